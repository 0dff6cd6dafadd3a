//! Selector and slot-name hashing. Slot lookup is a linear scan over a
//! small, ordered array (see `object::map`), so the hash only needs to be
//! cheap and well distributed enough to let the scan skip most
//! non-matching slots by comparing hashes before falling back to a byte
//! comparison.

use fxhash::FxHasher;
use std::hash::Hasher as _;

/// Computes the 32-bit name hash stored alongside each slot descriptor.
pub fn hash_name(bytes: &[u8]) -> u32 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    let full = hasher.finish();
    (full ^ (full >> 32)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_hash_identically() {
        assert_eq!(hash_name(b"foo"), hash_name(b"foo"));
    }

    #[test]
    fn differing_bytes_usually_differ() {
        assert_ne!(hash_name(b"foo"), hash_name(b"bar"));
        assert_ne!(hash_name(b"add:with:"), hash_name(b"add:"));
    }

    #[test]
    fn empty_name_hashes_consistently() {
        assert_eq!(hash_name(b""), hash_name(b""));
    }
}
