//! The fixed-size prefix carried by every heap object: its kind, GC flags,
//! a reference to its map, and (once forwarded) the new location.

use crate::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectKind {
    Map = 0,
    Slots = 1,
    Method = 2,
    Block = 3,
    ByteArray = 4,
    Activation = 5,
}

bitflags::bitflags! {
    pub struct HeaderFlags: u8 {
        /// Reachable from a tracked reference or the lobby; never collected.
        const GLOBAL = 0b0001;
        /// Needs a finalizer run before its storage is reclaimed.
        const NEEDS_FINALIZATION = 0b0010;
        /// Present in the old generation's remembered set (holds a
        /// potentially-young reference some young object depends on).
        const REMEMBERED = 0b0100;
        /// Has survived at least one minor collection; used to drive
        /// promotion into the old generation.
        const SURVIVED_MINOR = 0b1000;
        /// Lives in the old generation. Old objects are never moved by a
        /// minor collection; only a major collection relocates them.
        const OLD_GENERATION = 0b10000;
    }
}

#[derive(Debug)]
pub struct Header {
    pub kind: ObjectKind,
    pub flags: HeaderFlags,
    pub map: Value,
    pub age: u8,
    /// Set by the collector while copying this object; `None` once a new
    /// minor collection starts (forwarding pointers only live for the
    /// duration of a single scavenge).
    pub forward: Option<Value>,
}

impl Header {
    pub fn new(kind: ObjectKind, map: Value) -> Self {
        Header { kind, flags: HeaderFlags::empty(), map, age: 0, forward: None }
    }

    pub fn is_forwarded(&self) -> bool {
        self.forward.is_some()
    }
}
