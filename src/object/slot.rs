//! Slot descriptors, the shared shape information stored in a `Map`.

use crate::value::Value;

bitflags::bitflags! {
    pub struct SlotFlags: u8 {
        const MUTABLE  = 0b0001;
        const PARENT   = 0b0010;
        const ARGUMENT = 0b0100;
    }
}

/// Either the slot's value is baked into the map (constant, shared by every
/// object with this map), or it names an index into the owning object's own
/// assignable-value array.
#[derive(Copy, Clone, Debug)]
pub enum SlotBinding {
    Constant(Value),
    Index(u8),
}

#[derive(Clone, Debug)]
pub struct SlotDescriptor {
    pub name: std::sync::Arc<str>,
    pub name_hash: u32,
    pub flags: SlotFlags,
    pub binding: SlotBinding,
}

impl SlotDescriptor {
    pub fn is_mutable(&self) -> bool {
        self.flags.contains(SlotFlags::MUTABLE)
    }

    pub fn is_parent(&self) -> bool {
        self.flags.contains(SlotFlags::PARENT)
    }

    pub fn is_argument(&self) -> bool {
        self.flags.contains(SlotFlags::ARGUMENT)
    }

    pub fn matches(&self, name: &str, name_hash: u32) -> bool {
        self.name_hash == name_hash && &*self.name == name
    }
}
