//! Heap object representations. A `HeapObject` is a fixed header plus a
//! payload that varies by kind; the payload's variable-length parts (slot
//! value arrays, byte buffers) are owned Rust collections rather than a
//! hand-rolled flexible array member, so moving an object during a
//! collection is an ordinary Rust move of its payload into a freshly
//! allocated header rather than a raw byte copy. Client code never holds a
//! `HeapObject` pointer across anything that can allocate, so the two
//! approaches are observationally identical (see `heap::gc`).

pub mod header;
pub mod map;
pub mod slot;

use crate::value::Value;
use header::{Header, ObjectKind};
use map::Map;

pub enum ObjectData {
    Map(Map),
    Slots(Vec<Value>),
    Method(Vec<Value>),
    Block(Vec<Value>),
    ByteArray(Vec<u8>),
    Activation { bindings: Vec<Value>, receiver: Value, defining: Value },
}

pub struct HeapObject {
    pub header: Header,
    pub data: ObjectData,
}

impl HeapObject {
    pub fn new(kind: ObjectKind, map: Value, data: ObjectData) -> Self {
        HeapObject { header: Header::new(kind, map), data }
    }

    pub fn kind(&self) -> ObjectKind {
        self.header.kind
    }

    /// The assignable-slot value array for object kinds that have one.
    /// Maps and byte arrays do not.
    pub fn values(&self) -> Option<&[Value]> {
        match &self.data {
            ObjectData::Slots(v) | ObjectData::Method(v) | ObjectData::Block(v) => Some(v),
            ObjectData::Activation { bindings, .. } => Some(bindings),
            ObjectData::Map(_) | ObjectData::ByteArray(_) => None,
        }
    }

    pub fn values_mut(&mut self) -> Option<&mut Vec<Value>> {
        match &mut self.data {
            ObjectData::Slots(v) | ObjectData::Method(v) | ObjectData::Block(v) => Some(v),
            ObjectData::Activation { bindings, .. } => Some(bindings),
            ObjectData::Map(_) | ObjectData::ByteArray(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match &self.data {
            ObjectData::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match &mut self.data {
            ObjectData::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            ObjectData::ByteArray(b) => Some(b),
            _ => None,
        }
    }

    /// A rough byte-size estimate used purely for GC sizing decisions
    /// (when to trigger a collection, when to grow the old generation).
    pub fn approx_size(&self) -> usize {
        match &self.data {
            ObjectData::Map(m) => map_alloc_size(m.slots.len()),
            ObjectData::Slots(v) | ObjectData::Method(v) | ObjectData::Block(v) => values_alloc_size(v.len()),
            ObjectData::ByteArray(b) => std::mem::size_of::<Header>() + b.len(),
            ObjectData::Activation { bindings, .. } => {
                std::mem::size_of::<Header>() + (bindings.len() + 2) * std::mem::size_of::<Value>()
            }
        }
    }

    /// Visits every outgoing reference: the map pointer, assignable slot
    /// values, and (for `Map` payloads) every constant-bound slot value —
    /// method objects and constant parent objects live there, not in any
    /// assignable-value array, and are just as reachable. Used by the
    /// collector to trace and relocate live references without needing to
    /// know the object's kind.
    pub fn each_child<F: FnMut(&mut Value)>(&mut self, mut f: F) {
        f(&mut self.header.map);
        match &mut self.data {
            ObjectData::Slots(v) | ObjectData::Method(v) | ObjectData::Block(v) => {
                for value in v.iter_mut() {
                    f(value);
                }
            }
            ObjectData::Activation { bindings, receiver, defining } => {
                for value in bindings.iter_mut() {
                    f(value);
                }
                f(receiver);
                f(defining);
            }
            ObjectData::Map(m) => m.each_child(f),
            ObjectData::ByteArray(_) => {}
        }
    }
}

/// Conservative size estimate for a `Map` payload with `slot_count` slots,
/// usable before the `Map` itself is built (e.g. to reserve space for a
/// map-then-object allocation sequence with `Heap::ensure_space` ahead of
/// either allocation — see `interpreter::eval_object_literal`).
pub fn map_alloc_size(slot_count: usize) -> usize {
    std::mem::size_of::<Header>() + slot_count * std::mem::size_of::<slot::SlotDescriptor>()
}

/// Conservative size estimate for a `Slots`/`Method`/`Block` payload with
/// `value_count` assignable values, usable before the value array itself
/// is built. See `map_alloc_size`.
pub fn values_alloc_size(value_count: usize) -> usize {
    std::mem::size_of::<Header>() + value_count * std::mem::size_of::<Value>()
}
