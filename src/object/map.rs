//! Maps describe the shared shape of a family of objects: their ordered
//! slot list and, for method and block maps, the code they run. Adding a
//! slot to an object never mutates its current map in place; it derives a
//! fresh map (copy-on-write) so every other object still pointing at the
//! old map is unaffected.

use crate::activation::WeakActivationRef;
use crate::ast;
use crate::hasher::hash_name;
use crate::object::slot::{SlotBinding, SlotDescriptor, SlotFlags};
use std::rc::Rc;
use std::sync::Arc;

/// Code and metadata specific to method and block maps.
#[derive(Clone)]
pub struct CodeInfo {
    pub statements: Rc<[ast::Statement]>,
    pub script: Rc<ast::Script>,
    pub argument_slot_count: u8,
    /// Present only for block maps: the activation a non-local return or
    /// implicit parent lookup unwinds to / delegates through.
    pub block: Option<BlockInfo>,
}

#[derive(Clone)]
pub struct BlockInfo {
    pub parent_activation: WeakActivationRef,
    pub nonlocal_target: WeakActivationRef,
}

pub struct Map {
    pub slots: Vec<SlotDescriptor>,
    pub assignable_slot_count: u8,
    pub code: Option<CodeInfo>,
}

impl Map {
    pub fn empty() -> Self {
        Map { slots: Vec::new(), assignable_slot_count: 0, code: None }
    }

    pub fn for_code(
        slots: Vec<SlotDescriptor>,
        assignable_slot_count: u8,
        statements: Rc<[ast::Statement]>,
        script: Rc<ast::Script>,
        argument_slot_count: u8,
        block: Option<BlockInfo>,
    ) -> Self {
        Map {
            slots,
            assignable_slot_count,
            code: Some(CodeInfo { statements, script, argument_slot_count, block }),
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(&self.code, Some(c) if c.block.is_some())
    }

    pub fn find(&self, name: &str, name_hash: u32) -> Option<&SlotDescriptor> {
        self.slots.iter().find(|s| s.matches(name, name_hash))
    }

    pub fn find_index(&self, name: &str, name_hash: u32) -> Option<usize> {
        self.slots.iter().position(|s| s.matches(name, name_hash))
    }

    /// Derives a new map with one additional slot appended. At most 255
    /// assignable slots are supported per object; `None` signals overflow.
    pub fn with_added_slot(
        &self,
        name: Arc<str>,
        is_mutable: bool,
        is_parent: bool,
        value: crate::value::Value,
    ) -> Option<Map> {
        let mut slots = self.slots.clone();
        let mut flags = SlotFlags::empty();
        if is_mutable {
            flags.insert(SlotFlags::MUTABLE);
        }
        if is_parent {
            flags.insert(SlotFlags::PARENT);
        }
        let name_hash = hash_name(name.as_bytes());
        let (binding, assignable_slot_count) = if is_mutable {
            let next_index = self.assignable_slot_count;
            if next_index == u8::MAX {
                return None;
            }
            (SlotBinding::Index(next_index), next_index + 1)
        } else {
            (SlotBinding::Constant(value), self.assignable_slot_count)
        };
        slots.push(SlotDescriptor { name, name_hash, flags, binding });
        Some(Map { slots, assignable_slot_count, code: self.code.clone() })
    }

    /// Every `Constant` slot binding holds a `Value` in its own right — a
    /// method object, a parent object, a literal — not merely a shape
    /// descriptor, so the collector must trace it the same as an assignable
    /// slot value. `Index` bindings name a slot in the *owning object's*
    /// assignable-value array and carry nothing here.
    pub fn each_child<F: FnMut(&mut crate::value::Value)>(&mut self, mut f: F) {
        for slot in self.slots.iter_mut() {
            if let SlotBinding::Constant(v) = &mut slot.binding {
                f(v);
            }
        }
    }
}
