//! The lookup protocol: given a receiver and a selector, finds the slot
//! that answers it by scanning the receiver's map and, on a miss,
//! recursing into its parent slots.
//!
//! Two behaviours left open for an implementation to decide:
//!
//! - **Ambiguous parents.** If a selector is reachable through more than
//!   one parent slot, the first parent in declaration order that answers
//!   it wins; remaining parents are not consulted. This matches the
//!   resolution order objects are already defined to make everything
//!   else deterministic by (slot declaration order), so extending it to
//!   parent search keeps one rule instead of two.
//! - **Assignment scope.** A keyword send used as an assignment
//!   (`name:`) only ever resolves against the receiver's own direct
//!   slots; it never walks into parents. Self-like languages that allow
//!   assigning through a parent invite surprising action at a distance
//!   when two objects share a parent's mutable slot, so this
//!   implementation requires an explicit local slot to assign into.

use crate::object::header::ObjectKind;
use crate::object::map::Map;
use crate::object::slot::{SlotBinding, SlotDescriptor};
use crate::object::ObjectData;
use crate::state::State;
use crate::value::Value;
use std::collections::HashSet;

#[derive(Copy, Clone, PartialEq, Eq)]
pub enum LookupIntent {
    Read,
    Assign,
}

pub struct Found {
    /// The object whose map actually held the matching slot (the receiver
    /// for a direct hit, or some ancestor for an inherited one).
    pub owner: Value,
    pub slot: SlotDescriptor,
}

pub enum LookupOutcome {
    Found(Found),
    Miss,
}

/// Activation objects delegate transparently to their reified receiver;
/// integers and floats are not heap objects at all and delegate to a
/// shared traits object. This resolves a value to the object lookup
/// actually proceeds against.
fn resolve_object(mut value: Value, state: &State) -> Value {
    loop {
        if value.is_int() {
            return state.integer_traits;
        }
        if value.is_float() {
            return state.float_traits;
        }
        if value.is_object() {
            let obj = unsafe { value.object_ref() };
            if obj.kind() == ObjectKind::Activation {
                if let ObjectData::Activation { receiver, .. } = &obj.data {
                    value = *receiver;
                    continue;
                }
            }
        }
        return value;
    }
}

fn map_of(object: Value) -> &'static Map {
    let obj = unsafe { object.object_ref() };
    let map_obj = unsafe { obj.header.map.object_ref() };
    map_obj.as_map().expect("object header.map must reference a Map")
}

pub fn lookup(receiver: Value, name: &str, name_hash: u32, intent: LookupIntent, state: &State) -> LookupOutcome {
    let search_object = resolve_object(receiver, state);
    if !search_object.is_object() {
        return LookupOutcome::Miss;
    }
    let mut visited = HashSet::new();
    lookup_on(search_object, name, name_hash, intent, state, &mut visited)
}

fn lookup_on(
    object: Value,
    name: &str,
    name_hash: u32,
    intent: LookupIntent,
    state: &State,
    visited: &mut HashSet<usize>,
) -> LookupOutcome {
    let addr = object.as_object() as usize;
    if !visited.insert(addr) {
        return LookupOutcome::Miss;
    }

    let map = map_of(object);
    if let Some(slot) = map.find(name, name_hash) {
        return LookupOutcome::Found(Found { owner: object, slot: slot.clone() });
    }

    if intent == LookupIntent::Assign {
        return LookupOutcome::Miss;
    }

    let obj_ref = unsafe { object.object_ref() };
    for slot in map.slots.iter().filter(|s| s.is_parent()) {
        let parent_value = match slot.binding {
            SlotBinding::Constant(v) => v,
            SlotBinding::Index(idx) => obj_ref.values().expect("parent slot on a non-storage object")[idx as usize],
        };
        let parent_object = resolve_object(parent_value, state);
        if !parent_object.is_object() {
            continue;
        }
        match lookup_on(parent_object, name, name_hash, intent, state, visited) {
            LookupOutcome::Found(f) => return LookupOutcome::Found(f),
            LookupOutcome::Miss => continue,
        }
    }

    LookupOutcome::Miss
}

/// Reads a slot's current value given a successful lookup: a constant
/// slot's value is shared by every object with that map; an assignable
/// slot's value lives in the owning object's own value array.
pub fn read_slot(found: &Found) -> Value {
    match found.slot.binding {
        SlotBinding::Constant(v) => v,
        SlotBinding::Index(idx) => {
            let obj = unsafe { found.owner.object_ref() };
            obj.values().expect("assignable slot on a non-storage object")[idx as usize]
        }
    }
}
