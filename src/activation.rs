//! The activation stack. Each activation records a method or block's bound
//! receiver and its argument/local bindings; blocks additionally carry a
//! weak reference to the activation that created them (their lexical
//! parent) and the activation a non-local return from inside them should
//! unwind to.
//!
//! Weak references are index+generation pairs rather than raw pointers: a
//! block can outlive the activation that created it (it escapes as a
//! first-class value), so dereferencing a stale reference must be
//! detectable rather than undefined behaviour.

use crate::ast::SourceRange;
use crate::error::RuntimeError;
use crate::value::Value;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WeakActivationRef {
    pub index: u32,
    pub generation: u32,
}

pub struct Activation {
    pub receiver: Value,
    /// The method or block object's map: carries the code this activation
    /// is running plus the slot descriptors for argument/local bindings.
    pub map: Value,
    pub bindings: Vec<Value>,
    pub label: Arc<str>,
    pub call_range: SourceRange,
    pub parent: Option<WeakActivationRef>,
    pub nonlocal_target: Option<WeakActivationRef>,
    generation: u32,
}

enum Slot {
    Occupied(Activation),
    Free,
}

/// A fixed-capacity stack of activations. Slots are reused as activations
/// pop, with a monotonically increasing generation counter per slot so a
/// `WeakActivationRef` taken before a slot was reused can be told apart
/// from one taken after.
pub struct ActivationStack {
    slots: Vec<Slot>,
    generations: Vec<u32>,
    top: usize,
    max_depth: usize,
}

impl ActivationStack {
    pub fn new(max_depth: usize) -> Self {
        ActivationStack { slots: Vec::new(), generations: Vec::new(), top: 0, max_depth }
    }

    pub fn depth(&self) -> usize {
        self.top
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    fn current_ref_at(&self, index: usize) -> WeakActivationRef {
        WeakActivationRef { index: index as u32, generation: self.generations[index] }
    }

    pub fn top_ref(&self) -> Option<WeakActivationRef> {
        if self.top == 0 {
            None
        } else {
            Some(self.current_ref_at(self.top - 1))
        }
    }

    pub fn current(&self) -> Option<&Activation> {
        if self.top == 0 {
            return None;
        }
        match &self.slots[self.top - 1] {
            Slot::Occupied(a) => Some(a),
            Slot::Free => unreachable!("top slot must be occupied"),
        }
    }

    pub fn current_mut(&mut self) -> Option<&mut Activation> {
        if self.top == 0 {
            return None;
        }
        match &mut self.slots[self.top - 1] {
            Slot::Occupied(a) => Some(a),
            Slot::Free => unreachable!("top slot must be occupied"),
        }
    }

    pub fn push(
        &mut self,
        receiver: Value,
        map: Value,
        bindings: Vec<Value>,
        label: Arc<str>,
        call_range: SourceRange,
        parent: Option<WeakActivationRef>,
        nonlocal_target: Option<WeakActivationRef>,
    ) -> Result<WeakActivationRef, RuntimeError> {
        if self.top >= self.max_depth {
            return Err(RuntimeError::new(
                format!("stack overflow: activation depth exceeded {}", self.max_depth),
                call_range,
            ));
        }
        let activation = Activation {
            receiver,
            map,
            bindings,
            label,
            call_range,
            parent,
            nonlocal_target,
            generation: 0,
        };
        if self.top == self.slots.len() {
            self.slots.push(Slot::Occupied(activation));
            self.generations.push(0);
        } else {
            let gen = self.generations[self.top] + 1;
            self.generations[self.top] = gen;
            self.slots[self.top] = Slot::Occupied(Activation { generation: gen, ..activation });
        }
        let r = self.current_ref_at(self.top);
        self.top += 1;
        Ok(r)
    }

    pub fn pop(&mut self) {
        assert!(self.top > 0, "popped an empty activation stack");
        self.top -= 1;
        self.slots[self.top] = Slot::Free;
    }

    /// Looks up a weak reference. Returns `None` if the referenced
    /// activation has since been popped and its slot reused or retired.
    pub fn resolve(&self, r: WeakActivationRef) -> Option<&Activation> {
        let index = r.index as usize;
        if index >= self.top {
            return None;
        }
        if self.generations[index] != r.generation {
            return None;
        }
        match &self.slots[index] {
            Slot::Occupied(a) => Some(a),
            Slot::Free => None,
        }
    }

    /// Visits every `Value` owned by a live activation (its receiver, its
    /// method/block map, and its bindings) so the collector can treat the
    /// whole stack as a root set.
    pub fn each_root_mut<F: FnMut(&mut Value)>(&mut self, mut f: F) {
        for slot in self.slots[..self.top].iter_mut() {
            if let Slot::Occupied(a) = slot {
                f(&mut a.receiver);
                f(&mut a.map);
                for binding in a.bindings.iter_mut() {
                    f(binding);
                }
            }
        }
    }

    /// Every currently-live activation, innermost (most recently pushed)
    /// first. Used to build a stack trace when a runtime error is raised.
    pub fn trace_frames(&self) -> impl Iterator<Item = &Activation> {
        self.slots[..self.top].iter().rev().map(|s| match s {
            Slot::Occupied(a) => a,
            Slot::Free => unreachable!("live range must be fully occupied"),
        })
    }
}
