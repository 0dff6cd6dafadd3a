//! Ties the heap, the singleton objects and the activation stack together
//! into the single piece of state the interpreter, dispatcher and
//! primitive registry all thread through.

use crate::activation::ActivationStack;
use crate::config::Config;
use crate::error::AllocationError;
use crate::heap::Heap;
use crate::object::header::ObjectKind;
use crate::object::ObjectData;
use crate::state::State;
use crate::value::Value;
use std::io::Write;

pub struct Vm {
    pub heap: Heap,
    pub state: State,
    pub activations: ActivationStack,
    pub config: Config,
    /// Where `_Print:` and friends write. Stdout for the driver binary, an
    /// in-memory buffer in tests that need to assert on program output.
    pub output: Box<dyn Write>,
}

impl Vm {
    /// Builds the root set (singleton objects plus the live activation
    /// stack) from raw pointers rather than borrowed references: the heap
    /// call this feeds needs `&mut self.heap` for its duration, and the
    /// root-producing closure needs simultaneous access to `self.state` and
    /// `self.activations`, which the borrow checker cannot see are
    /// disjoint once hidden behind that call boundary.
    unsafe fn build_roots(state_ptr: *mut State, activations_ptr: *mut ActivationStack) -> Vec<*mut Value> {
        let state = &mut *state_ptr;
        let activations = &mut *activations_ptr;
        let mut roots = vec![
            &mut state.lobby as *mut Value,
            &mut state.nil as *mut Value,
            &mut state.true_object as *mut Value,
            &mut state.false_object as *mut Value,
            &mut state.integer_traits as *mut Value,
            &mut state.float_traits as *mut Value,
            &mut state.byte_array_map as *mut Value,
        ];
        activations.each_root_mut(|v| roots.push(v as *mut Value));
        roots
    }

    /// Allocates a new heap object.
    pub fn allocate(&mut self, kind: ObjectKind, map: Value, data: ObjectData) -> Result<Value, AllocationError> {
        let state_ptr: *mut State = &mut self.state;
        let activations_ptr: *mut ActivationStack = &mut self.activations;
        self.heap.allocate(kind, map, data, || unsafe { Self::build_roots(state_ptr, activations_ptr) })
    }

    /// Reserves room for a multi-step allocation sequence (see
    /// `Heap::ensure_space`) so none of the `allocate` calls that follow
    /// need to collect.
    pub fn ensure_space(&mut self, size: usize) {
        let state_ptr: *mut State = &mut self.state;
        let activations_ptr: *mut ActivationStack = &mut self.activations;
        self.heap.ensure_space(size, &mut || unsafe { Self::build_roots(state_ptr, activations_ptr) });
    }
}
