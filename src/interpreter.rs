//! The tree-walking evaluator. Turns an AST node into a `Completion` by
//! recursively evaluating its children and threading every non-normal
//! completion straight back up to the caller (see `completion::propagate`).
//!
//! This module only builds objects and drives evaluation order; dispatch
//! (resolving a selector to a method/block/plain value and pushing the
//! resulting activation) lives in `dispatch`.

use crate::ast::{Expression, NumberLiteral, Script, Slot, SourceRange, Statement};
use crate::completion::{propagate, Completion};
use crate::dispatch;
use crate::error::RuntimeError;
use crate::heap::tracked::TrackedRef;
use crate::object::header::ObjectKind;
use crate::object::map::{BlockInfo, Map};
use crate::object::slot::{SlotBinding, SlotDescriptor, SlotFlags};
use crate::object::{self, ObjectData};
use crate::value::Value;
use crate::vm::Vm;
use std::rc::Rc;
use std::sync::Arc;

/// Evaluates every statement in `script` against `self_value` as the
/// receiver, in a fresh top-level activation, returning the last
/// statement's value (or `nil` for an empty script).
///
/// A non-local return reaching the top frame is not treated as an error:
/// there is no enclosing method for it to have escaped, so the returned
/// expression's value is simply the script's result (see SPEC_FULL.md
/// §4.5).
pub fn execute_script(vm: &mut Vm, script: &Rc<Script>, self_value: Value) -> Result<Value, RuntimeError> {
    vm.activations.push(
        self_value,
        vm.state.nil,
        Vec::new(),
        script.name.clone(),
        SourceRange::synthetic(),
        None,
        None,
    )?;
    let result = execute_script_frame(vm, &script.statements, self_value);
    let frame = vm.activations.current().map(|a| (a.label.clone(), a.call_range));
    vm.activations.pop();
    match result {
        Completion::Normal(v) => Ok(v),
        // A `^` reaching all the way out of the top-level script has
        // nowhere else to go; its value is simply the script's result.
        Completion::NonLocalReturn { value, .. } => Ok(value),
        Completion::RuntimeError(mut e) => {
            if let Some((label, range)) = frame {
                e.push_frame(label.to_string(), range);
            }
            Err(e)
        }
    }
}

/// Runs a nested script (e.g. a `_LoadFile:` primitive) against the
/// caller's already-live activation stack and lobby, returning the raw
/// completion rather than collapsing it to a `Result`: a nested load is
/// itself just another expression from the caller's point of view.
pub fn execute_sub_script(vm: &mut Vm, script: &Rc<Script>, self_value: Value) -> Completion {
    execute_script_frame(vm, &script.statements, self_value)
}

pub(crate) fn execute_script_frame(vm: &mut Vm, statements: &[Statement], self_value: Value) -> Completion {
    let mut last = Completion::Normal(vm.state.nil);
    for statement in statements {
        let Statement::Expression(expr) = statement;
        last = eval_expression(vm, expr, self_value);
        if !last.is_normal() {
            return last;
        }
    }
    last
}

pub fn eval_expression(vm: &mut Vm, expr: &Expression, self_value: Value) -> Completion {
    match expr {
        Expression::Number(n, _) => Completion::Normal(match n {
            NumberLiteral::Integer(i) => Value::int(*i),
            NumberLiteral::Float(f) => Value::float(*f),
        }),
        Expression::String(s, range) => eval_string_literal(vm, s, *range),
        Expression::Identifier(name, range) => eval_identifier(vm, name, *range, self_value),
        Expression::Return(inner, _) => eval_return(vm, inner, self_value),
        Expression::Message(message) => dispatch::eval_message(vm, message, self_value),
        Expression::ObjectLiteral { slots, statements, range } => {
            eval_object_literal(vm, slots, statements, *range, self_value)
        }
        Expression::BlockLiteral { slots, statements, range } => {
            eval_block_literal(vm, slots, statements, *range, self_value)
        }
    }
}

fn eval_string_literal(vm: &mut Vm, s: &Arc<str>, range: SourceRange) -> Completion {
    let bytes = s.as_bytes().to_vec();
    let byte_array_map = vm.state.byte_array_map;
    match vm.allocate(ObjectKind::ByteArray, byte_array_map, ObjectData::ByteArray(bytes)) {
        Ok(v) => Completion::Normal(v),
        Err(e) => Completion::RuntimeError(RuntimeError::new(
            format!("out of memory allocating string: {}", e),
            range,
        )),
    }
}

/// `^expr`: evaluates `expr`, then packages it as a non-local return aimed
/// at the current activation's non-local-return target (itself, for a
/// method activation; its captured target, for a block activation).
fn eval_return(vm: &mut Vm, inner: &Expression, self_value: Value) -> Completion {
    let value = propagate!(eval_expression(vm, inner, self_value));
    let current = vm.activations.current().expect("return evaluated outside any activation");
    let target = current.nonlocal_target.or_else(|| vm.activations.top_ref());
    match target {
        Some(target) => Completion::NonLocalReturn { target, value },
        None => Completion::Normal(value),
    }
}

/// An identifier is sugar for a zero-argument send to `self`. `send`
/// itself recognizes `_`-prefixed selectors as primitives, so this is
/// nothing more than that send (spec.md §4.5's identifier rule is a
/// special case of §4.6's general dispatch algorithm, not a separate one).
fn eval_identifier(vm: &mut Vm, name: &Arc<str>, range: SourceRange, self_value: Value) -> Completion {
    dispatch::send_implicit(vm, self_value, name, &[], range)
}

/// Shared slot-evaluation pass for object, method and block literals:
/// evaluates every slot's initializer in declaration order first (so side
/// effects in initializers are strictly ordered, per spec.md §5), then
/// builds the slot descriptors and assignable-value array the resulting
/// map and object need.
///
/// Every evaluated value is kept alive via `Heap::track` the instant it is
/// computed, not just bundled into a plain `Vec`: a later slot's own
/// initializer, a sibling method allocation, or the final map/object
/// allocation this feeds can all trigger a collection, and nothing roots a
/// bare `Value` sitting in a descriptor or assignable-value array that
/// hasn't been installed on the heap yet. `resolve` reads each value back
/// from its (possibly moved) current location and releases the tracked
/// reference; callers must not let any further allocation happen between
/// `resolve` and the `allocate` call that installs the result — reserve
/// room for that call with `Vm::ensure_space` first.
struct TrackedSlots {
    descriptors: Vec<SlotDescriptor>,
    assignable: Vec<TrackedRef>,
    constants: Vec<(usize, TrackedRef)>,
}

impl TrackedSlots {
    fn resolve(self, vm: &mut Vm) -> (Vec<SlotDescriptor>, Vec<Value>) {
        let mut descriptors = self.descriptors;
        for (idx, tracked) in self.constants {
            let value = vm.heap.tracked_value(tracked);
            vm.heap.untrack(tracked);
            descriptors[idx].binding = SlotBinding::Constant(value);
        }
        let assignable_values = self
            .assignable
            .into_iter()
            .map(|tracked| {
                let value = vm.heap.tracked_value(tracked);
                vm.heap.untrack(tracked);
                value
            })
            .collect();
        (descriptors, assignable_values)
    }

    /// Appends a method slot built separately (see `eval_object_literal`),
    /// tracking its value the same way a data slot's initializer result is
    /// tracked above.
    fn push_method(&mut self, vm: &mut Vm, name: Arc<str>, name_hash: u32, method_value: Value) {
        let idx = self.descriptors.len();
        let tracked = vm.heap.track(method_value);
        self.constants.push((idx, tracked));
        self.descriptors.push(SlotDescriptor { name, name_hash, flags: SlotFlags::empty(), binding: SlotBinding::Constant(method_value) });
    }
}

fn eval_slots(vm: &mut Vm, slots: &[Slot], self_value: Value) -> Result<TrackedSlots, Completion> {
    let mut tracked = TrackedSlots { descriptors: Vec::with_capacity(slots.len()), assignable: Vec::new(), constants: Vec::new() };
    for slot in slots {
        // Slots whose `value` is itself a method/block-shaped literal are
        // handled by the caller building the code-bearing map (see
        // `eval_object_literal`'s method-slot special case below); a
        // plain data slot's initializer is evaluated here.
        if !slot.arguments.is_empty() {
            continue;
        }
        let value = match eval_expression(vm, &slot.value, self_value) {
            Completion::Normal(v) => v,
            other => return Err(other),
        };
        let name_hash = crate::hasher::hash_name(slot.name.as_bytes());
        let mut flags = SlotFlags::empty();
        if slot.is_mutable {
            flags.insert(SlotFlags::MUTABLE);
        }
        if slot.is_parent {
            flags.insert(SlotFlags::PARENT);
        }
        if slot.is_argument {
            flags.insert(SlotFlags::ARGUMENT);
        }
        if slot.is_mutable || slot.is_argument {
            let idx = tracked.assignable.len() as u8;
            tracked.assignable.push(vm.heap.track(value));
            tracked.descriptors.push(SlotDescriptor { name: slot.name.clone(), name_hash, flags, binding: SlotBinding::Index(idx) });
        } else {
            let descriptor_idx = tracked.descriptors.len();
            let tracked_ref = vm.heap.track(value);
            tracked.constants.push((descriptor_idx, tracked_ref));
            tracked.descriptors.push(SlotDescriptor { name: slot.name.clone(), name_hash, flags, binding: SlotBinding::Constant(value) });
        }
    }
    Ok(tracked)
}

fn eval_object_literal(
    vm: &mut Vm,
    slots: &[Slot],
    statements: &[Statement],
    range: SourceRange,
    self_value: Value,
) -> Completion {
    let mut tracked = match eval_slots(vm, slots, self_value) {
        Ok(t) => t,
        Err(c) => return c,
    };
    // Method/argument slots (those whose AST node carries its own
    // `arguments` list) describe nested methods rather than data; they
    // are collected separately because each becomes its own Method
    // object with its own map, not a descriptor on this object's map.
    // Each allocates independently (its own map, then its own Method
    // object), so every method built so far must stay tracked — sibling
    // methods further down this loop can themselves trigger a collection.
    for slot in slots.iter().filter(|s| !s.arguments.is_empty()) {
        let method_value = match allocate_method(vm, slot, self_value) {
            Ok(v) => v,
            Err(c) => return c,
        };
        let name_hash = crate::hasher::hash_name(slot.name.as_bytes());
        tracked.push_method(vm, slot.name.clone(), name_hash, method_value);
    }

    // Reserve room for both of the allocations below as one combined
    // request before resolving (and thereby untracking) anything: a
    // collection running after resolution, with nothing left rooting the
    // now-plain `Value`s about to be embedded in the map and object, would
    // not see them (spec.md §4.1). Only slot *counts* are needed for the
    // estimate, so this can run before `resolve`.
    let map_size = object::map_alloc_size(tracked.descriptors.len());
    let obj_size = object::values_alloc_size(tracked.assignable.len());
    vm.ensure_space(map_size + obj_size);

    let (descriptors, assignable_values) = tracked.resolve(vm);
    let assignable_slot_count = assignable_values.len() as u8;
    let map = Map { slots: descriptors, assignable_slot_count, code: None };
    let map_of_maps = vm.heap.map_of_maps;
    let map_value = match vm.allocate(ObjectKind::Map, map_of_maps, ObjectData::Map(map)) {
        Ok(v) => v,
        Err(e) => return Completion::RuntimeError(RuntimeError::new(format!("out of memory: {}", e), range)),
    };
    // Re-check the AST for a statements list on the literal itself: a
    // bare `(| ... |)` with trailing statements evaluates them against
    // the freshly built object once it exists (matching `(| x = 3 |)
    // somethingElse` running `somethingElse` with the new object as
    // `self`).
    match vm.allocate(ObjectKind::Slots, map_value, ObjectData::Slots(assignable_values)) {
        Ok(obj) => {
            if statements.is_empty() {
                Completion::Normal(obj)
            } else {
                execute_script_frame(vm, statements, obj)
            }
        }
        Err(e) => Completion::RuntimeError(RuntimeError::new(format!("out of memory: {}", e), range)),
    }
}

/// Builds a Method object for a slot whose AST node carries an argument
/// list (`name: a With: b = ( ... )`). The method's own body may itself
/// declare slots (rare, but legal per the shared `Slot`/`ObjectLiteral`
/// grammar), so its `value` expression is expected to be an
/// `ObjectLiteral` or `BlockLiteral` supplying those plus the statement
/// list, per spec.md §6.
fn allocate_method(vm: &mut Vm, slot: &Slot, self_value: Value) -> Result<Value, Completion> {
    let (body_slots, statements, range): (&[Slot], &[Statement], SourceRange) = match &slot.value {
        Expression::ObjectLiteral { slots, statements, range } => (slots, statements, *range),
        Expression::BlockLiteral { slots, statements, range } => (slots, statements, *range),
        other => (&[], std::slice::from_ref(leak_statement(other)), other.range()),
    };

    let mut tracked = eval_slots(vm, body_slots, self_value)?;

    // Argument slots are prepended so their indices are stable and known
    // ahead of time by `dispatch::activate_method`, which writes incoming
    // arguments directly into indices `0..argc`. Arguments start at `nil`
    // (a non-heap marker, never relocated), so they need no tracking.
    let mut argument_descriptors = Vec::with_capacity(slot.arguments.len());
    for arg_name in &slot.arguments {
        let name_hash = crate::hasher::hash_name(arg_name.as_bytes());
        let idx = argument_descriptors.len() as u8;
        argument_descriptors.push(SlotDescriptor {
            name: arg_name.clone(),
            name_hash,
            flags: SlotFlags::MUTABLE | SlotFlags::ARGUMENT,
            binding: SlotBinding::Index(idx),
        });
    }
    let argc = argument_descriptors.len() as u8;
    // Re-base the non-argument assignable indices past the argument block.
    for descriptor in tracked.descriptors.iter_mut() {
        if let SlotBinding::Index(i) = &mut descriptor.binding {
            *i += argc;
        }
    }

    // Reserve the combined map+object size before resolving (see
    // `eval_object_literal` for why resolution must come after).
    let map_size = object::map_alloc_size(argument_descriptors.len() + tracked.descriptors.len());
    let obj_size = object::values_alloc_size(argc as usize + tracked.assignable.len());
    vm.ensure_space(map_size + obj_size);

    let (body_descriptors, body_assignable_values) = tracked.resolve(vm);
    argument_descriptors.extend(body_descriptors);
    let mut argument_values = vec![vm.state.nil; argc as usize];
    argument_values.extend(body_assignable_values);

    let statements_rc: Rc<[Statement]> = Rc::from(statements.to_vec().into_boxed_slice());
    let script = synthetic_script(range);
    let map = Map::for_code(argument_descriptors, argument_values.len() as u8, statements_rc, script, argc, None);
    let map_of_maps = vm.heap.map_of_maps;
    let map_value = vm
        .allocate(ObjectKind::Map, map_of_maps, ObjectData::Map(map))
        .map_err(|e| Completion::RuntimeError(RuntimeError::new(format!("out of memory: {}", e), range)))?;
    vm.allocate(ObjectKind::Method, map_value, ObjectData::Method(argument_values))
        .map_err(|e| Completion::RuntimeError(RuntimeError::new(format!("out of memory: {}", e), range)))
}

fn eval_block_literal(
    vm: &mut Vm,
    slots: &[Slot],
    statements: &[Statement],
    range: SourceRange,
    self_value: Value,
) -> Completion {
    let tracked = match eval_slots(vm, slots, self_value) {
        Ok(t) => t,
        Err(c) => return c,
    };

    // Block arguments, like method arguments, are the AST's own
    // `arguments` field on whichever slot wraps the block — but a bare
    // `[ :a | ... ]` literal stores its argument names on the literal
    // itself via zero-arity pseudo-slots in this AST shape; this crate's
    // grammar instead expects the parser to desugar block parameters into
    // leading argument-flagged slots, matching method argument handling.
    let arg_slots: Vec<&Slot> = slots.iter().filter(|s| s.is_argument).collect();
    let argc = arg_slots.len() as u8;

    let parent_ref = match vm.activations.top_ref() {
        Some(r) => r,
        None => {
            return Completion::RuntimeError(RuntimeError::new(
                "block literal evaluated outside any activation",
                range,
            ))
        }
    };
    let nonlocal_target = vm
        .activations
        .current()
        .and_then(|a| a.nonlocal_target)
        .unwrap_or(parent_ref);

    // Reserve the combined map+object size before resolving (see
    // `eval_object_literal` for why resolution must come after).
    let map_size = object::map_alloc_size(tracked.descriptors.len());
    let obj_size = object::values_alloc_size(tracked.assignable.len());
    vm.ensure_space(map_size + obj_size);

    let (descriptors, assignable_values) = tracked.resolve(vm);
    let statements_rc: Rc<[Statement]> = Rc::from(statements.to_vec().into_boxed_slice());
    let script = synthetic_script(range);
    let block_info = BlockInfo { parent_activation: parent_ref, nonlocal_target };
    let map = Map::for_code(descriptors, assignable_values.len() as u8, statements_rc, script, argc, Some(block_info));
    let map_of_maps = vm.heap.map_of_maps;
    let map_value = match vm.allocate(ObjectKind::Map, map_of_maps, ObjectData::Map(map)) {
        Ok(v) => v,
        Err(e) => return Completion::RuntimeError(RuntimeError::new(format!("out of memory: {}", e), range)),
    };
    match vm.allocate(ObjectKind::Block, map_value, ObjectData::Block(assignable_values)) {
        Ok(v) => Completion::Normal(v),
        Err(e) => Completion::RuntimeError(RuntimeError::new(format!("out of memory: {}", e), range)),
    }
}

/// Wraps a bare (non-object-literal) method body expression — e.g.
/// `double = ( self * 2 )` where the parser has already reduced the
/// parenthesised body to a single expression rather than an
/// `ObjectLiteral` with one statement — as a one-statement slice so
/// `allocate_method` has a uniform statements list to store.
fn leak_statement(expr: &Expression) -> &'static Statement {
    // Deliberately small and rare path: a boxed leak is acceptable here
    // since method bodies are created once per method literal evaluation,
    // not per activation.
    Box::leak(Box::new(Statement::Expression(expr.clone())))
}

fn synthetic_script(range: SourceRange) -> Rc<Script> {
    Rc::new(Script { name: Arc::from(format!("<literal@{}:{}>", range.line, range.column)), statements: Vec::new() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::vm::Vm;

    fn fresh_vm() -> Vm {
        crate::prepare_world(Config::default())
    }

    #[test]
    fn number_literal_evaluates_to_itself() {
        let mut vm = fresh_vm();
        let expr = Expression::Number(NumberLiteral::Integer(42), SourceRange::synthetic());
        let lobby = vm.state.lobby;
        match eval_expression(&mut vm, &expr, lobby) {
            Completion::Normal(v) => assert_eq!(v.as_int(), 42),
            _ => panic!("expected normal completion"),
        }
    }
}
