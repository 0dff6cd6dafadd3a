//! Message dispatch: turns a receiver, selector and argument list into a
//! `Completion`, per spec.md §4.6. `interpreter` hands every `Message`
//! expression and every identifier (a sugared zero-argument send) here;
//! this module is the only place that pushes a method or block activation.
//!
//! **Local bindings vs. self-sends.** A method or block's own argument and
//! local-data slots are not reached through the receiver's map at all —
//! `(| x <- 1. set: v = (x: v) |)` only works because `v` resolves against
//! the *current activation*, not against `self`'s slots (`self` has no
//! slot named `v`). So any implicit-receiver identifier or keyword send
//! (`message.receiver == None`) first checks the live activation's own
//! map for a matching argument/local slot before falling back to an
//! ordinary send to `self`. An explicit-receiver send (`obj foo`) always
//! goes straight to `self`-style dispatch on `obj` and never consults the
//! caller's locals — this is the Open Question from spec.md §9 resolved in
//! DESIGN.md.

use crate::ast::{Message, SourceRange};
use crate::completion::{propagate, Completion};
use crate::error::RuntimeError;
use crate::interpreter::{eval_expression, execute_script_frame};
use crate::lookup::{lookup, read_slot, LookupIntent, LookupOutcome};
use crate::object::header::ObjectKind;
use crate::object::map::Map;
use crate::object::slot::SlotBinding;
use crate::primitives;
use crate::value::Value;
use crate::vm::Vm;
use smallvec::SmallVec;
use std::sync::Arc;

pub fn eval_message(vm: &mut Vm, message: &Message, self_value: Value) -> Completion {
    let mut arguments: SmallVec<[Value; 4]> = SmallVec::with_capacity(message.arguments.len());
    for arg_expr in &message.arguments {
        arguments.push(propagate!(eval_expression(vm, arg_expr, self_value)));
    }
    match &message.receiver {
        Some(expr) => {
            let receiver = propagate!(eval_expression(vm, expr, self_value));
            send(vm, receiver, &message.selector, &arguments, message.range)
        }
        None => send_implicit(vm, self_value, &message.selector, &arguments, message.range),
    }
}

/// Dispatch for a send with no explicit receiver: identifiers, and bare
/// keyword/unary sends written without one. Checks the current
/// activation's own argument/local slots first.
pub fn send_implicit(vm: &mut Vm, self_value: Value, selector: &str, arguments: &[Value], range: SourceRange) -> Completion {
    if selector.starts_with('_') {
        return primitives::dispatch(vm, selector, self_value, arguments, range);
    }
    if let Some(completion) = try_local(vm, selector, arguments, range) {
        return completion;
    }
    send(vm, self_value, selector, arguments, range)
}

/// The full §4.6 dispatch algorithm for an already-evaluated receiver and
/// argument list, ignoring any local-activation bindings (used for sends
/// with an explicit receiver expression).
pub fn send(vm: &mut Vm, receiver: Value, selector: &str, arguments: &[Value], range: SourceRange) -> Completion {
    if selector.starts_with('_') {
        return primitives::dispatch(vm, selector, receiver, arguments, range);
    }

    if let Some(slot_name) = assignment_target(selector) {
        if let Some(completion) = try_assign(vm, receiver, slot_name, arguments, range) {
            return completion;
        }
    }

    let name_hash = crate::hasher::hash_name(selector.as_bytes());
    match lookup(receiver, selector, name_hash, LookupIntent::Read, &vm.state) {
        LookupOutcome::Miss => Completion::RuntimeError(RuntimeError::new(
            format!("did not understand {:?}", selector),
            range,
        )),
        LookupOutcome::Found(found) => {
            let value = read_slot(&found);
            if !value.is_object() {
                return Completion::Normal(value);
            }
            let obj = unsafe { value.object_ref() };
            match obj.kind() {
                ObjectKind::Method => activate_method(vm, value, receiver, selector, arguments, range),
                ObjectKind::Block if block_selector_matches(value, selector) => {
                    activate_block(vm, value, selector, arguments, range)
                }
                _ => Completion::Normal(value),
            }
        }
    }
}

/// Checks the current activation's own map for a slot matching `selector`
/// (read form) or its assignment base name (write form), acting directly
/// on the activation's `bindings` array rather than any object's value
/// array. Returns `None` when nothing local matches, meaning the caller
/// should fall back to an ordinary self-send.
fn try_local(vm: &mut Vm, selector: &str, arguments: &[Value], range: SourceRange) -> Option<Completion> {
    let activation_map = vm.activations.current()?.map;
    if !activation_map.is_object() {
        return None;
    }
    let map = map_of(activation_map);

    if let Some(name) = assignment_target(selector) {
        let name_hash = crate::hasher::hash_name(name.as_bytes());
        let idx = match map.find(name, name_hash) {
            Some(slot) if slot.is_mutable() => match slot.binding {
                SlotBinding::Index(i) => i,
                SlotBinding::Constant(_) => return None,
            },
            _ => return None,
        };
        let new_value = match arguments.first() {
            Some(v) => *v,
            None => return Some(Completion::RuntimeError(RuntimeError::new(format!("{}: requires one argument", name), range))),
        };
        vm.activations.current_mut().expect("checked above").bindings[idx as usize] = new_value;
        return Some(Completion::Normal(new_value));
    }

    if selector.contains(':') {
        return None;
    }
    let name_hash = crate::hasher::hash_name(selector.as_bytes());
    let slot = map.find(selector, name_hash)?;
    let value = match slot.binding {
        SlotBinding::Index(i) => vm.activations.current().expect("checked above").bindings[i as usize],
        SlotBinding::Constant(v) => v,
    };
    Some(Completion::Normal(value))
}

/// `selector` is a candidate assignment target exactly when it is a
/// single keyword part ending in `:` — `x:`, not `add:with:`. Returns the
/// bare slot name (`x`) to look up.
fn assignment_target(selector: &str) -> Option<&str> {
    if selector.ends_with(':') && selector[..selector.len() - 1].find(':').is_none() && selector.len() > 1 {
        Some(&selector[..selector.len() - 1])
    } else {
        None
    }
}

/// Attempts to resolve `name` as a direct, mutable slot on `receiver` and
/// assign `arguments[0]` into it. `None` means no such slot exists and the
/// caller should fall back to ordinary dispatch of the literal selector
/// (e.g. a user-defined method actually named `x:`).
fn try_assign(vm: &mut Vm, receiver: Value, name: &str, arguments: &[Value], range: SourceRange) -> Option<Completion> {
    let name_hash = crate::hasher::hash_name(name.as_bytes());
    let found = match lookup(receiver, name, name_hash, LookupIntent::Assign, &vm.state) {
        LookupOutcome::Found(f) => f,
        LookupOutcome::Miss => return None,
    };
    if !found.slot.is_mutable() {
        return None;
    }
    let index = match found.slot.binding {
        SlotBinding::Index(i) => i,
        SlotBinding::Constant(_) => return None,
    };
    let new_value = match arguments.first() {
        Some(v) => *v,
        None => {
            return Some(Completion::RuntimeError(RuntimeError::new(
                format!("{}: requires one argument", name),
                range,
            )))
        }
    };
    vm.heap.write_barrier(found.owner, new_value);
    let owner_obj = unsafe { found.owner.object_mut() };
    let values = owner_obj.values_mut().expect("assignable slot on a non-storage object");
    values[index as usize] = new_value;
    Some(Completion::Normal(new_value))
}

fn map_of(map_value: Value) -> &'static Map {
    let obj = unsafe { map_value.object_ref() };
    obj.as_map().expect("activation/method/block map field must reference a Map object")
}

fn method_or_block_map(value: Value) -> &'static Map {
    let obj = unsafe { value.object_ref() };
    map_of(obj.header.map)
}

fn block_selector_matches(block: Value, selector: &str) -> bool {
    let map = method_or_block_map(block);
    let argc = map.code.as_ref().map(|c| c.argument_slot_count).unwrap_or(0);
    crate::ast::block_value_selector(argc as usize) == selector
}

/// Pushes a fresh activation for a method hit, binds `arguments` into its
/// leading argument slots, evaluates its statement list, and pops. A
/// non-local return that targets this very activation (an ordinary `^`
/// inside the method's own body, not escaping through a block) is caught
/// here and converted back into a normal completion — this activation's
/// `nonlocal_target` is itself, so every `^` anywhere under it that hasn't
/// already been intercepted by a nested method ends up here.
fn activate_method(
    vm: &mut Vm,
    method: Value,
    receiver: Value,
    selector: &str,
    arguments: &[Value],
    range: SourceRange,
) -> Completion {
    let method_map = unsafe { method.object_ref() }.header.map;
    let map = map_of(method_map);
    let code = map.code.as_ref().expect("Method object's map must carry CodeInfo");
    let argc = code.argument_slot_count as usize;
    if arguments.len() != argc {
        return Completion::RuntimeError(RuntimeError::new(
            format!("{} expects {} argument(s), got {}", selector, argc, arguments.len()),
            range,
        ));
    }
    let statements = code.statements.clone();
    let mut bindings = unsafe { method.object_ref() }.values().expect("method object must have a value array").to_vec();
    bindings[..argc].copy_from_slice(arguments);

    let activation_ref = match vm.activations.push(receiver, method_map, bindings, Arc::from(selector), range, None, None) {
        Ok(r) => r,
        Err(e) => return Completion::RuntimeError(e),
    };
    vm.activations.current_mut().expect("just pushed").nonlocal_target = Some(activation_ref);

    let completion = execute_script_frame(vm, &statements, receiver);
    let frame = vm.activations.current().map(|a| (a.label.clone(), a.call_range));
    vm.activations.pop();

    match completion {
        Completion::NonLocalReturn { target, value } if target == activation_ref => Completion::Normal(value),
        Completion::RuntimeError(mut e) => {
            if let Some((label, range)) = frame {
                e.push_frame(label.to_string(), range);
            }
            Completion::RuntimeError(e)
        }
        other => other,
    }
}

/// Pushes an activation for a block invocation. The block's receiver is
/// not the block value itself but whatever `self` was where the block was
/// created (spec.md §4.6): resolved by following the block's weak parent
/// reference. A stale parent (the creating activation has since returned)
/// is a runtime error, matching spec.md §4.4's "invoking a block whose
/// target is no longer on the stack is a runtime error".
fn activate_block(vm: &mut Vm, block: Value, selector: &str, arguments: &[Value], range: SourceRange) -> Completion {
    let block_map_value = unsafe { block.object_ref() }.header.map;
    let map = map_of(block_map_value);
    let code = map.code.as_ref().expect("Block object's map must carry CodeInfo");
    let block_info = code.block.clone().expect("block object's map must carry BlockInfo");
    let argc = code.argument_slot_count as usize;
    if arguments.len() != argc {
        return Completion::RuntimeError(RuntimeError::new(
            format!("{} expects {} argument(s), got {}", selector, argc, arguments.len()),
            range,
        ));
    }
    let parent_receiver = match vm.activations.resolve(block_info.parent_activation) {
        Some(a) => a.receiver,
        None => {
            return Completion::RuntimeError(RuntimeError::new(
                "block activated after its enclosing method or block has returned",
                range,
            ))
        }
    };
    let statements = code.statements.clone();
    let mut bindings = unsafe { block.object_ref() }.values().expect("block object must have a value array").to_vec();
    bindings[..argc].copy_from_slice(arguments);

    let activation_ref = match vm.activations.push(
        parent_receiver,
        block_map_value,
        bindings,
        Arc::from(selector),
        range,
        Some(block_info.parent_activation),
        Some(block_info.nonlocal_target),
    ) {
        Ok(r) => r,
        Err(e) => return Completion::RuntimeError(e),
    };

    let completion = execute_script_frame(vm, &statements, parent_receiver);
    let frame = vm.activations.current().map(|a| (a.label.clone(), a.call_range));
    vm.activations.pop();

    // A non-local return escapes past a block activation unless the block
    // itself happens to be the target (possible only if its enclosing
    // method has already returned and somehow re-entered, which cannot
    // happen in this single-threaded design — kept as a direct equality
    // check rather than an assumed-impossible `unreachable!` since a
    // future change to activation reuse should fail safely here, not UB).
    match completion {
        Completion::NonLocalReturn { target, value } if target == activation_ref => Completion::Normal(value),
        Completion::RuntimeError(mut e) => {
            if let Some((label, range)) = frame {
                e.push_frame(label.to_string(), range);
            }
            Completion::RuntimeError(e)
        }
        other => other,
    }
}
