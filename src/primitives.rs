//! The concrete primitive catalog and its dispatch table.
//!
//! spec.md §4.7 specifies only the *contract* a primitive honors (an
//! execution context, a receiver, an argument slice, returning a
//! completion); the actual selectors are left to "whatever built-in
//! primitive registry" the interpreter is wired to. A runnable, testable
//! core needs a real one, so this module supplies the minimal catalog
//! SPEC_FULL.md §4.7 lists: integer and float arithmetic/comparison,
//! object cloning and dynamic slot addition, identity, dynamic send, and
//! output. Every selector here is deliberately `_`-prefixed so none of it
//! can ever be shadowed by ordinary lookup (spec.md §4.3).

use crate::ast::SourceRange;
use crate::completion::Completion;
use crate::dispatch;
use crate::error::RuntimeError;
use crate::object::header::ObjectKind;
use crate::object::map::Map;
use crate::object::ObjectData;
use crate::value::Value;
use crate::vm::Vm;
use std::io::Write;

type PrimitiveFn = fn(&mut Vm, Value, &[Value], SourceRange) -> Completion;

static PRIMITIVES: &[(&str, PrimitiveFn)] = &[
    ("_IntAdd:", int_add),
    ("_IntSub:", int_sub),
    ("_IntMul:", int_mul),
    ("_IntDiv:", int_div),
    ("_IntMod:", int_mod),
    ("_IntLt:", int_lt),
    ("_IntEq:", int_eq),
    ("_IntToFloat", int_to_float),
    ("_IntPrint", int_print),
    ("_FloatAdd:", float_add),
    ("_FloatSub:", float_sub),
    ("_FloatMul:", float_mul),
    ("_FloatDiv:", float_div),
    ("_FloatLt:", float_lt),
    ("_FloatEq:", float_eq),
    ("_FloatPrint", float_print),
    ("_Clone", clone_object),
    ("_AddSlot:IsParent:Value:", add_slot),
    ("_Eq:", identity_eq),
    ("_Perform:With:", perform_with),
    ("_ArgumentCount", argument_count),
    ("_Print:", print_bytes),
    ("_LoadFile:", load_file),
    ("_CurrentActivation", current_activation),
];

/// Looks up and invokes a primitive by selector. A selector not found in
/// the table is a bug in the interpreter or in whatever installed a
/// `_`-prefixed slot, not a user-facing error — spec.md §4.7 calls
/// unknown primitives fatal, so this panics rather than returning a
/// catchable completion.
pub fn dispatch(vm: &mut Vm, selector: &str, receiver: Value, arguments: &[Value], range: SourceRange) -> Completion {
    match PRIMITIVES.iter().find(|(name, _)| *name == selector) {
        Some((_, f)) => f(vm, receiver, arguments, range),
        None => panic!("unknown primitive {:?}", selector),
    }
}

fn type_error(range: SourceRange, expected: &str, index: usize) -> Completion {
    Completion::RuntimeError(RuntimeError::new(
        format!("expected argument {} to be a {}", index, expected),
        range,
    ))
}

fn expect_int(v: Value, index: usize, range: SourceRange) -> Result<i64, Completion> {
    if v.is_int() {
        Ok(v.as_int())
    } else {
        Err(type_error(range, "small integer", index))
    }
}

fn expect_float(v: Value, index: usize, range: SourceRange) -> Result<f64, Completion> {
    if v.is_float() {
        Ok(v.as_float())
    } else {
        Err(type_error(range, "float", index))
    }
}

fn expect_arg(args: &[Value], index: usize, range: SourceRange) -> Result<Value, Completion> {
    args.get(index).copied().ok_or_else(|| {
        Completion::RuntimeError(RuntimeError::new(format!("missing argument {}", index), range))
    })
}

macro_rules! int_binop {
    ($name:ident, $op:expr, $result:expr) => {
        fn $name(vm: &mut Vm, receiver: Value, args: &[Value], range: SourceRange) -> Completion {
            let a = match expect_int(receiver, 0, range) {
                Ok(v) => v,
                Err(c) => return c,
            };
            let arg = match expect_arg(args, 0, range) {
                Ok(v) => v,
                Err(c) => return c,
            };
            let b = match expect_int(arg, 1, range) {
                Ok(v) => v,
                Err(c) => return c,
            };
            $result(vm, $op(a, b), range)
        }
    };
}

fn int_result(_vm: &mut Vm, value: i64, _range: SourceRange) -> Completion {
    Completion::Normal(Value::int(value))
}

fn bool_result(vm: &mut Vm, value: bool, _range: SourceRange) -> Completion {
    Completion::Normal(if value { vm.state.true_object } else { vm.state.false_object })
}

int_binop!(int_add, |a, b| a + b, int_result);
int_binop!(int_sub, |a, b: i64| a - b, int_result);
int_binop!(int_mul, |a, b| a * b, int_result);
int_binop!(int_lt, |a, b: i64| a < b, bool_result);
int_binop!(int_eq, |a, b| a == b, bool_result);

fn int_div(vm: &mut Vm, receiver: Value, args: &[Value], range: SourceRange) -> Completion {
    let a = match expect_int(receiver, 0, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    let arg = match expect_arg(args, 0, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    let b = match expect_int(arg, 1, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    if b == 0 {
        return Completion::RuntimeError(RuntimeError::new("integer division by zero", range));
    }
    Completion::Normal(Value::int(a / b))
}

fn int_mod(vm: &mut Vm, receiver: Value, args: &[Value], range: SourceRange) -> Completion {
    let _ = vm;
    let a = match expect_int(receiver, 0, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    let arg = match expect_arg(args, 0, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    let b = match expect_int(arg, 1, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    if b == 0 {
        return Completion::RuntimeError(RuntimeError::new("integer modulo by zero", range));
    }
    Completion::Normal(Value::int(a % b))
}

fn int_to_float(_vm: &mut Vm, receiver: Value, _args: &[Value], range: SourceRange) -> Completion {
    match expect_int(receiver, 0, range) {
        Ok(v) => Completion::Normal(Value::float(v as f64)),
        Err(c) => c,
    }
}

fn int_print(vm: &mut Vm, receiver: Value, _args: &[Value], range: SourceRange) -> Completion {
    match expect_int(receiver, 0, range) {
        Ok(v) => {
            let _ = writeln!(vm.output, "{}", v);
            Completion::Normal(receiver)
        }
        Err(c) => c,
    }
}

macro_rules! float_binop {
    ($name:ident, $op:expr, $result:expr) => {
        fn $name(vm: &mut Vm, receiver: Value, args: &[Value], range: SourceRange) -> Completion {
            let a = match expect_float(receiver, 0, range) {
                Ok(v) => v,
                Err(c) => return c,
            };
            let arg = match expect_arg(args, 0, range) {
                Ok(v) => v,
                Err(c) => return c,
            };
            let b = match expect_float(arg, 1, range) {
                Ok(v) => v,
                Err(c) => return c,
            };
            $result(vm, $op(a, b), range)
        }
    };
}

fn float_result(_vm: &mut Vm, value: f64, _range: SourceRange) -> Completion {
    Completion::Normal(Value::float(value))
}

float_binop!(float_add, |a, b| a + b, float_result);
float_binop!(float_sub, |a, b: f64| a - b, float_result);
float_binop!(float_mul, |a, b| a * b, float_result);
float_binop!(float_div, |a, b: f64| a / b, float_result);
float_binop!(float_lt, |a, b: f64| a < b, bool_result);
float_binop!(float_eq, |a, b: f64| a == b, bool_result);

fn float_print(vm: &mut Vm, receiver: Value, _args: &[Value], range: SourceRange) -> Completion {
    match expect_float(receiver, 0, range) {
        Ok(v) => {
            let _ = writeln!(vm.output, "{}", v);
            Completion::Normal(receiver)
        }
        Err(c) => c,
    }
}

/// Shallow-copies `receiver`: same map (maps are shared, immutable
/// shapes), fresh assignable-value storage holding a copy of the current
/// values. Integers, floats, maps and byte arrays are not valid receivers
/// (spec.md never requires cloning a non-slotted kind).
fn clone_object(vm: &mut Vm, receiver: Value, _args: &[Value], range: SourceRange) -> Completion {
    if !receiver.is_object() {
        return Completion::RuntimeError(RuntimeError::new("_Clone requires an object receiver", range));
    }
    let obj = unsafe { receiver.object_ref() };
    let (kind, map, values) = match (obj.kind(), obj.values()) {
        (ObjectKind::Slots, Some(v)) => (ObjectKind::Slots, obj.header.map, v.to_vec()),
        _ => return Completion::RuntimeError(RuntimeError::new("_Clone requires a slots object receiver", range)),
    };
    match vm.allocate(kind, map, ObjectData::Slots(values)) {
        Ok(v) => Completion::Normal(v),
        Err(e) => Completion::RuntimeError(RuntimeError::new(format!("out of memory: {}", e), range)),
    }
}

fn bytes_to_str(value: Value, index: usize, range: SourceRange) -> Result<String, Completion> {
    if !value.is_object() {
        return Err(type_error(range, "string", index));
    }
    let obj = unsafe { value.object_ref() };
    match obj.as_bytes() {
        Some(bytes) => String::from_utf8(bytes.to_vec()).map_err(|_| type_error(range, "utf8 string", index)),
        None => Err(type_error(range, "string", index)),
    }
}

/// `_AddSlot:IsParent:Value:` — installs a new slot on `receiver` in
/// place, per spec.md §4.2's copy-on-write rule: a *fresh* map is derived
/// (any other object still sharing the old map is unaffected) and
/// `receiver`'s own header is repointed at it, with its assignable-value
/// array extended to hold the new slot's storage.
fn add_slot(vm: &mut Vm, receiver: Value, args: &[Value], range: SourceRange) -> Completion {
    if !receiver.is_object() {
        return Completion::RuntimeError(RuntimeError::new("_AddSlot:IsParent:Value: requires an object receiver", range));
    }
    let name_arg = match expect_arg(args, 0, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    let is_parent_arg = match expect_arg(args, 1, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    let value_arg = match expect_arg(args, 2, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    let name = match bytes_to_str(name_arg, 0, range) {
        Ok(s) => s,
        Err(c) => return c,
    };
    let is_parent = is_parent_arg.is_identical(vm.state.true_object);

    let old_map_value = unsafe { receiver.object_ref() }.header.map;
    let old_map = unsafe { old_map_value.object_ref() }
        .as_map()
        .expect("receiver's header.map must reference a Map");
    let new_map = match old_map.with_added_slot(name.into(), true, is_parent, value_arg) {
        Some(m) => m,
        None => return Completion::RuntimeError(RuntimeError::new("object already has 255 assignable slots", range)),
    };

    // `receiver` and `value_arg` are plain `Value`s held only in this
    // function's locals; if `vm.allocate` below triggers a collection,
    // neither is reachable from any root until `receiver` is mutated back
    // into the object graph a few lines down, so both must be tracked
    // across the call and refreshed afterward before being dereferenced
    // again (spec.md §4.7).
    let receiver_ref = vm.heap.track(receiver);
    let value_ref = vm.heap.track(value_arg);
    let new_map_value = match vm.allocate(ObjectKind::Map, vm.heap.map_of_maps, ObjectData::Map(new_map)) {
        Ok(v) => v,
        Err(e) => {
            vm.heap.untrack(receiver_ref);
            vm.heap.untrack(value_ref);
            return Completion::RuntimeError(RuntimeError::new(format!("out of memory: {}", e), range));
        }
    };
    let receiver = vm.heap.tracked_value(receiver_ref);
    let value_arg = vm.heap.tracked_value(value_ref);
    vm.heap.untrack(receiver_ref);
    vm.heap.untrack(value_ref);

    vm.heap.write_barrier(receiver, value_arg);
    let obj = unsafe { receiver.object_mut() };
    obj.header.map = new_map_value;
    obj.values_mut().expect("receiver must carry a value array").push(value_arg);
    Completion::Normal(receiver)
}

fn identity_eq(vm: &mut Vm, receiver: Value, args: &[Value], range: SourceRange) -> Completion {
    let other = match expect_arg(args, 0, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    bool_result(vm, receiver.is_identical(other), range)
}

/// `_Perform:With:` — a dynamic send: `args[0]` is the selector as a
/// string, `args[1]` is forwarded as its sole argument if the selector
/// takes one (a single keyword part), otherwise ignored. Grounded in
/// Self's `perform:with:`.
fn perform_with(vm: &mut Vm, receiver: Value, args: &[Value], range: SourceRange) -> Completion {
    let selector_arg = match expect_arg(args, 0, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    let selector = match bytes_to_str(selector_arg, 0, range) {
        Ok(s) => s,
        Err(c) => return c,
    };
    let forwarded: &[Value] = if selector.ends_with(':') { &args[1..args.len().min(2)] } else { &[] };
    dispatch::send(vm, receiver, &selector, forwarded, range)
}

fn map_of(value: Value) -> Option<&'static Map> {
    let obj = unsafe { value.object_ref() };
    let map_obj = unsafe { obj.header.map.object_ref() };
    map_obj.as_map()
}

fn argument_count(_vm: &mut Vm, receiver: Value, _args: &[Value], range: SourceRange) -> Completion {
    if !receiver.is_object() {
        return Completion::RuntimeError(RuntimeError::new("_ArgumentCount requires a method or block receiver", range));
    }
    match map_of(receiver).and_then(|m| m.code.as_ref()) {
        Some(code) => Completion::Normal(Value::int(code.argument_slot_count as i64)),
        None => Completion::RuntimeError(RuntimeError::new("_ArgumentCount requires a method or block receiver", range)),
    }
}

/// `_LoadFile:` — spec.md §6's `execute_sub_script` driver surface: reads
/// the named file, hands its text to whatever `Config::script_loader` the
/// embedding binary installed, and runs the resulting script against the
/// current receiver as `self`, on the caller's own activation stack (a
/// nested load is just another expression, not a fresh top-level run).
/// With no loader installed this is a runtime error rather than a link
/// dependency on a parser, matching spec.md §1 keeping lexing/parsing out
/// of this crate's scope.
fn load_file(vm: &mut Vm, receiver: Value, args: &[Value], range: SourceRange) -> Completion {
    let path_arg = match expect_arg(args, 0, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    let path = match bytes_to_str(path_arg, 0, range) {
        Ok(s) => s,
        Err(c) => return c,
    };
    let loader = match vm.config.script_loader {
        Some(f) => f,
        None => {
            return Completion::RuntimeError(RuntimeError::new(
                "_LoadFile: requires a script loader hook, none installed",
                range,
            ))
        }
    };
    let source = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => return Completion::RuntimeError(RuntimeError::new(format!("could not read {}: {}", path, e), range)),
    };
    let script = match loader(&source) {
        Ok(s) => std::rc::Rc::new(s),
        Err(e) => return Completion::RuntimeError(RuntimeError::new(format!("{}: {}", path, e), range)),
    };
    crate::interpreter::execute_sub_script(vm, &script, receiver)
}

/// `_CurrentActivation` — reifies the activation a method or block body is
/// currently running in as a first-class object (spec.md §3's Activation
/// object variant): `data.bindings` is a snapshot of that activation's
/// argument/local values and `data.receiver` is the `self` it was bound
/// to. Per spec.md §4.3, an Activation object is a transparent lookup
/// receiver: an ordinary send to the result delegates straight to
/// `data.receiver` rather than ever consulting `data.bindings` (see
/// `lookup::resolve_object`) — the bindings snapshot is there for code
/// that reads `ObjectData::Activation` directly. Called with no receiver
/// expression (`_CurrentActivation`), so `receiver` here is whatever
/// `self` happened to be, which this primitive ignores in favor of the
/// activation's own recorded receiver.
fn current_activation(vm: &mut Vm, _receiver: Value, _args: &[Value], range: SourceRange) -> Completion {
    let (map, bindings, receiver) = match vm.activations.current() {
        Some(a) => (a.map, a.bindings.clone(), a.receiver),
        None => {
            return Completion::RuntimeError(RuntimeError::new(
                "_CurrentActivation requires an active method or block",
                range,
            ))
        }
    };
    if !map.is_object() {
        return Completion::RuntimeError(RuntimeError::new(
            "_CurrentActivation requires an active method or block",
            range,
        ));
    }
    let defining = map;
    match vm.allocate(ObjectKind::Activation, map, ObjectData::Activation { bindings, receiver, defining }) {
        Ok(v) => Completion::Normal(v),
        Err(e) => Completion::RuntimeError(RuntimeError::new(format!("out of memory: {}", e), range)),
    }
}

fn print_bytes(vm: &mut Vm, receiver: Value, args: &[Value], range: SourceRange) -> Completion {
    let arg = match expect_arg(args, 0, range) {
        Ok(v) => v,
        Err(c) => return c,
    };
    if !arg.is_object() {
        return type_error(range, "string", 0);
    }
    let bytes = unsafe { arg.object_ref() }.as_bytes().map(|b| b.to_vec());
    match bytes {
        Some(bytes) => {
            let _ = vm.output.write_all(&bytes);
            Completion::Normal(receiver)
        }
        None => type_error(range, "string", 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn fresh_vm() -> Vm {
        crate::prepare_world(Config::default())
    }

    #[test]
    fn int_add_adds() {
        let mut vm = fresh_vm();
        let range = SourceRange::synthetic();
        match int_add(&mut vm, Value::int(2), &[Value::int(3)], range) {
            Completion::Normal(v) => assert_eq!(v.as_int(), 5),
            _ => panic!("expected normal completion"),
        }
    }

    #[test]
    fn int_div_by_zero_is_runtime_error() {
        let mut vm = fresh_vm();
        let range = SourceRange::synthetic();
        match int_div(&mut vm, Value::int(1), &[Value::int(0)], range) {
            Completion::RuntimeError(_) => {}
            _ => panic!("expected a runtime error"),
        }
    }

    #[test]
    fn current_activation_errors_outside_any_activation() {
        let mut vm = fresh_vm();
        let lobby = vm.state.lobby;
        let range = SourceRange::synthetic();
        match current_activation(&mut vm, lobby, &[], range) {
            Completion::RuntimeError(_) => {}
            _ => panic!("expected a runtime error with no activation on the stack"),
        }
    }

    #[test]
    fn int_add_type_errors_on_non_int_argument() {
        let mut vm = fresh_vm();
        let range = SourceRange::synthetic();
        match int_add(&mut vm, Value::int(2), &[Value::float(1.0)], range) {
            Completion::RuntimeError(e) => assert!(e.message.contains("integer")),
            _ => panic!("expected a runtime error"),
        }
    }
}
