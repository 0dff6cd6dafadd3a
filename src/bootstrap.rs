//! Builds the initial object world: the lobby, the `nil`/`true`/`false`
//! singletons, and the integer/float traits objects every number
//! delegates to (spec.md §6's `prepare_world`). Since no parser is in
//! scope, every slot installed here — including each traits object's
//! arithmetic methods — is built directly as `ast`/`Map`/`Object` values
//! rather than by evaluating source text.

use crate::ast::{Expression, Message, Script, SourceRange, Statement};
use crate::config::Config;
use crate::hasher::hash_name;
use crate::heap::Heap;
use crate::object::header::ObjectKind;
use crate::object::map::Map;
use crate::object::slot::{SlotBinding, SlotDescriptor, SlotFlags};
use crate::object::ObjectData;
use crate::state::State;
use crate::value::Value;
use crate::vm::Vm;
use std::rc::Rc;
use std::sync::Arc;

/// Allocates the heap, the singleton objects, and the integer/float
/// traits, wiring everything into a ready-to-run `Vm`. Output defaults to
/// stdout; swap `vm.output` for a buffer in tests that check printed text.
pub fn prepare_world(config: Config) -> Vm {
    let mut heap = Heap::new(&config);

    let empty_map = allocate_bare_map(&mut heap);
    let nil = allocate_empty_slots(&mut heap, empty_map);
    let true_object = allocate_empty_slots(&mut heap, empty_map);
    let false_object = allocate_empty_slots(&mut heap, empty_map);
    let byte_array_map = empty_map;

    let integer_traits = build_number_traits(&mut heap, NumberTraitsKind::Integer);
    let float_traits = build_number_traits(&mut heap, NumberTraitsKind::Float);

    let lobby_map = build_lobby_map(&mut heap, nil, true_object, false_object);
    let lobby = allocate(&mut heap, ObjectKind::Slots, lobby_map, ObjectData::Slots(Vec::new()));

    let state = State { lobby, nil, true_object, false_object, integer_traits, float_traits, byte_array_map };

    log::debug!("world prepared: young={} old={} max_activation_depth={}", config.young_space_size, config.old_space_size, config.max_activation_depth);

    Vm { heap, state, activations: crate::activation::ActivationStack::new(config.max_activation_depth), config, output: Box::new(std::io::stdout()) }
}

/// Bootstrap-time allocation cannot trigger a collection: nothing has run
/// yet, so there is no activation stack or tracked-reference table to
/// root, and eden is sized generously enough that the handful of objects
/// built here never approaches it. A real collection mid-bootstrap would
/// have no roots to scavenge from and would silently corrupt the world.
fn allocate(heap: &mut Heap, kind: ObjectKind, map: Value, data: ObjectData) -> Value {
    heap.allocate(kind, map, data, || Vec::new())
        .expect("bootstrap allocation must not require a collection")
}

fn allocate_bare_map(heap: &mut Heap) -> Value {
    let map_of_maps = heap.map_of_maps;
    allocate(heap, ObjectKind::Map, map_of_maps, ObjectData::Map(Map::empty()))
}

fn allocate_empty_slots(heap: &mut Heap, map: Value) -> Value {
    allocate(heap, ObjectKind::Slots, map, ObjectData::Slots(Vec::new()))
}

fn build_lobby_map(heap: &mut Heap, nil: Value, true_object: Value, false_object: Value) -> Value {
    let slots = vec![
        constant_slot("nil", nil),
        constant_slot("true", true_object),
        constant_slot("false", false_object),
    ];
    let map = Map { slots, assignable_slot_count: 0, code: None };
    let map_of_maps = heap.map_of_maps;
    allocate(heap, ObjectKind::Map, map_of_maps, ObjectData::Map(map))
}

fn constant_slot(name: &str, value: Value) -> SlotDescriptor {
    SlotDescriptor {
        name: Arc::from(name),
        name_hash: hash_name(name.as_bytes()),
        flags: SlotFlags::empty(),
        binding: SlotBinding::Constant(value),
    }
}

enum NumberTraitsKind {
    Integer,
    Float,
}

/// Builds the shared traits object for integers or floats: a plain Slots
/// object whose slots are the arithmetic/comparison methods a receiver of
/// that kind understands. Each method's body is a single statement
/// sending the matching `_`-prefixed primitive to the implicit receiver
/// with the method's sole argument — exactly what source code spelling
/// `+ other = ( _IntAdd: other )` would produce, had a parser built it.
fn build_number_traits(heap: &mut Heap, kind: NumberTraitsKind) -> Value {
    let prefix = match kind {
        NumberTraitsKind::Integer => "_Int",
        NumberTraitsKind::Float => "_Float",
    };
    let binary_ops: &[(&str, &str)] = &[
        ("+", "Add:"),
        ("-", "Sub:"),
        ("*", "Mul:"),
        ("/", "Div:"),
        ("<", "Lt:"),
        ("=", "Eq:"),
    ];
    let mut slots = Vec::new();
    for (selector, suffix) in binary_ops {
        let primitive = format!("{}{}", prefix, suffix);
        slots.push(unary_arg_method_slot(heap, selector, &primitive));
    }
    if let NumberTraitsKind::Integer = kind {
        slots.push(unary_arg_method_slot(heap, "\\\\", "_IntMod:"));
        slots.push(zero_arg_method_slot(heap, "asFloat", "_IntToFloat"));
        slots.push(zero_arg_method_slot(heap, "print", "_IntPrint"));
    } else {
        slots.push(zero_arg_method_slot(heap, "print", "_FloatPrint"));
    }

    let map = Map { slots, assignable_slot_count: 0, code: None };
    let map_of_maps = heap.map_of_maps;
    let map_value = allocate(heap, ObjectKind::Map, map_of_maps, ObjectData::Map(map));
    allocate(heap, ObjectKind::Slots, map_value, ObjectData::Slots(Vec::new()))
}

fn synthetic_script() -> Rc<Script> {
    Rc::new(Script { name: Arc::from("<traits>"), statements: Vec::new() })
}

/// A method taking one argument whose entire body forwards to `primitive`
/// with that argument: `name: other = ( primitive: other )` in spirit.
fn unary_arg_method_slot(heap: &mut Heap, name: &str, primitive: &str) -> SlotDescriptor {
    let range = SourceRange::synthetic();
    let arg_name: Arc<str> = Arc::from("other");
    let body = Statement::Expression(Expression::Message(Rc::new(Message {
        receiver: None,
        selector: Arc::from(primitive),
        arguments: vec![Expression::Identifier(arg_name.clone(), range)],
        range,
    })));
    let arg_descriptor = SlotDescriptor {
        name: arg_name,
        name_hash: hash_name(b"other"),
        flags: SlotFlags::MUTABLE | SlotFlags::ARGUMENT,
        binding: SlotBinding::Index(0),
    };
    let code_map = Map::for_code(vec![arg_descriptor], 1, Rc::from(vec![body].into_boxed_slice()), synthetic_script(), 1, None);
    let map_of_maps = heap.map_of_maps;
    let map_value = allocate(heap, ObjectKind::Map, map_of_maps, ObjectData::Map(code_map));
    let method = allocate(heap, ObjectKind::Method, map_value, ObjectData::Method(vec![Value::int(0)]));
    constant_method_slot(name, method)
}

/// A method taking no arguments whose body simply forwards to a
/// zero-argument primitive: `name = ( primitive )`.
fn zero_arg_method_slot(heap: &mut Heap, name: &str, primitive: &str) -> SlotDescriptor {
    let range = SourceRange::synthetic();
    let body = Statement::Expression(Expression::Message(Rc::new(Message {
        receiver: None,
        selector: Arc::from(primitive),
        arguments: Vec::new(),
        range,
    })));
    let code_map = Map::for_code(Vec::new(), 0, Rc::from(vec![body].into_boxed_slice()), synthetic_script(), 0, None);
    let map_of_maps = heap.map_of_maps;
    let map_value = allocate(heap, ObjectKind::Map, map_of_maps, ObjectData::Map(code_map));
    let method = allocate(heap, ObjectKind::Method, map_value, ObjectData::Method(Vec::new()));
    constant_method_slot(name, method)
}

fn constant_method_slot(name: &str, method: Value) -> SlotDescriptor {
    SlotDescriptor {
        name: Arc::from(name),
        name_hash: hash_name(name.as_bytes()),
        flags: SlotFlags::empty(),
        binding: SlotBinding::Constant(method),
    }
}
