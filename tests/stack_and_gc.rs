//! spec.md §8 scenario 5 (stack overflow) and scenario 6 (GC stress under
//! sustained short-lived allocation with a long-lived parent object).

use selfvm::ast::{Expression, Message, NumberLiteral, Script, SourceRange, Statement};
use selfvm::config::Config;
use selfvm::object::header::ObjectKind;
use selfvm::object::map::Map;
use selfvm::object::slot::{SlotBinding, SlotDescriptor, SlotFlags};
use selfvm::object::ObjectData;
use selfvm::value::Value;
use std::rc::Rc;
use std::sync::Arc;

fn range() -> SourceRange {
    SourceRange::synthetic()
}

/// A method that sends itself with no base case overflows the bounded
/// activation stack; the driver-facing error names stack overflow and the
/// activation depth at the point of failure equals the configured bound.
#[test]
fn self_recursion_without_base_case_overflows_the_stack() {
    let max_depth = 64;
    let config = Config { max_activation_depth: max_depth, ..Config::default() };
    let mut vm = selfvm::prepare_world(config);

    let recurse_body = Expression::Message(Rc::new(Message {
        receiver: None,
        selector: Arc::from("loop"),
        arguments: Vec::new(),
        range: range(),
    }));
    let method = Expression::ObjectLiteral { slots: Vec::new(), statements: vec![Statement::Expression(recurse_body)], range: range() };
    let loop_slot = selfvm::ast::Slot {
        name: Arc::from("loop"),
        is_mutable: false,
        is_parent: false,
        is_argument: false,
        arguments: Vec::new(),
        value: method,
        range: range(),
    };
    let object = Expression::ObjectLiteral { slots: vec![loop_slot], statements: Vec::new(), range: range() };
    let send_loop = Expression::Message(Rc::new(Message {
        receiver: Some(object),
        selector: Arc::from("loop"),
        arguments: Vec::new(),
        range: range(),
    }));
    let script = Rc::new(Script { name: Arc::from("<overflow>"), statements: vec![Statement::Expression(send_loop)] });

    let lobby = vm.state.lobby;
    let err = selfvm::execute_script(&mut vm, &script, lobby).expect_err("unbounded self-recursion must be a runtime error");
    assert!(err.message.to_lowercase().contains("stack overflow"), "unexpected error message: {}", err.message);
    assert_eq!(vm.activations.depth(), 0, "the activation stack must fully unwind after the error");
}

/// Allocates many short-lived strings inside a loop while a receiver's
/// parent slot holds a long-lived object; after the loop, lookup through
/// the parent slot still resolves and the long-lived object's identity
/// (observed through a tracked reference) survived any number of minor
/// collections.
#[test]
fn long_lived_parent_survives_gc_stress() {
    let config = Config { young_space_size: 512, old_space_size: 4096, promotion_age: 2, ..Config::default() };
    let mut vm = selfvm::prepare_world(config);

    let marker_name: Arc<str> = Arc::from("marker");
    let long_lived_slots = vec![SlotDescriptor {
        name: marker_name.clone(),
        name_hash: selfvm::hasher::hash_name(marker_name.as_bytes()),
        flags: SlotFlags::empty(),
        binding: SlotBinding::Constant(Value::int(4242)),
    }];
    let long_lived_map = Map { slots: long_lived_slots, assignable_slot_count: 0, code: None };
    let map_of_maps = vm.heap.map_of_maps;
    let long_lived_map_value = vm.allocate(ObjectKind::Map, map_of_maps, ObjectData::Map(long_lived_map)).unwrap();
    let long_lived = vm.allocate(ObjectKind::Slots, long_lived_map_value, ObjectData::Slots(Vec::new())).unwrap();
    let long_lived_tracked = vm.heap.track(long_lived);

    let parent_name: Arc<str> = Arc::from("parent");
    let receiver_slots = vec![SlotDescriptor {
        name: parent_name.clone(),
        name_hash: selfvm::hasher::hash_name(parent_name.as_bytes()),
        flags: SlotFlags::PARENT,
        binding: SlotBinding::Constant(vm.heap.tracked_value(long_lived_tracked)),
    }];
    let receiver_map = Map { slots: receiver_slots, assignable_slot_count: 0, code: None };
    let receiver_map_value = vm.allocate(ObjectKind::Map, map_of_maps, ObjectData::Map(receiver_map)).unwrap();
    let receiver = vm.allocate(ObjectKind::Slots, receiver_map_value, ObjectData::Slots(Vec::new())).unwrap();
    let receiver_tracked = vm.heap.track(receiver);

    let byte_array_map = vm.state.byte_array_map;
    for i in 0..10_000u32 {
        let bytes = format!("short-lived-{}", i).into_bytes();
        vm.allocate(ObjectKind::ByteArray, byte_array_map, ObjectData::ByteArray(bytes)).expect("allocation must not fail");
    }

    let receiver_now = vm.heap.tracked_value(receiver_tracked);
    let hash = selfvm::hasher::hash_name(b"marker");
    let found = match selfvm::lookup::lookup(receiver_now, "marker", hash, selfvm::lookup::LookupIntent::Read, &vm.state) {
        selfvm::lookup::LookupOutcome::Found(f) => f,
        selfvm::lookup::LookupOutcome::Miss => panic!("parent-slot lookup must still resolve after GC stress"),
    };
    assert_eq!(selfvm::lookup::read_slot(&found).as_int(), 4242);

    vm.heap.untrack(receiver_tracked);
    vm.heap.untrack(long_lived_tracked);
}
