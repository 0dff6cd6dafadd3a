//! spec.md §8 scenario 6 as a throughput benchmark: sustained allocation
//! of short-lived byte-array objects against a small young generation,
//! with a long-lived parent object kept alive the whole time so the
//! benchmark also exercises cross-generational tracing once the parent
//! is promoted.

use criterion::{criterion_group, criterion_main, Criterion};
use selfvm::config::Config;
use selfvm::object::header::ObjectKind;
use selfvm::object::map::Map;
use selfvm::object::slot::{SlotBinding, SlotDescriptor, SlotFlags};
use selfvm::object::ObjectData;
use selfvm::value::Value;
use std::sync::Arc;

fn gc_stress(c: &mut Criterion) {
    c.bench_function("minor_gc_under_sustained_allocation", |b| {
        b.iter(|| {
            let config = Config { young_space_size: 16 * 1024, old_space_size: 256 * 1024, promotion_age: 3, ..Config::default() };
            let mut vm = selfvm::prepare_world(config);

            let name: Arc<str> = Arc::from("marker");
            let slots = vec![SlotDescriptor {
                name: name.clone(),
                name_hash: selfvm::hasher::hash_name(name.as_bytes()),
                flags: SlotFlags::empty(),
                binding: SlotBinding::Constant(Value::int(1)),
            }];
            let map = Map { slots, assignable_slot_count: 0, code: None };
            let map_of_maps = vm.heap.map_of_maps;
            let map_value = vm.allocate(ObjectKind::Map, map_of_maps, ObjectData::Map(map)).unwrap();
            let long_lived = vm.allocate(ObjectKind::Slots, map_value, ObjectData::Slots(Vec::new())).unwrap();
            let tracked = vm.heap.track(long_lived);

            let byte_array_map = vm.state.byte_array_map;
            for i in 0..10_000u32 {
                let bytes = format!("stress-{}", i).into_bytes();
                vm.allocate(ObjectKind::ByteArray, byte_array_map, ObjectData::ByteArray(bytes)).unwrap();
            }

            vm.heap.untrack(tracked);
        })
    });
}

criterion_group!(benches, gc_stress);
criterion_main!(benches);
