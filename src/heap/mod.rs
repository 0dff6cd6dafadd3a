//! The heap: a young generation (eden plus two Cheney survivor semispaces)
//! and a growable old generation with a remembered set, tied together
//! behind a single `allocate`/`write_barrier` surface. Collections run
//! synchronously at the allocation point that needs them; there is no
//! concurrent or incremental collector.

pub mod gc;
pub mod space;
pub mod tracked;

use crate::config::Config;
use crate::error::AllocationError;
use crate::object::header::{HeaderFlags, ObjectKind};
use crate::object::map::Map;
use crate::object::{HeapObject, ObjectData};
use crate::value::Value;
use fxhash::FxHashSet;
use space::Space;
use tracked::{TrackedRef, TrackedTable};

pub struct Heap {
    eden: Space,
    survivor_from: Space,
    survivor_to: Space,
    old: Space,
    /// Old-generation objects that may hold a reference into the young
    /// generation, recorded by `write_barrier`.
    remembered: FxHashSet<usize>,
    tracked: TrackedTable,
    promote_age: u8,
    /// The self-describing map every `Map` object's header points at.
    pub map_of_maps: Value,
}

impl Heap {
    pub fn new(config: &Config) -> Self {
        let mut eden = Space::new(config.young_space_size);
        let survivor_from = Space::new(config.young_space_size / 2);
        let survivor_to = Space::new(config.young_space_size / 2);
        let old = Space::new(config.old_space_size);

        // Bootstrap the map-of-maps: allocate it with a placeholder
        // self-pointer, then patch the header once the address is known.
        let placeholder = Value::from_object(std::ptr::null_mut());
        let map_object = HeapObject::new(ObjectKind::Map, placeholder, ObjectData::Map(Map::empty()));
        let ptr = eden.allocate(map_object);
        let self_value = Value::from_object(ptr);
        unsafe {
            (*ptr).header.map = self_value;
        }

        Heap {
            eden,
            survivor_from,
            survivor_to,
            old,
            remembered: FxHashSet::default(),
            tracked: TrackedTable::new(),
            promote_age: config.promotion_age,
            map_of_maps: self_value,
        }
    }

    /// Allocates a new object, triggering a minor (and if necessary major)
    /// collection first if eden does not have room. `roots` must enumerate
    /// every currently-reachable `Value` slot outside the heap itself
    /// (activation bindings, tracked references, the lobby) so a
    /// collection triggered mid-allocation does not reclaim live data.
    pub fn allocate(
        &mut self,
        kind: ObjectKind,
        map: Value,
        data: ObjectData,
        mut roots: impl FnMut() -> Vec<*mut Value>,
    ) -> Result<Value, AllocationError> {
        let object = HeapObject::new(kind, map, data);
        let size = object.approx_size();
        self.ensure_space(size, &mut roots);
        if !self.eden.has_room_for(size) {
            return Err(AllocationError { requested: size });
        }
        let ptr = self.eden.allocate(object);
        Ok(Value::from_object(ptr))
    }

    /// Reserves room for `size` bytes of upcoming allocation without
    /// performing it, running the same collect-then-grow escalation
    /// `allocate` uses. Lets a caller that builds a structure in more than
    /// one `allocate` call (e.g. a map, then the object whose header
    /// points at it — spec.md §4.1) reserve the combined size once up
    /// front, so no collection runs between the calls: a GC in the middle
    /// of such a sequence would not see the earlier call's result, since
    /// nothing roots it until the later call installs it. Every value that
    /// must survive until then needs to be tracked (`Heap::track`)
    /// regardless — this only protects the allocation calls themselves.
    pub fn ensure_space(&mut self, size: usize, roots: &mut impl FnMut() -> Vec<*mut Value>) {
        if !self.eden.has_room_for(size) {
            self.minor_collect(roots);
        }
        if !self.eden.has_room_for(size) {
            self.major_collect(roots);
        }
        if !self.eden.has_room_for(size) {
            // Grow the old generation rather than fail outright; failure
            // is reserved for exhaustion the allocator cannot recover from.
            self.old.grow(size.max(self.old.capacity));
        }
    }

    pub fn track(&mut self, value: Value) -> TrackedRef {
        self.tracked.track(value)
    }

    pub fn tracked_value(&self, r: TrackedRef) -> Value {
        self.tracked.get(r)
    }

    pub fn untrack(&mut self, r: TrackedRef) {
        self.tracked.untrack(r)
    }

    /// Must be called whenever a reference to `referenced` is stored into
    /// an assignable slot belonging to `holder`. If the holder is in the
    /// old generation and the value being stored is a young object, the
    /// holder is added to the remembered set so the next minor collection
    /// traces through it.
    pub fn write_barrier(&mut self, holder: Value, referenced: Value) {
        if !holder.is_object() || !referenced.is_object() {
            return;
        }
        let holder_ptr = holder.as_object();
        let holder_obj = unsafe { &*holder_ptr };
        if !holder_obj.header.flags.contains(HeaderFlags::OLD_GENERATION) {
            return;
        }
        let referenced_obj = unsafe { &*referenced.as_object() };
        if referenced_obj.header.flags.contains(HeaderFlags::OLD_GENERATION) {
            return;
        }
        self.remembered.insert(holder_ptr as usize);
    }

    fn remembered_roots(&self) -> Vec<*mut Value> {
        let mut roots = Vec::new();
        for &addr in &self.remembered {
            let ptr = addr as *mut HeapObject;
            let object = unsafe { &mut *ptr };
            object.each_child(|v| roots.push(v as *mut Value));
        }
        roots
    }

    pub fn minor_collect(&mut self, roots: &mut impl FnMut() -> Vec<*mut Value>) {
        let mut all_roots = roots();
        all_roots.extend(self.remembered_roots());
        self.tracked.each_root(|v| all_roots.push(v as *mut Value));
        all_roots.push(&mut self.map_of_maps as *mut Value);

        gc::minor_collect(
            &mut self.eden,
            &mut self.survivor_from,
            &mut self.survivor_to,
            &mut self.old,
            self.promote_age,
            all_roots.into_iter(),
        );

        std::mem::swap(&mut self.survivor_from, &mut self.survivor_to);
        self.prune_remembered_set();
    }

    fn prune_remembered_set(&mut self) {
        self.remembered.retain(|&addr| {
            let ptr = addr as *mut HeapObject;
            let object = unsafe { &mut *ptr };
            let mut still_young = false;
            object.each_child(|v| {
                if v.is_object() {
                    let child = unsafe { &*v.as_object() };
                    if !child.header.flags.contains(HeaderFlags::OLD_GENERATION) {
                        still_young = true;
                    }
                }
            });
            still_young
        });
    }

    pub fn major_collect(&mut self, roots: &mut impl FnMut() -> Vec<*mut Value>) {
        let mut all_roots = roots();
        self.tracked.each_root(|v| all_roots.push(v as *mut Value));
        all_roots.push(&mut self.map_of_maps as *mut Value);

        let mut new_old = Space::new(self.old.capacity);
        gc::major_collect(
            &mut self.eden,
            &mut self.survivor_from,
            &mut self.survivor_to,
            &mut self.old,
            &mut new_old,
            self.promote_age,
            all_roots.into_iter(),
        );
        self.old = new_old;
        self.remembered.clear();
    }
}
