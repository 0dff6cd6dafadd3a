//! A single region of the heap: a growable list of owned objects plus a
//! byte-size budget. Used both for the young generation's three
//! semispaces (eden, survivor-from, survivor-to) and for the old
//! generation.

use crate::object::HeapObject;

pub struct Space {
    objects: Vec<Box<HeapObject>>,
    bytes_used: usize,
    pub capacity: usize,
}

impl Space {
    pub fn new(capacity: usize) -> Self {
        Space { objects: Vec::new(), bytes_used: 0, capacity }
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn has_room_for(&self, size: usize) -> bool {
        self.bytes_used + size <= self.capacity
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Takes ownership of `object`, giving it a stable heap address for as
    /// long as it stays in this space.
    pub fn allocate(&mut self, object: HeapObject) -> *mut HeapObject {
        let size = object.approx_size();
        let boxed = Box::new(object);
        let ptr = Box::into_raw(boxed);
        self.objects.push(unsafe { Box::from_raw(ptr) });
        self.bytes_used += size;
        ptr
    }

    /// Empties this space, returning everything that was in it. Used after
    /// a scavenge: eden and survivor-from are drained (their live
    /// contents have already been copied elsewhere, forwarding pointers
    /// left behind), then the drained boxes are dropped.
    pub fn drain(&mut self) -> Vec<Box<HeapObject>> {
        self.bytes_used = 0;
        std::mem::take(&mut self.objects)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<HeapObject>> {
        self.objects.iter_mut()
    }

    pub fn grow(&mut self, extra: usize) {
        self.capacity += extra;
    }
}
