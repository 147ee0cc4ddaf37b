// Helpers shared by the unit tests.

use allocator_api2::alloc::{ AllocError, Allocator };
use std::{
    alloc::Layout,
    ptr::NonNull,
    sync::{
        Arc,
        atomic::{ AtomicUsize, Ordering }
    }
};

#[derive(Clone, Default)]
pub struct DropCounter(Arc<AtomicUsize>);

impl DropCounter {
    pub fn new() -> Self { Self::default() }
    pub fn drops(&self) -> usize { self.0.load(Ordering::SeqCst) }
    pub fn track(&self, value: i32) -> Tracked {
        Tracked { value, counter: self.0.clone() }
    }
}

#[derive(Debug)]
pub struct Tracked {
    value: i32,
    counter: Arc<AtomicUsize>
}

impl Tracked {
    pub fn value(&self) -> i32 { self.value }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

// Refuses every request, for exercising construction failure.
#[derive(Clone, Copy, Default)]
pub struct FailingAlloc;

unsafe impl Allocator for FailingAlloc {
    fn allocate(&self, _layout: Layout) -> Result<NonNull<[u8]>, AllocError> { Err(AllocError) }
    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}
