// Counter policies for RefCountObject. LocalCount is the plain single-threaded
// counter, AtomicCount makes every transition a single atomic operation so
// handles may be shared between threads.

use std::{
    cell::Cell,
    hint,
    sync::atomic::{
        self,
        AtomicU32,
        Ordering
    }
};

pub trait RefCount {
    fn new(value: u32) -> Self;
    /// Snapshot of the current value.
    fn get(&self) -> u32;
    /// Adds one and returns the previous value.
    fn increment(&self) -> u32;
    /// Subtracts one and returns the previous value. When this returns 1 the
    /// caller observed the transition to zero and owns the cleanup.
    fn decrement(&self) -> u32;
    /// Adds one unless the value is zero. Used to promote weak handles without
    /// reviving a destroyed object.
    fn increment_if_nonzero(&self) -> bool;
    /// Moves the value from 1 straight to 0. Returns false if it was not 1.
    fn release_if_unique(&self) -> bool;
    /// Swaps `expected` for [`LOCKED`]. While locked, [`RefCount::increment_unless_locked`]
    /// waits, so the value cannot grow past `expected` behind the holder's back.
    fn lock(&self, expected: u32) -> bool;
    /// Restores `value` after a successful [`RefCount::lock`].
    fn unlock(&self, value: u32);
    /// Like [`RefCount::increment`], but waits out a concurrent [`RefCount::lock`].
    fn increment_unless_locked(&self) -> u32;
}

/// Sentinel held by a locked counter. Real counts stop one short of it.
pub const LOCKED: u32 = u32::MAX;
const MAX_COUNT: u32 = LOCKED - 1;

#[cold]
pub(crate) fn count_corrupted(what: &'static str, value: u32) -> ! {
    log::error!("reference count {} (value {}), aborting", what, value);
    std::process::abort()
}

#[derive(Debug)]
pub struct LocalCount(Cell<u32>);

impl RefCount for LocalCount {
    fn new(value: u32) -> Self { Self(Cell::new(value)) }

    fn get(&self) -> u32 { self.0.get() }

    fn increment(&self) -> u32 {
        let old = self.0.get();
        if old >= MAX_COUNT { count_corrupted("overflow", old) }
        self.0.set(old + 1);
        old
    }

    fn decrement(&self) -> u32 {
        let old = self.0.get();
        match old.checked_sub(1) {
            Some(new) => self.0.set(new),
            None => count_corrupted("underflow", old)
        }
        old
    }

    fn increment_if_nonzero(&self) -> bool {
        match self.0.get() {
            0 => false,
            _ => { self.increment(); true }
        }
    }

    fn release_if_unique(&self) -> bool {
        match self.0.get() {
            1 => { self.0.set(0); true }
            _ => false
        }
    }

    fn lock(&self, expected: u32) -> bool {
        if self.0.get() != expected { return false }
        self.0.set(LOCKED);
        true
    }

    fn unlock(&self, value: u32) { self.0.set(value) }

    // nothing else runs while a single-threaded lock is held
    fn increment_unless_locked(&self) -> u32 { self.increment() }
}

#[derive(Debug)]
pub struct AtomicCount(AtomicU32);

impl RefCount for AtomicCount {
    fn new(value: u32) -> Self { Self(AtomicU32::new(value)) }

    fn get(&self) -> u32 { self.0.load(Ordering::Acquire) }

    fn increment(&self) -> u32 {
        // new references are always made from an existing one, so no
        // synchronization is needed here
        let old = self.0.fetch_add(1, Ordering::Relaxed);
        if old >= MAX_COUNT { count_corrupted("overflow", old) }
        old
    }

    fn decrement(&self) -> u32 {
        let old = self.0.fetch_sub(1, Ordering::Release);
        if old == 0 { count_corrupted("underflow", old) }
        if old == 1 {
            // synchronize with every Release decrement before we tear down
            atomic::fence(Ordering::Acquire);
        }
        old
    }

    fn increment_if_nonzero(&self) -> bool {
        let mut n = self.0.load(Ordering::Relaxed);
        loop {
            if n == 0 { return false }
            if n >= MAX_COUNT { count_corrupted("overflow", n) }
            match self.0.compare_exchange_weak(n, n + 1, Ordering::Acquire, Ordering::Relaxed) {
                Ok(_) => return true,
                Err(current) => n = current
            }
        }
    }

    fn release_if_unique(&self) -> bool {
        self.0.compare_exchange(1, 0, Ordering::Acquire, Ordering::Relaxed).is_ok()
    }

    fn lock(&self, expected: u32) -> bool {
        // Acquire pairs with the Release decrements of handles that are gone
        self.0.compare_exchange(expected, LOCKED, Ordering::Acquire, Ordering::Relaxed).is_ok()
    }

    fn unlock(&self, value: u32) { self.0.store(value, Ordering::Release) }

    fn increment_unless_locked(&self) -> u32 {
        let mut n = self.0.load(Ordering::Relaxed);
        loop {
            if n == LOCKED {
                hint::spin_loop();
                n = self.0.load(Ordering::Relaxed);
                continue;
            }
            if n >= MAX_COUNT { count_corrupted("overflow", n) }
            match self.0.compare_exchange_weak(n, n + 1, Ordering::Acquire, Ordering::Relaxed) {
                Ok(old) => return old,
                Err(current) => n = current
            }
        }
    }
}
