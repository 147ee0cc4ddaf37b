use allocator_api2::alloc::{ Allocator, Global };
use std::{
    fmt::Debug,
    marker::PhantomData,
    mem,
    ptr::NonNull
};
use crate::rc::{
    control_block::RefCountObject,
    count::{ AtomicCount, LocalCount, RefCount },
    shared_ptr::SharedPtr
};

/// A non-owning observer of an object managed by [`SharedPtr`]. Holding a
/// `WeakPtr` keeps the control block allocated but never the object itself;
/// use [`WeakPtr::lock`] to get a strong handle while the object is alive.
///
/// This is the tool for breaking reference cycles: one side of a
/// parent/child pair should hold its link as a `WeakPtr`.
pub struct WeakPtr<T, C = LocalCount, A = Global>
where C: RefCount,
      A: Allocator
{
    _rep: Option<NonNull<RefCountObject<T, C, A>>>,
    _data: PhantomData<RefCountObject<T, C, A>>
}

impl<T, C, A> WeakPtr<T, C, A>
where C: RefCount,
      A: Allocator
{
    /// Starts observing the object owned by `shared`. Observing an empty
    /// handle gives an empty `WeakPtr`.
    pub fn new(shared: &SharedPtr<T, C, A>) -> Self {
        if let Some(r) = shared.rep_ptr() {
            unsafe { RefCountObject::downgrade(r) };
        }
        Self { _rep: shared.rep_ptr(), _data: PhantomData }
    }

    pub const fn empty() -> Self {
        Self { _rep: None, _data: PhantomData }
    }

    pub fn is_empty(&self) -> bool { self._rep.is_none() }

    /// True when there is no control block or its object has been destroyed.
    pub fn expired(&self) -> bool { self.strong_count() == 0 }

    /// Promotes to a strong handle. Gives an empty `SharedPtr` once the object
    /// is gone; a destroyed object is never brought back.
    pub fn lock(&self) -> SharedPtr<T, C, A> {
        // the weak reference we hold keeps the block allocated, though not
        // necessarily the object inside it
        match self._rep {
            Some(r) if unsafe { RefCountObject::try_increment_strong(r) } => SharedPtr::from_rep(self._rep),
            Some(_) => {
                log::debug!("WeakPtr::lock on expired object");
                SharedPtr::empty()
            },
            None => SharedPtr::empty()
        }
    }

    pub fn strong_count(&self) -> usize {
        self._rep.map_or(0, |r| unsafe { RefCountObject::strong_count(r) })
    }

    pub fn weak_count(&self) -> usize {
        self._rep.map_or(0, |r| unsafe { RefCountObject::weak_count(r) })
    }

    /// True if both observe the same control block, or both are empty.
    pub fn ptr_eq(&self, other: &Self) -> bool { self._rep == other._rep }

    /// Moves the observation out, leaving this handle empty.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::empty())
    }

    /// Stops observing. The control block is freed here if this was the last
    /// reference of any kind.
    pub fn reset(&mut self) {
        if let Some(r) = self._rep.take() {
            unsafe { RefCountObject::decrement_weak(r) };
        }
    }
}

impl<T, C, A> Default for WeakPtr<T, C, A>
where C: RefCount,
      A: Allocator
{
    fn default() -> Self { Self::empty() }
}

impl<T, C, A> From<&SharedPtr<T, C, A>> for WeakPtr<T, C, A>
where C: RefCount,
      A: Allocator
{
    fn from(value: &SharedPtr<T, C, A>) -> Self { Self::new(value) }
}

impl<T, C, A> Clone for WeakPtr<T, C, A>
where C: RefCount,
      A: Allocator
{
    fn clone(&self) -> Self {
        if let Some(r) = self._rep {
            unsafe { RefCountObject::increment_weak(r) };
        }
        Self { _rep: self._rep, _data: PhantomData }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.ptr_eq(source) { return }
        *self = source.clone();
    }
}

impl<T, C, A> Drop for WeakPtr<T, C, A>
where C: RefCount,
      A: Allocator
{
    fn drop(&mut self) { self.reset() }
}

impl<T, C, A> Debug for WeakPtr<T, C, A>
where T: Debug,
      C: RefCount,
      A: Allocator
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let strong = self.lock();
        match strong.get() {
            // the temporary lock adds one strong reference of its own
            Ok(v) => write!(f, "WeakPtr {{ data: {:?}, strong: {}, weak: {} }}",
                v, strong.strong_count() - 1, self.weak_count()),
            Err(_) => write!(f, "WeakPtr {{ expired }}")
        }
    }
}

unsafe impl<T, A> Send for WeakPtr<T, AtomicCount, A>
where T: Send + Sync,
      A: Allocator + Send + Sync {}

unsafe impl<T, A> Sync for WeakPtr<T, AtomicCount, A>
where T: Send + Sync,
      A: Allocator + Send + Sync {}

#[cfg(test)]
pub mod tests {
    use super::WeakPtr;
    use crate::{
        rc::shared_ptr::SharedPtr,
        sync,
        testing::DropCounter
    };
    use std::error::Error;
    type TestReturn = Result<(), Box<dyn Error>>;

    fn check_strong_count(get: usize, expect: usize) {
        assert!(get == expect, "Strong count should be {} instead of {}", expect, get);
    }
    fn check_weak_count(get: usize, expect: usize) {
        assert!(get == expect, "Weak count should be {} instead of {}", expect, get);
    }

    #[test]
    fn weak_pointers() -> TestReturn {
        let weak_ptr;
        {
            let shared_ptr: SharedPtr<i32> = SharedPtr::make_shared(200);
            weak_ptr = shared_ptr.downgrade();
            check_strong_count(shared_ptr.strong_count(), 1);
            check_weak_count(shared_ptr.weak_count(), 1);
            assert!(!weak_ptr.expired(), "Weak pointer should not be expired");
            assert!(*weak_ptr.lock() == 200, "Value from weak_ptr should be 200");
        }
        check_strong_count(weak_ptr.strong_count(), 0);
        check_weak_count(weak_ptr.weak_count(), 1);
        assert!(weak_ptr.expired(), "Weak pointer should expire with its last owner");
        assert!(weak_ptr.lock().is_empty(), "Lock after expiry should be empty");
        Ok(())
    }

    #[test]
    fn lock_increments_strong_by_one() -> TestReturn {
        let shared = SharedPtr::new(String::from("a"));
        let weak = WeakPtr::from(&shared);
        let locked = weak.lock();
        check_strong_count(shared.strong_count(), 2);
        check_weak_count(shared.weak_count(), 1);
        assert!(locked.ptr_eq(&shared), "Promoted handle should share the block");
        drop(locked);
        check_strong_count(shared.strong_count(), 1);
        Ok(())
    }

    #[test]
    fn empty_weak() -> TestReturn {
        let weak: WeakPtr<i32> = WeakPtr::empty();
        assert!(weak.expired(), "Empty weak pointer is always expired");
        assert!(weak.lock().is_empty(), "Locking an empty weak pointer gives an empty handle");
        let empty: SharedPtr<i32> = SharedPtr::empty();
        let from_empty = WeakPtr::new(&empty);
        assert!(from_empty.is_empty(), "Observing an empty handle gives an empty weak pointer");
        check_weak_count(from_empty.weak_count(), 0);
        Ok(())
    }

    #[test]
    fn copy_and_move_weak() -> TestReturn {
        let shared = SharedPtr::new(1);
        let mut w1 = shared.downgrade();
        let w2 = w1.clone();
        check_weak_count(shared.weak_count(), 2);
        check_strong_count(shared.strong_count(), 1);
        let w3 = w1.take();
        assert!(w1.is_empty(), "Moved-from weak pointer should be empty");
        check_weak_count(shared.weak_count(), 2);
        assert!(w3.ptr_eq(&w2), "Moved weak pointer should keep the block");
        let mut w4 = w2.clone();
        w4.clone_from(&w2);
        check_weak_count(shared.weak_count(), 3);
        w4.reset();
        check_weak_count(shared.weak_count(), 2);
        Ok(())
    }

    #[test]
    fn weak_outlives_object() -> TestReturn {
        let counter = DropCounter::new();
        let shared = SharedPtr::new(counter.track(5));
        let w1 = shared.downgrade();
        let w2 = w1.clone();
        drop(shared);
        assert!(counter.drops() == 1, "Object should be dropped with its last owner");
        assert!(w1.expired() && w2.expired(), "Every observer should see the expiry");
        drop(w1);
        check_weak_count(w2.weak_count(), 1);
        assert!(w2.lock().is_empty(), "Expired observer cannot promote");
        assert!(counter.drops() == 1, "Object must not be dropped twice");
        Ok(())
    }

    #[test]
    fn counters_stay_readable_after_object_drop() -> TestReturn {
        let shared = sync::make_shared(String::from("gone"));
        let weak = shared.downgrade();
        let other = weak.clone();
        drop(shared);
        // every path below touches only the counters of a block whose object is dead
        assert!(weak.strong_count() == 0 && weak.weak_count() == 2, "Counts should survive the object");
        assert!(weak.lock().is_empty(), "Dead object must not be promoted");
        drop(other);
        check_weak_count(weak.weak_count(), 1);
        assert!(format!("{:?}", weak) == "WeakPtr { expired }", "Unexpected debug output {:?}", weak);
        Ok(())
    }

    #[test]
    fn scenario_from_single_value() -> TestReturn {
        let counter = DropCounter::new();
        let s1 = SharedPtr::new(counter.track(42));
        check_strong_count(s1.strong_count(), 1);
        let s2 = s1.clone();
        check_strong_count(s1.strong_count(), 2);
        let w = WeakPtr::new(&s1);
        check_weak_count(w.weak_count(), 1);
        drop(s1);
        check_strong_count(s2.strong_count(), 1);
        assert!(counter.drops() == 0, "Object still alive through s2");
        drop(s2);
        assert!(counter.drops() == 1, "Object should be destroyed with s2");
        assert!(w.expired(), "w should be expired");
        assert!(w.lock().is_empty(), "w.lock() should be empty");
        Ok(())
    }

    #[test]
    fn format_weak() -> TestReturn {
        let shared = SharedPtr::new(3);
        let weak = shared.downgrade();
        assert!(format!("{:?}", weak) == "WeakPtr { data: 3, strong: 1, weak: 1 }", "Unexpected debug output {:?}", weak);
        drop(shared);
        assert!(format!("{:?}", weak) == "WeakPtr { expired }", "Unexpected debug output {:?}", weak);
        Ok(())
    }

    #[test]
    fn atomic_lock_races_last_drop() -> TestReturn {
        for _ in 0..50 {
            let counter = DropCounter::new();
            let shared = sync::make_shared(counter.track(1));
            let weak = shared.downgrade();
            std::thread::scope(|s| {
                for _ in 0..4 {
                    let w = weak.clone();
                    s.spawn(move || {
                        let locked = w.lock();
                        if let Ok(v) = locked.get() {
                            assert!(v.value() == 1, "Promoted handle must see a live value");
                        }
                    });
                }
                drop(shared);
            });
            assert!(counter.drops() == 1, "Object should be dropped exactly once");
            assert!(weak.expired(), "Weak pointer should be expired");
        }
        Ok(())
    }
}
