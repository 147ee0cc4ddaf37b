use allocator_api2::alloc::Allocator;
use std::{
    alloc::Layout,
    mem::ManuallyDrop,
    ptr::{ self, NonNull }
};
use crate::{
    error::Error,
    rc::count::{ LOCKED, RefCount }
};

// Shared bookkeeping for one managed object, allocated together with the
// object it owns (make_shared layout).
//
// `weaks` counts every WeakPtr plus one implicit reference held collectively
// by the strong handles while `uses > 0`. The last strong release drops that
// implicit reference, so whichever side brings `weaks` to zero frees the
// block. This keeps "object destroyed" and "record freed" as two separate
// transitions that never race each other.
#[repr(C)]
pub struct RefCountObject<T, C, A>
where C: RefCount,
      A: Allocator
{
    uses: C,
    weaks: C,
    _allocator: A,
    data: ManuallyDrop<T>
}

impl<T, C, A> RefCountObject<T, C, A>
where C: RefCount,
      A: Allocator
{
    fn get_layout() -> Layout { Layout::new::<Self>() }

    /// Allocates a block holding `data` with one strong reference and no weak
    /// observers. On failure nothing stays allocated and `data` is dropped.
    pub(crate) fn new_in(data: T, alloc: A) -> Result<NonNull<Self>, Error> {
        let layout = Self::get_layout();
        let raw = alloc.allocate(layout).map_err(|_| Error::alloc_failed(layout))?;
        let block = raw.cast::<Self>();
        unsafe {
            ptr::write(block.as_ptr(), Self {
                uses: C::new(1),
                weaks: C::new(1),
                _allocator: alloc,
                data: ManuallyDrop::new(data)
            });
        }
        log::trace!("control block {:p}: allocated ({} bytes)", block, layout.size());
        Ok(block)
    }

    // The counters are reached through raw field pointers: a weak handle may
    // outlive `data`, so no reference may ever span the whole block.
    unsafe fn uses<'a>(this: NonNull<Self>) -> &'a C {
        unsafe { &*ptr::addr_of!((*this.as_ptr()).uses) }
    }

    unsafe fn weaks<'a>(this: NonNull<Self>) -> &'a C {
        unsafe { &*ptr::addr_of!((*this.as_ptr()).weaks) }
    }

    pub(crate) unsafe fn strong_count(this: NonNull<Self>) -> usize {
        unsafe { Self::uses(this) }.get() as usize
    }

    pub(crate) unsafe fn weak_count(this: NonNull<Self>) -> usize {
        let weaks = unsafe { Self::weaks(this) }.get();
        // locked by is_unique, which only succeeds with no weak handles
        if weaks == LOCKED { return 0 }
        let implicit = if unsafe { Self::strong_count(this) } > 0 { 1 } else { 0 };
        weaks.saturating_sub(implicit) as usize
    }

    /// True if the caller's strong handle is the only handle of any kind.
    /// `weaks` is locked while `uses` is checked so no WeakPtr can be made
    /// from another strong handle in between; a WeakPtr that already exists
    /// keeps `weaks` above 1 and makes the lock fail.
    pub(crate) unsafe fn is_unique(this: NonNull<Self>) -> bool {
        let weaks = unsafe { Self::weaks(this) };
        if !weaks.lock(1) {
            return false;
        }
        let unique = unsafe { Self::uses(this) }.get() == 1;
        weaks.unlock(1);
        unique
    }

    /// Caller must hold a strong reference, which keeps `data` alive.
    pub(crate) unsafe fn get_data<'a>(this: NonNull<Self>) -> &'a T {
        unsafe { &*Self::data_ptr(this) }
    }

    pub(crate) fn data_ptr(this: NonNull<Self>) -> *const T {
        unsafe { ptr::addr_of!((*this.as_ptr()).data) as *const T }
    }

    pub(crate) unsafe fn increment_strong(this: NonNull<Self>) {
        unsafe { Self::uses(this) }.increment();
    }

    /// Adds a weak reference on behalf of an existing WeakPtr.
    pub(crate) unsafe fn increment_weak(this: NonNull<Self>) {
        unsafe { Self::weaks(this) }.increment();
    }

    /// Adds a weak reference on behalf of a strong handle.
    pub(crate) unsafe fn downgrade(this: NonNull<Self>) {
        unsafe { Self::weaks(this) }.increment_unless_locked();
    }

    pub(crate) unsafe fn try_increment_strong(this: NonNull<Self>) -> bool {
        unsafe { Self::uses(this) }.increment_if_nonzero()
    }

    /// Releases one strong reference. The object is destroyed synchronously on
    /// the 1 -> 0 transition.
    pub(crate) unsafe fn decrement_strong(this: NonNull<Self>) {
        if unsafe { Self::uses(this) }.decrement() == 1 {
            unsafe { ptr::drop_in_place(ptr::addr_of_mut!((*this.as_ptr()).data) as *mut T) };
            log::trace!("control block {:p}: object destroyed", this);
            unsafe { Self::decrement_weak(this) };
        }
    }

    /// Releases one weak reference, freeing the record once nothing refers to it.
    pub(crate) unsafe fn decrement_weak(this: NonNull<Self>) {
        if unsafe { Self::weaks(this) }.decrement() == 1 {
            unsafe {
                let alloc = ptr::read(ptr::addr_of!((*this.as_ptr())._allocator));
                alloc.deallocate(this.cast(), Self::get_layout());
            }
            log::trace!("control block {:p}: released", this);
        }
    }

    /// Moves the object out if `this` holds the only strong reference. The
    /// strong count is taken straight from 1 to 0 so no WeakPtr can promote
    /// in between.
    pub(crate) unsafe fn take_if_unique(this: NonNull<Self>) -> Option<T> {
        if !unsafe { Self::uses(this) }.release_if_unique() {
            return None;
        }
        let value = unsafe { ptr::read(ptr::addr_of!((*this.as_ptr()).data) as *const T) };
        log::trace!("control block {:p}: object moved out", this);
        unsafe { Self::decrement_weak(this) };
        Some(value)
    }
}
