use allocator_api2::alloc::{ Allocator, Global };
use std::{
    alloc::{ Layout, handle_alloc_error },
    fmt::{ Debug, Display },
    marker::PhantomData,
    mem::{ self, ManuallyDrop },
    ops::{ Deref, DerefMut },
    ptr::{ self, NonNull }
};
use crate::error::{ Error, invalid_access };

/// Exclusive ownership of one heap object. There is no control block and no
/// counting: the handle is the only owner, and ownership moves with it.
///
/// `UniquePtr` is deliberately not [`Clone`]:
///
/// ```compile_fail
/// # use smart_ptrs::UniquePtr;
/// let a = UniquePtr::new(1);
/// let b: UniquePtr<i32> = a.clone();
/// ```
pub struct UniquePtr<T, A = Global>
where A: Allocator
{
    _ptr: Option<NonNull<T>>,
    _allocator: A,
    _data: PhantomData<T>
}

impl<T> UniquePtr<T, Global> {
    pub fn new(data: T) -> Self { Self::new_in(data, Global) }
    pub const fn empty() -> Self { Self::empty_in(Global) }
}

impl<T, A> UniquePtr<T, A>
where A: Allocator
{
    pub const fn empty_in(alloc: A) -> Self {
        Self { _ptr: None, _allocator: alloc, _data: PhantomData }
    }

    pub fn new_in(data: T, alloc: A) -> Self {
        match Self::try_new_in(data, alloc) {
            Ok(v) => v,
            Err(_) => handle_alloc_error(Layout::new::<T>())
        }
    }

    pub fn try_new_in(data: T, alloc: A) -> Result<Self, Error> {
        let layout = Layout::new::<T>();
        let raw = alloc.allocate(layout).map_err(|_| Error::alloc_failed(layout))?;
        let _ptr = raw.cast::<T>();
        unsafe { ptr::write(_ptr.as_ptr(), data) };
        Ok(Self { _ptr: Some(_ptr), _allocator: alloc, _data: PhantomData })
    }

    pub fn allocator(&self) -> &A { &self._allocator }

    pub fn is_empty(&self) -> bool { self._ptr.is_none() }

    pub fn get(&self) -> Result<&T, Error> {
        match self._ptr {
            Some(p) => Ok(unsafe { p.as_ref() }),
            None => Err(Error::empty_handle("UniquePtr"))
        }
    }

    pub fn get_mut(&mut self) -> Result<&mut T, Error> {
        match self._ptr {
            Some(mut p) => Ok(unsafe { p.as_mut() }),
            None => Err(Error::empty_handle("UniquePtr"))
        }
    }

    pub fn as_ptr(&self) -> *const T {
        self._ptr.map_or(ptr::null(), |p| p.as_ptr() as *const T)
    }

    // Reads the object out and frees its storage, leaving the handle empty.
    fn take_value(&mut self) -> Option<T> {
        let p = self._ptr.take()?;
        unsafe {
            let value = ptr::read(p.as_ptr());
            self._allocator.deallocate(p.cast(), Layout::new::<T>());
            Some(value)
        }
    }

    /// Gives up ownership of the object, freeing the allocation.
    pub fn into_inner(self) -> Option<T> {
        let mut this = ManuallyDrop::new(self);
        let value = this.take_value();
        unsafe { ptr::drop_in_place(&mut this._allocator) };
        value
    }

    /// Moves ownership out, leaving this handle empty.
    pub fn take(&mut self) -> Self
    where A: Clone
    {
        let empty = Self::empty_in(self._allocator.clone());
        mem::replace(self, empty)
    }

    /// Destroys the owned object, if any, then takes ownership of `data`.
    pub fn reset(&mut self, data: Option<T>) {
        if self.try_reset(data).is_err() {
            handle_alloc_error(Layout::new::<T>())
        }
    }

    /// Like [`UniquePtr::reset`], but reports allocation failure. On failure
    /// the handle is left empty.
    pub fn try_reset(&mut self, data: Option<T>) -> Result<(), Error> {
        drop(self.take_value());
        if let Some(v) = data {
            let layout = Layout::new::<T>();
            let raw = self._allocator.allocate(layout).map_err(|_| Error::alloc_failed(layout))?;
            let p = raw.cast::<T>();
            unsafe { ptr::write(p.as_ptr(), v) };
            self._ptr = Some(p);
        }
        Ok(())
    }
}

impl<T, A> Default for UniquePtr<T, A>
where A: Allocator + Default
{
    fn default() -> Self { Self::empty_in(A::default()) }
}

impl<T, A> Drop for UniquePtr<T, A>
where A: Allocator
{
    fn drop(&mut self) { drop(self.take_value()) }
}

impl<T, A> Deref for UniquePtr<T, A>
where A: Allocator
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Ok(v) => v,
            Err(_) => invalid_access("UniquePtr")
        }
    }
}

impl<T, A> DerefMut for UniquePtr<T, A>
where A: Allocator
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.get_mut() {
            Ok(v) => v,
            Err(_) => invalid_access("UniquePtr")
        }
    }
}

impl<T, A> Debug for UniquePtr<T, A>
where T: Debug,
      A: Allocator
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Ok(v) => write!(f, "UniquePtr {{ data: {:?} }}", v),
            Err(_) => write!(f, "UniquePtr {{ empty }}")
        }
    }
}

impl<T, A> Display for UniquePtr<T, A>
where T: Display,
      A: Allocator
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Ok(v) => write!(f, "{}", v),
            Err(_) => write!(f, "None")
        }
    }
}

unsafe impl<T, A> Send for UniquePtr<T, A>
where T: Send,
      A: Allocator + Send {}

unsafe impl<T, A> Sync for UniquePtr<T, A>
where T: Sync,
      A: Allocator + Sync {}

#[cfg(test)]
pub mod tests {
    use super::UniquePtr;
    use crate::{
        error::Error as PtrError,
        testing::{ DropCounter, FailingAlloc }
    };
    use std::error::Error;
    type TestReturn = Result<(), Box<dyn Error>>;

    struct Data { data: i32 }

    #[test]
    fn create_unique() -> TestReturn {
        let uptr = UniquePtr::new(Data { data: 42 });
        assert!(uptr.data == 42, "Member access should give 42 instead of {}", uptr.data);
        assert!((*uptr).data == 42, "Dereference should give 42");
        assert!(!uptr.is_empty(), "Constructed UniquePtr should not be empty");
        Ok(())
    }

    #[test]
    fn move_leaves_source_empty() -> TestReturn {
        let counter = DropCounter::new();
        let mut a = UniquePtr::new(counter.track(1));
        let ptr = a.as_ptr();
        let b = a.take();
        assert!(a.is_empty(), "Moved-from handle should be empty");
        assert!(b.as_ptr() == ptr, "Ownership should move without reallocating");
        assert!(a.get().err() == Some(PtrError::EmptyHandle { handle: "UniquePtr" }), "Moved-from get should fail");
        drop(a);
        assert!(counter.drops() == 0, "Dropping the moved-from handle must not drop the object");
        drop(b);
        assert!(counter.drops() == 1, "Object should be dropped with its owner");
        Ok(())
    }

    #[test]
    #[should_panic(expected = "Invalid access: UniquePtr is empty")]
    fn deref_empty_panics() {
        let uptr: UniquePtr<Data> = UniquePtr::empty();
        let _value = uptr.data;
    }

    #[test]
    fn mutate_through_handle() -> TestReturn {
        let mut uptr = UniquePtr::new(Data { data: 1 });
        uptr.data += 1;
        uptr.get_mut()?.data *= 10;
        assert!(uptr.get()?.data == 20, "Value should be 20 instead of {}", uptr.data);
        Ok(())
    }

    #[test]
    fn reset_unique() -> TestReturn {
        let counter = DropCounter::new();
        let mut uptr = UniquePtr::new(counter.track(1));
        uptr.reset(Some(counter.track(2)));
        assert!(counter.drops() == 1, "Old object should be dropped by reset");
        assert!(uptr.get()?.value() == 2, "Handle should own the new object");
        uptr.reset(None);
        assert!(uptr.is_empty(), "Reset to None should empty the handle");
        assert!(counter.drops() == 2, "Both objects should be dropped");
        Ok(())
    }

    #[test]
    fn into_inner_unique() -> TestReturn {
        let counter = DropCounter::new();
        let uptr = UniquePtr::new(counter.track(9));
        let value = uptr.into_inner().ok_or("handle should own a value")?;
        assert!(counter.drops() == 0, "Moving the value out must not drop it");
        assert!(value.value() == 9, "Value should be 9");
        drop(value);
        assert!(counter.drops() == 1, "Value should be dropped once");
        assert!(UniquePtr::<i32>::empty().into_inner().is_none(), "Empty handle has no value");
        Ok(())
    }

    #[test]
    fn construction_failure_is_reported() -> TestReturn {
        let result = UniquePtr::try_new_in(5, FailingAlloc);
        assert!(matches!(result, Err(PtrError::AllocFailed { .. })), "Allocation failure should be reported");
        let mut uptr: UniquePtr<i32, FailingAlloc> = UniquePtr::empty_in(FailingAlloc);
        assert!(uptr.try_reset(Some(1)).is_err(), "Reset should report allocation failure");
        assert!(uptr.is_empty(), "Failed reset leaves the handle empty");
        Ok(())
    }

    #[test]
    fn format_unique() -> TestReturn {
        let uptr = UniquePtr::new(7);
        assert!(format!("{:?}", uptr) == "UniquePtr { data: 7 }", "Unexpected debug output {:?}", uptr);
        assert!(format!("{}", uptr) == "7", "Display should forward to the value");
        let empty: UniquePtr<i32> = UniquePtr::default();
        assert!(format!("{:?}", empty) == "UniquePtr { empty }", "Unexpected debug output {:?}", empty);
        Ok(())
    }
}
