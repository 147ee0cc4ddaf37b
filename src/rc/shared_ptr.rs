use allocator_api2::alloc::{ Allocator, Global };
use std::{
    alloc::{ Layout, handle_alloc_error },
    fmt::{ Debug, Display },
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::{ self, NonNull }
};
use crate::{
    error::{ Error, invalid_access },
    rc::{
        control_block::RefCountObject,
        count::{ AtomicCount, LocalCount, RefCount },
        weak_ptr::WeakPtr
    },
    unique_ptr::UniquePtr
};

/// A shared-ownership handle. Every non-empty `SharedPtr` holds one strong
/// reference on its control block; the managed object is destroyed when the
/// last one is dropped or reset.
///
/// `C` selects the counter policy: [`LocalCount`] for single-threaded use,
/// [`AtomicCount`] when handles cross threads (see [`crate::sync`]).
pub struct SharedPtr<T, C = LocalCount, A = Global>
where C: RefCount,
      A: Allocator
{
    _rep: Option<NonNull<RefCountObject<T, C, A>>>,
    _data: PhantomData<RefCountObject<T, C, A>>
}

impl<T> SharedPtr<T, LocalCount, Global> {
    /// Construct an object of type T and wrap it in a SharedPtr to act as a reference counting
    /// smart pointer.
    pub fn make_shared(data: T) -> Self { Self::new(data) }

    pub fn new(data: T) -> Self { Self::new_in(data, Global) }

    /// Takes over the object owned by `unique`. An empty `UniquePtr` gives an
    /// empty `SharedPtr`.
    pub fn from_unique<U>(unique: UniquePtr<T, U>) -> Self
    where U: Allocator
    {
        match unique.into_inner() {
            Some(v) => Self::new(v),
            None => Self::empty()
        }
    }
}

impl<T, C, A> SharedPtr<T, C, A>
where C: RefCount,
      A: Allocator
{
    pub(crate) fn from_rep(_rep: Option<NonNull<RefCountObject<T, C, A>>>) -> Self {
        Self { _rep, _data: PhantomData }
    }

    /// An empty handle, owning nothing.
    pub const fn empty() -> Self {
        Self { _rep: None, _data: PhantomData }
    }

    pub fn new_in(data: T, alloc: A) -> Self {
        match Self::try_new_in(data, alloc) {
            Ok(v) => v,
            Err(_) => handle_alloc_error(Layout::new::<RefCountObject<T, C, A>>())
        }
    }

    /// Allocates the control block for `data`. Allocation failure is reported
    /// instead of aborting; no partial block is left behind.
    pub fn try_new_in(data: T, alloc: A) -> Result<Self, Error> {
        let _rep = RefCountObject::new_in(data, alloc)?;
        Ok(Self::from_rep(Some(_rep)))
    }

    pub(crate) fn rep_ptr(&self) -> Option<NonNull<RefCountObject<T, C, A>>> { self._rep }

    pub fn is_empty(&self) -> bool { self._rep.is_none() }

    /// Reference to the managed object, or [`Error::EmptyHandle`] if there is none.
    pub fn get(&self) -> Result<&T, Error> {
        match self._rep {
            // a live strong handle keeps the object alive
            Some(r) => Ok(unsafe { RefCountObject::get_data(r) }),
            None => Err(Error::empty_handle("SharedPtr"))
        }
    }

    /// Mutable access, only granted while this is the sole strong handle and
    /// nothing observes the object through a WeakPtr. For atomic counters the
    /// check holds off concurrent downgrades, so it never succeeds while any
    /// other thread can still reach the object.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self._rep {
            Some(r) if unsafe { RefCountObject::is_unique(r) } => {
                Some(unsafe { &mut *(RefCountObject::data_ptr(r) as *mut T) })
            },
            _ => None
        }
    }

    /// Raw pointer to the object, null when empty.
    pub fn as_ptr(&self) -> *const T {
        match self._rep {
            Some(r) => RefCountObject::data_ptr(r),
            None => ptr::null()
        }
    }

    /// Number of strong handles sharing the object; 0 for an empty handle.
    pub fn strong_count(&self) -> usize {
        self._rep.map_or(0, |r| unsafe { RefCountObject::strong_count(r) })
    }

    /// Number of WeakPtr observers of the object; 0 for an empty handle.
    pub fn weak_count(&self) -> usize {
        self._rep.map_or(0, |r| unsafe { RefCountObject::weak_count(r) })
    }

    pub fn unique(&self) -> bool { self.strong_count() == 1 }

    /// True if both handles refer to the same control block, or both are empty.
    pub fn ptr_eq(&self, other: &Self) -> bool { self._rep == other._rep }

    pub fn downgrade(&self) -> WeakPtr<T, C, A> { WeakPtr::new(self) }

    /// Moves the reference out, leaving this handle empty. Counts are unchanged.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::empty())
    }

    fn release(&mut self) {
        if let Some(r) = self._rep.take() {
            unsafe { RefCountObject::decrement_strong(r) };
        }
    }

    /// Releases the current object (destroying it if this was the last strong
    /// handle), then takes ownership of `data` if one is given.
    pub fn reset(&mut self, data: Option<T>)
    where A: Default
    {
        if self.try_reset(data).is_err() {
            handle_alloc_error(Layout::new::<RefCountObject<T, C, A>>())
        }
    }

    /// Like [`SharedPtr::reset`], but reports allocation failure. The old
    /// object is always released first; on failure the handle is left empty.
    pub fn try_reset(&mut self, data: Option<T>) -> Result<(), Error>
    where A: Default
    {
        self.release();
        if let Some(v) = data {
            *self = Self::try_new_in(v, A::default())?;
        }
        Ok(())
    }

    /// Returns the object if this is the last strong handle. Otherwise the
    /// handle is given back unchanged.
    pub fn into_inner(self) -> Result<T, Self> {
        let this = mem::ManuallyDrop::new(self);
        match this._rep {
            None => Err(mem::ManuallyDrop::into_inner(this)),
            Some(r) => match unsafe { RefCountObject::take_if_unique(r) } {
                Some(v) => Ok(v),
                None => Err(mem::ManuallyDrop::into_inner(this))
            }
        }
    }
}

impl<T, C, A> Default for SharedPtr<T, C, A>
where C: RefCount,
      A: Allocator
{
    fn default() -> Self { Self::empty() }
}

impl<T, C, A> Clone for SharedPtr<T, C, A>
where C: RefCount,
      A: Allocator
{
    fn clone(&self) -> Self {
        if let Some(r) = self._rep {
            unsafe { RefCountObject::increment_strong(r) };
        }
        Self::from_rep(self._rep)
    }

    // Assigning a handle that already shares our block leaves every count
    // untouched.
    fn clone_from(&mut self, source: &Self) {
        if self.ptr_eq(source) { return }
        *self = source.clone();
    }
}

impl<T, C, A> Drop for SharedPtr<T, C, A>
where C: RefCount,
      A: Allocator
{
    fn drop(&mut self) { self.release() }
}

impl<T, C, A> Deref for SharedPtr<T, C, A>
where C: RefCount,
      A: Allocator
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Ok(v) => v,
            Err(_) => invalid_access("SharedPtr")
        }
    }
}

impl<T, C, A> PartialEq for SharedPtr<T, C, A>
where T: PartialEq,
      C: RefCount,
      A: Allocator
{
    fn eq(&self, other: &Self) -> bool {
        match (self.get(), other.get()) {
            (Ok(a), Ok(b)) => a == b,
            (Err(_), Err(_)) => true,
            _ => false
        }
    }
}

impl<T, C, A> From<UniquePtr<T, A>> for SharedPtr<T, C, A>
where C: RefCount,
      A: Allocator + Clone
{
    fn from(value: UniquePtr<T, A>) -> Self {
        let alloc = value.allocator().clone();
        match value.into_inner() {
            Some(v) => Self::new_in(v, alloc),
            None => Self::empty()
        }
    }
}

impl<T, C, A> Debug for SharedPtr<T, C, A>
where T: Debug,
      C: RefCount,
      A: Allocator
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Ok(v) => write!(f, "SharedPtr {{ data: {:?}, strong: {}, weak: {} }}",
                v, self.strong_count(), self.weak_count()),
            Err(_) => write!(f, "SharedPtr {{ empty }}")
        }
    }
}

impl<T, C, A> Display for SharedPtr<T, C, A>
where T: Display,
      C: RefCount,
      A: Allocator
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Ok(v) => write!(f, "{}", v),
            Err(_) => write!(f, "None")
        }
    }
}

unsafe impl<T, A> Send for SharedPtr<T, AtomicCount, A>
where T: Send + Sync,
      A: Allocator + Send + Sync {}

unsafe impl<T, A> Sync for SharedPtr<T, AtomicCount, A>
where T: Send + Sync,
      A: Allocator + Send + Sync {}
