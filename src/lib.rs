//! Ownership handles with explicit lifetime bookkeeping.
//!
//! - [`UniquePtr`]: exclusive ownership, moved but never copied.
//! - [`SharedPtr`]: shared ownership through a reference counted control
//!   block. The object is destroyed synchronously when the last strong handle
//!   goes away.
//! - [`WeakPtr`]: a non-owning observer of a `SharedPtr`'s object that can be
//!   promoted back with [`WeakPtr::lock`] while the object is still alive.
//!
//! Reference counting never reclaims a cycle of `SharedPtr`s. Break cycles by
//! holding one direction as a `WeakPtr`, or keep graph shaped data in an
//! [`arena::Arena`].
//!
//! The default handles count with plain integers and stay on one thread. The
//! [`sync`] aliases use atomic counters and may be shared across threads.

pub mod error;
pub mod rc {
    pub mod control_block;
    pub mod count;
    pub mod shared_ptr;
    pub mod weak_ptr;
}
pub mod arena;
pub mod unique_ptr;

pub use crate::{
    error::Error,
    rc::{
        count::{ AtomicCount, LocalCount, RefCount },
        shared_ptr::SharedPtr,
        weak_ptr::WeakPtr
    },
    unique_ptr::UniquePtr
};

/// Handles whose counters are atomic, for objects shared between threads.
pub mod sync {
    use allocator_api2::alloc::Global;
    use crate::rc::count::AtomicCount;

    pub type SharedPtr<T, A = Global> = crate::rc::shared_ptr::SharedPtr<T, AtomicCount, A>;
    pub type WeakPtr<T, A = Global> = crate::rc::weak_ptr::WeakPtr<T, AtomicCount, A>;

    /// Construct an object of type T and wrap it in an atomically counted SharedPtr.
    pub fn make_shared<T>(data: T) -> SharedPtr<T> { SharedPtr::new_in(data, Global) }
}

#[cfg(test)]
mod testing;
