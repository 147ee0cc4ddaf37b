use std::alloc::Layout;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid access: {handle} is empty")]
    EmptyHandle { handle: &'static str },

    #[error("Failed to allocate {size} bytes (align {align})")]
    AllocFailed { size: usize, align: usize },

    #[error("Arena node at index {index} was removed")]
    StaleNode { index: usize },
}

impl Error {
    #[cold]
    pub fn empty_handle(handle: &'static str) -> Self {
        Error::EmptyHandle { handle }
    }

    #[cold]
    pub fn alloc_failed(layout: Layout) -> Self {
        Error::AllocFailed {
            size: layout.size(),
            align: layout.align(),
        }
    }

    #[cold]
    pub fn stale_node(index: usize) -> Self {
        Error::StaleNode { index }
    }
}

// Dereferencing through Deref has no way to return an error, so the invalid
// access is raised as a panic carrying the same message.
#[cold]
#[track_caller]
pub(crate) fn invalid_access(handle: &'static str) -> ! {
    panic!("{}", Error::empty_handle(handle))
}
