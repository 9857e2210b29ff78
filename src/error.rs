use std::alloc::Layout;

use thiserror::Error;

/// Failures surfaced by the fallible handle operations.
///
/// Most precondition violations are not represented here: a failed promotion
/// or a mismatched downcast yields an empty handle instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error
{
    /// The global allocator could not provide storage for an object or a
    /// control block. Nothing was constructed.
    #[error("failed to allocate {size} bytes aligned to {align}")]
    AllocFailed
    {
        size: usize, align: usize
    },

    /// A shared handle to an object was requested from the object itself, but
    /// no shared handle currently owns it.
    #[error("object is not owned by any shared handle")]
    NotOwned,
}

impl Error
{
    pub(crate) fn alloc_failed(layout: Layout) -> Self
    {
        Error::AllocFailed {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
