//! Thin layer over the global allocator.
//!
//! Every heap allocation made by the handles goes through here so that the
//! fallible factories can report failure instead of aborting, and so that
//! storage for values is laid out exactly as `Box` would lay it out.

use std::{
    alloc::{self, Layout},
    ptr::NonNull,
};

use crate::error::{Error, Result};

/// Allocate storage for `layout`.
///
/// Zero-sized layouts never touch the allocator; they receive a dangling but
/// well-aligned pointer, the same convention `Box` uses.
pub(crate) fn try_allocate(layout: Layout) -> Result<NonNull<u8>>
{
    if layout.size() == 0 {
        return Ok(dangling(layout));
    }

    match NonNull::new(unsafe { alloc::alloc(layout) }) {
        Some(ptr) => Ok(ptr),
        None => {
            log::debug!(
                "allocation of {} bytes (align {}) failed",
                layout.size(),
                layout.align()
            );
            Err(Error::alloc_failed(layout))
        }
    }
}

/// Infallible variant of [`try_allocate`]; diverges through
/// `handle_alloc_error` on failure.
pub(crate) fn allocate(layout: Layout) -> NonNull<u8>
{
    match try_allocate(layout) {
        Ok(ptr) => ptr,
        Err(_) => alloc::handle_alloc_error(layout),
    }
}

/// # Safety
///
/// `ptr` must come from [`try_allocate`] or [`allocate`] with the same
/// `layout`, and must not be used afterwards.
pub(crate) unsafe fn deallocate(ptr: NonNull<u8>, layout: Layout)
{
    if layout.size() != 0 {
        alloc::dealloc(ptr.as_ptr(), layout)
    }
}

/// Move `value` into fresh heap storage compatible with `Box<T>`.
///
/// On failure the value is dropped and nothing stays allocated.
pub(crate) fn try_place<T>(value: T) -> Result<NonNull<T>>
{
    let ptr = try_allocate(Layout::new::<T>())?.cast::<T>();
    unsafe { ptr.as_ptr().write(value) }
    Ok(ptr)
}

pub(crate) fn place<T>(value: T) -> NonNull<T>
{
    let ptr = allocate(Layout::new::<T>()).cast::<T>();
    unsafe { ptr.as_ptr().write(value) }
    ptr
}

fn dangling(layout: Layout) -> NonNull<u8>
{
    // Alignment is a non-zero power of two.
    unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
}
