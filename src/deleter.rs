use std::ptr::NonNull;

/// Strategy for destroying an owned object and releasing its storage.
///
/// Handles pair every object with exactly one deleter and call it at most
/// once. Closures taking the object pointer are deleters too:
///
/// ```
/// use std::ptr::NonNull;
/// use smartref::Exclusive;
///
/// let raw = Box::into_raw(Box::new(7u32));
/// let handle = unsafe {
///     Exclusive::from_raw_with(raw, |ptr: NonNull<u32>| drop(Box::from_raw(ptr.as_ptr())))
/// };
/// assert_eq!(*handle, 7);
/// ```
pub trait Deleter<T: ?Sized>
{
    /// Destroy the object behind `ptr` and free its storage.
    ///
    /// # Safety
    ///
    /// `ptr` must be the live object this deleter was paired with, and no
    /// other reference to it may be used afterwards.
    unsafe fn delete(&mut self, ptr: NonNull<T>);
}

/// Runs the object's destructor and returns its storage to the global
/// allocator, like dropping a `Box<T>`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefaultDelete;

impl<T: ?Sized> Deleter<T> for DefaultDelete
{
    unsafe fn delete(&mut self, ptr: NonNull<T>) { drop(Box::from_raw(ptr.as_ptr())) }
}

impl<T: ?Sized, F: FnMut(NonNull<T>)> Deleter<T> for F
{
    unsafe fn delete(&mut self, ptr: NonNull<T>) { self(ptr) }
}
