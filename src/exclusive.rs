use std::{
    fmt,
    marker::PhantomData,
    mem,
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

use crate::{
    allocator,
    deleter::{DefaultDelete, Deleter},
    error::Result,
    observer::Observer,
    stats,
};

/// Sole owner of a heap object.
///
/// Has the semantics of `Box` plus two things `Box` lacks: a pluggable
/// [`Deleter`], and an empty state. A handle becomes empty when created with
/// [`empty`](Self::empty), after [`take`](Self::take), [`release`](Self::release)
/// or [`reset`](Self::reset). Dropping an empty handle does nothing.
///
/// There is no `Clone`: ownership moves, it is never duplicated.
///
/// Like `Box`, the handle's own operations are associated functions
/// (`Exclusive::release(&mut x)`) so they never shadow methods of `T`.
pub struct Exclusive<T: ?Sized, D: Deleter<T> = DefaultDelete>
{
    ptr: Option<NonNull<T>>,
    deleter: D,
    _owns: PhantomData<T>,
}

unsafe impl<T: ?Sized + Send, D: Deleter<T> + Send> Send for Exclusive<T, D> {}
unsafe impl<T: ?Sized + Sync, D: Deleter<T> + Sync> Sync for Exclusive<T, D> {}

impl<T> Exclusive<T>
{
    /// Allocate `value` on the heap.
    ///
    /// Aborts through `handle_alloc_error` if the allocator fails; see
    /// [`try_new`](Self::try_new).
    pub fn new(value: T) -> Self { unsafe { Self::adopt(allocator::place(value), DefaultDelete) } }

    /// Allocate `value` on the heap, reporting allocation failure.
    ///
    /// On failure `value` is dropped and nothing is owned.
    pub fn try_new(value: T) -> Result<Self>
    {
        Ok(unsafe { Self::adopt(allocator::try_place(value)?, DefaultDelete) })
    }

    /// Destroy the current object, if any, and own `value` instead.
    ///
    /// The new object is allocated before the old one is destroyed, so on
    /// failure the handle is unchanged.
    pub fn replace(this: &mut Self, value: T) -> Result<()>
    {
        let fresh = allocator::try_place(value)?;
        stats::record_exclusive_acquired();
        this.swap_in(Some(fresh));
        Ok(())
    }
}

impl<T: ?Sized> Exclusive<T>
{
    /// Take ownership of an object allocated the way `Box` allocates.
    ///
    /// A null `ptr` gives an empty handle.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `Box::into_raw` (or an equivalent
    /// allocation), and nothing else may own it.
    pub unsafe fn from_raw(ptr: *mut T) -> Self { Self::from_raw_with(ptr, DefaultDelete) }
}

impl<T: ?Sized, D: Deleter<T>> Exclusive<T, D>
{
    /// Take ownership of `ptr`, to be destroyed with `deleter`.
    ///
    /// A null `ptr` gives an empty handle that still holds `deleter`.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a live object that `deleter` may
    /// destroy, and nothing else may own it.
    pub unsafe fn from_raw_with(ptr: *mut T, deleter: D) -> Self
    {
        match NonNull::new(ptr) {
            Some(ptr) => Self::adopt(ptr, deleter),
            None => Self::vacant(deleter),
        }
    }

    unsafe fn adopt(ptr: NonNull<T>, deleter: D) -> Self
    {
        stats::record_exclusive_acquired();
        Self {
            ptr: Some(ptr),
            deleter,
            _owns: PhantomData,
        }
    }

    pub(crate) fn vacant(deleter: D) -> Self
    {
        Self {
            ptr: None,
            deleter,
            _owns: PhantomData,
        }
    }

    pub fn is_empty(this: &Self) -> bool { this.ptr.is_none() }

    pub fn get(this: &Self) -> Option<&T> { this.ptr.map(|p| unsafe { &*p.as_ptr() }) }

    pub fn get_mut(this: &mut Self) -> Option<&mut T>
    {
        this.ptr.map(|p| unsafe { &mut *p.as_ptr() })
    }

    /// Reference the owned object without checking that there is one.
    ///
    /// # Safety
    ///
    /// The handle must not be empty.
    pub unsafe fn get_unchecked(this: &Self) -> &T { &*this.ptr.unwrap_unchecked().as_ptr() }

    /// Address of the owned object, or `None` when empty.
    pub fn as_ptr(this: &Self) -> Option<NonNull<T>> { this.ptr }

    pub fn observe(this: &Self) -> Observer<T>
    {
        match this.ptr {
            Some(p) => Observer::from(p),
            None => Observer::null(),
        }
    }

    pub fn deleter(this: &Self) -> &D { &this.deleter }

    pub fn deleter_mut(this: &mut Self) -> &mut D { &mut this.deleter }

    /// Give up ownership without destroying anything. The caller becomes
    /// responsible for the returned object; the handle is left empty.
    pub fn release(this: &mut Self) -> Option<NonNull<T>>
    {
        let ptr = this.ptr.take();
        if ptr.is_some() {
            stats::record_exclusive_relinquished();
        }
        ptr
    }

    /// Like [`release`](Self::release), consuming the handle. The deleter is
    /// dropped.
    pub fn into_raw(mut this: Self) -> Option<NonNull<T>> { Self::release(&mut this) }

    /// Split into the raw object and its deleter, leaving nothing behind.
    pub fn into_parts(this: Self) -> (Option<NonNull<T>>, D)
    {
        let mut this = mem::ManuallyDrop::new(this);
        let ptr = Self::release(&mut this);
        (ptr, unsafe { std::ptr::read(&this.deleter) })
    }

    /// Destroy the owned object now and leave the handle empty.
    pub fn reset(this: &mut Self) { this.swap_in(None) }

    /// Destroy the owned object and take ownership of `ptr` instead.
    ///
    /// # Safety
    ///
    /// Same contract as [`from_raw_with`](Self::from_raw_with) for this
    /// handle's deleter.
    pub unsafe fn reset_raw(this: &mut Self, ptr: *mut T)
    {
        let fresh = NonNull::new(ptr);
        if fresh.is_some() {
            stats::record_exclusive_acquired();
        }
        this.swap_in(fresh)
    }

    fn swap_in(&mut self, fresh: Option<NonNull<T>>)
    {
        if let Some(old) = mem::replace(&mut self.ptr, fresh) {
            stats::record_exclusive_relinquished();
            log::trace!("deleting exclusively owned object at {:p}", old);
            unsafe { self.deleter.delete(old) }
        }
    }
}

impl<T: ?Sized, D: Deleter<T> + Default> Exclusive<T, D>
{
    /// A handle that owns nothing.
    pub fn empty() -> Self { Self::vacant(D::default()) }

    /// Move the object and deleter out, leaving this handle empty with a
    /// default deleter.
    pub fn take(this: &mut Self) -> Self { mem::take(this) }
}

impl<T: ?Sized, D: Deleter<T> + Default> Default for Exclusive<T, D>
{
    fn default() -> Self { Self::empty() }
}

impl<T: ?Sized, D: Deleter<T>> Drop for Exclusive<T, D>
{
    fn drop(&mut self) { self.swap_in(None) }
}

/// Dereferencing an empty handle is a precondition violation and panics;
/// use [`Exclusive::get`] when emptiness is expected.
impl<T: ?Sized, D: Deleter<T>> Deref for Exclusive<T, D>
{
    type Target = T;

    fn deref(&self) -> &T
    {
        match Self::get(self) {
            Some(it) => it,
            None => panic!("dereferenced an empty Exclusive"),
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> DerefMut for Exclusive<T, D>
{
    fn deref_mut(&mut self) -> &mut T
    {
        match Self::get_mut(self) {
            Some(it) => it,
            None => panic!("dereferenced an empty Exclusive"),
        }
    }
}

impl<T: ?Sized> From<Box<T>> for Exclusive<T>
{
    fn from(it: Box<T>) -> Self { unsafe { Self::from_raw(Box::into_raw(it)) } }
}

impl<T: ?Sized + fmt::Debug, D: Deleter<T>> fmt::Debug for Exclusive<T, D>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Exclusive").field("value", &Self::get(self)).finish()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::cell::Cell;

    struct Tally<'a>(&'a Cell<u32>);

    impl Drop for Tally<'_>
    {
        fn drop(&mut self) { self.0.set(self.0.get() + 1) }
    }

    #[test]
    fn take_leaves_source_empty()
    {
        let drops = Cell::new(0);
        let mut first = Exclusive::new(Tally(&drops));
        let second = Exclusive::take(&mut first);

        assert!(Exclusive::is_empty(&first));
        assert!(!Exclusive::is_empty(&second));
        drop(first);
        assert_eq!(drops.get(), 0);
        drop(second);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn release_hands_over_responsibility()
    {
        let drops = Cell::new(0);
        let mut handle = Exclusive::new(Tally(&drops));
        let raw = Exclusive::release(&mut handle).unwrap();
        drop(handle);
        assert_eq!(drops.get(), 0);

        drop(unsafe { Box::from_raw(raw.as_ptr()) });
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn replace_destroys_previous_object()
    {
        let drops = Cell::new(0);
        let mut handle = Exclusive::new(Tally(&drops));
        Exclusive::replace(&mut handle, Tally(&drops)).unwrap();
        assert_eq!(drops.get(), 1);
        Exclusive::reset(&mut handle);
        assert_eq!(drops.get(), 2);
        assert!(Exclusive::get(&handle).is_none());
        Exclusive::reset(&mut handle);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn custom_deleter_runs_once()
    {
        let calls = Cell::new(0);
        let raw = Box::into_raw(Box::new(String::from("owned")));
        let handle = unsafe {
            Exclusive::from_raw_with(raw, |p: NonNull<String>| {
                calls.set(calls.get() + 1);
                drop(Box::from_raw(p.as_ptr()));
            })
        };
        assert_eq!(handle.len(), 5);
        drop(handle);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn null_raw_pointer_is_empty()
    {
        let handle = unsafe { Exclusive::<u8>::from_raw(std::ptr::null_mut()) };
        assert!(Exclusive::is_empty(&handle));
        assert!(Exclusive::observe(&handle).is_null());
    }

    #[test]
    fn unsized_objects_from_box()
    {
        let mut handle: Exclusive<[u32]> = Exclusive::from(vec![1, 2, 3].into_boxed_slice());
        handle[1] = 5;
        assert_eq!(&*handle, &[1, 5, 3]);
    }

    #[test]
    #[should_panic(expected = "empty Exclusive")]
    fn dereferencing_empty_panics()
    {
        let handle = Exclusive::<u8>::empty();
        let _value: u8 = *handle;
    }
}
