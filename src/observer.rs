use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ptr::NonNull,
};

/// Address of an object this handle neither owns nor keeps alive.
///
/// Meant as the parameter type for code that needs to look at an object it
/// will not outlive, in place of taking a [`Shared`](crate::Shared) just to
/// observe. Comparison and hashing use the address only. Dereferencing is
/// unchecked: whether the object still exists is the caller's business.
#[repr(transparent)]
pub struct Observer<T: ?Sized>
{
    ptr: Option<NonNull<T>>,
}

unsafe impl<T: ?Sized + Sync> Send for Observer<T> {}
unsafe impl<T: ?Sized + Sync> Sync for Observer<T> {}

impl<T: ?Sized> Observer<T>
{
    /// An observer of nothing.
    pub const fn null() -> Self { Self { ptr: None } }

    pub fn is_null(self) -> bool { self.ptr.is_none() }

    pub fn as_ptr(self) -> Option<NonNull<T>> { self.ptr }

    /// Address of the observed object, `0` for a null observer.
    pub fn addr(self) -> usize { self.ptr.map_or(0, |p| p.as_ptr() as *const () as usize) }

    /// Reference the observed object.
    ///
    /// # Safety
    ///
    /// The observer must not be null, the object must still be alive for
    /// `'a`, and nothing may mutate it during `'a`.
    pub unsafe fn as_ref<'a>(self) -> &'a T { &*self.ptr.unwrap_unchecked().as_ptr() }

    /// Mutably reference the observed object.
    ///
    /// # Safety
    ///
    /// As [`as_ref`](Self::as_ref), and no other reference to the object may
    /// be used during `'a`.
    pub unsafe fn as_mut<'a>(self) -> &'a mut T { &mut *self.ptr.unwrap_unchecked().as_ptr() }
}

impl<T: ?Sized> Clone for Observer<T>
{
    fn clone(&self) -> Self { *self }
}

impl<T: ?Sized> Copy for Observer<T> {}

impl<T: ?Sized> Default for Observer<T>
{
    fn default() -> Self { Self::null() }
}

impl<T: ?Sized> From<NonNull<T>> for Observer<T>
{
    fn from(ptr: NonNull<T>) -> Self { Self { ptr: Some(ptr) } }
}

impl<T: ?Sized> From<&T> for Observer<T>
{
    fn from(it: &T) -> Self { Self::from(NonNull::from(it)) }
}

impl<T: ?Sized> From<&mut T> for Observer<T>
{
    fn from(it: &mut T) -> Self { Self::from(NonNull::from(it)) }
}

impl<T: ?Sized> PartialEq for Observer<T>
{
    fn eq(&self, other: &Self) -> bool { self.addr() == other.addr() }
}

impl<T: ?Sized> Eq for Observer<T> {}

impl<T: ?Sized> PartialOrd for Observer<T>
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl<T: ?Sized> Ord for Observer<T>
{
    fn cmp(&self, other: &Self) -> Ordering { self.addr().cmp(&other.addr()) }
}

impl<T: ?Sized> Hash for Observer<T>
{
    fn hash<H: Hasher>(&self, state: &mut H) { self.addr().hash(state) }
}

impl<T: ?Sized> fmt::Debug for Observer<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_tuple("Observer")
            .field(&(self.addr() as *const ()))
            .finish()
    }
}

impl<T: ?Sized> fmt::Pointer for Observer<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Pointer::fmt(&(self.addr() as *const ()), f)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn compares_by_address()
    {
        let values = [7, 7];
        let a = Observer::from(&values[0]);
        let b = Observer::from(&values[1]);

        assert_ne!(a, b);
        assert_eq!(a, Observer::from(&values[0]));
        assert!(a < b);
        assert_eq!(unsafe { a.as_ref() }, unsafe { b.as_ref() });

        let set: HashSet<_> = [a, b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn null_observers()
    {
        let nothing = Observer::<str>::null();
        assert!(nothing.is_null());
        assert_eq!(nothing.addr(), 0);
        assert_eq!(nothing, Observer::default());
        assert!(!Observer::from("text").is_null());
    }

    #[test]
    fn mutation_through_observer()
    {
        fn bump(counter: Observer<u32>) { unsafe { *counter.as_mut() += 1 } }

        let mut counter = 1u32;
        bump(Observer::from(&mut counter));
        bump(Observer::from(&mut counter));
        assert_eq!(counter, 3);
    }
}
