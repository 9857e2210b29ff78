use std::{fmt, mem};

use crate::{
    block::ControlBlock,
    shared::{Parts, Shared},
};

/// Non-owning handle to an object managed by [`Shared`] handles.
///
/// A weak handle keeps the control block alive but not the object. It can
/// tell whether the object has been destroyed ([`expired`](Self::expired))
/// and, while it has not, produce a new strong handle ([`lock`](Self::lock)).
///
/// Use it for back edges and caches, anywhere a `Shared` would create an
/// ownership cycle.
pub struct Weak<T: ?Sized>
{
    inner: Option<Parts<T>>,
}

unsafe impl<T: ?Sized + Send + Sync> Send for Weak<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Weak<T> {}

impl<T: ?Sized> Weak<T>
{
    /// A weak handle to nothing. Always expired.
    pub const fn new() -> Self { Self { inner: None } }

    /// The caller hands over one weak reference counted in `parts`.
    pub(crate) unsafe fn from_parts(parts: Parts<T>) -> Self { Self { inner: Some(parts) } }

    /// A strong handle to the object, or an empty one if the object has
    /// already been destroyed.
    ///
    /// Promotion is atomic with respect to the last strong handle being
    /// dropped on another thread: the result either keeps the object alive
    /// or is empty.
    pub fn lock(&self) -> Shared<T> { self.upgrade().unwrap_or_default() }

    /// Like [`lock`](Self::lock), with `None` in place of an empty handle.
    pub fn upgrade(&self) -> Option<Shared<T>>
    {
        let p = self.inner?;
        if p.block().try_promote() {
            Some(Shared::from_parts(p))
        } else {
            None
        }
    }

    /// True when no strong handle remains. A snapshot; it may turn true
    /// right after returning false.
    pub fn expired(&self) -> bool { self.strong_count() == 0 }

    pub fn strong_count(&self) -> usize { self.inner.map_or(0, |p| p.block().strong_count()) }

    pub fn weak_count(&self) -> usize { self.inner.map_or(0, |p| p.block().weak_count()) }

    /// True when both handles share one control block (or both are empty).
    pub fn ptr_eq(&self, other: &Self) -> bool
    {
        self.inner.map(|p| p.block) == other.inner.map(|p| p.block)
    }

    /// Move the weak reference out, leaving this handle empty.
    pub fn take(&mut self) -> Self { mem::take(self) }

    /// Drop this handle's weak reference now and leave it empty.
    pub fn reset(&mut self) { drop(self.take()) }
}

impl<T: ?Sized> Clone for Weak<T>
{
    fn clone(&self) -> Self
    {
        if let Some(p) = self.inner {
            p.block().increment_weak();
        }
        Self { inner: self.inner }
    }
}

impl<T: ?Sized> Drop for Weak<T>
{
    fn drop(&mut self)
    {
        if let Some(p) = self.inner.take() {
            unsafe { ControlBlock::decrement_weak(p.block) }
        }
    }
}

impl<T: ?Sized> Default for Weak<T>
{
    fn default() -> Self { Self::new() }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T>
{
    fn from(shared: &Shared<T>) -> Self { Shared::downgrade(shared) }
}

impl<T: ?Sized> fmt::Debug for Weak<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Weak").field("expired", &self.expired()).finish()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn lock_follows_object_lifetime()
    {
        let strong = Shared::new(String::from("alive"));
        let weak = Shared::downgrade(&strong);

        assert!(!weak.expired());
        assert_eq!(&*weak.lock(), "alive");
        assert_eq!(weak.strong_count(), 1);

        drop(strong);
        assert!(weak.expired());
        assert!(Shared::is_empty(&weak.lock()));
        assert!(weak.upgrade().is_none());
        assert_eq!(weak.weak_count(), 1);
    }

    #[test]
    fn weak_count_starts_at_zero()
    {
        let strong = Shared::new(0u8);
        assert_eq!(Shared::weak_count(&strong), 0);

        let first = Weak::from(&strong);
        let second = first.clone();
        assert_eq!(Shared::weak_count(&strong), 2);
        assert!(first.ptr_eq(&second));

        drop(first);
        assert_eq!(second.weak_count(), 1);
        drop(strong);
        assert_eq!(second.weak_count(), 1);
        assert_eq!(second.strong_count(), 0);
    }

    #[test]
    fn debug_shows_expiry()
    {
        let strong = Shared::new(3u16);
        let weak = Shared::downgrade(&strong);
        assert_eq!(format!("{:?}", weak), "Weak { expired: false }");
        drop(strong);
        assert_eq!(format!("{:?}", weak), "Weak { expired: true }");
    }

    #[test]
    fn empty_weak_handles()
    {
        let mut weak = Weak::<str>::new();
        assert!(weak.expired());
        assert!(weak.upgrade().is_none());
        assert_eq!(weak.weak_count(), 0);
        assert!(weak.ptr_eq(&Weak::default()));

        let strong = Shared::new(1i64);
        let mut watching = Shared::downgrade(&strong);
        let moved = watching.take();
        assert!(watching.expired());
        assert_eq!(*moved.lock(), 1);

        weak.reset();
        watching.reset();
        assert_eq!(Shared::weak_count(&strong), 1);
    }
}
