use std::{
    any::Any,
    fmt,
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::NonNull,
};

use crate::{
    block::{ControlBlock, DetachedBlock, InlineBlock},
    deleter::{DefaultDelete, Deleter},
    error::Result,
    exclusive::Exclusive,
    observer::Observer,
    self_shared::SelfShared,
    weak::Weak,
};

/// A control block paired with the address the handle views through it.
///
/// The address usually is the managed object, but after [`Shared::map`] or a
/// cast it may be a part of it or the same object under another type.
///
/// A mapped view may point outside the managed object altogether (into
/// another `Shared` it holds, or at a static), so uniqueness of the block
/// says nothing about who else can reach the viewed address.
pub(crate) struct Parts<T: ?Sized>
{
    pub(crate) block: NonNull<ControlBlock>,
    pub(crate) ptr: NonNull<T>,
    mapped: bool,
}

impl<T: ?Sized> Clone for Parts<T>
{
    fn clone(&self) -> Self { *self }
}

impl<T: ?Sized> Copy for Parts<T> {}

impl<T: ?Sized> Parts<T>
{
    /// The view of a freshly managed object.
    fn whole(block: NonNull<ControlBlock>, ptr: NonNull<T>) -> Self
    {
        Self {
            block,
            ptr,
            mapped: false,
        }
    }

    pub(crate) fn block(&self) -> &ControlBlock { unsafe { self.block.as_ref() } }

    /// Same address under another type; a mapped view stays mapped.
    fn with_ptr<U: ?Sized>(self, ptr: NonNull<U>) -> Parts<U>
    {
        Parts {
            block: self.block,
            ptr,
            mapped: self.mapped,
        }
    }

    fn with_view<U: ?Sized>(self, ptr: NonNull<U>) -> Parts<U>
    {
        Parts {
            block: self.block,
            ptr,
            mapped: true,
        }
    }

    /// Whether holding the only reference to the block also means holding
    /// the only way to reach the viewed address.
    fn exclusive(&self) -> bool { !self.mapped && self.block().is_unique() }
}

/// One of any number of co-owners of a heap object.
///
/// Cloning adds a strong reference, dropping removes one; the object is
/// destroyed with the last strong reference and its control block is freed
/// once the last [`Weak`] is gone too. Counter updates are atomic, access to
/// the object is not: `Shared<T>` only hands out `&T`, so mutation across
/// owners needs a lock or other interior mutability inside `T`.
///
/// A handle may be empty (see [`Shared::empty`], [`Weak::lock`],
/// [`Shared::downcast`]). Dereferencing an empty handle is a precondition
/// violation and panics; [`Shared::get`] is the checked alternative.
///
/// Two handles owning each other through `Shared` are never destroyed. Make
/// one edge of such a cycle a [`Weak`].
///
/// Like `Arc`, the handle's own operations are associated functions
/// (`Shared::strong_count(&s)`) so they never shadow methods of `T`.
pub struct Shared<T: ?Sized>
{
    inner: Option<Parts<T>>,
    _owns: PhantomData<T>,
}

unsafe impl<T: ?Sized + Send + Sync> Send for Shared<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Shared<T> {}

impl<T> Shared<T>
{
    /// Allocate `value` together with its control block.
    ///
    /// Aborts through `handle_alloc_error` if the allocator fails; see
    /// [`try_new`](Self::try_new).
    pub fn new(value: T) -> Self
    {
        let (block, ptr) = InlineBlock::allocate(value);
        Self::from_parts(Parts::whole(block, ptr))
    }

    /// Allocate `value` together with its control block, reporting
    /// allocation failure. On failure `value` is dropped.
    pub fn try_new(value: T) -> Result<Self>
    {
        let (block, ptr) = InlineBlock::try_allocate(value)?;
        Ok(Self::from_parts(Parts::whole(block, ptr)))
    }
}

impl<T: SelfShared> Shared<T>
{
    /// Like [`new`](Self::new), then records the new owner in the object's
    /// [`SelfSlot`](crate::SelfSlot).
    pub fn new_self_shared(value: T) -> Self
    {
        let this = Self::new(value);
        Self::enable_self_share(&this);
        this
    }

    pub fn try_new_self_shared(value: T) -> Result<Self>
    {
        let this = Self::try_new(value)?;
        Self::enable_self_share(&this);
        Ok(this)
    }
}

impl<T: ?Sized + SelfShared> Shared<T>
{
    /// Let the object hand out shared handles to itself through
    /// [`SelfShared::shared_from_self`].
    ///
    /// Needed after [`from_raw`](Self::from_raw) or a conversion from
    /// [`Exclusive`]. Does nothing if the handle is empty or the object
    /// already knows a live owner.
    pub fn enable_self_share(this: &Self)
    {
        if let Some(it) = Self::get(this) {
            it.self_slot().install(this);
        }
    }
}

impl<T: ?Sized> Shared<T>
{
    /// A handle that owns nothing.
    pub const fn empty() -> Self
    {
        Self {
            inner: None,
            _owns: PhantomData,
        }
    }

    /// The caller hands over one strong reference counted in `parts`.
    pub(crate) fn from_parts(parts: Parts<T>) -> Self
    {
        Self {
            inner: Some(parts),
            _owns: PhantomData,
        }
    }

    /// Take shared ownership of an object allocated the way `Box` allocates.
    ///
    /// A null `ptr` gives an empty handle.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `Box::into_raw` (or an equivalent
    /// allocation), and nothing else may own it.
    pub unsafe fn from_raw(ptr: *mut T) -> Self { Self::from_raw_with(ptr, DefaultDelete) }

    /// Fallible [`from_raw`](Self::from_raw). If the control block cannot be
    /// allocated the object is destroyed before the error is returned.
    ///
    /// # Safety
    ///
    /// As [`from_raw`](Self::from_raw).
    pub unsafe fn try_from_raw(ptr: *mut T) -> Result<Self>
    {
        Self::try_from_raw_with(ptr, DefaultDelete)
    }

    /// Take shared ownership of `ptr`, to be destroyed with `deleter` once
    /// the last strong handle is gone.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a live object that `deleter` may
    /// destroy, and nothing else may own it.
    pub unsafe fn from_raw_with<D>(ptr: *mut T, deleter: D) -> Self
    where
        D: Deleter<T> + Send + 'static,
    {
        match NonNull::new(ptr) {
            Some(object) => {
                let block = DetachedBlock::init(DetachedBlock::<T, D>::reserve(), object, deleter);
                Self::from_parts(Parts::whole(block, object))
            }
            None => Self::empty(),
        }
    }

    /// Fallible [`from_raw_with`](Self::from_raw_with). If the control block
    /// cannot be allocated, `deleter` destroys the object before the error is
    /// returned.
    ///
    /// # Safety
    ///
    /// As [`from_raw_with`](Self::from_raw_with).
    pub unsafe fn try_from_raw_with<D>(ptr: *mut T, mut deleter: D) -> Result<Self>
    where
        D: Deleter<T> + Send + 'static,
    {
        let object = match NonNull::new(ptr) {
            Some(object) => object,
            None => return Ok(Self::empty()),
        };
        match DetachedBlock::<T, D>::try_reserve() {
            Ok(slot) => {
                let block = DetachedBlock::init(slot, object, deleter);
                Ok(Self::from_parts(Parts::whole(block, object)))
            }
            Err(e) => {
                deleter.delete(object);
                Err(e)
            }
        }
    }

    /// Move the object owned by `exclusive` under shared ownership.
    ///
    /// If the control block cannot be allocated, `exclusive` is handed back
    /// still owning its object.
    pub fn try_from_exclusive<D>(exclusive: Exclusive<T, D>) -> Result<Self, Exclusive<T, D>>
    where
        D: Deleter<T> + Send + 'static,
    {
        if Exclusive::is_empty(&exclusive) {
            return Ok(Self::empty());
        }
        let slot = match DetachedBlock::<T, D>::try_reserve() {
            Ok(slot) => slot,
            Err(_) => return Err(exclusive),
        };
        Ok(unsafe { Self::adopt_exclusive(slot, exclusive) })
    }

    unsafe fn adopt_exclusive<D>(slot: NonNull<DetachedBlock<T, D>>, exclusive: Exclusive<T, D>)
        -> Self
    where
        D: Deleter<T> + Send + 'static,
    {
        match Exclusive::into_parts(exclusive) {
            (Some(object), deleter) => {
                let block = DetachedBlock::init(slot, object, deleter);
                Self::from_parts(Parts::whole(block, object))
            }
            (None, _) => {
                DetachedBlock::<T, D>::unreserve(slot);
                Self::empty()
            }
        }
    }

    pub fn is_empty(this: &Self) -> bool { this.inner.is_none() }

    pub fn get(this: &Self) -> Option<&T> { this.inner.map(|p| unsafe { &*p.ptr.as_ptr() }) }

    /// Reference the object without checking that there is one.
    ///
    /// # Safety
    ///
    /// The handle must not be empty.
    pub unsafe fn get_unchecked(this: &Self) -> &T
    {
        &*this.inner.unwrap_unchecked().ptr.as_ptr()
    }

    /// Mutable access, granted only while no other `Shared` or [`Weak`]
    /// shares the control block. Never granted through a handle produced by
    /// [`map`](Self::map), since its view may be reachable from elsewhere.
    pub fn get_mut(this: &mut Self) -> Option<&mut T>
    {
        match this.inner {
            Some(p) if p.exclusive() => Some(unsafe { &mut *p.ptr.as_ptr() }),
            _ => None,
        }
    }

    /// True when this is the only handle of any kind sharing the block and
    /// the handle views the managed object itself rather than a mapped view.
    pub fn is_unique(this: &Self) -> bool { this.inner.map_or(false, |p| p.exclusive()) }

    /// Number of strong handles sharing the block, `0` for an empty handle.
    pub fn strong_count(this: &Self) -> usize { this.inner.map_or(0, |p| p.block().strong_count()) }

    /// Number of weak handles sharing the block, `0` for an empty handle.
    pub fn weak_count(this: &Self) -> usize { this.inner.map_or(0, |p| p.block().weak_count()) }

    /// Address the handle views, or `None` when empty.
    pub fn as_ptr(this: &Self) -> Option<NonNull<T>> { this.inner.map(|p| p.ptr) }

    /// True when both handles view the same address (or both are empty).
    pub fn ptr_eq(this: &Self, other: &Self) -> bool
    {
        Self::observe(this) == Self::observe(other)
    }

    /// True when both handles share one control block (or both are empty),
    /// even if they view different parts of the object.
    pub fn owner_eq<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool
    {
        this.inner.map(|p| p.block) == other.inner.map(|p| p.block)
    }

    pub fn observe(this: &Self) -> Observer<T>
    {
        match this.inner {
            Some(p) => Observer::from(p.ptr),
            None => Observer::null(),
        }
    }

    /// A weak handle to the same object. Empty for an empty handle.
    pub fn downgrade(this: &Self) -> Weak<T>
    {
        match this.inner {
            Some(p) => {
                p.block().downgrade();
                unsafe { Weak::from_parts(p) }
            }
            None => Weak::new(),
        }
    }

    /// Move the ownership out, leaving this handle empty. No counter changes.
    pub fn take(this: &mut Self) -> Self { mem::take(this) }

    /// Drop this handle's strong reference now and leave it empty.
    pub fn reset(this: &mut Self) { drop(Self::take(this)) }

    /// A handle sharing this one's control block while viewing a part of the
    /// object, or the object through another type:
    ///
    /// ```
    /// use std::fmt::Display;
    /// use smartref::Shared;
    ///
    /// let pair = Shared::new((String::from("left"), 2));
    /// let left: Shared<String> = Shared::map(&pair, |p| &p.0);
    /// let shown = Shared::map::<dyn Display, _>(&left, |s| s);
    /// drop(pair);
    /// drop(left);
    /// assert_eq!(shown.to_string(), "left");
    /// ```
    ///
    /// The result keeps the whole object alive and is destroyed wherever its
    /// last handle is dropped, so `T` must be thread-safe even if `U` alone
    /// would be:
    ///
    /// ```compile_fail
    /// use std::rc::Rc;
    /// use smartref::Shared;
    ///
    /// let owner = Shared::new((Rc::new(()), 3u32));
    /// let number = Shared::map(&owner, |o| &o.1);
    /// ```
    ///
    /// A mapped handle never grants [`get_mut`](Self::get_mut). Empty in,
    /// empty out.
    pub fn map<U: ?Sized, F>(this: &Self, f: F) -> Shared<U>
    where
        T: Send + Sync + 'static,
        F: for<'a> FnOnce(&'a T) -> &'a U,
    {
        match this.inner {
            Some(p) => {
                let view = NonNull::from(f(unsafe { &*p.ptr.as_ptr() }));
                p.block().increment_strong();
                Shared::from_parts(p.with_view(view))
            }
            None => Shared::empty(),
        }
    }

    /// Reinterpret the viewed address as a `U`, sharing the control block.
    ///
    /// # Safety
    ///
    /// The viewed object must be valid as a `U` for as long as the result or
    /// any handle derived from it is used. If `U` is `Send + Sync` the
    /// managed object must be safe to destroy on any thread.
    pub unsafe fn cast_unchecked<U>(this: &Self) -> Shared<U>
    {
        match this.inner {
            Some(p) => {
                p.block().increment_strong();
                Shared::from_parts(p.with_ptr(p.ptr.cast::<U>()))
            }
            None => Shared::empty(),
        }
    }
}

impl<T: Any + Send + Sync> Shared<T>
{
    /// Erase the type, keeping the ability to [`downcast`](Shared::downcast).
    pub fn into_any(this: Self) -> Shared<dyn Any + Send + Sync>
    {
        let this = mem::ManuallyDrop::new(this);
        match this.inner {
            Some(p) => {
                let erased: NonNull<dyn Any + Send + Sync> = p.ptr;
                Shared::from_parts(p.with_ptr(erased))
            }
            None => Shared::empty(),
        }
    }
}

macro_rules! downcast {
    ($($any:ty),+) => {$(
        impl Shared<$any>
        {
            /// A handle to the same object as a `U`, or an empty handle if
            /// the object is not a `U`.
            pub fn downcast<U: Any>(this: &Self) -> Shared<U>
            {
                match this.inner {
                    Some(p) if unsafe { p.ptr.as_ref() }.is::<U>() => {
                        p.block().increment_strong();
                        Shared::from_parts(p.with_ptr(p.ptr.cast::<U>()))
                    }
                    _ => Shared::empty(),
                }
            }
        }
    )+};
}

downcast!(dyn Any, dyn Any + Send, dyn Any + Send + Sync);

impl<T: ?Sized> Clone for Shared<T>
{
    fn clone(&self) -> Self
    {
        if let Some(p) = self.inner {
            p.block().increment_strong();
        }
        Self {
            inner: self.inner,
            _owns: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for Shared<T>
{
    fn drop(&mut self)
    {
        if let Some(p) = self.inner.take() {
            unsafe { ControlBlock::decrement_strong(p.block) }
        }
    }
}

impl<T: ?Sized> Default for Shared<T>
{
    fn default() -> Self { Self::empty() }
}

impl<T: ?Sized> Deref for Shared<T>
{
    type Target = T;

    fn deref(&self) -> &T
    {
        match Self::get(self) {
            Some(it) => it,
            None => panic!("dereferenced an empty Shared"),
        }
    }
}

impl<T> From<T> for Shared<T>
{
    fn from(value: T) -> Self { Self::new(value) }
}

impl<T: ?Sized> From<Box<T>> for Shared<T>
{
    fn from(it: Box<T>) -> Self { unsafe { Self::from_raw(Box::into_raw(it)) } }
}

/// Aborts through `handle_alloc_error` if the control block cannot be
/// allocated; see [`Shared::try_from_exclusive`].
impl<T: ?Sized, D: Deleter<T> + Send + 'static> From<Exclusive<T, D>> for Shared<T>
{
    fn from(exclusive: Exclusive<T, D>) -> Self
    {
        if Exclusive::is_empty(&exclusive) {
            return Self::empty();
        }
        unsafe { Self::adopt_exclusive(DetachedBlock::<T, D>::reserve(), exclusive) }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Shared").field("value", &Self::get(self)).finish()
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Pointer::fmt(&Self::observe(self), f)
    }
}
