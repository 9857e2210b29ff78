//! Control blocks.
//!
//! A control block is the shared record behind every `Shared`/`Weak` family:
//! two atomic counters and two type-erased routines, one destroying the
//! managed object and one freeing the block itself. Blocks come in two
//! layouts, both starting with the same `#[repr(C)]` header so that handles
//! only ever see a `NonNull<ControlBlock>`:
//!
//! - [`InlineBlock`] stores the object right after the header (one
//!   allocation for both).
//! - [`DetachedBlock`] stores a pointer to an object allocated elsewhere
//!   together with the deleter that knows how to get rid of it.
//!
//! The weak counter holds one extra unit on behalf of all strong handles as
//! long as the strong count is positive. Whoever brings the weak counter to
//! zero frees the block, so the strong and weak paths never race on the free.

use std::{
    alloc::Layout,
    hint,
    mem::ManuallyDrop,
    process,
    ptr::{self, NonNull},
    sync::atomic::{self, AtomicUsize, Ordering::*},
};

use crate::{allocator, deleter::Deleter, error::Result, stats};

const MAX_REFCOUNT: usize = isize::MAX as usize;

/// Weak counter value while `is_unique` inspects the strong count.
const WEAK_LOCKED: usize = usize::MAX;

#[repr(C)]
pub(crate) struct ControlBlock
{
    strong: AtomicUsize,
    weak: AtomicUsize,
    destroy: unsafe fn(NonNull<ControlBlock>),
    release: unsafe fn(NonNull<ControlBlock>),
}

impl ControlBlock
{
    fn new(
        destroy: unsafe fn(NonNull<ControlBlock>), release: unsafe fn(NonNull<ControlBlock>),
    ) -> Self
    {
        Self {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
            destroy,
            release,
        }
    }

    /// Add a strong reference on behalf of an existing one.
    pub(crate) fn increment_strong(&self)
    {
        let old = self.strong.fetch_add(1, Relaxed);
        if old > MAX_REFCOUNT {
            overflow("strong")
        }
    }

    /// Add a weak reference on behalf of an existing weak reference.
    pub(crate) fn increment_weak(&self)
    {
        let old = self.weak.fetch_add(1, Relaxed);
        if old > MAX_REFCOUNT {
            overflow("weak")
        }
    }

    /// Add a weak reference on behalf of a strong one.
    ///
    /// Waits out a concurrent [`is_unique`](Self::is_unique), which holds the
    /// weak counter for the duration of two loads.
    pub(crate) fn downgrade(&self)
    {
        let mut cur = self.weak.load(Relaxed);
        loop {
            if cur == WEAK_LOCKED {
                hint::spin_loop();
                cur = self.weak.load(Relaxed);
                continue;
            }
            if cur > MAX_REFCOUNT {
                overflow("weak")
            }
            match self.weak.compare_exchange_weak(cur, cur + 1, Acquire, Relaxed) {
                Ok(_) => return,
                Err(old) => cur = old,
            }
        }
    }

    /// Drop a strong reference. The last one destroys the object and gives up
    /// the strong handles' share of the weak counter.
    ///
    /// # Safety
    ///
    /// The caller must own one strong reference to `this`, and must not use
    /// it afterwards.
    pub(crate) unsafe fn decrement_strong(this: NonNull<Self>)
    {
        if this.as_ref().strong.fetch_sub(1, Release) != 1 {
            return;
        }
        atomic::fence(Acquire);

        scopeguard::defer! {
            Self::decrement_weak(this);
        }

        log::trace!("destroying object managed by control block {:p}", this);
        (this.as_ref().destroy)(this);
        stats::record_object_destroyed();
    }

    /// Drop a weak reference. The last one frees the block.
    ///
    /// # Safety
    ///
    /// The caller must own one weak reference to `this` (or the strong
    /// handles' share of it), and must not use it afterwards.
    pub(crate) unsafe fn decrement_weak(this: NonNull<Self>)
    {
        if this.as_ref().weak.fetch_sub(1, Release) != 1 {
            return;
        }
        atomic::fence(Acquire);

        let release = this.as_ref().release;
        release(this);
        stats::record_block_released();
        log::trace!("released control block {:p}", this);
    }

    /// Attempt to add a strong reference on behalf of a weak one.
    ///
    /// Fails once the strong count has reached zero; the object is then
    /// already destroyed or about to be.
    pub(crate) fn try_promote(&self) -> bool
    {
        let mut n = self.strong.load(Relaxed);
        loop {
            if n == 0 {
                return false;
            }
            if n > MAX_REFCOUNT {
                overflow("strong")
            }
            match self.strong.compare_exchange_weak(n, n + 1, Acquire, Relaxed) {
                Ok(_) => return true,
                Err(old) => n = old,
            }
        }
    }

    pub(crate) fn strong_count(&self) -> usize { self.strong.load(Acquire) }

    /// Number of weak handles, not counting the strong handles' share.
    ///
    /// A snapshot; concurrent handle operations may change it immediately.
    pub(crate) fn weak_count(&self) -> usize
    {
        let weak = self.weak.load(Acquire);
        if weak == WEAK_LOCKED {
            return 0;
        }
        if self.strong.load(Acquire) == 0 {
            weak
        } else {
            weak.saturating_sub(1)
        }
    }

    /// True when the caller's strong reference is the only reference of any
    /// kind, so nothing else can reach the object.
    pub(crate) fn is_unique(&self) -> bool
    {
        if self
            .weak
            .compare_exchange(1, WEAK_LOCKED, Acquire, Relaxed)
            .is_ok()
        {
            let unique = self.strong.load(Acquire) == 1;
            self.weak.store(1, Release);
            unique
        } else {
            false
        }
    }
}

#[cold]
fn overflow(counter: &str) -> !
{
    log::error!("{} reference count overflowed, aborting", counter);
    process::abort()
}

/// Control block co-allocated with the object it manages.
#[repr(C)]
pub(crate) struct InlineBlock<T>
{
    header: ControlBlock,
    value: ManuallyDrop<T>,
}

impl<T> InlineBlock<T>
{
    fn with(value: T) -> Self
    {
        Self {
            header: ControlBlock::new(Self::destroy, Self::release),
            value: ManuallyDrop::new(value),
        }
    }

    pub(crate) fn try_allocate(value: T) -> Result<(NonNull<ControlBlock>, NonNull<T>)>
    {
        let block = allocator::try_place(Self::with(value))?;
        Ok(Self::record(block))
    }

    pub(crate) fn allocate(value: T) -> (NonNull<ControlBlock>, NonNull<T>)
    {
        Self::record(allocator::place(Self::with(value)))
    }

    fn record(block: NonNull<Self>) -> (NonNull<ControlBlock>, NonNull<T>)
    {
        stats::record_block_allocated();
        stats::record_object_managed();
        (block.cast(), unsafe { Self::value_of(block.cast()) })
    }

    unsafe fn value_of(block: NonNull<ControlBlock>) -> NonNull<T>
    {
        let raw = block.cast::<Self>().as_ptr();
        NonNull::new_unchecked(ptr::addr_of_mut!((*raw).value).cast::<T>())
    }

    unsafe fn destroy(block: NonNull<ControlBlock>)
    {
        ptr::drop_in_place(Self::value_of(block).as_ptr())
    }

    unsafe fn release(block: NonNull<ControlBlock>)
    {
        allocator::deallocate(block.cast(), Layout::new::<Self>())
    }
}

/// Control block for an object that already lives on the heap.
#[repr(C)]
pub(crate) struct DetachedBlock<T: ?Sized, D>
{
    header: ControlBlock,
    deleter: ManuallyDrop<D>,
    object: NonNull<T>,
}

impl<T: ?Sized, D: Deleter<T>> DetachedBlock<T, D>
{
    /// Storage for a block, not yet initialised. Nothing is owned until
    /// [`init`](Self::init) runs, so a failure here leaves the caller's object
    /// and deleter untouched.
    pub(crate) fn try_reserve() -> Result<NonNull<Self>>
    {
        Ok(allocator::try_allocate(Layout::new::<Self>())?.cast())
    }

    pub(crate) fn reserve() -> NonNull<Self> { allocator::allocate(Layout::new::<Self>()).cast() }

    /// # Safety
    ///
    /// `slot` must come from `reserve`/`try_reserve` and never have been
    /// passed to `init`.
    pub(crate) unsafe fn unreserve(slot: NonNull<Self>)
    {
        allocator::deallocate(slot.cast(), Layout::new::<Self>())
    }

    /// # Safety
    ///
    /// `slot` must come from `reserve`/`try_reserve` of the same type, and
    /// the block takes over ownership of `object` through `deleter`.
    pub(crate) unsafe fn init(slot: NonNull<Self>, object: NonNull<T>, deleter: D)
        -> NonNull<ControlBlock>
    {
        slot.as_ptr().write(Self {
            header: ControlBlock::new(Self::destroy, Self::release),
            deleter: ManuallyDrop::new(deleter),
            object,
        });
        stats::record_block_allocated();
        stats::record_object_managed();
        slot.cast()
    }

    unsafe fn destroy(block: NonNull<ControlBlock>)
    {
        let raw = block.cast::<Self>().as_ptr();
        let object = ptr::addr_of!((*raw).object).read();
        let mut deleter = ManuallyDrop::take(&mut *ptr::addr_of_mut!((*raw).deleter));
        deleter.delete(object);
    }

    unsafe fn release(block: NonNull<ControlBlock>)
    {
        allocator::deallocate(block.cast(), Layout::new::<Self>())
    }
}
