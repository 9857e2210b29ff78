use std::mem;

#[cfg(feature = "stats")]
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

#[cfg(feature = "stats")]
use lazy_static::lazy_static;

/// Process-wide handle lifecycle statistics, for diagnosing leaks such as
/// shared-ownership cycles.
///
/// All counters are cumulative since process start. With the `stats` feature
/// disabled nothing is recorded and every counter stays zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats
{
    /// Control blocks allocated by shared-handle factories.
    pub blocks_allocated: usize,

    /// Control blocks whose storage was returned to the allocator.
    pub blocks_released: usize,

    /// Objects placed under shared ownership.
    pub objects_managed: usize,

    /// Shared-owned objects destroyed after their last strong handle.
    pub objects_destroyed: usize,

    /// Objects an exclusive handle took ownership of.
    pub exclusive_acquired: usize,

    /// Objects an exclusive handle deleted, released to the caller, or passed
    /// on to a shared handle.
    pub exclusive_relinquished: usize,
}

impl Stats
{
    /// Control blocks currently allocated.
    pub fn live_blocks(&self) -> usize { self.blocks_allocated.saturating_sub(self.blocks_released) }

    /// Shared-owned objects not yet destroyed.
    pub fn live_objects(&self) -> usize { self.objects_managed.saturating_sub(self.objects_destroyed) }

    /// Control blocks kept alive only by weak handles.
    pub fn expired_blocks(&self) -> usize { self.live_blocks().saturating_sub(self.live_objects()) }

    /// Objects currently owned by exclusive handles.
    pub fn live_exclusive(&self) -> usize
    {
        self.exclusive_acquired.saturating_sub(self.exclusive_relinquished)
    }

    /// Approximate memory taken by live control block headers.
    ///
    /// Detached blocks also store an object pointer and a deleter, which is
    /// not accounted for.
    pub fn overhead_size(&self) -> usize
    {
        self.live_blocks() * mem::size_of::<crate::block::ControlBlock>()
    }
}

/// Snapshot of the lifecycle counters.
///
/// Counters are read one at a time, so a snapshot taken while other threads
/// create or drop handles may be slightly inconsistent, down to showing more
/// releases than allocations. The derived `live_*` figures clamp at zero.
pub fn stats() -> Stats { ledger::snapshot() }

pub(crate) use ledger::*;

#[cfg(feature = "stats")]
mod ledger
{
    use super::*;

    struct Ledger
    {
        blocks_allocated: AtomicUsize,
        blocks_released: AtomicUsize,
        objects_managed: AtomicUsize,
        objects_destroyed: AtomicUsize,
        exclusive_acquired: AtomicUsize,
        exclusive_relinquished: AtomicUsize,
    }

    lazy_static! {
        static ref LEDGER: Ledger = Ledger {
            blocks_allocated: AtomicUsize::new(0),
            blocks_released: AtomicUsize::new(0),
            objects_managed: AtomicUsize::new(0),
            objects_destroyed: AtomicUsize::new(0),
            exclusive_acquired: AtomicUsize::new(0),
            exclusive_relinquished: AtomicUsize::new(0),
        };
    }

    pub(crate) fn snapshot() -> Stats
    {
        Stats {
            blocks_allocated: LEDGER.blocks_allocated.load(Relaxed),
            blocks_released: LEDGER.blocks_released.load(Relaxed),
            objects_managed: LEDGER.objects_managed.load(Relaxed),
            objects_destroyed: LEDGER.objects_destroyed.load(Relaxed),
            exclusive_acquired: LEDGER.exclusive_acquired.load(Relaxed),
            exclusive_relinquished: LEDGER.exclusive_relinquished.load(Relaxed),
        }
    }

    pub(crate) fn record_block_allocated() { LEDGER.blocks_allocated.fetch_add(1, Relaxed); }
    pub(crate) fn record_block_released() { LEDGER.blocks_released.fetch_add(1, Relaxed); }
    pub(crate) fn record_object_managed() { LEDGER.objects_managed.fetch_add(1, Relaxed); }
    pub(crate) fn record_object_destroyed() { LEDGER.objects_destroyed.fetch_add(1, Relaxed); }
    pub(crate) fn record_exclusive_acquired() { LEDGER.exclusive_acquired.fetch_add(1, Relaxed); }
    pub(crate) fn record_exclusive_relinquished()
    {
        LEDGER.exclusive_relinquished.fetch_add(1, Relaxed);
    }
}

#[cfg(not(feature = "stats"))]
mod ledger
{
    use super::Stats;

    pub(crate) fn snapshot() -> Stats { Stats::default() }

    pub(crate) fn record_block_allocated() {}
    pub(crate) fn record_block_released() {}
    pub(crate) fn record_object_managed() {}
    pub(crate) fn record_object_destroyed() {}
    pub(crate) fn record_exclusive_acquired() {}
    pub(crate) fn record_exclusive_relinquished() {}
}
