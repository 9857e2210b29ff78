use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::Cell,
    ptr::{self, NonNull},
    sync::{
        atomic::{AtomicUsize, Ordering::SeqCst},
        Arc,
    },
};

use smartref::{Error, Exclusive, Shared};

/// System allocator that can be told to refuse the next allocation made by
/// the current thread.
struct Refusing;

thread_local! {
    static REFUSE_NEXT: Cell<bool> = const { Cell::new(false) };
}

unsafe impl GlobalAlloc for Refusing
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8
    {
        if REFUSE_NEXT.try_with(|r| r.replace(false)).unwrap_or(false) {
            ptr::null_mut()
        } else {
            System.alloc(layout)
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) { System.dealloc(ptr, layout) }
}

#[global_allocator]
static ALLOCATOR: Refusing = Refusing;

fn refuse_next_allocation() { REFUSE_NEXT.with(|r| r.set(true)) }

struct Counted(Arc<AtomicUsize>);

impl Drop for Counted
{
    fn drop(&mut self) { self.0.fetch_add(1, SeqCst); }
}

#[test]
fn failed_conversion_hands_the_exclusive_back()
{
    let drops = Arc::new(AtomicUsize::new(0));
    let exclusive = Exclusive::new(Counted(drops.clone()));
    let address = Exclusive::observe(&exclusive);

    refuse_next_allocation();
    let back = match Shared::try_from_exclusive(exclusive) {
        Ok(_) => panic!("control block allocation was not refused"),
        Err(back) => back,
    };

    assert!(!Exclusive::is_empty(&back));
    assert_eq!(Exclusive::observe(&back), address);
    assert_eq!(drops.load(SeqCst), 0);

    drop(back);
    assert_eq!(drops.load(SeqCst), 1);
}

#[test]
fn failed_raw_adoption_deletes_the_object_once()
{
    let drops = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let raw = Box::into_raw(Box::new(Counted(drops.clone())));

    refuse_next_allocation();
    let result = unsafe {
        Shared::try_from_raw_with(raw, move |p: NonNull<Counted>| {
            counter.fetch_add(1, SeqCst);
            drop(Box::from_raw(p.as_ptr()));
        })
    };

    assert!(matches!(result, Err(Error::AllocFailed { .. })));
    assert_eq!(calls.load(SeqCst), 1);
    assert_eq!(drops.load(SeqCst), 1);
}

#[test]
fn failed_factories_drop_the_value()
{
    let drops = Arc::new(AtomicUsize::new(0));

    refuse_next_allocation();
    assert!(Shared::try_new(Counted(drops.clone())).is_err());
    assert_eq!(drops.load(SeqCst), 1);

    refuse_next_allocation();
    assert!(Exclusive::try_new(Counted(drops.clone())).is_err());
    assert_eq!(drops.load(SeqCst), 2);

    let mut kept = Exclusive::new(Counted(drops.clone()));
    refuse_next_allocation();
    assert!(Exclusive::replace(&mut kept, Counted(drops.clone())).is_err());
    assert_eq!(drops.load(SeqCst), 3);
    assert!(!Exclusive::is_empty(&kept));

    drop(kept);
    assert_eq!(drops.load(SeqCst), 4);
}
