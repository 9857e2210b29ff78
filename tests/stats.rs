#![cfg(feature = "stats")]

use parking_lot::Mutex;
use serial_test::serial;
use smartref::{stats, Exclusive, Shared, Stats, Weak};

/// Counter movement since `before`.
fn since(before: Stats) -> Stats
{
    let now = stats();
    Stats {
        blocks_allocated: now.blocks_allocated - before.blocks_allocated,
        blocks_released: now.blocks_released - before.blocks_released,
        objects_managed: now.objects_managed - before.objects_managed,
        objects_destroyed: now.objects_destroyed - before.objects_destroyed,
        exclusive_acquired: now.exclusive_acquired - before.exclusive_acquired,
        exclusive_relinquished: now.exclusive_relinquished - before.exclusive_relinquished,
    }
}

#[test]
#[serial]
fn shared_lifecycle_is_counted()
{
    let before = stats();

    let first = Shared::new(String::from("counted"));
    let second = first.clone();
    let weak = Shared::downgrade(&first);

    let during = since(before);
    assert_eq!(during.blocks_allocated, 1);
    assert_eq!(during.live_objects(), 1);
    assert_eq!(during.live_blocks(), 1);

    drop(first);
    drop(second);
    let expired = since(before);
    assert_eq!(expired.objects_destroyed, 1);
    assert_eq!(expired.expired_blocks(), 1);
    assert_eq!(expired.blocks_released, 0);

    drop(weak);
    let after = since(before);
    assert_eq!(after.live_blocks(), 0);
    assert_eq!(after.overhead_size(), 0);
}

#[test]
#[serial]
fn exclusive_handoffs_are_counted()
{
    let before = stats();

    let mut kept = Exclusive::new(1u32);
    let moved = Exclusive::take(&mut kept);
    assert_eq!(since(before).live_exclusive(), 1);

    let shared: Shared<u32> = Shared::from(moved);
    let during = since(before);
    assert_eq!(during.live_exclusive(), 0);
    assert_eq!(during.exclusive_relinquished, 1);
    assert_eq!(during.live_objects(), 1);

    drop(shared);
    drop(kept);
    let after = since(before);
    assert_eq!(after.live_objects(), 0);
    assert_eq!(after.live_blocks(), 0);
    assert_eq!(after.exclusive_acquired, 1);
}

struct Node
{
    next: Mutex<Option<Shared<Node>>>,
    back: Mutex<Weak<Node>>,
}

fn node() -> Shared<Node>
{
    Shared::new(Node {
        next: Mutex::new(None),
        back: Mutex::new(Weak::new()),
    })
}

#[test]
#[serial]
fn cycles_show_up_as_live_objects()
{
    let before = stats();

    let a = node();
    let b = node();
    *a.next.lock() = Some(b.clone());
    *b.next.lock() = Some(a.clone());
    let watch = Shared::downgrade(&a);
    drop(a);
    drop(b);
    assert_eq!(since(before).live_objects(), 2);

    if let Some(a) = watch.upgrade() {
        a.next.lock().take();
    }
    assert_eq!(since(before).live_objects(), 0);
    drop(watch);
    assert_eq!(since(before).live_blocks(), 0);

    let a = node();
    let b = node();
    *a.next.lock() = Some(b.clone());
    *b.back.lock() = Shared::downgrade(&a);
    drop(b);
    drop(a);
    assert_eq!(since(before).live_objects(), 0);
    assert_eq!(since(before).live_blocks(), 0);
}
