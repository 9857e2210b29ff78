//! Ownership handles for heap objects, built around an atomic control block.
//!
//! The crate provides four handle types that together cover the usual ways
//! code holds on to a heap object:
//!
//! - [`Exclusive`] is the sole owner of an object, with a pluggable
//!   [`Deleter`] and an empty state. Ownership moves, it is never copied.
//! - [`Shared`] is one of many co-owners. Strong and weak counts live in a
//!   control block, either allocated together with the object
//!   ([`Shared::new`]) or separately for an object that is already on the
//!   heap ([`Shared::from_raw`], `From<Exclusive>`).
//! - [`Weak`] observes a shared object without keeping it alive and can be
//!   promoted back to a [`Shared`] while the object exists.
//! - [`Observer`] is a bare, non-owning address. It never affects lifetimes
//!   and dereferencing it is on the caller.
//!
//! Objects that need to hand out shared handles to themselves embed a
//! [`SelfSlot`] and implement [`SelfShared`].
//!
//! Counter updates are atomic, so handles can be cloned and dropped from
//! many threads at once. Access to the object is not synchronised: shared
//! handles only hand out `&T`.
//!
//! # Cycles
//!
//! Objects that own each other through [`Shared`] handles keep each other
//! alive forever:
//!
//! ```
//! use parking_lot::Mutex;
//! use smartref::{Shared, Weak};
//!
//! struct Parent
//! {
//!     child: Mutex<Option<Shared<Child>>>,
//! }
//!
//! struct Child
//! {
//!     parent: Weak<Parent>,
//! }
//!
//! let parent = Shared::new(Parent { child: Mutex::new(None) });
//! let child = Shared::new(Child { parent: Shared::downgrade(&parent) });
//! *parent.child.lock() = Some(child.clone());
//!
//! drop(parent);
//! assert!(child.parent.expired());
//! ```
//!
//! Making the back edge a [`Weak`] as above breaks the cycle. With the
//! `stats` feature, [`stats()`] reports how many objects and control blocks
//! are still alive, which helps locating the leaks cycles cause.

pub(crate) mod allocator;
pub(crate) mod block;
pub mod deleter;
pub mod error;
pub mod exclusive;
pub mod observer;
pub mod self_shared;
pub mod shared;
pub mod stats;
pub mod weak;

pub use deleter::{DefaultDelete, Deleter};
pub use error::{Error, Result};
pub use exclusive::Exclusive;
pub use observer::Observer;
pub use self_shared::{SelfShared, SelfSlot};
pub use shared::Shared;
pub use stats::{stats, Stats};
pub use weak::Weak;
