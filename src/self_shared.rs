//! Objects that hand out shared handles to themselves.
//!
//! An object embeds a [`SelfSlot`] and implements [`SelfShared`] to point at
//! it. Once the object is placed under shared ownership (through
//! [`Shared::new_self_shared`] or [`Shared::enable_self_share`]) the slot
//! holds a weak handle to the owner, and any `&self` method can recover a
//! strong one:
//!
//! ```
//! use smartref::{SelfShared, SelfSlot, Shared};
//!
//! #[derive(Default)]
//! struct Session
//! {
//!     slot: SelfSlot<Session>,
//! }
//!
//! impl SelfShared for Session
//! {
//!     fn self_slot(&self) -> &SelfSlot<Self> { &self.slot }
//! }
//!
//! let session = Shared::new_self_shared(Session::default());
//! let again = session.shared_from_self().unwrap();
//! assert!(Shared::ptr_eq(&session, &again));
//! assert_eq!(Shared::strong_count(&session), 2);
//! ```

use std::fmt;

use parking_lot::Mutex;

use crate::{
    error::{Error, Result},
    shared::Shared,
    weak::Weak,
};

/// Weak self-reference stored inside an object.
///
/// Empty until the object's first shared owner is recorded. Cloning gives
/// an empty slot, since a copy of the object is a different object with no
/// owner yet.
pub struct SelfSlot<T: ?Sized>
{
    weak: Mutex<Weak<T>>,
}

impl<T: ?Sized> SelfSlot<T>
{
    pub fn new() -> Self { Self { weak: Mutex::new(Weak::new()) } }

    /// Record `owner` unless a live owner is already known.
    pub(crate) fn install(&self, owner: &Shared<T>) -> bool
    {
        let mut weak = self.weak.lock();
        if !weak.expired() {
            return false;
        }
        *weak = Shared::downgrade(owner);
        log::trace!("recorded self-sharing owner {:p}", Shared::observe(owner));
        true
    }

    /// Weak handle to the owner; expired if there is none.
    pub fn weak(&self) -> Weak<T> { self.weak.lock().clone() }

    /// Strong handle to the owner.
    pub fn shared(&self) -> Result<Shared<T>> { self.weak.lock().upgrade().ok_or(Error::NotOwned) }
}

impl<T: ?Sized> Default for SelfSlot<T>
{
    fn default() -> Self { Self::new() }
}

impl<T: ?Sized> Clone for SelfSlot<T>
{
    fn clone(&self) -> Self { Self::new() }
}

impl<T: ?Sized> fmt::Debug for SelfSlot<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("SelfSlot")
            .field("owned", &!self.weak.lock().expired())
            .finish()
    }
}

/// Implemented by types that embed a [`SelfSlot`] for themselves.
pub trait SelfShared
{
    fn self_slot(&self) -> &SelfSlot<Self>;

    /// A new strong handle to `self`.
    ///
    /// Fails with [`Error::NotOwned`] when `self` is not (or no longer)
    /// managed by a [`Shared`] that recorded itself in the slot: an object
    /// on the stack, in an [`Exclusive`](crate::Exclusive), or being dropped.
    fn shared_from_self(&self) -> Result<Shared<Self>> { self.self_slot().shared() }

    /// A weak handle to `self`, expired under the same conditions in which
    /// [`shared_from_self`](Self::shared_from_self) fails.
    fn weak_from_self(&self) -> Weak<Self> { self.self_slot().weak() }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::Exclusive;

    #[derive(Debug, Default)]
    struct Node
    {
        slot: SelfSlot<Node>,
        label: &'static str,
    }

    impl SelfShared for Node
    {
        fn self_slot(&self) -> &SelfSlot<Self> { &self.slot }
    }

    fn node(label: &'static str) -> Node
    {
        Node {
            label,
            ..Node::default()
        }
    }

    #[test]
    fn owned_object_finds_its_owner()
    {
        let owner = Shared::new_self_shared(node("root"));
        let again = owner.shared_from_self().unwrap();

        assert_eq!(again.label, "root");
        assert!(Shared::ptr_eq(&owner, &again));
        assert_eq!(Shared::strong_count(&owner), 2);
        assert_eq!(Shared::weak_count(&owner), 1);
        assert!(!owner.weak_from_self().expired());
    }

    #[test]
    fn object_on_the_stack_is_not_owned()
    {
        let local = node("stack");
        assert_eq!(local.shared_from_self().unwrap_err(), Error::NotOwned);
        assert!(local.weak_from_self().expired());
    }

    #[test]
    fn exclusive_object_is_not_owned_until_shared()
    {
        let boxed = Exclusive::new(node("boxed"));
        assert!(boxed.shared_from_self().is_err());

        let owner: Shared<Node> = Shared::from(boxed);
        assert!(owner.shared_from_self().is_err());

        Shared::enable_self_share(&owner);
        let again = owner.shared_from_self().unwrap();
        assert!(Shared::ptr_eq(&owner, &again));
    }

    #[test]
    fn plain_new_does_not_record_owner()
    {
        let owner = Shared::new(node("plain"));
        assert!(owner.shared_from_self().is_err());
    }

    #[test]
    fn first_owner_is_kept()
    {
        let owner = Shared::new_self_shared(node("first"));
        let alias = owner.clone();
        Shared::enable_self_share(&alias);
        assert_eq!(Shared::weak_count(&owner), 1);
        assert!(!owner.slot.install(&alias));
    }

    #[test]
    fn cloned_object_starts_unowned()
    {
        let owner = Shared::new_self_shared(node("original"));
        let copy = Node {
            slot: owner.slot.clone(),
            label: "copy",
        };
        assert!(copy.shared_from_self().is_err());
        assert!(owner.shared_from_self().is_ok());
    }
}
