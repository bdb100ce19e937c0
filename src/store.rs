use std::rc::Rc;

use jigsync_core::{StorePath, StoreValue};

use crate::error::StoreError;

#[derive(Clone, Debug, PartialEq)]
pub struct StoreChange {
    pub path: StorePath,
    /// `None` when the path was removed.
    pub value: Option<StoreValue>,
    /// Store-assigned order of the write that produced this change.
    pub seq: u64,
}

pub type StoreCallback = Rc<dyn Fn(StoreChange)>;

/// Mutation the store applies on its own when a connection goes silent.
#[derive(Clone, Debug, PartialEq)]
pub enum DisconnectAction {
    Write(StoreValue),
    Remove,
    /// Flip `is_online` on the player record at the path, keeping every
    /// other field.
    MarkOffline,
}

/// Push-subscribe key/value service shared by every client of a session.
///
/// Conflicts resolve by last write wins per path, in store order. Writing a
/// path replaces everything underneath it. Callbacks must be delivered
/// asynchronously: an implementation may never invoke a subscriber from inside
/// `write`, `remove` or `subscribe`.
pub trait RealtimeStore {
    fn write(&self, path: &StorePath, value: StoreValue) -> Result<(), StoreError>;
    fn remove(&self, path: &StorePath) -> Result<(), StoreError>;
    /// One-shot read of the value stored exactly at `path`.
    fn read(&self, path: &StorePath) -> Result<Option<StoreValue>, StoreError>;
    /// Subscribes to `path` and its descendants. Current values are delivered
    /// first, then every later change.
    fn subscribe(&self, path: &StorePath, callback: StoreCallback)
        -> Result<Subscription, StoreError>;
    fn register_disconnect_action(
        &self,
        path: &StorePath,
        action: DisconnectAction,
    ) -> Result<(), StoreError>;
    fn cancel_disconnect_actions(&self, path: &StorePath) -> Result<(), StoreError>;
}

/// Live subscription; dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
