//! Storage backend contract shared by every store `StorageSync` can bind to.
//!
//! SYSTEM CONTEXT
//! ==============
//! The backend is the process-wide key/value substrate (browser
//! `localStorage`, `sessionStorage`, or [`crate::memory::MemoryStorage`]).
//! It stores raw strings only; JSON encoding is the component's concern.
//!
//! Change notifications are delivered to every context except the writer.
//! A [`Subscription`] keeps the listener registered until it is dropped.

#[cfg(test)]
#[path = "backend_test.rs"]
mod backend_test;

use std::fmt;

/// Which storage area a backend or event belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageArea {
    /// Persistent storage shared by every context of an origin.
    #[default]
    Local,
    /// Per-context storage that lives as long as the session.
    Session,
}

/// Change notification for a key written by another context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that changed. `None` when the whole area was cleared.
    pub key: Option<String>,
    /// Value before the change, if any.
    pub old_value: Option<String>,
    /// Value after the change. `None` when the key was removed.
    pub new_value: Option<String>,
    /// Area the change happened in.
    pub storage_area: StorageArea,
}

/// Callback invoked with each external change notification.
pub type ChangeListener = Box<dyn Fn(&StorageEvent)>;

/// Error returned by [`StorageBackend`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The store refused access (disabled storage, blocked cookies, private mode).
    #[error("storage access denied: {0}")]
    AccessDenied(String),
    /// Writing would exceed the store's quota.
    #[error("storage quota exceeded writing '{key}' ({needed} of {quota} bytes)")]
    QuotaExceeded { key: String, needed: usize, quota: usize },
    /// No store exists in this execution context.
    #[error("storage is not available in this context")]
    Unavailable,
    /// A browser call failed with the given message.
    #[error("{0}")]
    Js(String),
}

/// Key/value store with external change notification.
///
/// Methods take `&self`; implementations share their entries between handles
/// and use interior mutability.
pub trait StorageBackend {
    /// Area this backend reads and writes.
    fn area(&self) -> StorageArea;

    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Register `listener` for changes made by other contexts.
    fn subscribe(&self, listener: ChangeListener) -> Result<Subscription, StorageError>;
}

/// Registration handle for a [`ChangeListener`]. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Build a subscription that runs `cancel` once when released.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// Release the listener now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}
