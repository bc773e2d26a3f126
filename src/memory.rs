//! In-memory storage backend with browser-style cross-context notification.
//!
//! DESIGN
//! ======
//! One shared entry map per store, reached through cheap `MemoryStorage`
//! handles. Each handle belongs to a context (think: browser tab). Cloning a
//! handle stays in the same context; [`MemoryStorage::open_context`] opens a
//! new one. A write notifies the listeners of every other context, never the
//! writer's own, which is how the `storage` DOM event behaves.
//!
//! TRADE-OFFS
//! ==========
//! Quota is counted in UTF-8 bytes of keys plus values rather than browsers'
//! UTF-16 code units. The disabled switch stands in for private-mode and
//! blocked-cookie failures so error paths can be exercised without a browser.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::backend::{ChangeListener, StorageArea, StorageBackend, StorageError, StorageEvent, Subscription};

/// Default quota: 5 MiB, the common browser allowance per origin.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

struct ListenerEntry {
    id: u64,
    context: u64,
    listener: Rc<dyn Fn(&StorageEvent)>,
}

struct Shared {
    area: StorageArea,
    entries: BTreeMap<String, String>,
    listeners: Vec<ListenerEntry>,
    quota: usize,
    disabled: bool,
    next_context: u64,
    next_listener: u64,
}

impl Shared {
    fn ensure_enabled(&self) -> Result<(), StorageError> {
        if self.disabled {
            return Err(StorageError::AccessDenied("storage is disabled in this context".into()));
        }
        Ok(())
    }

    fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// Handle to a shared in-memory key/value store.
#[derive(Clone)]
pub struct MemoryStorage {
    shared: Rc<RefCell<Shared>>,
    context: u64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// New empty local-area store with the default quota.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(StorageArea::Local, DEFAULT_QUOTA_BYTES)
    }

    /// New empty local-area store limited to `quota` bytes.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self::with_options(StorageArea::Local, quota)
    }

    /// New empty store for `area` limited to `quota` bytes.
    #[must_use]
    pub fn with_options(area: StorageArea, quota: usize) -> Self {
        let shared = Shared {
            area,
            entries: BTreeMap::new(),
            listeners: Vec::new(),
            quota,
            disabled: false,
            next_context: 1,
            next_listener: 0,
        };
        Self { shared: Rc::new(RefCell::new(shared)), context: 0 }
    }

    /// Open a handle on the same store from a new context.
    #[must_use]
    pub fn open_context(&self) -> Self {
        let mut shared = self.shared.borrow_mut();
        let context = shared.next_context;
        shared.next_context += 1;
        Self { shared: Rc::clone(&self.shared), context }
    }

    /// Make every operation fail with [`StorageError::AccessDenied`].
    pub fn set_disabled(&self, disabled: bool) {
        self.shared.borrow_mut().disabled = disabled;
    }

    pub fn is_disabled(&self) -> bool {
        self.shared.borrow().disabled
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.shared.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.borrow().entries.is_empty()
    }

    /// Stored keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.shared.borrow().entries.keys().cloned().collect()
    }

    /// Bytes currently counted against the quota.
    pub fn used_bytes(&self) -> usize {
        self.shared.borrow().used_bytes()
    }

    /// Registered listeners across all contexts.
    pub fn listener_count(&self) -> usize {
        self.shared.borrow().listeners.len()
    }

    /// Remove every key, notifying other contexts with a `None` key.
    pub fn clear(&self) -> Result<(), StorageError> {
        let had_entries = {
            let mut shared = self.shared.borrow_mut();
            shared.ensure_enabled()?;
            let had_entries = !shared.entries.is_empty();
            shared.entries.clear();
            had_entries
        };
        if had_entries {
            self.notify(None, None, None);
        }
        Ok(())
    }

    fn notify(&self, key: Option<&str>, old_value: Option<String>, new_value: Option<String>) {
        // Collect first so listeners may touch the store without a double borrow.
        let (area, listeners) = {
            let shared = self.shared.borrow();
            let listeners = shared
                .listeners
                .iter()
                .filter(|entry| entry.context != self.context)
                .map(|entry| Rc::clone(&entry.listener))
                .collect::<Vec<_>>();
            (shared.area, listeners)
        };
        if listeners.is_empty() {
            return;
        }
        let event = StorageEvent { key: key.map(str::to_owned), old_value, new_value, storage_area: area };
        for listener in listeners {
            listener(&event);
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn area(&self) -> StorageArea {
        self.shared.borrow().area
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let shared = self.shared.borrow();
        shared.ensure_enabled()?;
        Ok(shared.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let old_value = {
            let mut shared = self.shared.borrow_mut();
            shared.ensure_enabled()?;
            let replaced = shared.entries.get(key).map_or(0, |old| key.len() + old.len());
            let needed = shared.used_bytes() - replaced + key.len() + value.len();
            if needed > shared.quota {
                return Err(StorageError::QuotaExceeded { key: key.to_owned(), needed, quota: shared.quota });
            }
            shared.entries.insert(key.to_owned(), value.to_owned())
        };
        if old_value.as_deref() == Some(value) {
            return Ok(());
        }
        self.notify(Some(key), old_value, Some(value.to_owned()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let old_value = {
            let mut shared = self.shared.borrow_mut();
            shared.ensure_enabled()?;
            shared.entries.remove(key)
        };
        if old_value.is_some() {
            self.notify(Some(key), old_value, None);
        }
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> Result<Subscription, StorageError> {
        let id = {
            let mut shared = self.shared.borrow_mut();
            shared.ensure_enabled()?;
            let id = shared.next_listener;
            shared.next_listener += 1;
            shared.listeners.push(ListenerEntry { id, context: self.context, listener: Rc::from(listener) });
            id
        };
        let shared = Rc::downgrade(&self.shared);
        Ok(Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.borrow_mut().listeners.retain(|entry| entry.id != id);
            }
        }))
    }
}
