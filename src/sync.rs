//! `StorageSync`: keeps one value mirrored to one storage key.
//!
//! SYSTEM CONTEXT
//! ==============
//! The component owns a key name and a JSON value. Mutating the value queues
//! a coalesced save; changing the key (or the raw/JSON switch) queues a
//! coalesced reload. While attached, writes to the same key from other
//! contexts trigger a reload flagged as an external change.
//!
//! Nothing runs eagerly. Queued work and external notifications are handled
//! on the next [`StorageSync::flush`], which stands in for one turn of the
//! host event loop and returns the [`SyncEvent`]s raised during it.
//!
//! ERROR HANDLING
//! ==============
//! Read, write and parse failures never reach the caller. Each one sets
//! `error_message`, raises [`SyncEvent::ErrorMessageChanged`] and logs with
//! `tracing::error!`. A value that fails to parse loads as `null` and still
//! raises [`SyncEvent::Load`].

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backend::{StorageBackend, StorageEvent, Subscription};
use crate::config::SyncOptions;
use crate::path::{self, PathError};
use crate::scheduler::{Scheduler, Waker};

/// Scheduler label for coalesced saves.
pub const SAVE_LABEL: &str = "save";
/// Scheduler label for coalesced reloads.
pub const RELOAD_LABEL: &str = "reload";
/// `error_message` after a stored value fails to parse as JSON.
pub const PARSE_ERROR_MESSAGE: &str = "Could not parse local storage value";

/// What the component is doing right now. Value assignments made outside
/// `Idle` never schedule a save.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    #[default]
    Idle,
    Loading,
    Saving,
}

/// Notification raised by the component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// A stored value was loaded.
    Load { external_change: bool },
    /// Nothing is stored under the key. Handlers typically seed a default.
    LoadEmpty { external_change: bool },
    /// A load replaced the value with a different one.
    ValueChanged,
    /// `error_message` was set.
    ErrorMessageChanged(String),
}

/// External change notifications waiting for the next flush.
#[derive(Default)]
struct Mailbox {
    queue: RefCell<VecDeque<StorageEvent>>,
    waker: RefCell<Option<Waker>>,
}

impl Mailbox {
    fn deliver(&self, event: StorageEvent) {
        self.queue.borrow_mut().push_back(event);
        let waker = self.waker.borrow().clone();
        if let Some(waker) = waker {
            waker();
        }
    }

    fn pop(&self) -> Option<StorageEvent> {
        self.queue.borrow_mut().pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    fn clear(&self) {
        self.queue.borrow_mut().clear();
    }

    fn set_waker(&self, waker: Option<Waker>) {
        *self.waker.borrow_mut() = waker;
    }
}

/// A value bound to a storage key.
///
/// `value` is `None` until something assigns it ("undefined"). Both `None`
/// and `Some(Value::Null)` delete the key on save.
pub struct StorageSync<B: StorageBackend> {
    backend: B,
    name: String,
    value: Option<Value>,
    use_raw: bool,
    auto_save_disabled: bool,
    error_message: Option<String>,
    loaded: bool,
    mode: SyncMode,
    scheduler: Scheduler<StorageSync<B>>,
    mailbox: Rc<Mailbox>,
    subscription: Option<Subscription>,
    events: Vec<SyncEvent>,
}

impl<B: StorageBackend + 'static> StorageSync<B> {
    /// Create the component and queue its initial reload.
    pub fn new(backend: B, options: SyncOptions) -> Self {
        let mut sync = Self {
            backend,
            name: options.name,
            value: None,
            use_raw: options.use_raw,
            auto_save_disabled: options.auto_save_disabled,
            error_message: None,
            loaded: false,
            mode: SyncMode::Idle,
            scheduler: Scheduler::new(),
            mailbox: Rc::new(Mailbox::default()),
            subscription: None,
            events: Vec::new(),
        };
        sync.debounce_reload();
        sync
    }

    // --- Properties ---

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Change the storage key. Queues a reload when the key differs.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name == self.name {
            return;
        }
        self.name = name;
        self.debounce_reload();
    }

    pub fn use_raw(&self) -> bool {
        self.use_raw
    }

    /// Switch between raw strings and JSON. Queues a reload on change.
    pub fn set_use_raw(&mut self, use_raw: bool) {
        if use_raw == self.use_raw {
            return;
        }
        self.use_raw = use_raw;
        self.debounce_reload();
    }

    pub fn auto_save_disabled(&self) -> bool {
        self.auto_save_disabled
    }

    /// Turn auto-save off or on. Turning it back on queues a save.
    pub fn set_auto_save_disabled(&mut self, disabled: bool) {
        if disabled == self.auto_save_disabled {
            return;
        }
        self.auto_save_disabled = disabled;
        self.try_save_value();
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Replace the value. `Value::Null` deletes the key on the next save.
    pub fn set_value(&mut self, value: Value) {
        self.assign(Some(value));
    }

    /// Reset the value to undefined, which also deletes the key on save.
    pub fn unset_value(&mut self) -> Option<Value> {
        let previous = self.value.clone();
        self.assign(None);
        previous
    }

    /// Deserialize the current value into `T`.
    pub fn value_as<T: DeserializeOwned>(&self) -> Option<T> {
        let value = self.value.as_ref()?;
        match <T as serde::Deserialize>::deserialize(value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                tracing::debug!(key = %self.name, error = %err, "value does not match requested type");
                None
            }
        }
    }

    /// Serialize `value` and assign it.
    pub fn set_value_from<T: Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.set_value(value);
        Ok(())
    }

    /// Mutate the value in place, then treat it as changed. An undefined value
    /// is handed to `mutate` as `null`.
    pub fn update(&mut self, mutate: impl FnOnce(&mut Value)) {
        let mut value = self.value.take().unwrap_or_default();
        mutate(&mut value);
        self.value = Some(value);
        self.try_save_value();
    }

    /// Read a nested value, e.g. `get_path("cartoon.name")`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        self.value.as_ref().and_then(|root| path::get(root, path))
    }

    /// Assign a nested value. Assigning an equal scalar is not a change.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), PathError> {
        let Some(root) = self.value.as_mut() else {
            return Err(PathError::Missing(path.to_owned()));
        };
        if !is_change(path::get(root, path), Some(&value)) {
            return Ok(());
        }
        path::set(root, path, value)?;
        self.try_save_value();
        Ok(())
    }

    /// Report a nested mutation made through other means.
    pub fn mark_dirty(&mut self) {
        self.try_save_value();
    }

    /// Last error encountered while loading or saving.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Whether a load has completed since the last reload started.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // --- Lifecycle ---

    /// Start listening for external changes. No-op when already attached.
    pub fn attach(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        let mailbox = Rc::clone(&self.mailbox);
        let listener = Box::new(move |event: &StorageEvent| mailbox.deliver(event.clone()));
        match self.backend.subscribe(listener) {
            Ok(subscription) => {
                tracing::debug!(key = %self.name, "attached to storage events");
                self.subscription = Some(subscription);
            }
            Err(err) => {
                tracing::warn!(key = %self.name, error = %err, "could not subscribe to storage events");
                self.record_error(err.to_string());
            }
        }
    }

    /// Stop listening for external changes and drop undelivered ones.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            tracing::debug!(key = %self.name, "detached from storage events");
        }
        self.mailbox.clear();
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    // --- Event loop ---

    /// Install the callback invoked whenever work is queued, so a host loop
    /// knows to call [`flush`](Self::flush).
    pub fn set_waker(&mut self, waker: Option<Waker>) {
        self.mailbox.set_waker(waker.clone());
        self.scheduler.set_waker(waker);
    }

    /// Whether a flush would do anything.
    pub fn has_pending(&self) -> bool {
        !self.scheduler.is_empty() || !self.mailbox.is_empty()
    }

    /// Labels of queued tasks in run order.
    pub fn pending_labels(&self) -> Vec<&'static str> {
        self.scheduler.labels()
    }

    /// Run one event-loop turn: handle queued external changes, then queued
    /// tasks, until both are empty. Returns the events raised since the last
    /// drain.
    pub fn flush(&mut self) -> Vec<SyncEvent> {
        loop {
            if let Some(event) = self.mailbox.pop() {
                self.handle_storage_event(&event);
                continue;
            }
            let Some((label, task)) = self.scheduler.take_next() else {
                break;
            };
            tracing::debug!(label, key = %self.name, "running scheduled task");
            task(&mut *self);
        }
        self.take_events()
    }

    /// Drain raised events without running anything.
    pub fn take_events(&mut self) -> Vec<SyncEvent> {
        std::mem::take(&mut self.events)
    }

    /// React to a change made by another context: reload when it touches
    /// this component's key.
    pub fn handle_storage_event(&mut self, event: &StorageEvent) {
        if event.key.as_deref() == Some(self.name.as_str()) {
            self.load(true);
        }
    }

    // --- Load / save ---

    /// Load the value again, e.g. after writing to storage behind the
    /// component's back.
    pub fn reload(&mut self) {
        self.loaded = false;
        self.load(false);
    }

    /// Write the value now. Deletes the key when the value is null or
    /// undefined. Use this when auto-save is disabled.
    pub fn save(&mut self) {
        let previous = std::mem::replace(&mut self.mode, SyncMode::Saving);
        let result = self.write();
        self.mode = previous;
        if let Err(message) = result {
            self.record_error(message);
        }
    }

    fn load(&mut self, external_change: bool) {
        let stored = match self.backend.get(&self.name) {
            Ok(stored) => stored,
            Err(err) => {
                tracing::error!(
                    key = %self.name,
                    error = %err,
                    "could not read from storage; try enabling cookies for this page"
                );
                self.record_error(err.to_string());
                return;
            }
        };

        let Some(raw) = stored else {
            self.loaded = true;
            self.assign_loaded(Value::Null);
            self.events.push(SyncEvent::LoadEmpty { external_change });
            return;
        };

        let value = if self.use_raw {
            Value::String(raw)
        } else {
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => value,
                Err(err) => {
                    tracing::error!(key = %self.name, error = %err, raw = %raw, "could not parse storage value");
                    self.record_error(PARSE_ERROR_MESSAGE.to_owned());
                    Value::Null
                }
            }
        };
        self.loaded = true;
        self.assign_loaded(value);
        self.events.push(SyncEvent::Load { external_change });
    }

    fn write(&self) -> Result<(), String> {
        let encoded = match &self.value {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) if self.use_raw => Some(Cow::Borrowed(raw.as_str())),
            Some(value) => match serde_json::to_string(value) {
                Ok(json) => Some(Cow::Owned(json)),
                Err(err) => {
                    tracing::error!(key = %self.name, error = %err, "could not serialize value");
                    return Err(err.to_string());
                }
            },
        };
        let result = match encoded {
            None => self.backend.remove(&self.name),
            Some(encoded) => self.backend.set(&self.name, &encoded),
        };
        result.map_err(|err| {
            tracing::error!(
                key = %self.name,
                error = %err,
                "could not save to storage; private browsing may be blocking this action"
            );
            err.to_string()
        })
    }

    // --- Observers ---

    /// Assign and run the save observer.
    fn assign(&mut self, value: Option<Value>) {
        if !is_change(self.value.as_ref(), value.as_ref()) {
            return;
        }
        self.value = value;
        self.try_save_value();
    }

    fn assign_loaded(&mut self, value: Value) {
        if self.value.as_ref() == Some(&value) {
            return;
        }
        let previous = std::mem::replace(&mut self.mode, SyncMode::Loading);
        self.assign(Some(value));
        self.mode = previous;
        self.events.push(SyncEvent::ValueChanged);
    }

    fn try_save_value(&mut self) {
        if self.mode != SyncMode::Idle {
            return;
        }
        if self.loaded && !self.auto_save_disabled {
            self.scheduler.schedule_coalesced(SAVE_LABEL, Self::save);
        }
    }

    fn debounce_reload(&mut self) {
        self.scheduler.schedule_coalesced(RELOAD_LABEL, Self::reload);
    }

    fn record_error(&mut self, message: String) {
        self.error_message = Some(message.clone());
        self.events.push(SyncEvent::ErrorMessageChanged(message));
    }
}

/// Objects and arrays are always a change when assigned, even if deep-equal,
/// so re-assigning one rewrites the stored entry. Scalars compare by value.
fn is_change(current: Option<&Value>, next: Option<&Value>) -> bool {
    match next {
        Some(Value::Object(_) | Value::Array(_)) => true,
        _ => current != next,
    }
}

impl<B: StorageBackend> fmt::Debug for StorageSync<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSync")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("use_raw", &self.use_raw)
            .field("auto_save_disabled", &self.auto_save_disabled)
            .field("error_message", &self.error_message)
            .field("loaded", &self.loaded)
            .field("mode", &self.mode)
            .field("attached", &self.subscription.is_some())
            .field("pending", &self.scheduler.labels())
            .finish_non_exhaustive()
    }
}
