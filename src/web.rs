//! Browser binding: `localStorage`/`sessionStorage` backend and a driver that
//! flushes the component from the browser event loop.
//!
//! All of this requires a browser environment and is compiled only with the
//! `web` feature.
//!
//! DESIGN
//! ======
//! `WebStorage` is a thin pass-through to `web_sys::Storage`. Its
//! subscriptions register a `storage` listener on `window`; the browser
//! already skips the writing context, so the listener only filters by area.
//!
//! `BrowserSync` installs a waker that arms a zero-delay timeout whenever work
//! is queued, so a burst of synchronous mutations lands in one flush on the
//! next turn. Events from that flush go to the host handler with mutable
//! access to the component.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use gloo_timers::callback::Timeout;
use wasm_bindgen::{JsCast, JsValue, closure::Closure};

use crate::backend::{ChangeListener, StorageArea, StorageBackend, StorageError, StorageEvent, Subscription};
use crate::config::SyncOptions;
use crate::scheduler::Waker;
use crate::sync::{StorageSync, SyncEvent};

const STORAGE_EVENT: &str = "storage";

fn js_message(value: &JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

// =============================================================================
// BACKEND
// =============================================================================

/// `window.localStorage` or `window.sessionStorage`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WebStorage {
    area: StorageArea,
}

impl WebStorage {
    #[must_use]
    pub fn local() -> Self {
        Self { area: StorageArea::Local }
    }

    #[must_use]
    pub fn session() -> Self {
        Self { area: StorageArea::Session }
    }

    fn storage(&self) -> Result<web_sys::Storage, StorageError> {
        let window = web_sys::window().ok_or(StorageError::Unavailable)?;
        let storage = match self.area {
            StorageArea::Local => window.local_storage(),
            StorageArea::Session => window.session_storage(),
        };
        match storage {
            Ok(Some(storage)) => Ok(storage),
            Ok(None) => Err(StorageError::Unavailable),
            // Thrown by the getter itself when cookies/storage are blocked.
            Err(err) => Err(StorageError::AccessDenied(js_message(&err))),
        }
    }
}

impl StorageBackend for WebStorage {
    fn area(&self) -> StorageArea {
        self.area
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.storage()?
            .get_item(key)
            .map_err(|err| StorageError::Js(js_message(&err)))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage()?
            .set_item(key, value)
            .map_err(|err| StorageError::Js(js_message(&err)))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.storage()?
            .remove_item(key)
            .map_err(|err| StorageError::Js(js_message(&err)))
    }

    fn subscribe(&self, listener: ChangeListener) -> Result<Subscription, StorageError> {
        let window = web_sys::window().ok_or(StorageError::Unavailable)?;
        let own_area: JsValue = self.storage()?.into();
        let area = self.area;

        let callback = Closure::<dyn FnMut(web_sys::StorageEvent)>::new(move |event: web_sys::StorageEvent| {
            if !event.storage_area().is_some_and(|storage| JsValue::from(storage) == own_area) {
                return;
            }
            listener(&StorageEvent {
                key: event.key(),
                old_value: event.old_value(),
                new_value: event.new_value(),
                storage_area: area,
            });
        });
        window
            .add_event_listener_with_callback(STORAGE_EVENT, callback.as_ref().unchecked_ref())
            .map_err(|err| StorageError::Js(js_message(&err)))?;

        Ok(Subscription::new(move || {
            if let Err(err) = window.remove_event_listener_with_callback(STORAGE_EVENT, callback.as_ref().unchecked_ref()) {
                tracing::warn!(error = %js_message(&err), "could not remove storage listener");
            }
        }))
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// Host callback for events raised during a flush.
pub type EventHandler = Box<dyn FnMut(&mut StorageSync<WebStorage>, &SyncEvent)>;

struct Driver {
    sync: RefCell<StorageSync<WebStorage>>,
    handler: RefCell<EventHandler>,
    timer: RefCell<Option<Timeout>>,
}

impl Driver {
    fn drive(&self) {
        loop {
            let events = self.sync.borrow_mut().flush();
            if events.is_empty() {
                break;
            }
            let mut handler = self.handler.borrow_mut();
            let mut sync = self.sync.borrow_mut();
            for event in &events {
                (*handler)(&mut *sync, event);
            }
        }
    }
}

fn arm(driver: &Weak<Driver>) {
    let Some(strong) = driver.upgrade() else {
        return;
    };
    if strong.timer.borrow().is_some() {
        return;
    }
    let weak = driver.clone();
    let timeout = Timeout::new(0, move || {
        if let Some(driver) = weak.upgrade() {
            driver.timer.borrow_mut().take();
            driver.drive();
        }
    });
    *strong.timer.borrow_mut() = Some(timeout);
}

/// A `StorageSync` bound to web storage and flushed by the browser event loop.
///
/// Dropping it cancels any pending flush and removes the `storage` listener.
pub struct BrowserSync {
    driver: Rc<Driver>,
}

impl BrowserSync {
    /// Create, attach and schedule the initial load.
    ///
    /// `handler` sees every [`SyncEvent`]; on `LoadEmpty` it can seed a
    /// default value through the `&mut StorageSync` it receives.
    pub fn new(
        options: SyncOptions,
        storage: WebStorage,
        handler: impl FnMut(&mut StorageSync<WebStorage>, &SyncEvent) + 'static,
    ) -> Self {
        let driver = Rc::new(Driver {
            sync: RefCell::new(StorageSync::new(storage, options)),
            handler: RefCell::new(Box::new(handler)),
            timer: RefCell::new(None),
        });
        let weak = Rc::downgrade(&driver);
        let waker_target = weak.clone();
        let waker: Waker = Rc::new(move || arm(&waker_target));
        let pending = {
            let mut sync = driver.sync.borrow_mut();
            sync.set_waker(Some(waker));
            sync.attach();
            sync.has_pending()
        };
        if pending {
            arm(&weak);
        }
        Self { driver }
    }

    /// Access the component. Must not be called from inside the event
    /// handler, which already holds it.
    pub fn with<R>(&self, f: impl FnOnce(&mut StorageSync<WebStorage>) -> R) -> R {
        f(&mut *self.driver.sync.borrow_mut())
    }

    /// Flush now instead of waiting for the armed timeout. Must not be called
    /// from inside the event handler, which already holds the component.
    pub fn flush_now(&self) {
        self.driver.drive();
    }
}
