//! Keep a value in sync with a browser-style key/value store.
//!
//! [`StorageSync`] mirrors one JSON (or raw string) value to one storage key.
//! Mutations are saved on the next event-loop turn, bursts of mutations
//! collapse into one write, and writes made by other contexts (other tabs)
//! reload the value. Storage is injected through [`StorageBackend`], so the
//! same component runs against `window.localStorage` in the browser and
//! against [`MemoryStorage`] everywhere else.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`sync`] | The `StorageSync` component and its events |
//! | [`backend`] | Backend trait, change events, subscriptions, errors |
//! | [`memory`] | Shared in-memory backend with per-context notification |
//! | [`scheduler`] | Coalescing single-threaded task queue |
//! | [`path`] | Dotted-path access into JSON values |
//! | [`config`] | Component options from JSON or the environment |
//! | `web` | `localStorage`/`sessionStorage` backend and event-loop driver (feature `web`) |

pub mod backend;
pub mod config;
pub mod memory;
pub mod path;
pub mod scheduler;
pub mod sync;
#[cfg(feature = "web")]
pub mod web;

pub use backend::{ChangeListener, StorageArea, StorageBackend, StorageError, StorageEvent, Subscription};
pub use config::{ConfigError, SyncOptions};
pub use memory::MemoryStorage;
pub use path::PathError;
pub use scheduler::Scheduler;
pub use sync::{StorageSync, SyncEvent, SyncMode};
