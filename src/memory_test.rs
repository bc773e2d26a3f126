use std::cell::RefCell;
use std::rc::Rc;

use super::*;

fn recorder(store: &MemoryStorage) -> (Rc<RefCell<Vec<StorageEvent>>>, Subscription) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let sub = store
        .subscribe(Box::new(move |ev: &StorageEvent| sink.borrow_mut().push(ev.clone())))
        .expect("subscribe");
    (seen, sub)
}

// =============================================================
// Basic key/value behavior
// =============================================================

#[test]
fn get_missing_key_is_none() {
    let store = MemoryStorage::new();
    assert_eq!(store.get("nope").unwrap(), None);
}

#[test]
fn set_then_get_returns_value() {
    let store = MemoryStorage::new();
    store.set("k", "v").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    assert_eq!(store.len(), 1);
}

#[test]
fn remove_deletes_key_and_missing_remove_is_ok() {
    let store = MemoryStorage::new();
    store.set("k", "v").unwrap();
    store.remove("k").unwrap();
    store.remove("k").unwrap();
    assert!(store.is_empty());
}

#[test]
fn contexts_share_entries() {
    let tab_a = MemoryStorage::new();
    let tab_b = tab_a.open_context();
    tab_a.set("shared", "1").unwrap();
    assert_eq!(tab_b.get("shared").unwrap().as_deref(), Some("1"));
}

// =============================================================
// Notifications
// =============================================================

#[test]
fn writer_context_is_not_notified() {
    let tab_a = MemoryStorage::new();
    let (seen, _sub) = recorder(&tab_a);
    tab_a.set("k", "v").unwrap();
    assert!(seen.borrow().is_empty());
}

#[test]
fn other_context_receives_set_and_remove() {
    let tab_a = MemoryStorage::new();
    let tab_b = tab_a.open_context();
    let (seen, _sub) = recorder(&tab_b);

    tab_a.set("k", "v1").unwrap();
    tab_a.remove("k").unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].key.as_deref(), Some("k"));
    assert_eq!(seen[0].old_value, None);
    assert_eq!(seen[0].new_value.as_deref(), Some("v1"));
    assert_eq!(seen[1].old_value.as_deref(), Some("v1"));
    assert_eq!(seen[1].new_value, None);
    assert_eq!(seen[1].storage_area, StorageArea::Local);
}

#[test]
fn unchanged_write_does_not_notify() {
    let tab_a = MemoryStorage::new();
    let tab_b = tab_a.open_context();
    tab_a.set("k", "same").unwrap();
    let (seen, _sub) = recorder(&tab_b);
    tab_a.set("k", "same").unwrap();
    assert!(seen.borrow().is_empty());
}

#[test]
fn clear_notifies_with_no_key() {
    let tab_a = MemoryStorage::new();
    let tab_b = tab_a.open_context();
    tab_a.set("k", "v").unwrap();
    let (seen, _sub) = recorder(&tab_b);
    tab_a.clear().unwrap();
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].key, None);
    assert!(tab_a.is_empty());
}

#[test]
fn dropping_subscription_removes_listener() {
    let tab_a = MemoryStorage::new();
    let tab_b = tab_a.open_context();
    let (seen, sub) = recorder(&tab_b);
    assert_eq!(tab_a.listener_count(), 1);
    drop(sub);
    assert_eq!(tab_a.listener_count(), 0);
    tab_a.set("k", "v").unwrap();
    assert!(seen.borrow().is_empty());
}

#[test]
fn session_store_reports_session_area() {
    let store = MemoryStorage::with_options(StorageArea::Session, DEFAULT_QUOTA_BYTES);
    assert_eq!(store.area(), StorageArea::Session);
}

// =============================================================
// Failure modes
// =============================================================

#[test]
fn quota_rejects_oversized_write_and_keeps_old_value() {
    let store = MemoryStorage::with_quota(10);
    store.set("k", "1234").unwrap();
    let err = store.set("k", "0123456789").unwrap_err();
    assert!(matches!(err, StorageError::QuotaExceeded { needed: 11, quota: 10, .. }));
    assert_eq!(store.get("k").unwrap().as_deref(), Some("1234"));
}

#[test]
fn quota_counts_replacement_not_addition() {
    let store = MemoryStorage::with_quota(10);
    store.set("k", "123456789").unwrap();
    store.set("k", "987654321").unwrap();
    assert_eq!(store.used_bytes(), 10);
}

#[test]
fn disabled_store_denies_every_operation() {
    let store = MemoryStorage::new();
    store.set_disabled(true);
    assert!(matches!(store.get("k"), Err(StorageError::AccessDenied(_))));
    assert!(matches!(store.set("k", "v"), Err(StorageError::AccessDenied(_))));
    assert!(matches!(store.remove("k"), Err(StorageError::AccessDenied(_))));
    store.set_disabled(false);
    assert!(store.get("k").is_ok());
}
