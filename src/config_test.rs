use std::sync::Mutex;

use super::*;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// # Safety
/// Callers hold `ENV_LOCK` so env mutation is not racing another test.
unsafe fn clear_sync_env() {
    unsafe {
        std::env::remove_var(ENV_NAME);
        std::env::remove_var(ENV_USE_RAW);
        std::env::remove_var(ENV_AUTO_SAVE_DISABLED);
    }
}

#[test]
fn defaults_are_empty_name_and_json_autosave() {
    let opts = SyncOptions::default();
    assert_eq!(opts.name, "");
    assert!(!opts.use_raw);
    assert!(!opts.auto_save_disabled);
}

#[test]
fn named_sets_only_the_key() {
    let opts = SyncOptions::named("my-app-storage");
    assert_eq!(opts, SyncOptions { name: "my-app-storage".into(), ..SyncOptions::default() });
}

#[test]
fn from_json_reads_camel_case_fields() {
    let opts = SyncOptions::from_json(r#"{"name":"cart","useRaw":true,"autoSaveDisabled":true}"#).unwrap();
    assert_eq!(opts.name, "cart");
    assert!(opts.use_raw);
    assert!(opts.auto_save_disabled);
}

#[test]
fn from_json_missing_fields_default() {
    let opts = SyncOptions::from_json(r#"{"name":"cart"}"#).unwrap();
    assert_eq!(opts, SyncOptions::named("cart"));
}

#[test]
fn from_json_rejects_malformed_input() {
    let err = SyncOptions::from_json("{name").unwrap_err();
    assert!(err.to_string().starts_with("invalid options JSON"));
}

#[test]
fn parse_bool_accepts_common_spellings() {
    assert!(parse_bool(ENV_USE_RAW, "true").unwrap());
    assert!(parse_bool(ENV_USE_RAW, " TRUE ").unwrap());
    assert!(parse_bool(ENV_USE_RAW, "1").unwrap());
    assert!(!parse_bool(ENV_USE_RAW, "false").unwrap());
    assert!(!parse_bool(ENV_USE_RAW, "0").unwrap());
}

#[test]
fn parse_bool_rejects_other_values() {
    let err = parse_bool(ENV_USE_RAW, "yes").unwrap_err().to_string();
    assert!(err.contains("STORAGE_SYNC_USE_RAW"));
    assert!(err.contains("'yes'"));
}

#[test]
fn from_env_reads_all_variables() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_sync_env();
        std::env::set_var(ENV_NAME, "prefs");
        std::env::set_var(ENV_USE_RAW, "1");
        std::env::set_var(ENV_AUTO_SAVE_DISABLED, "true");
    }

    let opts = SyncOptions::from_env().unwrap();
    assert_eq!(opts, SyncOptions { name: "prefs".into(), use_raw: true, auto_save_disabled: true });

    unsafe { clear_sync_env() };
}

#[test]
fn from_env_invalid_bool_errors() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_sync_env();
        std::env::set_var(ENV_AUTO_SAVE_DISABLED, "maybe");
    }

    let err = SyncOptions::from_env().unwrap_err().to_string();
    assert!(err.contains(ENV_AUTO_SAVE_DISABLED));

    unsafe { clear_sync_env() };
}

#[cfg(unix)]
#[test]
fn from_env_non_unicode_bool_errors() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_sync_env();
        std::env::set_var(ENV_USE_RAW, OsStr::from_bytes(b"tr\xffue"));
    }

    let err = SyncOptions::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidBool { var: ENV_USE_RAW, .. }));

    unsafe { clear_sync_env() };
}
