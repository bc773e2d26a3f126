use std::cell::Cell;

use super::*;

#[derive(Default)]
struct Log {
    entries: Vec<String>,
}

fn push(entry: &'static str) -> impl FnOnce(&mut Log) + 'static {
    move |log: &mut Log| log.entries.push(entry.to_owned())
}

#[test]
fn same_label_collapses_to_latest_task() {
    let mut scheduler = Scheduler::<Log>::new();
    assert!(!scheduler.schedule_coalesced("save", push("first")));
    assert!(scheduler.schedule_coalesced("save", push("second")));
    assert!(scheduler.schedule_coalesced("save", push("third")));
    assert_eq!(scheduler.len(), 1);

    let mut log = Log::default();
    assert_eq!(scheduler.run_pending(&mut log), 1);
    assert_eq!(log.entries, vec!["third"]);
}

#[test]
fn different_labels_both_run() {
    let mut scheduler = Scheduler::<Log>::new();
    scheduler.schedule_coalesced("reload", push("reload"));
    scheduler.schedule_coalesced("save", push("save"));

    let mut log = Log::default();
    scheduler.run_pending(&mut log);
    assert_eq!(log.entries, vec!["reload", "save"]);
}

#[test]
fn rescheduling_moves_label_to_back() {
    let mut scheduler = Scheduler::<Log>::new();
    scheduler.schedule_coalesced("reload", push("reload-1"));
    scheduler.schedule_coalesced("save", push("save"));
    scheduler.schedule_coalesced("reload", push("reload-2"));
    assert_eq!(scheduler.labels(), vec!["save", "reload"]);
}

#[test]
fn cancel_removes_pending_task() {
    let mut scheduler = Scheduler::<Log>::new();
    scheduler.schedule_coalesced("save", push("save"));
    assert!(scheduler.is_scheduled("save"));
    assert!(scheduler.cancel("save"));
    assert!(!scheduler.cancel("save"));
    assert!(scheduler.is_empty());
}

#[test]
fn clear_drops_everything() {
    let mut scheduler = Scheduler::<Log>::new();
    scheduler.schedule_coalesced("save", push("save"));
    scheduler.schedule_coalesced("reload", push("reload"));
    scheduler.clear();

    let mut log = Log::default();
    assert_eq!(scheduler.run_pending(&mut log), 0);
    assert!(log.entries.is_empty());
}

#[test]
fn waker_fires_on_each_schedule() {
    let wakes = Rc::new(Cell::new(0));
    let counter = Rc::clone(&wakes);
    let mut scheduler = Scheduler::<Log>::new();
    scheduler.set_waker(Some(Rc::new(move || counter.set(counter.get() + 1))));

    scheduler.schedule_coalesced("save", push("a"));
    scheduler.schedule_coalesced("save", push("b"));
    assert_eq!(wakes.get(), 2);
    assert!(scheduler.waker().is_some());
}

#[test]
fn debug_lists_pending_labels() {
    let mut scheduler = Scheduler::<Log>::new();
    scheduler.schedule_coalesced("save", push("a"));
    let rendered = format!("{scheduler:?}");
    assert!(rendered.contains("\"save\""));
}
