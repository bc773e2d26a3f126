//! Single-threaded coalescing task queue.
//!
//! DESIGN
//! ======
//! Work is queued under a label. Scheduling a label that is already pending
//! drops the pending task and enqueues the new one at the back, so a burst of
//! triggers within one turn collapses into a single run of the latest task.
//! Different labels keep FIFO order of their latest schedule; nothing else is
//! promised between them.
//!
//! The queue never runs by itself. The owner drains it on its next turn, and
//! an optional waker tells a host event loop that a turn is needed.

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod scheduler_test;

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Deferred unit of work run against the owner `C`.
pub type Task<C> = Box<dyn FnOnce(&mut C)>;

/// Callback invoked whenever new work is queued.
pub type Waker = Rc<dyn Fn()>;

pub struct Scheduler<C> {
    queue: VecDeque<(&'static str, Task<C>)>,
    waker: Option<Waker>,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    #[must_use]
    pub fn new() -> Self {
        Self { queue: VecDeque::new(), waker: None }
    }

    /// Install (or remove) the waker called on every schedule.
    pub fn set_waker(&mut self, waker: Option<Waker>) {
        self.waker = waker;
    }

    pub fn waker(&self) -> Option<&Waker> {
        self.waker.as_ref()
    }

    /// Queue `task` under `label`, replacing any pending task with that label.
    ///
    /// Returns `true` when a pending task was replaced.
    pub fn schedule_coalesced(&mut self, label: &'static str, task: impl FnOnce(&mut C) + 'static) -> bool {
        let replaced = self.cancel(label);
        let task: Task<C> = Box::new(task);
        self.queue.push_back((label, task));
        tracing::debug!(label, replaced, "task scheduled");
        if let Some(waker) = &self.waker {
            waker();
        }
        replaced
    }

    /// Drop the pending task for `label`. Returns `true` if one was pending.
    pub fn cancel(&mut self, label: &str) -> bool {
        let before = self.queue.len();
        self.queue.retain(|(pending, _)| *pending != label);
        self.queue.len() != before
    }

    pub fn is_scheduled(&self, label: &str) -> bool {
        self.queue.iter().any(|(pending, _)| *pending == label)
    }

    /// Pending labels in run order.
    pub fn labels(&self) -> Vec<&'static str> {
        self.queue.iter().map(|(label, _)| *label).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remove the next task so the caller can run it against its owner.
    pub fn take_next(&mut self) -> Option<(&'static str, Task<C>)> {
        self.queue.pop_front()
    }

    /// Drop all pending work.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Run every pending task against `ctx`. Returns the number run.
    pub fn run_pending(&mut self, ctx: &mut C) -> usize {
        let mut ran = 0;
        while let Some((_, task)) = self.take_next() {
            task(ctx);
            ran += 1;
        }
        ran
    }
}

impl<C> fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.labels())
            .field("has_waker", &self.waker.is_some())
            .finish()
    }
}
