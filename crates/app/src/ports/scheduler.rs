//! Scheduler port: time-based execution on a shared worker pool.

use std::time::Duration;

use driverhub_domain::time::{self, Timestamp};

/// Unit of work handed to a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks on some pool thread at or after a requested time.
///
/// Delivery is at-least-once from the executor's point of view; nothing in
/// the core assumes a task runs on any particular thread.
pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed.
    fn schedule_delayed(&self, task: Task, delay: Duration);

    /// Run `task` at or after `at`. Past timestamps run as soon as possible.
    fn schedule_at(&self, task: Task, at: Timestamp) {
        self.schedule_delayed(task, time::until(at));
    }
}

impl<T: Scheduler + ?Sized> Scheduler for std::sync::Arc<T> {
    fn schedule_delayed(&self, task: Task, delay: Duration) {
        (**self).schedule_delayed(task, delay);
    }

    fn schedule_at(&self, task: Task, at: Timestamp) {
        (**self).schedule_at(task, at);
    }
}
