//! Reporting of run progress.
//!
//! The [`Reporter`] trait receives ordered callbacks as the runner moves
//! through its phases:
//!
//! ```text
//! start_tasks
//!   (start_task, finish_task)*        per task, item and module sub-task
//! finish_tasks
//!   finish_task*                      deferred tasks as they are drained
//! [start_handlers
//!   (start_task, finish_task)*
//!  finish_handlers]                   only when a handler actually runs
//! finish_all
//! end_reporter(error)                 always last, also on failure
//! ```
//!
//! # Available Reporters
//!
//! - [`CliReporter`] - human console output with elapsed-time prefixes
//! - [`JsonChunkReporter`] - length-prefixed JSON events for machine consumers
//! - [`StructReporter`] - in-memory record of the run, serializable
//! - [`NullReporter`] - no output
//! - [`CompositeReporter`] - fans every hook out to several reporters

pub mod plugins;

pub use plugins::{
    CliReporter, ChunkEvent, JsonChunkReporter, NullReporter, RunRecord, StructReporter,
    TaskRecord, MAX_TASK_RECORDS,
};

use std::sync::Arc;

use crate::error::Error;
use crate::executor::runner::Runner;
use crate::executor::task::{Task, TaskResult};
use crate::expr::Vars;

/// Receives run progress events.
///
/// Every method has a no-op default so reporters only implement the hooks
/// they care about. Hooks may be called from future worker threads.
pub trait Reporter: Send + Sync {
    /// Called before the first task of the first play.
    fn start_tasks(&self, runner: &Runner) {
        let _ = runner;
    }

    /// Called after every play's task list has run.
    fn finish_tasks(&self, runner: &Runner) {
        let _ = runner;
    }

    /// Called before the first notified handler runs.
    fn start_handlers(&self, runner: &Runner) {
        let _ = runner;
    }

    /// Called after the last notified handler ran.
    fn finish_handlers(&self, runner: &Runner) {
        let _ = runner;
    }

    /// Called when a task starts, with its expanded name and arguments and
    /// the parameters it was bound with.
    fn start_task(&self, task: &Task, name: &str, args: &str, vars: &Vars) {
        let _ = (task, name, args, vars);
    }

    /// Called when a task finishes. `result` is `None` for a deferred task
    /// that has only been dispatched.
    fn finish_task(&self, task: &Task, result: Option<&TaskResult>) {
        let _ = (task, result);
    }

    /// Called once the run completed successfully.
    fn finish_all(&self, runner: &Runner) {
        let _ = runner;
    }

    /// Always the last hook of a run.
    fn end_reporter(&self, runner: &Runner, error: Option<&Error>) {
        let _ = (runner, error);
    }
}

/// Forwards every hook to each contained reporter, in order.
#[derive(Default)]
pub struct CompositeReporter {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl std::fmt::Debug for CompositeReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeReporter")
            .field("reporters_count", &self.reporters.len())
            .finish()
    }
}

impl CompositeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reporter to the composite.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Adds a reporter to the composite (mutable version).
    pub fn add_reporter(&mut self, reporter: Arc<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for CompositeReporter {
    fn start_tasks(&self, runner: &Runner) {
        for r in &self.reporters {
            r.start_tasks(runner);
        }
    }

    fn finish_tasks(&self, runner: &Runner) {
        for r in &self.reporters {
            r.finish_tasks(runner);
        }
    }

    fn start_handlers(&self, runner: &Runner) {
        for r in &self.reporters {
            r.start_handlers(runner);
        }
    }

    fn finish_handlers(&self, runner: &Runner) {
        for r in &self.reporters {
            r.finish_handlers(runner);
        }
    }

    fn start_task(&self, task: &Task, name: &str, args: &str, vars: &Vars) {
        for r in &self.reporters {
            r.start_task(task, name, args, vars);
        }
    }

    fn finish_task(&self, task: &Task, result: Option<&TaskResult>) {
        for r in &self.reporters {
            r.finish_task(task, result);
        }
    }

    fn finish_all(&self, runner: &Runner) {
        for r in &self.reporters {
            r.finish_all(runner);
        }
    }

    fn end_reporter(&self, runner: &Runner, error: Option<&Error>) {
        for r in &self.reporters {
            r.end_reporter(runner, error);
        }
    }
}
