//! In-memory record of a run.
//!
//! [`StructReporter`] prints nothing. It collects a [`RunRecord`] that a
//! caller can take with [`StructReporter::snapshot`] and serialize, e.g. to
//! ship a run summary elsewhere.

use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::super::Reporter;
use crate::executor::runner::Runner;
use crate::executor::task::{Task, TaskResult};
use crate::expr::Vars;

/// Maximum number of task entries kept per run
pub const MAX_TASK_RECORDS: usize = 500;

/// One started task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub name: String,
    pub command: String,
    pub args: String,
    pub vars: Vars,
    /// Seconds from run start until the task finished
    pub finished_secs: Option<f64>,
    pub result: Option<TaskResult>,
}

/// Summary of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunRecord {
    pub hostname: String,
    pub start: Option<DateTime<Utc>>,
    /// Seconds until the task phase finished
    pub tasks_finish_secs: Option<f64>,
    /// Seconds until the run finished
    pub finish_secs: Option<f64>,
    /// Tasks started, including those past the record limit
    pub task_count: usize,
    pub tasks: Vec<TaskRecord>,
}

#[derive(Default)]
struct State {
    record: RunRecord,
    started: Option<Instant>,
    // Tasks started but not finished, with their entry index
    pending: Vec<(Task, usize)>,
}

impl State {
    fn elapsed(&self) -> Option<f64> {
        self.started.map(|s| s.elapsed().as_secs_f64())
    }
}

/// Collects a [`RunRecord`].
#[derive(Default)]
pub struct StructReporter {
    state: Mutex<State>,
}

impl std::fmt::Debug for StructReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructReporter")
            .field("task_count", &self.state.lock().record.task_count)
            .finish()
    }
}

impl StructReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the record collected so far.
    pub fn snapshot(&self) -> RunRecord {
        self.state.lock().record.clone()
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Reporter for StructReporter {
    fn start_tasks(&self, runner: &Runner) {
        let mut state = self.state.lock();
        *state = State {
            record: RunRecord {
                hostname: local_hostname(),
                start: Some(runner.start()),
                ..Default::default()
            },
            started: Some(Instant::now()),
            pending: Vec::new(),
        };
    }

    fn finish_tasks(&self, _runner: &Runner) {
        let mut state = self.state.lock();
        state.record.tasks_finish_secs = state.elapsed();
    }

    fn start_task(&self, task: &Task, name: &str, args: &str, vars: &Vars) {
        let mut state = self.state.lock();
        state.record.task_count += 1;
        if state.record.tasks.len() >= MAX_TASK_RECORDS {
            return;
        }
        let idx = state.record.tasks.len();
        state.record.tasks.push(TaskRecord {
            name: name.to_string(),
            command: task.command.clone(),
            args: args.to_string(),
            vars: vars.clone(),
            finished_secs: None,
            result: None,
        });
        state.pending.push((task.clone(), idx));
    }

    fn finish_task(&self, task: &Task, result: Option<&TaskResult>) {
        let Some(res) = result else {
            return;
        };
        let mut state = self.state.lock();
        let Some(pos) = state.pending.iter().rposition(|(t, _)| t == task) else {
            return;
        };
        let (_, idx) = state.pending.remove(pos);
        let finished = state.elapsed();
        if let Some(entry) = state.record.tasks.get_mut(idx) {
            entry.result = Some(res.clone());
            entry.finished_secs = finished;
        }
    }

    fn finish_all(&self, _runner: &Runner) {
        let mut state = self.state.lock();
        state.record.finish_secs = state.elapsed();
    }
}
