//! Shared test utilities and fixtures for the playrun test suite.
//!
//! This module provides:
//! - A mock command that counts calls and records its parameters
//! - A reporter that records every hook it receives
//! - Builders for runners and temporary playbook directories
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use playrun::callback::Reporter;
use playrun::config::Config;
use playrun::error::{Error, Result};
use playrun::executor::{CommandEnv, Environment, Play, Playbook, Runner, SimplePath, Task, TaskResult};
use playrun::expr::{Value, Vars};
use playrun::modules::{Command, CommandError, CommandRegistry, CommandResult};

// ============================================================================
// Mock Command Implementation
// ============================================================================

/// Calls seen by every mock command bound from one registry.
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    calls: Arc<AtomicUsize>,
    params: Arc<Mutex<Vec<Vars>>>,
}

impl MockLog {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn params(&self) -> Vec<Vars> {
        self.params.lock().clone()
    }

    /// The `value` parameter of every call, in call order.
    pub fn values(&self) -> Vec<Value> {
        self.params()
            .iter()
            .map(|p| p.get("value").cloned().unwrap_or_default())
            .collect()
    }
}

/// A command driven entirely by its parameters:
///
/// - `changed=true` reports a change
/// - `fail=true` fails with a partial result
/// - `sleep_ms=N` sleeps before finishing
/// - `value=X` is echoed back as result data
pub struct MockCommand {
    params: Vars,
    log: MockLog,
}

impl MockCommand {
    fn flag(&self, key: &str) -> bool {
        self.params.get(key).map(Value::truthy).unwrap_or(false)
    }
}

impl Command for MockCommand {
    fn run(&self, _env: &CommandEnv) -> CommandResult {
        self.log.calls.fetch_add(1, Ordering::SeqCst);
        self.log.params.lock().push(self.params.clone());

        if let Some(Value::Int(ms)) = self.params.get("sleep_ms") {
            std::thread::sleep(Duration::from_millis(*ms as u64));
        }

        let mut res = if self.flag("changed") {
            TaskResult::changed()
        } else {
            TaskResult::ok()
        };
        if let Some(value) = self.params.get("value") {
            res = res.with("value", value.clone());
        }

        if self.flag("fail") {
            return Err(CommandError::failed_with("mock failure", res));
        }
        Ok(res)
    }
}

/// Built-in registry plus a `mock` command reporting to the returned log.
pub fn mock_registry() -> (CommandRegistry, MockLog) {
    let log = MockLog::default();
    let mut registry = CommandRegistry::with_builtins();
    let shared = log.clone();
    registry.register_binder("mock", move |_name, params| {
        Ok(Box::new(MockCommand {
            params: params.clone(),
            log: shared.clone(),
        }) as Box<dyn Command>)
    });
    (registry, log)
}

// ============================================================================
// Recording Reporter
// ============================================================================

/// One reporter hook invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StartTasks,
    FinishTasks,
    StartHandlers,
    FinishHandlers,
    /// Expanded task name
    StartTask(String),
    /// Declared task name and (changed, failed) when a result was given
    FinishTask(String, Option<(bool, bool)>),
    FinishAll,
    End(Option<String>),
}

/// Records every hook in call order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Position of the first event equal to `event`.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    /// Names passed to `start_task`, in order.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::StartTask(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl Reporter for RecordingReporter {
    fn start_tasks(&self, _runner: &Runner) {
        self.push(Event::StartTasks);
    }

    fn finish_tasks(&self, _runner: &Runner) {
        self.push(Event::FinishTasks);
    }

    fn start_handlers(&self, _runner: &Runner) {
        self.push(Event::StartHandlers);
    }

    fn finish_handlers(&self, _runner: &Runner) {
        self.push(Event::FinishHandlers);
    }

    fn start_task(&self, _task: &Task, name: &str, _args: &str, _vars: &Vars) {
        self.push(Event::StartTask(name.to_string()));
    }

    fn finish_task(&self, task: &Task, result: Option<&TaskResult>) {
        self.push(Event::FinishTask(
            task.name.clone(),
            result.map(|r| (r.changed, r.failed)),
        ));
    }

    fn finish_all(&self, _runner: &Runner) {
        self.push(Event::FinishAll);
    }

    fn end_reporter(&self, _runner: &Runner, error: Option<&Error>) {
        self.push(Event::End(error.map(|e| e.to_string())));
    }
}

// ============================================================================
// Runner Builders
// ============================================================================

/// Everything a runner test inspects afterwards.
pub struct Harness {
    pub runner: Runner,
    pub reporter: Arc<RecordingReporter>,
    pub log: MockLog,
}

impl Harness {
    /// Runs the plays with the mock registry and a recording reporter.
    pub fn new(plays: Vec<Play>) -> Self {
        Self::with_vars(plays, Vars::new())
    }

    /// Like [`Harness::new`], seeding the root scope with `vars`.
    pub fn with_vars(plays: Vec<Play>, vars: Vars) -> Self {
        let mut playbook = Playbook::new(".");
        for play in plays {
            playbook.add_play(play);
        }
        let (registry, log) = mock_registry();
        let env = test_environment(".").with_vars(&vars);
        let reporter = RecordingReporter::new();
        let runner = Runner::new(Arc::new(env), Arc::new(registry), playbook)
            .with_reporter(reporter.clone());
        Self {
            runner,
            reporter,
            log,
        }
    }

    pub fn run(&self) -> Result<()> {
        self.runner.run()
    }
}

/// A single play holding `tasks`.
pub fn play_with(name: &str, tasks: Vec<Task>) -> Play {
    let mut play = Play::new(name);
    for task in tasks {
        play.add_task(task);
    }
    play
}

/// A mock task with raw argument text.
pub fn mock(name: &str, args: &str) -> Task {
    Task::new(name, "mock").args(args)
}

pub fn test_environment(root: impl AsRef<Path>) -> Environment {
    Environment::new(
        Config::default(),
        Arc::new(SimplePath::new(root.as_ref().to_path_buf())),
    )
    .expect("environment")
}

// ============================================================================
// Temporary Playbook Directories
// ============================================================================

/// A temporary directory to write playbook files into.
pub struct TestContext {
    pub temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `content` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

pub fn assert_task_changed(result: &TaskResult) {
    assert!(!result.failed, "task failed: {:?}", result.msg());
    assert!(result.changed, "expected a change: {:?}", result);
}

pub fn assert_task_failed(result: &TaskResult) {
    assert!(result.failed, "expected failure: {:?}", result);
}
