//! The orchestration state machine.
//!
//! A [`Runner`] drives a [`Playbook`] through its phases:
//!
//! ```text
//! start_tasks
//!   per play: tasks in order (items, module calls, futures)
//! finish_tasks
//!   drain outstanding futures
//! [start_handlers
//!   per play: notified handlers, once each
//!  finish_handlers]
//! finish_all
//! end_reporter
//! ```
//!
//! The first error aborts the run. The failing task still gets its
//! `finish_task` report, with a synthetic failed result when the command
//! produced none, and `end_reporter` always closes the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::callback::{NullReporter, Reporter};
use crate::error::{Error, Result};
use crate::executor::environment::{CommandEnv, Environment};
use crate::executor::playbook::{Play, Playbook};
use crate::executor::task::{RunResult, Task, TaskResult};
use crate::expr::{eval_string, eval_template, expand_templates, ExprError, Value, Vars};
use crate::modules::{bind_params, CommandError, CommandRegistry};
use crate::vars::{Future, FutureScope, NestedScope, PriorityScope, Scope};

/// A deferred task waiting to be drained.
struct Deferred {
    task: Task,
    name: String,
    future: Arc<Future<TaskResult>>,
}

/// Per-play execution state.
struct PlayState<'a> {
    play: &'a Play,
    scope: Arc<FutureScope>,
    to_notify: IndexSet<String>,
    deferred: Vec<Deferred>,
}

impl<'a> PlayState<'a> {
    fn new(play: &'a Play, parent: Arc<dyn Scope>) -> Self {
        let scope = Arc::new(FutureScope::new(Some(parent)));
        scope.extend(&play.vars);
        Self {
            play,
            scope,
            to_notify: IndexSet::new(),
            deferred: Vec::new(),
        }
    }

    fn notify(&mut self, task: &Task) {
        for handler in &task.notify {
            if self.to_notify.insert(handler.clone()) {
                debug!(handler = %handler, "Handler notified");
            }
        }
    }
}

/// What has been reported for the task currently executing.
#[derive(Default)]
struct Trace {
    name: Option<String>,
    args: Option<String>,
    started: bool,
    finished: bool,
}

/// Runs a playbook against an [`Environment`].
pub struct Runner {
    env: Arc<Environment>,
    registry: Arc<CommandRegistry>,
    playbook: Playbook,
    reporter: Arc<dyn Reporter>,
    results: Arc<Mutex<Vec<RunResult>>>,
    run_id: Uuid,
    start: Mutex<DateTime<Utc>>,
    runtime: Mutex<Option<Duration>>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("run_id", &self.run_id)
            .field("plays", &self.playbook.plays.len())
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Creates a runner that reports nowhere.
    pub fn new(env: Arc<Environment>, registry: Arc<CommandRegistry>, playbook: Playbook) -> Self {
        Self {
            env,
            registry,
            playbook,
            reporter: Arc::new(NullReporter),
            results: Arc::new(Mutex::new(Vec::new())),
            run_id: Uuid::new_v4(),
            start: Mutex::new(Utc::now()),
            runtime: Mutex::new(None),
        }
    }

    /// Sets the report sink.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn playbook(&self) -> &Playbook {
        &self.playbook
    }

    /// When the current (or last) run started.
    pub fn start(&self) -> DateTime<Utc> {
        *self.start.lock()
    }

    /// Wall time of the last completed run.
    pub fn runtime(&self) -> Option<Duration> {
        *self.runtime.lock()
    }

    /// Every executed task, in completion order.
    pub fn results(&self) -> Vec<RunResult> {
        self.results.lock().clone()
    }

    /// Runs every play, then the notified handlers.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub fn run(&self) -> Result<()> {
        *self.start.lock() = Utc::now();
        self.results.lock().clear();
        let started = Instant::now();

        let outcome = self.run_phases();
        *self.runtime.lock() = Some(started.elapsed());

        match &outcome {
            Ok(()) => info!(elapsed = ?started.elapsed(), "Run finished"),
            Err(e) => warn!(error = %e, "Run aborted"),
        }
        self.reporter.end_reporter(self, outcome.as_ref().err());
        outcome
    }

    fn run_phases(&self) -> Result<()> {
        info!(plays = self.playbook.plays.len(), "Starting tasks");
        self.reporter.start_tasks(self);

        let mut states = Vec::with_capacity(self.playbook.plays.len());
        for play in &self.playbook.plays {
            let mut state = PlayState::new(play, Arc::clone(&self.env.vars));
            let outcome = self.run_play(&mut state);
            states.push(state);
            outcome?;
        }

        self.reporter.finish_tasks(self);

        for state in &mut states {
            self.drain(state)?;
        }

        let mut handlers_started = false;
        for state in &mut states {
            let play = state.play;
            for handler in &play.handlers {
                if !state.to_notify.contains(&handler.name) {
                    continue;
                }
                if !handlers_started {
                    info!("Running notified handlers");
                    self.reporter.start_handlers(self);
                    handlers_started = true;
                }
                debug!(handler = %handler.name, play = %play.name, "Running handler");
                let scope: Arc<dyn Scope> = state.scope.clone();
                self.run_task(state, handler, scope)?;
            }
            self.drain(state)?;
        }

        if handlers_started {
            self.reporter.finish_handlers(self);
        }
        self.reporter.finish_all(self);
        Ok(())
    }

    #[instrument(skip_all, fields(play = %state.play.name))]
    fn run_play(&self, state: &mut PlayState<'_>) -> Result<()> {
        info!(tasks = state.play.tasks.len(), "Starting play");
        let play = state.play;
        for task in &play.tasks {
            let scope: Arc<dyn Scope> = state.scope.clone();
            self.run_task(state, task, scope)?;
        }
        Ok(())
    }

    /// Waits for every future the play dispatched, reporting each and
    /// propagating its notifications.
    fn drain(&self, state: &mut PlayState<'_>) -> Result<()> {
        for deferred in std::mem::take(&mut state.deferred) {
            debug!(future = %deferred.future.name(), "Waiting for future");
            match deferred.future.get() {
                Ok(res) => {
                    self.reporter.finish_task(&deferred.task, Some(&res));
                    if res.changed {
                        state.notify(&deferred.task);
                    }
                }
                Err(e) => {
                    self.reporter
                        .finish_task(&deferred.task, Some(&TaskResult::failed(e.to_string())));
                    return Err(e.in_task(state.play.name.as_str(), deferred.name));
                }
            }
        }
        Ok(())
    }

    /// Runs one task, looping over its items. Returns whether anything
    /// changed.
    #[instrument(skip_all, fields(task = %task.name))]
    fn run_task(&self, state: &mut PlayState<'_>, task: &Task, scope: Arc<dyn Scope>) -> Result<bool> {
        if let Some(when) = task.when.as_deref().filter(|w| !w.trim().is_empty()) {
            let priority = PriorityScope::new(task.include_vars.clone(), Arc::clone(&scope));
            let cond = match eval_condition(when, &priority) {
                Ok(cond) => cond,
                Err(e) => {
                    let err = Error::from(e);
                    self.report_failure(task, &task.name, "", &err);
                    return Err(err.in_task(state.play.name.as_str(), task.name.as_str()));
                }
            };
            if !cond {
                debug!(when = %when, "Skipping task, condition is false");
                return Ok(false);
            }
        }

        let Some(items) = &task.items else {
            return self.run_single(state, task, scope);
        };

        let mut changed = false;
        for item in items {
            let item_scope = Arc::new(NestedScope::with_parent(Arc::clone(&scope)));
            item_scope.set("item", item.clone());
            changed |= self.run_single(state, task, item_scope)?;
        }
        Ok(changed)
    }

    /// Steps 3 to 9 for one task or item, reporting a synthetic failure
    /// for errors that happen before the command could report.
    fn run_single(&self, state: &mut PlayState<'_>, task: &Task, scope: Arc<dyn Scope>) -> Result<bool> {
        let mut trace = Trace::default();
        let outcome = self.execute(state, task, scope, &mut trace);

        outcome.map_err(|err| {
            let name = trace.name.unwrap_or_else(|| task.name.clone());
            if !trace.finished {
                if trace.started {
                    self.reporter
                        .finish_task(task, Some(&TaskResult::failed(err.to_string())));
                } else {
                    self.report_failure(task, &name, trace.args.as_deref().unwrap_or(""), &err);
                }
            }
            err.in_task(state.play.name.as_str(), name)
        })
    }

    fn report_failure(&self, task: &Task, name: &str, args: &str, err: &Error) {
        self.reporter.start_task(task, name, args, &Vars::new());
        self.reporter
            .finish_task(task, Some(&TaskResult::failed(err.to_string())));
    }

    fn execute(
        &self,
        state: &mut PlayState<'_>,
        task: &Task,
        scope: Arc<dyn Scope>,
        trace: &mut Trace,
    ) -> Result<bool> {
        let started = Instant::now();
        let priority: Arc<dyn Scope> =
            Arc::new(PriorityScope::new(task.include_vars.clone(), Arc::clone(&scope)));

        let name = expand_templates(&task.name, &priority)?;
        trace.name = Some(name.clone());
        let args = expand_templates(&task.args, &priority)?;
        trace.args = Some(args.clone());
        let vars = self.expand_vars(&task.vars, &priority)?;

        let play = state.play;
        if let Some(module) = play.module(&task.command) {
            if task.future.is_some() || task.is_async {
                return Err(Error::invalid_task(name, "a module call cannot run deferred"));
            }
            let params = bind_params(&task.command, &args, &vars)?;
            debug!(module = %module.name, "Calling module");
            self.reporter.start_task(task, &name, &args, &params);
            trace.started = true;

            let module_scope = Arc::new(NestedScope::with_parent(Arc::clone(&priority)));
            module_scope.extend(&params);
            let mut changed = false;
            for sub in &module.tasks {
                changed |= self.run_task(state, sub, module_scope.clone())?;
            }

            let res = if changed {
                TaskResult::changed()
            } else {
                TaskResult::ok()
            };
            self.complete(state, task, res, started, trace);
            return Ok(changed);
        }

        let params = bind_params(&task.command, &args, &vars)?;
        let cmd = self.registry.bind_vars(&task.command, &params)?;
        self.reporter.start_task(task, &name, &args, &params);
        trace.started = true;

        let cmd_env = CommandEnv::new(
            Arc::clone(&priority),
            Arc::clone(&self.reporter),
            Arc::clone(&self.env),
            task.clone(),
        );

        let deferred_name = task
            .future
            .clone()
            .or_else(|| task.is_async.then(|| name.clone()));
        if let Some(future_name) = deferred_name {
            let results = Arc::clone(&self.results);
            let job_task = task.clone();
            let future = state.scope.add_future(&future_name, move || {
                let outcome = cmd.run(&cmd_env);
                let result = match &outcome {
                    Ok(res) => res.clone(),
                    Err(e) => failure_result(e),
                };
                results.lock().push(RunResult {
                    task: job_task,
                    result,
                    runtime: started.elapsed(),
                });
                outcome.map_err(Error::from)
            });
            future.spawn();
            debug!(future = %future_name, "Dispatched deferred task");

            self.reporter.finish_task(task, None);
            trace.finished = true;
            state.deferred.push(Deferred {
                task: task.clone(),
                name,
                future,
            });
            return Ok(false);
        }

        debug!(command = %task.command, "Running command");
        match cmd.run(&cmd_env) {
            Ok(res) => {
                let changed = res.changed;
                self.complete(state, task, res, started, trace);
                Ok(changed)
            }
            Err(e) => {
                let res = failure_result(&e);
                self.complete(state, task, res, started, trace);
                Err(Error::Command(e))
            }
        }
    }

    /// Registers, records and reports a finished task, and propagates its
    /// notifications when it changed something.
    fn complete(
        &self,
        state: &mut PlayState<'_>,
        task: &Task,
        res: TaskResult,
        started: Instant,
        trace: &mut Trace,
    ) {
        if let Some(register) = &task.register {
            state.scope.set(register, Value::from(res.registered()));
        }

        self.results.lock().push(RunResult {
            task: task.clone(),
            result: res.clone(),
            runtime: started.elapsed(),
        });

        self.reporter.finish_task(task, Some(&res));
        trace.finished = true;

        if !res.failed && res.changed {
            state.notify(task);
        }
    }

    /// Template-expands the string values of call-site vars.
    fn expand_vars(&self, vars: &Vars, scope: &Arc<dyn Scope>) -> Result<Vars> {
        vars.iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => Value::String(expand_templates(text, scope)?),
                    other => other.clone(),
                };
                Ok((key.clone(), value))
            })
            .collect()
    }
}

/// The result to record for a failed command: its partial result marked
/// failed, or a synthetic one carrying the message.
fn failure_result(err: &CommandError) -> TaskResult {
    match err.result() {
        Some(partial) => {
            let mut res = partial.clone();
            res.failed = true;
            if res.msg().is_none() {
                res = res.with_msg(err.to_string());
            }
            res
        }
        None => TaskResult::failed(err.to_string()),
    }
}

/// Evaluates a `when` condition.
///
/// Templates and bare `(...)` or `[...]` forms go through the expression
/// language; any other text is a raw string judged by `boolify`, so
/// `when: no` skips and `when: yes` runs.
fn eval_condition(when: &str, scope: &dyn Scope) -> std::result::Result<bool, ExprError> {
    let text = when.trim();
    let value = if text.contains("{{") || text.starts_with('(') || text.starts_with('[') {
        eval_string(text, scope)?
    } else {
        eval_template(text, scope)?
    };
    Ok(value.truthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::executor::environment::SimplePath;
    use crate::modules::BindError;

    fn runner(play: Play) -> Runner {
        let env = Environment::new(Config::default(), Arc::new(SimplePath::new("."))).unwrap();
        let mut book = Playbook::new(".");
        book.add_play(play);
        Runner::new(Arc::new(env), Arc::new(CommandRegistry::with_builtins()), book)
    }

    #[test]
    fn test_register_and_template() {
        let mut play = Play::new("p");
        play.set_var("who", "world");
        play.add_task(Task::new("greet {{ who }}", "debug").args("msg=hi").register("out"));
        play.add_task(Task::new("check", "assert").var("that", "(= out.msg \"hi\")"));

        let runner = runner(play);
        runner.run().unwrap();

        let results = runner.results();
        assert_eq!(results.len(), 2);
        assert!(!results[1].result.failed);
    }

    #[test]
    fn test_when_false_skips() {
        let mut play = Play::new("p");
        play.add_task(Task::new("never", "assert").args("that=false").when("(= 1 2)"));

        let runner = runner(play);
        runner.run().unwrap();
        assert!(runner.results().is_empty());
    }

    #[test]
    fn test_failure_wraps_context() {
        let mut play = Play::new("web");
        play.add_task(Task::new("bad {{ 1 }}", "nope"));

        let err = runner(play).run().unwrap_err();
        match err {
            Error::Task { play, task, source } => {
                assert_eq!(play, "web");
                assert_eq!(task, "bad 1");
                assert!(matches!(*source, Error::Bind(BindError::UnknownCommand(_))));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_module_future_rejected() {
        let mut play = Play::new("p");
        let mut module = crate::executor::playbook::Module::new("greet");
        module.add_task(Task::new("say", "debug").args("msg=hi"));
        play.add_module(module);
        play.add_task(Task::new("call", "greet").future("f"));

        let err = runner(play).run().unwrap_err();
        assert!(matches!(err.root(), Error::InvalidTask { .. }));
    }
}
