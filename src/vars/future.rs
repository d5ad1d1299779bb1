//! Deferred task results.
//!
//! A [`Future`] wraps a computation that runs at most once. It is started
//! either explicitly by [`Future::spawn`] or implicitly by the first
//! [`Future::get`]; every later `get` returns the memoized outcome.
//! [`FutureScope`] binds futures to variable names so a template can read a
//! deferred task's result before the task has finished.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use super::scope::{NestedScope, Scope};
use crate::error::{Error, Result};
use crate::executor::task::TaskResult;
use crate::expr::{Value, Vars};

type Job<T> = Box<dyn FnOnce() -> Result<T> + Send>;

/// Observable lifecycle of a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Running,
    Ready,
    Failed,
}

enum Slot<T> {
    Pending(Job<T>),
    /// Holds the thread executing the job.
    Running(ThreadId),
    Ready(T),
    Failed(String),
}

/// A single-execution, memoized deferred computation.
pub struct Future<T> {
    name: String,
    slot: Mutex<Slot<T>>,
    settled: Condvar,
}

impl<T: Clone + Send + 'static> Future<T> {
    pub fn new<F>(name: impl Into<String>, job: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self {
            name: name.into(),
            slot: Mutex::new(Slot::Pending(Box::new(job))),
            settled: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> FutureState {
        match &*self.slot.lock() {
            Slot::Pending(_) => FutureState::Pending,
            Slot::Running(_) => FutureState::Running,
            Slot::Ready(_) => FutureState::Ready,
            Slot::Failed(_) => FutureState::Failed,
        }
    }

    /// Returns the outcome, executing the job on the calling thread if no
    /// one has started it yet, and blocking until it has settled.
    ///
    /// A job that reads its own future fails instead of waiting on itself.
    pub fn get(&self) -> Result<T> {
        if let Some(job) = self.claim() {
            self.execute(job);
        }

        let mut slot = self.slot.lock();
        loop {
            match &*slot {
                Slot::Ready(value) => return Ok(value.clone()),
                Slot::Failed(message) => {
                    return Err(Error::FutureFailed {
                        name: self.name.clone(),
                        message: message.clone(),
                    })
                }
                Slot::Running(owner) if *owner == thread::current().id() => {
                    return Err(Error::FutureFailed {
                        name: self.name.clone(),
                        message: "future reads its own result".to_string(),
                    })
                }
                Slot::Pending(_) | Slot::Running(_) => self.settled.wait(&mut slot),
            }
        }
    }

    /// Starts execution on a background thread without blocking.
    ///
    /// Does nothing if the future was already started. If no thread can be
    /// spawned the job stays pending and runs on the first `get`.
    pub fn spawn(self: &Arc<Self>) {
        if self.state() != FutureState::Pending {
            return;
        }
        let this = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("future-{}", self.name))
            .spawn(move || {
                let _ = this.get();
            });
        if let Err(e) = spawned {
            warn!(future = %self.name, error = %e, "Failed to spawn future thread");
        }
    }

    /// Transitions Pending to Running, handing the job to exactly one caller.
    fn claim(&self) -> Option<Job<T>> {
        let mut slot = self.slot.lock();
        if !matches!(*slot, Slot::Pending(_)) {
            return None;
        }
        match std::mem::replace(&mut *slot, Slot::Running(thread::current().id())) {
            Slot::Pending(job) => Some(job),
            _ => None,
        }
    }

    fn execute(&self, job: Job<T>) {
        debug!(future = %self.name, "Running future");
        let outcome = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(value)) => Slot::Ready(value),
            Ok(Err(e)) => Slot::Failed(e.to_string()),
            Err(_) => Slot::Failed("future body panicked".to_string()),
        };
        *self.slot.lock() = outcome;
        self.settled.notify_all();
    }
}

/// A nested scope that can also bind names to futures.
///
/// Reading a future-bound name blocks until the future settles and yields
/// its result as [`Value::Result`]; a failed future reads as a failed
/// result. Future bindings take precedence over plain variables.
pub struct FutureScope {
    inner: NestedScope,
    futures: RwLock<IndexMap<String, Arc<Future<TaskResult>>>>,
}

impl FutureScope {
    pub fn new(parent: Option<Arc<dyn Scope>>) -> Self {
        let inner = match parent {
            Some(parent) => NestedScope::with_parent(parent),
            None => NestedScope::new(),
        };
        Self {
            inner,
            futures: RwLock::new(IndexMap::new()),
        }
    }

    /// Registers a future under `name` without starting it.
    pub fn add_future<F>(&self, name: &str, job: F) -> Arc<Future<TaskResult>>
    where
        F: FnOnce() -> Result<TaskResult> + Send + 'static,
    {
        let future = Arc::new(Future::new(name, job));
        self.futures
            .write()
            .insert(name.to_string(), Arc::clone(&future));
        future
    }

    /// Returns the future bound to `name`, if any.
    pub fn future(&self, name: &str) -> Option<Arc<Future<TaskResult>>> {
        self.futures.read().get(name).cloned()
    }

    /// Names of the registered futures, in registration order.
    pub fn future_names(&self) -> Vec<String> {
        self.futures.read().keys().cloned().collect()
    }

    /// Blocks until every registered future has settled, then returns the
    /// first failure in registration order.
    pub fn wait(&self) -> Result<()> {
        let mut first_err = None;
        for (_, outcome) in self.results() {
            if let Err(e) = outcome {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Settles every future and returns each outcome with its name.
    pub fn results(&self) -> Vec<(String, Result<TaskResult>)> {
        // Snapshot first: a future body may register another future.
        let futures: Vec<_> = self
            .futures
            .read()
            .iter()
            .map(|(name, f)| (name.clone(), Arc::clone(f)))
            .collect();
        futures
            .into_iter()
            .map(|(name, future)| (name, future.get()))
            .collect()
    }

    /// Returns a copy of the plain variables bound in this scope.
    pub fn local(&self) -> Vars {
        self.inner.local()
    }
}

impl Scope for FutureScope {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(future) = self.future(key) {
            let result = future
                .get()
                .unwrap_or_else(|e| TaskResult::failed(e.to_string()));
            return Some(Value::from(result));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) {
        self.inner.set(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_runs_once_and_memoizes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let future = Future::new("f", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        });

        assert_eq!(future.state(), FutureState::Pending);
        assert_eq!(future.get().unwrap(), 7);
        assert_eq!(future.get().unwrap(), 7);
        assert_eq!(future.state(), FutureState::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_is_memoized() {
        let future: Future<i32> = Future::new("bad", || Err(Error::Config("boom".into())));
        assert!(matches!(future.get(), Err(Error::FutureFailed { .. })));
        assert_eq!(future.state(), FutureState::Failed);
        assert!(future.get().is_err());
    }

    #[test]
    fn test_panic_becomes_failure() {
        let future: Future<i32> = Future::new("p", || panic!("oops"));
        assert!(future.get().is_err());
    }

    #[test]
    fn test_job_reading_itself_fails_instead_of_waiting() {
        let scope = Arc::new(FutureScope::new(None));
        let inner = Arc::clone(&scope);
        let future = scope.add_future("r", move || {
            let Some(Value::Result(seen)) = inner.get("r") else {
                panic!("expected result");
            };
            Ok(TaskResult::ok().with("seen_failed", seen.failed))
        });

        let res = future.get().unwrap();
        assert_eq!(res.data.get("seen_failed"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_spawn_then_get() {
        let future = Arc::new(Future::new("slow", || {
            thread::sleep(Duration::from_millis(20));
            Ok("done".to_string())
        }));
        future.spawn();
        assert_eq!(future.get().unwrap(), "done");
    }

    #[test]
    fn test_scope_reads_future_as_result() {
        let scope = FutureScope::new(None);
        scope.add_future("r", || Ok(TaskResult::changed()));
        let Some(Value::Result(res)) = scope.get("r") else {
            panic!("expected result");
        };
        assert!(res.changed);
    }

    #[test]
    fn test_wait_reports_first_failure() {
        let scope = FutureScope::new(None);
        scope.add_future("ok", || Ok(TaskResult::ok()));
        scope.add_future("bad1", || Err(Error::Config("one".into())));
        scope.add_future("bad2", || Err(Error::Config("two".into())));

        match scope.wait() {
            Err(Error::FutureFailed { name, .. }) => assert_eq!(name, "bad1"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(scope.future("bad2").map(|f| f.state()), Some(FutureState::Failed));
    }

    #[test]
    fn test_failed_future_reads_as_failed_result() {
        let scope = FutureScope::new(None);
        scope.add_future("r", || Err(Error::Config("nope".into())));
        let value = scope.get("r").unwrap_or_default();
        assert!(!value.truthy());
    }
}
