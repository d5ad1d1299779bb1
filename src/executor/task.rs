//! Task descriptors and task results.
//!
//! This module provides:
//! - [`Task`], the static description of one step, with builder methods
//! - [`TaskResult`], the changed/failed outcome plus result data
//! - [`RunResult`], a finished task with its elapsed time

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::expr::{Value, Vars};

/// Result of executing a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Whether something was changed
    pub changed: bool,
    /// Whether the task failed
    pub failed: bool,
    /// Command-specific result data
    #[serde(default)]
    pub data: Vars,
}

impl TaskResult {
    /// Create a successful, unchanged result
    pub fn ok() -> Self {
        Self::default()
    }

    /// Create a changed result
    pub fn changed() -> Self {
        Self {
            changed: true,
            ..Default::default()
        }
    }

    /// Create a failed result carrying `msg`
    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            failed: true,
            ..Default::default()
        }
        .with_msg(msg)
    }

    /// Set a data field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Set the `msg` data field
    pub fn with_msg(self, msg: impl Into<String>) -> Self {
        self.with("msg", msg.into())
    }

    /// Looks up a data field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// The `msg` data field, if it is a string.
    pub fn msg(&self) -> Option<&str> {
        self.get("msg").and_then(Value::as_str)
    }

    /// Copy of this result with `Changed` and `Failed` mirrored into its
    /// data, as stored by `register`.
    pub fn registered(&self) -> Self {
        let mut res = self.clone();
        res.data.insert("Changed".into(), Value::Bool(self.changed));
        res.data.insert("Failed".into(), Value::Bool(self.failed));
        res
    }

    /// JSON object of the data fields plus `changed` and `failed`.
    pub fn to_json(&self) -> JsonValue {
        let mut obj: serde_json::Map<String, JsonValue> = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        obj.insert("changed".into(), JsonValue::Bool(self.changed));
        obj.insert("failed".into(), JsonValue::Bool(self.failed));
        JsonValue::Object(obj)
    }
}

/// A task to be executed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task name, may contain templates
    pub name: String,
    /// Command or module to run
    pub command: String,
    /// Raw argument text, may contain templates
    #[serde(default)]
    pub args: String,
    /// Structured arguments given at the call site
    #[serde(default)]
    pub vars: Vars,
    /// Variables from an `include`, checked before any other scope
    #[serde(default)]
    pub include_vars: Vars,
    /// Condition template
    #[serde(default)]
    pub when: Option<String>,
    /// Items to loop over, bound to `item`
    #[serde(default)]
    pub items: Option<Vec<Value>>,
    /// Handlers to notify on change
    #[serde(default)]
    pub notify: Vec<String>,
    /// Variable name to register the result under
    #[serde(default)]
    pub register: Option<String>,
    /// Run deferred, binding the result under this name
    #[serde(default)]
    pub future: Option<String>,
    /// Whether the task was declared `async`
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

impl Task {
    /// Create a new task with the given name and command
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    /// Set the raw argument text
    pub fn args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    /// Add a structured argument
    pub fn var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Set the when condition
    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.when = Some(condition.into());
        self
    }

    /// Set loop items
    pub fn items(mut self, items: Vec<Value>) -> Self {
        self.items = Some(items);
        self
    }

    /// Add a handler to notify
    pub fn notify(mut self, handler: impl Into<String>) -> Self {
        self.notify.push(handler.into());
        self
    }

    /// Set the register variable
    pub fn register(mut self, name: impl Into<String>) -> Self {
        self.register = Some(name.into());
        self
    }

    /// Run as a future bound under `name`
    pub fn future(mut self, name: impl Into<String>) -> Self {
        self.future = Some(name.into());
        self
    }

    /// Mark the task as asynchronous
    pub fn asynchronous(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    /// Set include variables
    pub fn include_vars(mut self, vars: Vars) -> Self {
        self.include_vars = vars;
        self
    }

    /// True if the task runs deferred.
    pub fn is_deferred(&self) -> bool {
        self.is_async || self.future.is_some()
    }
}

/// A finished task with its outcome and elapsed time.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub task: Task,
    pub result: TaskResult,
    pub runtime: Duration,
}
