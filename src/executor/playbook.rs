//! Play and playbook descriptors.
//!
//! This module provides:
//! - [`Module`]: a named, reusable list of tasks spliced in at call sites
//! - [`Play`]: tasks, handlers, modules and play vars
//! - [`Playbook`]: ordered plays plus the directory relative paths resolve against

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::executor::task::Task;
use crate::expr::{Value, Vars};

/// A reusable task list invoked like a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }
}

/// A play: an ordered task list with its handlers and variables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Play {
    /// Play name
    pub name: String,
    /// Tasks, in execution order
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Handlers, run once each when notified
    #[serde(default)]
    pub handlers: Vec<Task>,
    /// Modules callable from this play's tasks
    #[serde(default)]
    pub modules: IndexMap<String, Module>,
    /// Play variables
    #[serde(default)]
    pub vars: Vars,
}

impl Play {
    /// Create a new empty play
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a task to the play
    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Add a handler to the play
    pub fn add_handler(&mut self, handler: Task) {
        self.handlers.push(handler);
    }

    /// Add a module to the play
    pub fn add_module(&mut self, module: Module) {
        self.modules.insert(module.name.clone(), module);
    }

    /// Set a play variable
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Looks up the module a command name refers to.
    pub fn module(&self, command: &str) -> Option<&Module> {
        self.modules.get(command)
    }
}

/// A complete playbook containing multiple plays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    /// Plays, in execution order
    #[serde(default)]
    pub plays: Vec<Play>,
    /// Directory relative file references resolve against
    #[serde(default)]
    pub base_dir: PathBuf,
}

impl Playbook {
    /// Create a new empty playbook rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            plays: Vec::new(),
            base_dir: base_dir.into(),
        }
    }

    /// Add a play to the playbook
    pub fn add_play(&mut self, play: Play) {
        self.plays.push(play);
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Total number of tasks across all plays, handlers excluded.
    pub fn task_count(&self) -> usize {
        self.plays.iter().map(|p| p.tasks.len()).sum()
    }
}
