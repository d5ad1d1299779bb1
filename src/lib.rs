//! # playrun - a playbook runner for local commands
//!
//! playrun reads a YAML playbook of plays, each holding tasks, handlers and
//! reusable task modules, and runs the tasks in order on the local machine.
//! Task names, arguments and conditions are written in a small embedded
//! expression language; tasks may loop over items, register their results,
//! notify handlers, or run in the background as futures that later tasks
//! read by name.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                CLI (clap)                     │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │      Parser (YAML -> Playbook/Play/Task)      │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │  Runner (items, when, notify, futures,        │
//! │          handlers)  ──────►  Reporter         │
//! └──────────────────────────────────────────────┘
//!          │                          │
//!          ▼                          ▼
//! ┌──────────────────┐   ┌──────────────────────┐
//! │ Command registry │   │ Expression language   │
//! │ (shell, debug..) │   │ over Scopes/Futures   │
//! └──────────────────┘   └──────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use playrun::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let playbook = playrun::parser::load_playbook("site.yml")?;
//!     let env = Environment::new(Config::default(), Arc::new(SimplePath::new(".")))?;
//!
//!     let runner = Runner::new(
//!         Arc::new(env),
//!         Arc::new(CommandRegistry::with_builtins()),
//!         playbook,
//!     )
//!     .with_reporter(Arc::new(CliReporter::new()));
//!     runner.run()
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::callback::{
        CliReporter, CompositeReporter, JsonChunkReporter, NullReporter, Reporter,
        StructReporter,
    };
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::executor::{
        CommandEnv, Environment, Module, Play, Playbook, Runner, SimplePath, Task, TaskResult,
    };
    pub use crate::expr::{eval_string, Value, Vars};
    pub use crate::modules::{Command, CommandError, CommandRegistry};
    pub use crate::vars::{FutureScope, NestedScope, Scope};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// The embedded expression language: tokenizer, parser, evaluator and
/// the dynamic [`Value`](expr::Value) type.
pub mod expr;

/// Variable scopes and futures.
pub mod vars;

// ============================================================================
// Execution
// ============================================================================

/// Tasks, plays, the runner and the environment commands execute in.
pub mod executor;

/// Built-in commands and the registry that binds task arguments to them.
pub mod modules;

/// YAML playbook loading.
pub mod parser;

/// Progress reporting sinks.
pub mod callback;

/// Configuration loading.
pub mod config;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of playrun.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
