//! Core execution engine for playrun
//!
//! This module provides:
//! - the task, play and playbook descriptors
//! - the [`Runner`] that sequences tasks, items, futures and handlers
//! - the [`Environment`] a run executes in, and ad-hoc single commands

pub mod environment;
pub mod playbook;
pub mod runner;
pub mod task;

pub use environment::{run_adhoc_task, CommandEnv, Environment, Paths, SimplePath};
pub use playbook::{Module, Play, Playbook};
pub use runner::Runner;
pub use task::{RunResult, Task, TaskResult};
