//! Error types for playrun.
//!
//! Every subsystem owns a narrow error enum (`expr::ExprError`,
//! `modules::BindError`, `modules::CommandError`); this module defines the
//! crate-level [`Error`] that the runner surfaces to its caller, wrapping the
//! narrow errors with play/task context where it is known.

use std::path::PathBuf;
use thiserror::Error;

use crate::expr::ExprError;
use crate::modules::{BindError, CommandError};

/// Result type alias for playrun operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for playrun.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Expression Errors
    // ========================================================================
    /// Template expansion, parsing or evaluation failed.
    #[error(transparent)]
    Expr(#[from] ExprError),

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// Argument text could not be bound to a command.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// A command reported its own failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    // ========================================================================
    // Run Errors
    // ========================================================================
    /// A task failed; wraps the underlying error with its location.
    #[error("Task '{task}' in play '{play}' failed: {source}")]
    Task {
        /// Play name
        play: String,
        /// Task name (as resolved, when resolution got that far)
        task: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// A deferred task settled with an error.
    #[error("Future '{name}' failed: {message}")]
    FutureFailed {
        /// Binding name of the future
        name: String,
        /// Error message reported by the future body
        message: String,
    },

    /// The task descriptor cannot be executed as written.
    #[error("Invalid task '{task}': {message}")]
    InvalidTask {
        /// Task name
        task: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Playbook Errors
    // ========================================================================
    /// Error parsing a playbook file.
    #[error("Failed to parse playbook '{}': {}", .path.display(), .message)]
    PlaybookParse {
        /// Path to the playbook file
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Error {
    /// Wraps an error with the play and task it occurred in.
    ///
    /// Errors that already carry task context are returned unchanged, so a
    /// failure inside a module sub-task keeps its innermost location.
    pub fn in_task(self, play: impl Into<String>, task: impl Into<String>) -> Self {
        match self {
            Error::Task { .. } => self,
            other => Error::Task {
                play: play.into(),
                task: task.into(),
                source: Box::new(other),
            },
        }
    }

    /// Creates a new playbook parse error.
    pub fn playbook_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PlaybookParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid task error.
    pub fn invalid_task(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTask {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Returns the innermost error, looking through task context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Task { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self.root() {
            Error::Command(_) | Error::FutureFailed { .. } => 2,
            Error::Expr(_) | Error::Bind(_) | Error::InvalidTask { .. } => 3,
            Error::PlaybookParse { .. } | Error::YamlParse(_) => 4,
            Error::Config(_) => 5,
            _ => 1,
        }
    }
}
