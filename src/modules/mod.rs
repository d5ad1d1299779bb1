//! Command system for playrun
//!
//! This module provides the [`Command`] trait, the errors commands and
//! binding can raise, and the [`CommandRegistry`] that turns a task's
//! command name and argument text into a runnable command.
//!
//! # Binding
//!
//! Leading `key=value` words of the argument text become parameters,
//! unquoted with shell rules (values inferred as int, float or bool where
//! they parse); everything from the first plain word onwards is kept
//! verbatim as free-form text under `_raw`. The task's structured `vars`
//! are merged on top and the result is deserialized into the command's
//! struct.
//!
//! ```text
//! chdir=/tmp echo "a b"   ->  {"chdir": "/tmp", "_raw": "echo \"a b\""}
//! msg=hello count=3       ->  {"msg": "hello", "count": 3}
//! ```

pub mod assert;
pub mod command;
pub mod debug;
pub mod set_fact;
pub mod shell;

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub use crate::executor::environment::CommandEnv;
use crate::executor::task::TaskResult;
use crate::expr::{ExprError, Value, Vars};

/// Key under which free-form argument text is passed to commands
pub const RAW_KEY: &str = "_raw";

/// Errors raised by a running command
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command ran and reported failure, possibly with partial output
    #[error("{message}")]
    Failed {
        message: String,
        result: Option<Box<TaskResult>>,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Expression error: {0}")]
    Expr(#[from] ExprError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            result: None,
        }
    }

    /// A failure that carries the result the command produced.
    pub fn failed_with(message: impl Into<String>, result: TaskResult) -> Self {
        Self::Failed {
            message: message.into(),
            result: Some(Box::new(result)),
        }
    }

    /// The partial result attached to the failure, if any.
    pub fn result(&self) -> Option<&TaskResult> {
        match self {
            Self::Failed { result, .. } => result.as_deref(),
            _ => None,
        }
    }
}

/// Errors raised while turning argument text into a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid arguments for '{command}': {message}")]
    InvalidArgs { command: String, message: String },
}

/// Result type for command execution
pub type CommandResult = Result<TaskResult, CommandError>;

/// Trait that all commands must implement
pub trait Command: Send + Sync {
    /// Runs the command against the given environment.
    fn run(&self, env: &CommandEnv) -> CommandResult;
}

type Binder = Box<dyn Fn(&str, &Vars) -> Result<Box<dyn Command>, BindError> + Send + Sync>;

/// Splits argument text into leading `key=value` pairs and trailing
/// free-form text (stored under [`RAW_KEY`]).
///
/// Pair values are unquoted with shell rules. The free-form tail is kept
/// exactly as written so shell syntax such as pipes survives.
pub fn parse_simple_map(text: &str) -> Result<Vars, String> {
    let mut vars = Vars::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let end = word_end(rest)?;
        let word = &rest[..end];
        let pair = match word.split_once('=') {
            Some((key, _)) if is_key(key) => shell_words::split(word)
                .map_err(|e| e.to_string())?
                .pop()
                .and_then(|w| w.split_once('=').map(|(k, v)| (k.to_string(), v.to_string()))),
            _ => None,
        };
        match pair {
            Some((key, value)) => {
                vars.insert(key, Value::infer(&value));
                rest = rest[end..].trim_start();
            }
            None => break,
        }
    }

    let rest = rest.trim_end();
    if !rest.is_empty() {
        vars.insert(RAW_KEY.to_string(), Value::String(rest.to_string()));
    }
    Ok(vars)
}

/// Byte offset where the first shell word of `text` ends.
fn word_end(text: &str) -> Result<usize, String> {
    let mut single = false;
    let mut double = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if !single => escaped = true,
            '\'' if !double => single = !single,
            '"' if !single => double = !double,
            c if c.is_whitespace() && !single && !double => return Ok(i),
            _ => {}
        }
    }
    if single || double || escaped {
        return Err("missing closing quote".to_string());
    }
    Ok(text.len())
}

fn is_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Registry for binding command names to commands
pub struct CommandRegistry {
    binders: HashMap<String, Binder>,
}

impl CommandRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            binders: HashMap::new(),
        }
    }

    /// Create a registry with all built-in commands
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register::<command::CommandModule>("command");
        registry.register::<shell::ShellModule>("shell");

        registry.register::<assert::AssertModule>("assert");
        registry.register::<debug::DebugModule>("debug");
        registry.register::<set_fact::SetFactModule>("set_fact");

        registry
    }

    /// Register a command type that deserializes from its parameters
    pub fn register<T>(&mut self, name: &str)
    where
        T: Command + DeserializeOwned + 'static,
    {
        self.register_binder(name, |command, params| {
            serde_json::from_value::<T>(Value::Map(params.clone()).to_json())
                .map(|c| Box::new(c) as Box<dyn Command>)
                .map_err(|e| BindError::InvalidArgs {
                    command: command.to_string(),
                    message: e.to_string(),
                })
        });
    }

    /// Register a custom binder
    pub fn register_binder<F>(&mut self, name: &str, binder: F)
    where
        F: Fn(&str, &Vars) -> Result<Box<dyn Command>, BindError> + Send + Sync + 'static,
    {
        self.binders.insert(name.to_string(), Box::new(binder));
    }

    /// Check if a command exists
    pub fn contains(&self, name: &str) -> bool {
        self.binders.contains_key(name)
    }

    /// Get all command names
    pub fn names(&self) -> Vec<&str> {
        self.binders.keys().map(|s| s.as_str()).collect()
    }

    /// Binds `name` to a command from expanded argument text and the task's
    /// structured vars. Vars win over same-named pairs in the text.
    pub fn bind(&self, name: &str, args: &str, vars: &Vars) -> Result<Box<dyn Command>, BindError> {
        let params = bind_params(name, args, vars)?;
        self.bind_vars(name, &params)
    }

    /// Binds `name` to a command from already merged parameters.
    pub fn bind_vars(&self, name: &str, params: &Vars) -> Result<Box<dyn Command>, BindError> {
        let binder = self
            .binders
            .get(name)
            .ok_or_else(|| BindError::UnknownCommand(name.to_string()))?;
        binder(name, params)
    }
}

/// Merges the `key=value` pairs of `args` with `vars`, vars winning.
pub fn bind_params(command: &str, args: &str, vars: &Vars) -> Result<Vars, BindError> {
    let mut params = parse_simple_map(args).map_err(|message| BindError::InvalidArgs {
        command: command.to_string(),
        message,
    })?;
    params.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(params)
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Shared handle to a registry
pub type SharedRegistry = Arc<CommandRegistry>;

/// Deserializes any scalar as its string form.
pub(crate) fn deserialize_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(v @ (JsonValue::Bool(_) | JsonValue::Number(_))) => Ok(Some(v.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string, found {}",
            other
        ))),
    }
}
