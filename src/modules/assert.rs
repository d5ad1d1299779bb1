//! Assert module - Fail task if conditions are not met
//!
//! Each condition in `that` is an expression evaluated against the task's
//! scope (`(= port 80)`, `{{ r.Changed }}`); the task fails on the first
//! falsy one, with `msg` as the failure message when given.

use serde::{Deserialize, Deserializer};

use super::{deserialize_opt_string, Command, CommandEnv, CommandError, CommandResult};
use crate::executor::task::TaskResult;
use crate::expr::eval_string;

/// Module for asserting conditions are true
#[derive(Debug, Clone, Deserialize)]
pub struct AssertModule {
    /// Conditions; free-form argument text is a single condition
    #[serde(alias = "_raw", deserialize_with = "one_or_many")]
    pub that: Vec<String>,
    /// Failure message
    #[serde(default, alias = "fail_msg", deserialize_with = "deserialize_opt_string")]
    pub msg: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

impl Command for AssertModule {
    fn run(&self, env: &CommandEnv) -> CommandResult {
        if self.that.is_empty() {
            return Err(CommandError::InvalidParameter(
                "'that' requires at least one condition".to_string(),
            ));
        }

        for condition in &self.that {
            let value = eval_string(condition, env.scope.as_ref())?;
            if !value.truthy() {
                let message = self
                    .msg
                    .clone()
                    .unwrap_or_else(|| format!("Assertion failed: {}", condition));
                let result = TaskResult::failed(message.as_str())
                    .with("assertion", condition.as_str())
                    .with("evaluated_to", value);
                return Err(CommandError::failed_with(message, result));
            }
        }

        Ok(TaskResult::ok().with_msg("All assertions passed"))
    }
}
