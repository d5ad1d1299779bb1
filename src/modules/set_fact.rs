//! Set_fact module - Bind variables during a run
//!
//! Every `key=value` pair (and every structured var) is written into the
//! scope the task runs in, so later tasks can read it. Never reports a
//! change.

use serde::Deserialize;

use super::{Command, CommandEnv, CommandError, CommandResult, RAW_KEY};
use crate::executor::task::TaskResult;
use crate::expr::Vars;
use crate::vars::Scope;

/// Module for setting variables dynamically
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct SetFactModule {
    facts: Vars,
}

impl Command for SetFactModule {
    fn run(&self, env: &CommandEnv) -> CommandResult {
        if let Some(raw) = self.facts.get(RAW_KEY) {
            return Err(CommandError::InvalidParameter(format!(
                "set_fact takes key=value pairs, found '{}'",
                raw
            )));
        }
        if self.facts.is_empty() {
            return Err(CommandError::InvalidParameter(
                "set_fact requires at least one key=value pair".to_string(),
            ));
        }

        env.scope.extend(&self.facts);

        let mut result = TaskResult::ok();
        result.data = self.facts.clone();
        Ok(result)
    }
}
