//! Debug module - Print debug messages and variable values
//!
//! Runs entirely in-process. With `msg` the message is returned as the
//! result's `msg`; with `var` the named variable (a dotted path such as
//! `out.stdout` is allowed) is returned under its own name.

use serde::Deserialize;

use super::{deserialize_opt_string, Command, CommandEnv, CommandError, CommandResult};
use crate::executor::task::TaskResult;
use crate::expr::eval::resolve;
use crate::expr::{EvalError, Value};

/// Placeholder reported for a `var` that does not resolve
const UNDEFINED: &str = "VARIABLE IS NOT DEFINED!";

/// Module for printing debug messages and variable values
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugModule {
    /// Message to report; free-form argument text lands here
    #[serde(default, alias = "_raw", deserialize_with = "deserialize_opt_string")]
    pub msg: Option<String>,
    /// Variable to report
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub var: Option<String>,
}

impl Command for DebugModule {
    fn run(&self, env: &CommandEnv) -> CommandResult {
        match (&self.var, &self.msg) {
            (Some(_), Some(_)) => Err(CommandError::InvalidParameter(
                "'msg' and 'var' are mutually exclusive".to_string(),
            )),
            (Some(var), None) => {
                let value = match resolve(var, env.scope.as_ref()) {
                    Ok(value) => value,
                    Err(EvalError::Undefined(_)) => Value::from(UNDEFINED),
                    Err(e) => return Err(CommandError::Expr(e.into())),
                };
                Ok(TaskResult::ok().with(var.as_str(), value))
            }
            (None, Some(msg)) => Ok(TaskResult::ok().with_msg(msg.as_str())),
            (None, None) => Ok(TaskResult::ok().with_msg("Hello world!")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Vars;
    use crate::modules::CommandRegistry;
    use crate::test_support::command_env_with;

    fn run(args: &str, vars: Vars) -> CommandResult {
        let env = command_env_with(vars);
        CommandRegistry::with_builtins()
            .bind("debug", args, &Vars::new())
            .unwrap()
            .run(&env)
    }

    #[test]
    fn test_debug_msg() {
        let result = run("msg=hi", Vars::new()).unwrap();
        assert!(!result.changed);
        assert_eq!(result.msg(), Some("hi"));

        let result = run("free form text", Vars::new()).unwrap();
        assert_eq!(result.msg(), Some("free form text"));
    }

    #[test]
    fn test_debug_var_path() {
        let mut out = Vars::new();
        out.insert("stdout".into(), Value::from("done"));
        let mut vars = Vars::new();
        vars.insert("out".into(), Value::Map(out));

        let result = run("var=out.stdout", vars).unwrap();
        assert_eq!(result.get("out.stdout"), Some(&Value::from("done")));
    }

    #[test]
    fn test_debug_undefined_var() {
        let result = run("var=missing", Vars::new()).unwrap();
        assert_eq!(result.get("missing"), Some(&Value::from(UNDEFINED)));
    }

    #[test]
    fn test_debug_default_message() {
        assert_eq!(run("", Vars::new()).unwrap().msg(), Some("Hello world!"));
    }
}
