//! Command module - Execute arbitrary commands
//!
//! This module executes commands directly without going through a shell.
//! For shell commands (pipes, redirects, etc.), use the shell module.
//!
//! The process plumbing shared with the shell module lives here too:
//! `creates`/`removes` guards, `chdir`, and turning process output into a
//! result with `rc`, `stdout` and `stderr`.

use std::process::Command as Process;

use serde::Deserialize;
use tracing::debug;

use super::{deserialize_opt_string, Command, CommandEnv, CommandError, CommandResult};
use crate::executor::task::TaskResult;

/// Parameters shared by process-running commands.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecParams {
    /// Command line; free-form argument text lands here
    #[serde(default, alias = "_raw", deserialize_with = "deserialize_opt_string")]
    pub cmd: Option<String>,
    /// Explicit argument vector, used instead of splitting `cmd`
    #[serde(default)]
    pub argv: Option<Vec<String>>,
    /// Working directory
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub chdir: Option<String>,
    /// Skip when this path exists
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub creates: Option<String>,
    /// Skip unless this path exists
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub removes: Option<String>,
}

impl ExecParams {
    /// Returns an unchanged result when a `creates`/`removes` guard says
    /// the command should not run.
    pub(crate) fn skip_result(&self, env: &CommandEnv) -> Option<TaskResult> {
        if let Some(creates) = &self.creates {
            if env.paths().file(creates).exists() {
                return Some(TaskResult::ok().with_msg(format!("Skipped, '{}' exists", creates)));
            }
        }

        if let Some(removes) = &self.removes {
            if !env.paths().file(removes).exists() {
                return Some(
                    TaskResult::ok().with_msg(format!("Skipped, '{}' does not exist", removes)),
                );
            }
        }

        None
    }

    /// The command line, or an error naming the missing parameter.
    pub(crate) fn cmd(&self) -> Result<&str, CommandError> {
        match self.cmd.as_deref().map(str::trim) {
            Some(cmd) if !cmd.is_empty() => Ok(cmd),
            _ => Err(CommandError::InvalidParameter(
                "'cmd' or free-form command text is required".to_string(),
            )),
        }
    }

    /// Runs `process` and converts its output into a result.
    ///
    /// A zero exit status is a changed result; anything else is a failure
    /// carrying the same data.
    pub(crate) fn execute(
        &self,
        mut process: Process,
        shown: &str,
        env: &CommandEnv,
    ) -> CommandResult {
        // Relative to the playbook directory, which is also the default.
        process.current_dir(env.paths().file(self.chdir.as_deref().unwrap_or(".")));

        debug!(command = %shown, "Executing process");
        let output = process.output().map_err(|e| {
            CommandError::failed(format!("Failed to execute '{}': {}", shown, e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let rc = output.status.code().unwrap_or(-1);

        let result = TaskResult::changed()
            .with("rc", i64::from(rc))
            .with("stdout", stdout.trim_end_matches('\n'))
            .with("stderr", stderr.trim_end_matches('\n'));

        if output.status.success() {
            Ok(result)
        } else {
            let mut failed = result;
            failed.failed = true;
            Err(CommandError::failed_with(
                format!("'{}' exited with code {}", shown, rc),
                failed,
            ))
        }
    }
}

/// Module for executing commands directly
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct CommandModule {
    params: ExecParams,
}

impl CommandModule {
    fn argv(&self) -> Result<Vec<String>, CommandError> {
        let argv = match &self.params.argv {
            Some(argv) => argv.clone(),
            None => shell_words::split(self.params.cmd()?)
                .map_err(|e| CommandError::InvalidParameter(e.to_string()))?,
        };
        if argv.is_empty() {
            return Err(CommandError::InvalidParameter(
                "argv cannot be empty".to_string(),
            ));
        }
        Ok(argv)
    }
}

impl Command for CommandModule {
    fn run(&self, env: &CommandEnv) -> CommandResult {
        if let Some(skipped) = self.params.skip_result(env) {
            return Ok(skipped);
        }

        let argv = self.argv()?;
        let mut process = Process::new(&argv[0]);
        process.args(&argv[1..]);

        self.params
            .execute(process, &shell_words::join(&argv), env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Value, Vars};
    use crate::modules::CommandRegistry;
    use crate::test_support::command_env;

    fn bind(args: &str) -> Box<dyn Command> {
        CommandRegistry::with_builtins()
            .bind("command", args, &Vars::new())
            .unwrap()
    }

    #[test]
    fn test_command_echo() {
        let env = command_env();
        let result = bind(r#"echo "hello world""#).run(&env).unwrap();

        assert!(result.changed);
        assert_eq!(result.get("rc"), Some(&Value::Int(0)));
        assert_eq!(result.get("stdout"), Some(&Value::from("hello world")));
    }

    #[test]
    fn test_command_with_argv() {
        let env = command_env();
        let mut vars = Vars::new();
        vars.insert(
            "argv".into(),
            Value::List(vec![Value::from("echo"), Value::from("a|b")]),
        );
        let cmd = CommandRegistry::with_builtins()
            .bind("command", "", &vars)
            .unwrap();

        let result = cmd.run(&env).unwrap();
        assert_eq!(result.get("stdout"), Some(&Value::from("a|b")));
    }

    #[test]
    fn test_command_creates_exists() {
        let env = command_env();
        let result = bind("creates=/ echo never").run(&env).unwrap();

        assert!(!result.changed);
        assert!(result.msg().unwrap_or_default().contains("exists"));
    }

    #[test]
    fn test_command_fails() {
        let env = command_env();
        let err = bind("false").run(&env).unwrap_err();

        let partial = err.result().expect("failure carries the result");
        assert!(partial.failed);
        assert_eq!(partial.get("rc"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_command_requires_text() {
        let env = command_env();
        assert!(matches!(
            bind("chdir=/tmp").run(&env),
            Err(CommandError::InvalidParameter(_))
        ));
    }
}
