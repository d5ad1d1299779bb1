//! Shell module - Execute commands through `sh -c`
//!
//! Pipes, redirects and other shell syntax are available. Takes the same
//! parameters as the command module.

use std::process::Command as Process;

use serde::Deserialize;

use super::command::ExecParams;
use super::{Command, CommandEnv, CommandResult};

/// Shell used to run the command line
const SHELL: &str = "sh";

/// Module for executing shell commands
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct ShellModule {
    params: ExecParams,
}

impl Command for ShellModule {
    fn run(&self, env: &CommandEnv) -> CommandResult {
        if let Some(skipped) = self.params.skip_result(env) {
            return Ok(skipped);
        }

        let cmd = self.params.cmd()?;
        let mut process = Process::new(SHELL);
        process.arg("-c").arg(cmd);

        self.params.execute(process, cmd, env)
    }
}
