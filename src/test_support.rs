//! Fixtures shared by unit tests.

use std::sync::Arc;

use crate::callback::NullReporter;
use crate::config::Config;
use crate::executor::environment::{CommandEnv, Environment, SimplePath};
use crate::executor::task::Task;
use crate::expr::Vars;
use crate::vars::{NestedScope, Scope};

/// A command environment rooted at the current directory with an empty
/// task scope.
pub(crate) fn command_env() -> CommandEnv {
    command_env_with(Vars::new())
}

/// Like [`command_env`], with `vars` bound in the task scope.
pub(crate) fn command_env_with(vars: Vars) -> CommandEnv {
    let cwd = std::env::current_dir().unwrap();
    let env = Arc::new(Environment::new(Config::default(), Arc::new(SimplePath::new(cwd))).unwrap());
    let scope: Arc<dyn Scope> = Arc::new(NestedScope::with_parent(env.vars.clone()));
    scope.extend(&vars);
    CommandEnv::new(scope, Arc::new(NullReporter), env, Task::new("test", "test"))
}
