//! Execution environment shared by a run.
//!
//! An [`Environment`] owns the root variable scope, the loaded
//! configuration, a temporary directory that lives as long as the run, and
//! the [`Paths`] resolver used for relative file references. Commands see
//! it through a per-task [`CommandEnv`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

use crate::callback::{NullReporter, Reporter};
use crate::config::Config;
use crate::error::Result;
use crate::executor::task::{Task, TaskResult};
use crate::expr::{expand_templates, Vars};
use crate::modules::CommandRegistry;
use crate::vars::{NestedScope, Scope};

/// Resolves file references made by playbooks.
pub trait Paths: Send + Sync {
    /// Path of a plain file.
    fn file(&self, name: &str) -> PathBuf;

    /// Path of a template file.
    fn template_file(&self, name: &str) -> PathBuf;
}

/// Resolves relative names against a single base directory.
#[derive(Debug, Clone)]
pub struct SimplePath {
    root: PathBuf,
}

impl SimplePath {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Paths for SimplePath {
    fn file(&self, name: &str) -> PathBuf {
        self.resolve(name)
    }

    fn template_file(&self, name: &str) -> PathBuf {
        self.resolve(name)
    }
}

/// Process-wide state for one run.
pub struct Environment {
    /// Root variable scope
    pub vars: Arc<dyn Scope>,
    /// Loaded configuration
    pub config: Config,
    /// Scratch directory, removed on drop
    pub tmp_dir: Option<TempDir>,
    /// Relative path resolver
    pub paths: Arc<dyn Paths>,
}

impl Environment {
    /// Creates an environment with a fresh root scope and scratch directory.
    pub fn new(config: Config, paths: Arc<dyn Paths>) -> Result<Self> {
        let tmp_dir = tempfile::Builder::new().prefix("playrun").tempdir()?;
        debug!(tmp_dir = %tmp_dir.path().display(), "Created scratch directory");
        Ok(Self {
            vars: Arc::new(NestedScope::new()),
            config,
            tmp_dir: Some(tmp_dir),
            paths,
        })
    }

    /// Seeds the root scope.
    pub fn with_vars(self, vars: &Vars) -> Self {
        self.vars.extend(vars);
        self
    }

    /// The scratch directory, if one was created.
    pub fn tmp_path(&self) -> Option<&Path> {
        self.tmp_dir.as_ref().map(TempDir::path)
    }

    /// Creates a new temporary file in the scratch directory.
    pub fn temp_file(&self, prefix: &str) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let file = match self.tmp_path() {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file)
    }
}

/// What a command sees while it runs.
#[derive(Clone)]
pub struct CommandEnv {
    /// Scope the task runs in
    pub scope: Arc<dyn Scope>,
    /// Report sink of the run
    pub reporter: Arc<dyn Reporter>,
    /// Environment of the run
    pub env: Arc<Environment>,
    /// The task being run
    pub task: Task,
}

impl CommandEnv {
    pub fn new(
        scope: Arc<dyn Scope>,
        reporter: Arc<dyn Reporter>,
        env: Arc<Environment>,
        task: Task,
    ) -> Self {
        Self {
            scope,
            reporter,
            env,
            task,
        }
    }

    pub fn paths(&self) -> &dyn Paths {
        self.env.paths.as_ref()
    }

    pub fn tmp_path(&self) -> Option<&Path> {
        self.env.tmp_path()
    }

    pub fn config(&self) -> &Config {
        &self.env.config
    }
}

/// Binds and runs a single command outside any playbook.
///
/// Runs in a fresh environment rooted at the current directory, with
/// `vars` as the root scope and no reporting. Templates in `args` are
/// expanded against `vars` first.
pub fn run_adhoc_task(
    registry: &CommandRegistry,
    command: &str,
    args: &str,
    vars: &Vars,
) -> Result<TaskResult> {
    let cwd = std::env::current_dir()?;
    let env = Arc::new(
        Environment::new(Config::default(), Arc::new(SimplePath::new(cwd)))?.with_vars(vars),
    );
    let args = expand_templates(args, &env.vars)?;
    let task = Task::new(command, command).args(args.as_str());

    let cmd = registry.bind(command, &args, &Vars::new())?;
    let cmd_env = CommandEnv::new(env.vars.clone(), Arc::new(NullReporter), env, task);
    Ok(cmd.run(&cmd_env)?)
}
