//! playrun - runs a YAML playbook of local commands
//!
//! This is the main entry point for the playrun CLI.

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cli::Cli;
use is_terminal::IsTerminal;
use playrun::callback::{CliReporter, JsonChunkReporter, Reporter, StructReporter};
use playrun::config::{Config, LoggingConfig, OutputFormat};
use playrun::executor::{Environment, Runner, SimplePath};
use playrun::modules::CommandRegistry;
use playrun::parser::Parser;
use playrun::vars::parse_overrides;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration, command-line flags win
    let mut config = Config::load(cli.config.as_ref()).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {:#}", e);
        Config::default()
    });
    cli.apply(&mut config);
    if !std::io::stdout().is_terminal() {
        config.output.no_color = true;
    }

    init_logging(cli.verbosity(), &config.logging);

    let code = run(&cli, config)?;
    std::process::exit(code);
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so report output on stdout stays parseable.
    if logging.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(verbosity >= 3)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
}

/// Runs the playbook and returns the process exit code.
fn run(cli: &Cli, config: Config) -> Result<i32> {
    let playbook = Parser::new()
        .parse_playbook(&cli.playbook)
        .with_context(|| format!("Failed to load playbook {}", cli.playbook.display()));
    let playbook = match playbook {
        Ok(playbook) => playbook,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(exit_code_of(&e));
        }
    };

    let overrides = parse_overrides(&cli.set).context("Invalid --set value")?;
    let base_dir = absolute(playbook.base_dir());
    debug!(base_dir = %base_dir.display(), "Resolved playbook directory");

    let output = config.output.clone();
    let env = Environment::new(config, Arc::new(SimplePath::new(base_dir)))?.with_vars(&overrides);

    let structured = Arc::new(StructReporter::new());
    let reporter: Arc<dyn Reporter> = match output.format {
        OutputFormat::Cli => Arc::new(
            CliReporter::new()
                .show_output(output.show_command_output)
                .with_debug(output.debug)
                .with_no_color(output.no_color),
        ),
        OutputFormat::Json => Arc::new(JsonChunkReporter::new()),
        OutputFormat::Struct => structured.clone(),
    };

    let runner = Runner::new(
        Arc::new(env),
        Arc::new(CommandRegistry::with_builtins()),
        playbook,
    )
    .with_reporter(reporter);
    let outcome = runner.run();

    if output.format == OutputFormat::Struct {
        let record = serde_json::to_string_pretty(&structured.snapshot())?;
        println!("{}", record);
    }

    match outcome {
        Ok(()) => Ok(0),
        Err(e) => {
            warn!(error = %e, "Run failed");
            if !(output.debug && output.format == OutputFormat::Cli) {
                eprintln!("Error: {}", e);
            }
            Ok(e.exit_code())
        }
    }
}

fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<playrun::Error>()
        .map(playrun::Error::exit_code)
        .unwrap_or(1)
}

fn absolute(path: &Path) -> std::path::PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
