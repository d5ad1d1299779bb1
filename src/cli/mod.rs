//! CLI module for playrun
//!
//! Argument parsing and the glue that applies command-line flags on top of
//! the loaded configuration.

use clap::Parser;
use std::path::PathBuf;

use playrun::config::{Config, OutputFormat};

/// playrun - run a YAML playbook of local commands
#[derive(Parser, Debug, Clone)]
#[command(name = "playrun")]
#[command(version)]
#[command(about = "Run a playbook of local commands", long_about = None)]
pub struct Cli {
    /// Playbook file to run
    pub playbook: PathBuf,

    /// Set a variable (key=value), may be repeated
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    pub set: Vec<String>,

    /// Show command parameters and result data
    #[arg(short = 'o', long = "output")]
    pub show_output: bool,

    /// Print the error that aborted the run
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Report as length-prefixed JSON events
    #[arg(long, conflicts_with = "format")]
    pub json: bool,

    /// Report format (cli, json or struct)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    #[arg(short = 'c', long, env = "PLAYRUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Overrides configuration values with the flags that were given.
    pub fn apply(&self, config: &mut Config) {
        if self.show_output {
            config.output.show_command_output = true;
        }
        if self.debug {
            config.output.debug = true;
        }
        if self.no_color {
            config.output.no_color = true;
        }
        if self.json {
            config.output.format = OutputFormat::Json;
        } else if let Some(format) = self.format {
            config.output.format = format;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["playrun", "site.yml"]).unwrap();
        assert_eq!(cli.playbook, PathBuf::from("site.yml"));
        assert!(cli.set.is_empty());
        assert_eq!(cli.verbosity(), 0);
    }

    #[test]
    fn test_set_is_repeatable() {
        let cli = Cli::try_parse_from([
            "playrun", "-s", "a=1", "--set", "b=two", "-vv", "site.yml",
        ])
        .unwrap();
        assert_eq!(cli.set, vec!["a=1".to_string(), "b=two".to_string()]);
        assert_eq!(cli.verbosity(), 2);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from(["playrun", "-o", "-d", "--json", "site.yml"]).unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert!(config.output.show_command_output);
        assert!(config.output.debug);
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_format_flag() {
        let cli = Cli::try_parse_from(["playrun", "--format", "struct", "site.yml"]).unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.output.format, OutputFormat::Struct);

        assert!(Cli::try_parse_from(["playrun", "--format", "xml", "site.yml"]).is_err());
    }
}
