//! CLI argument parsing definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pre-test checks, then the timed load phase
    Run(RunArgs),

    /// Run the pre-test checks only
    Check(BenchArgs),

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

/// Options shared by `run` and `check`
#[derive(Args, Debug, Clone)]
pub struct BenchArgs {
    /// Base URL of the service under test
    #[arg(long, value_name = "URL")]
    pub target: Option<String>,

    /// Scenario file (YAML)
    #[arg(long, value_name = "PATH")]
    pub scenarios: PathBuf,

    /// Additional seed users (YAML list of name/secret)
    #[arg(long, value_name = "PATH")]
    pub users: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub bench: BenchArgs,

    /// Number of concurrent workers
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Length of the load phase in seconds
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Seed for scenario and user selection
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Go straight to the load phase
    #[arg(long)]
    pub skip_checks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration in use
    Show {
        /// Path to configuration file (optional, uses default loading logic)
        #[arg(long, value_name = "PATH")]
        config_file: Option<PathBuf>,

        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "loadcheck",
            "--log-level",
            "debug",
            "run",
            "--target",
            "http://127.0.0.1:8080",
            "--scenarios",
            "bench.yaml",
            "--workers",
            "16",
            "--duration",
            "30",
            "--seed",
            "7",
            "--output",
            "json",
            "--skip-checks",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.bench.target.as_deref(), Some("http://127.0.0.1:8080"));
                assert_eq!(args.bench.scenarios, PathBuf::from("bench.yaml"));
                assert_eq!(args.bench.output, OutputFormat::Json);
                assert_eq!(args.workers, Some(16));
                assert_eq!(args.duration, Some(30));
                assert_eq!(args.seed, Some(7));
                assert!(args.skip_checks);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_check_requires_scenarios() {
        assert!(Cli::try_parse_from(["loadcheck", "check"]).is_err());
        let cli = Cli::try_parse_from(["loadcheck", "check", "--scenarios", "b.yaml"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Check(BenchArgs { output: OutputFormat::Text, .. }))
        ));
    }
}
