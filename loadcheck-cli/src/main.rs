use anyhow::{Context, Result};
use clap::Parser;
use loadcheck_config::{ConfigLoader, LoadcheckConfig};
use loadcheck_logging::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, warn};

mod cli;
mod commands;
mod report;

use cli::{Cli, Commands, ConfigCommands};
use commands::bench;
use commands::config::{handle_config_generate, handle_config_show, handle_config_validate};

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConfigSource {
    File(PathBuf),
    /// Named file was absent, environment and defaults used instead
    MissingFile(PathBuf),
    Environment,
}

impl ConfigSource {
    /// Report the source; call once the subscriber is installed
    pub(crate) fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded configuration from: {:?}", path),
            ConfigSource::MissingFile(path) => {
                warn!("Configuration file not found: {:?}. Using defaults.", path)
            }
            ConfigSource::Environment => {
                debug!("No configuration file specified. Loaded from environment or defaults.")
            }
        }
    }
}

/// Load configuration from file or use defaults
pub(crate) fn load_config(
    config_path: Option<&PathBuf>,
) -> Result<(LoadcheckConfig, ConfigSource)> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) if path.exists() => {
            let config = loader
                .from_file(path)
                .context(format!("Failed to load configuration from {:?}", path))?;
            Ok((config, ConfigSource::File(path.clone())))
        }
        Some(path) => {
            let config = loader
                .from_env()
                .context("Failed to load configuration from environment")?;
            Ok((config, ConfigSource::MissingFile(path.clone())))
        }
        None => {
            let config = loader
                .from_env()
                .context("Failed to load configuration from environment")?;
            Ok((config, ConfigSource::Environment))
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (mut config, source) = load_config(cli.config.as_ref())?;

    let mut logging = config.logging.clone();
    if let Some(level) = &cli.log_level {
        logging.level = level.parse().map_err(anyhow::Error::msg)?;
    }
    init_logging(&logging)?;
    source.log();

    match &cli.command {
        Some(Commands::Run(args)) => {
            bench::apply_overrides(&mut config, &args.bench, Some(args))?;
            bench::run(&config, args).await
        }
        Some(Commands::Check(args)) => {
            bench::apply_overrides(&mut config, args, None)?;
            bench::check(&config, args).await
        }
        Some(Commands::Config { config_cmd }) => {
            match config_cmd {
                ConfigCommands::Validate { config_file } => handle_config_validate(config_file)?,
                ConfigCommands::Generate { output, force } => {
                    handle_config_generate(output, *force)?
                }
                ConfigCommands::Show {
                    config_file,
                    format,
                } => handle_config_show(config_file.as_ref().or(cli.config.as_ref()), format)?,
            }
            Ok(ExitCode::SUCCESS)
        }
        None => {
            // If no subcommand is provided, print help
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            cmd.print_help().context("Failed to print help")?;
            println!();
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_falls_back_and_is_reported() {
        let path = PathBuf::from("/nonexistent/loadcheck.yaml");
        let (config, source) = load_config(Some(&path)).unwrap();
        assert_eq!(source, ConfigSource::MissingFile(path));
        assert_eq!(config.run.workers, LoadcheckConfig::default().run.workers);
    }

    #[test]
    fn test_file_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loadcheck.yaml");
        std::fs::write(&path, LoadcheckConfig::generate_sample()).unwrap();

        let (_, source) = load_config(Some(&path)).unwrap();
        assert_eq!(source, ConfigSource::File(path));
        let (_, source) = load_config(None).unwrap();
        assert_eq!(source, ConfigSource::Environment);
    }
}
