//! `config validate|generate|show`

use crate::load_config;
use anyhow::{Context, Result};
use loadcheck_config::LoadcheckConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Handle configuration validation
pub fn handle_config_validate(config_file: &Path) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {:?}",
            config_file
        ));
    }

    match load_config(Some(&config_file.to_path_buf())) {
        Ok((config, _)) => {
            config
                .users
                .load_seeds()
                .context("Seed users are invalid")?;
            println!("Configuration file is valid");
            info!("Configuration validation passed");
            Ok(())
        }
        Err(e) => {
            println!("Configuration validation failed: {:#}", e);
            error!("Configuration validation failed: {:#}", e);
            Err(e)
        }
    }
}

/// Handle configuration generation
pub fn handle_config_generate(output: &PathBuf, force: bool) -> Result<()> {
    info!("Generating configuration at: {:?}", output);

    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
    }

    fs::write(output, LoadcheckConfig::generate_sample())
        .context("Failed to write configuration file")?;

    println!("Configuration generated at: {:?}", output);
    println!(
        "Validate with: loadcheck config validate --config-file {:?}",
        output
    );
    Ok(())
}

/// Handle configuration display
pub fn handle_config_show(config_file: Option<&PathBuf>, format: &str) -> Result<()> {
    let (config, _) = load_config(config_file)?;
    println!("{}", render_config(&config, format)?);
    Ok(())
}

fn render_config(config: &LoadcheckConfig, format: &str) -> Result<String> {
    match format.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::to_string(config).context("Failed to serialize to YAML"),
        "json" => serde_json::to_string_pretty(config).context("Failed to serialize to JSON"),
        _ => Err(anyhow::anyhow!(
            "Unknown output format: {}. Valid formats: yaml, json",
            format
        )),
    }
}
