//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use stockflow_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "api_url": config.api_url,
                    "realtime_url": config.realtime_url(),
                    "data_dir": config.data_dir,
                    "stale_time_secs": config.stale_time_secs,
                    "page_size": config.page_size,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.api_url);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  api_url:         {}", config.api_url);
            println!(
                "  realtime_url:    {}{}",
                config.realtime_url(),
                if config.realtime_url.is_none() {
                    " (derived)"
                } else {
                    ""
                }
            );
            println!("  data_dir:        {}", config.data_dir.display());
            println!("  stale_time_secs: {}", config.stale_time_secs);
            println!("  page_size:       {}", config.page_size);
            println!(
                "  log_file:        {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let unset = value.is_empty() || value == "none";

    match key {
        "api_url" => {
            if unset {
                bail!("api_url cannot be empty");
            }
            config.api_url = value.trim_end_matches('/').to_string();
        }
        "realtime_url" => {
            config.realtime_url = if unset { None } else { Some(value.to_string()) };
        }
        "data_dir" => {
            config.data_dir = value.into();
        }
        "stale_time_secs" => {
            config.stale_time_secs = value
                .parse()
                .context("Invalid value for stale_time_secs. Use a whole number of seconds.")?;
        }
        "page_size" => {
            let page_size: u32 = value
                .parse()
                .context("Invalid value for page_size. Use a positive number.")?;
            if page_size == 0 {
                bail!("page_size must be at least 1");
            }
            config.page_size = page_size;
        }
        "log_file" => {
            config.log_file = if unset { None } else { Some(value.into()) };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: api_url, realtime_url, data_dir, stale_time_secs, page_size, log_file",
                key
            );
        }
    }

    Ok(())
}
