//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use tether_core::{SdkConfig, Timeout};

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        SdkConfig::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&config).context("Failed to encode configuration")?
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.url.as_deref().unwrap_or_default());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(SdkConfig::config_file_path);
            println!("Configuration:");
            println!(
                "  url:                {}",
                config.url.as_deref().unwrap_or("(not set)")
            );
            println!("  auto_queue:         {}", config.auto_queue);
            println!("  auto_replay:        {}", config.auto_replay);
            println!("  auto_resubscribe:   {}", config.auto_resubscribe);
            println!(
                "  queue_ttl:          {}",
                describe_limit(config.queue_ttl().map(|d| format!("{}ms", d.as_millis())))
            );
            println!(
                "  queue_max_size:     {}",
                describe_limit(config.queue_max_size().map(|n| n.to_string()))
            );
            println!("  replay_interval:    {}ms", config.replay_interval_ms);
            println!(
                "  request_timeout:    {}",
                match config.request_timeout() {
                    Timeout::Never => "none".to_string(),
                    Timeout::After(d) => format!("{}ms", d.as_millis()),
                }
            );
            println!("  sdk_name:           {}", config.sdk_name);
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Print the config file path
pub fn path(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let path = config_path
        .cloned()
        .unwrap_or_else(SdkConfig::config_file_path);

    match output.format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "path": path })),
        _ => println!("{}", path.display()),
    }
    Ok(())
}

fn describe_limit(limit: Option<String>) -> String {
    limit.unwrap_or_else(|| "unlimited".to_string())
}
