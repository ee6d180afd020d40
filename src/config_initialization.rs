//! Configuration initialization and hierarchy management

use anyhow::{Context, Result};
use tracing::info;

use crate::adapters::TomlConfigAdapter;
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::utils::logging::{LogFormat, LogLevel};

/// Build the effective configuration following precedence: CLI > Env > File > Defaults
pub fn initialize_configuration_hierarchy(cli: &Cli) -> Result<AppConfig> {
    let adapter = TomlConfigAdapter::new();

    // Defaults and file
    let mut config = adapter
        .load(cli.config.as_deref())
        .context("Failed to load configuration file")?;

    // Environment
    TomlConfigAdapter::apply_env(&mut config, |name| std::env::var(name).ok())
        .context("Invalid environment override")?;

    // Command line
    apply_cli_configuration_overrides(&mut config, cli)?;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Apply CLI argument overrides to configuration
pub fn apply_cli_configuration_overrides(config: &mut AppConfig, cli: &Cli) -> Result<()> {
    let mut cli_overrides = 0;

    if let Some(level) = &cli.log_level {
        config.logging.level = LogLevel::parse(level)?;
        cli_overrides += 1;
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = LogFormat::parse(format)?;
        cli_overrides += 1;
    }

    match &cli.command {
        Commands::RemoveWatermark(args) => {
            if let Some(samples) = args.samples {
                config.watermark.sample_count = samples;
                cli_overrides += 1;
            }
            if let Some(min_agreement) = args.min_agreement {
                config.watermark.min_agreement = min_agreement;
                cli_overrides += 1;
            }
        }
        Commands::Preview(args) => {
            if let Some(height) = args.height {
                config.watermark.preview_height = height;
                cli_overrides += 1;
            }
        }
        _ => {}
    }

    if cli_overrides > 0 {
        info!(cli_overrides, "Applied CLI configuration overrides");
    }
    Ok(())
}
