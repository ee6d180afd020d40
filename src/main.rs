//! vidtool - video format conversion and watermark removal
//!
//! # Usage
//!
//! ```bash
//! vidtool transcode --input clip.mov --format mp4
//! vidtool preview --input clip.mp4
//! vidtool remove-watermark --input clip.mp4 --region 40,600,220,60 --preview-scale 0.666667
//! vidtool batch --dir ./videos --format mkv --recursive
//! ```

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use vidtool::cli::{commands, Cli, Commands};
use vidtool::config_initialization::initialize_configuration_hierarchy;
use vidtool::utils::logging::init_logging;
use vidtool::AppContainer;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match initialize_configuration_hierarchy(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
    };
    init_logging(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting vidtool");

    let json_progress = cli.json_progress;
    let container = AppContainer::new(config);

    let result = match cli.command {
        Commands::Transcode(args) => commands::transcode(&container, args, json_progress).await,
        Commands::RemoveWatermark(args) => {
            commands::remove_watermark(&container, args, json_progress).await
        }
        Commands::Preview(args) => commands::preview(&container, args).await,
        Commands::Probe(args) => commands::probe(&container, args).await,
        Commands::Batch(args) => commands::batch(&container, args, json_progress).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
