//! CLI module for vidtool
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

pub use args::{BatchArgs, PreviewArgs, ProbeArgs, RemoveWatermarkArgs, TranscodeArgs};

/// vidtool - video format conversion and watermark removal
///
/// Converts videos between containers with the system ffmpeg, and removes a
/// static watermark from a user-selected region by masking and inpainting it.
#[derive(Parser, Debug)]
#[command(name = "vidtool")]
#[command(about = "Convert video formats and remove static watermarks")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML, or YAML by extension)
    #[arg(long, global = true, env = "VIDTOOL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Print progress as JSON lines instead of a progress bar
    #[arg(long, global = true)]
    pub json_progress: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a video to another container format
    Transcode(TranscodeArgs),
    /// Remove a static watermark from a region of a video
    RemoveWatermark(RemoveWatermarkArgs),
    /// Save a scaled frame for choosing the watermark region
    Preview(PreviewArgs),
    /// Show media information
    Probe(ProbeArgs),
    /// Convert every video in a directory
    Batch(BatchArgs),
}
