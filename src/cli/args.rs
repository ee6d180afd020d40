//! Command-line argument definitions

use std::path::PathBuf;

use clap::{ArgGroup, Args};
use clap_num::number_range;

use crate::domain::model::Rectangle;

fn parse_samples(s: &str) -> Result<usize, String> {
    number_range(s, 1, 100)
}

fn parse_preview_height(s: &str) -> Result<u32, String> {
    number_range(s, 16, 4320)
}

/// Arguments for the transcode command
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["output", "format"])))]
pub struct TranscodeArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file path; its extension selects the container
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output container extension (mp4, avi, mkv, mov, wmv); the output is
    /// written next to the input or into the configured output directory
    #[arg(short, long)]
    pub format: Option<String>,
}

/// Arguments for the remove-watermark command
#[derive(Args, Debug)]
pub struct RemoveWatermarkArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Watermark region as x,y,width,height
    #[arg(short, long)]
    pub region: Rectangle,

    /// Scale of the preview the region was selected on (as printed by
    /// `preview`); the region is converted back to source coordinates
    #[arg(long)]
    pub preview_scale: Option<f64>,

    /// Output file path (default: <stem>_nowatermark.mp4)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of frames sampled to build the mask
    #[arg(long, value_parser = parse_samples)]
    pub samples: Option<usize>,

    /// Sampled frames that must agree for a pixel to be masked
    #[arg(long, value_parser = parse_samples)]
    pub min_agreement: Option<usize>,
}

/// Arguments for the preview command
#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// PNG file to write (default: <stem>_preview.png)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Preview height in pixels
    #[arg(long, value_parser = parse_preview_height)]
    pub height: Option<u32>,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the batch command
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Directory to scan for videos
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Output container extension
    #[arg(short, long)]
    pub format: String,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,
}
