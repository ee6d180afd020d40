//! Application configuration model

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{VidError, VidResult};
use crate::utils::logging::LoggingConfig;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tools: ToolsConfig,
    pub transcode: TranscodeConfig,
    pub watermark: WatermarkConfig,
    pub logging: LoggingConfig,
    /// Directory for derived output paths; defaults to the input's directory
    pub output_dir: Option<PathBuf>,
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// Transcode encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub video_bitrate: String,
    pub audio_bitrate: String,
    /// Output extension used when none is given on the command line
    pub default_format: String,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            video_bitrate: "2500k".to_string(),
            audio_bitrate: "192k".to_string(),
            default_format: "mp4".to_string(),
        }
    }
}

/// Watermark detection, restoration and re-encode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Frames sampled to build the mask
    pub sample_count: usize,
    /// Frames that must agree for a pixel to join the mask
    pub min_agreement: usize,
    pub preset: String,
    pub audio_bitrate: String,
    /// Encoder worker threads
    pub threads: usize,
    pub inpaint_radius: u32,
    /// Height of the region-selection preview
    pub preview_height: u32,
    /// Mean intensity a preview frame must exceed to count as non-blank
    pub blank_threshold: f64,
    /// Seed for the texture synthesis noise; random when unset
    pub seed: Option<u64>,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            sample_count: 10,
            min_agreement: 7,
            preset: "slow".to_string(),
            audio_bitrate: "192k".to_string(),
            threads: 4,
            inpaint_radius: 3,
            preview_height: 720,
            blank_threshold: 10.0,
            seed: None,
        }
    }
}

impl AppConfig {
    /// Check value ranges; warns about settings that are legal but unusual
    pub fn validate(&self) -> VidResult<()> {
        for (name, value) in [
            ("transcode.video_bitrate", &self.transcode.video_bitrate),
            ("transcode.audio_bitrate", &self.transcode.audio_bitrate),
            ("watermark.audio_bitrate", &self.watermark.audio_bitrate),
            ("watermark.preset", &self.watermark.preset),
        ] {
            if value.trim().is_empty() {
                return Err(VidError::config(format!("{} must not be empty", name)));
            }
        }

        let wm = &self.watermark;
        if wm.sample_count == 0 {
            return Err(VidError::config("watermark.sample_count must be at least 1"));
        }
        if wm.min_agreement == 0 || wm.min_agreement > wm.sample_count {
            return Err(VidError::config(format!(
                "watermark.min_agreement must be between 1 and {} (sample_count), got {}",
                wm.sample_count, wm.min_agreement
            )));
        }
        if wm.threads == 0 {
            return Err(VidError::config("watermark.threads must be at least 1"));
        }
        if wm.preview_height == 0 {
            return Err(VidError::config("watermark.preview_height must be at least 1"));
        }
        if !wm.blank_threshold.is_finite() {
            return Err(VidError::config("watermark.blank_threshold must be finite"));
        }

        let cpus = num_cpus::get();
        if wm.threads > cpus {
            warn!(
                threads = wm.threads,
                cpus, "Encoder thread count exceeds available CPUs"
            );
        }

        Ok(())
    }
}
