// Config file adapter - Loads AppConfig from TOML or YAML files and VIDTOOL_* variables

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::{VidError, VidResult};
use crate::utils::logging::{LogFormat, LogLevel};

/// Locations searched, in order, when no config file is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["vidtool.toml", "config/vidtool.toml"];

/// Environment variables recognised as overrides
pub const ENV_OVERRIDES: &[&str] = &[
    "VIDTOOL_FFMPEG",
    "VIDTOOL_FFPROBE",
    "VIDTOOL_VIDEO_BITRATE",
    "VIDTOOL_AUDIO_BITRATE",
    "VIDTOOL_OUTPUT_DIR",
    "VIDTOOL_LOG_LEVEL",
    "VIDTOOL_LOG_FORMAT",
    "VIDTOOL_WATERMARK_THREADS",
    "VIDTOOL_SAMPLE_COUNT",
    "VIDTOOL_MIN_AGREEMENT",
];

/// Configuration file adapter
pub struct TomlConfigAdapter {
    search_paths: Vec<PathBuf>,
}

impl Default for TomlConfigAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TomlConfigAdapter {
    /// Adapter searching the default locations relative to the working directory
    pub fn new() -> Self {
        Self {
            search_paths: DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Adapter searching only `paths`
    pub fn with_search_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths: paths,
        }
    }

    /// First existing search path, if any
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.is_file()).cloned()
    }

    /// Load a config file; `.yaml`/`.yml` are parsed as YAML, anything else as TOML
    pub fn load_file(&self, path: &Path) -> VidResult<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VidError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let is_yaml = path
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                ext == "yaml" || ext == "yml"
            })
            .unwrap_or(false);

        let config = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| {
                VidError::config(format!("Failed to parse YAML config {}: {}", path.display(), e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                VidError::config(format!("Failed to parse TOML config {}: {}", path.display(), e))
            })?
        };

        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Load `explicit` if given (it must exist), else the first search path
    /// found, else defaults
    pub fn load(&self, explicit: Option<&Path>) -> VidResult<AppConfig> {
        match explicit {
            Some(path) => self.load_file(path),
            None => match self.find_config_file() {
                Some(path) => self.load_file(&path),
                None => {
                    debug!("No configuration file found, using defaults");
                    Ok(AppConfig::default())
                }
            },
        }
    }

    /// Apply `VIDTOOL_*` overrides read through `lookup`
    pub fn apply_env<F>(config: &mut AppConfig, lookup: F) -> VidResult<usize>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = 0;
        for name in ENV_OVERRIDES {
            let Some(value) = lookup(name) else {
                continue;
            };
            debug!(variable = name, value = %value, "Environment override");

            match *name {
                "VIDTOOL_FFMPEG" => config.tools.ffmpeg = PathBuf::from(value),
                "VIDTOOL_FFPROBE" => config.tools.ffprobe = PathBuf::from(value),
                "VIDTOOL_VIDEO_BITRATE" => config.transcode.video_bitrate = value,
                "VIDTOOL_AUDIO_BITRATE" => {
                    config.transcode.audio_bitrate = value.clone();
                    config.watermark.audio_bitrate = value;
                }
                "VIDTOOL_OUTPUT_DIR" => config.output_dir = Some(PathBuf::from(value)),
                "VIDTOOL_LOG_LEVEL" => config.logging.level = LogLevel::parse(&value)?,
                "VIDTOOL_LOG_FORMAT" => config.logging.format = LogFormat::parse(&value)?,
                "VIDTOOL_WATERMARK_THREADS" => config.watermark.threads = parse_number(name, &value)?,
                "VIDTOOL_SAMPLE_COUNT" => config.watermark.sample_count = parse_number(name, &value)?,
                "VIDTOOL_MIN_AGREEMENT" => config.watermark.min_agreement = parse_number(name, &value)?,
                _ => continue,
            }
            applied += 1;
        }

        if applied > 0 {
            info!(applied, "Applied environment overrides");
        }
        Ok(applied)
    }
}

fn parse_number(name: &str, value: &str) -> VidResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|e| VidError::config(format!("Invalid value for {}: '{}' ({})", name, value, e)))
}
