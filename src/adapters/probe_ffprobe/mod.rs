//! FFprobe adapter for media file probing
//!
//! Runs `ffprobe -print_format json -show_streams -show_format` and maps the
//! result onto [`MediaInfo`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::domain::model::MediaInfo;
use crate::error::{VidError, VidResult};
use crate::ports::ProbePort;

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// FFprobe-based probe adapter
pub struct FFprobeAdapter {
    ffprobe: PathBuf,
}

impl FFprobeAdapter {
    /// Create an adapter running the given ffprobe binary
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    /// Map ffprobe JSON output onto `MediaInfo`
    pub fn parse_output(path: &Path, json: &[u8]) -> VidResult<MediaInfo> {
        let parsed: ProbeOutput = serde_json::from_slice(json)
            .map_err(|e| VidError::probe(path, format!("invalid ffprobe output: {}", e)))?;

        // First stream's duration, falling back to the container's
        let duration = parsed
            .streams
            .first()
            .and_then(|s| parse_seconds(s.duration.as_deref()))
            .or_else(|| {
                parsed
                    .format
                    .as_ref()
                    .and_then(|f| parse_seconds(f.duration.as_deref()))
            })
            .ok_or_else(|| VidError::probe(path, "duration is missing or not a number"))?;

        if duration <= 0.0 {
            return Err(VidError::probe(path, format!("duration is {}", duration)));
        }

        let video = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let audio = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"));

        let fps = video
            .and_then(|v| {
                parse_ratio(v.avg_frame_rate.as_deref())
                    .or_else(|| parse_ratio(v.r_frame_rate.as_deref()))
            })
            .unwrap_or(0.0);

        let format = parsed.format.as_ref();
        Ok(MediaInfo {
            path: path.to_path_buf(),
            container: format
                .and_then(|f| f.format_name.clone())
                .unwrap_or_default(),
            duration,
            width: video.and_then(|v| v.width).unwrap_or(0),
            height: video.and_then(|v| v.height).unwrap_or(0),
            fps,
            has_audio: audio.is_some(),
            video_codec: video.and_then(|v| v.codec_name.clone()),
            audio_codec: audio.and_then(|a| a.codec_name.clone()),
            file_size: format
                .and_then(|f| f.size.as_deref())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        })
    }
}

#[async_trait]
impl ProbePort for FFprobeAdapter {
    async fn probe(&self, path: &Path) -> VidResult<MediaInfo> {
        debug!(path = %path.display(), "Probing media");

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| VidError::Spawn {
                program: self.ffprobe.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(VidError::probe(
                path,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Self::parse_output(path, &output.stdout)
    }
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite())
}

/// Parse an ffprobe rational such as `30000/1001`
fn parse_ratio(value: Option<&str>) -> Option<f64> {
    let mut parts = value?.split('/');
    let num = parts.next()?.trim().parse::<f64>().ok()?;
    let den = match parts.next() {
        Some(d) => d.trim().parse::<f64>().ok()?,
        None => 1.0,
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}
