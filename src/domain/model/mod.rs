// Domain models - Core types and data structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{VidError, VidResult};

/// Decoded 8-bit RGB frame
pub type FrameBuffer = image::RgbImage;

/// Highest percentage a transcode may report before the encoder has exited
pub const TRANSCODE_PROGRESS_CAP: f64 = 99.0;

/// Rectangle in source-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    /// Create a new rectangle
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Map a rectangle picked on a scaled preview back to source resolution.
    ///
    /// `scale` is `preview_height / source_height`. Coordinates truncate
    /// toward zero, matching how the preview was produced.
    pub fn from_preview(preview: Rectangle, scale: f64) -> VidResult<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(VidError::InvalidArgument(format!(
                "preview scale must be positive, got {}",
                scale
            )));
        }

        let unscale = |v: u32| (v as f64 / scale) as u32;
        Ok(Self {
            x: unscale(preview.x),
            y: unscale(preview.y),
            width: unscale(preview.width),
            height: unscale(preview.height),
        })
    }

    /// True when the rectangle has no area
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Check that the rectangle lies entirely inside a `width`x`height` frame
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }

    /// Check whether a pixel lies inside the rectangle
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && (px as u64) < self.right() && py >= self.y && (py as u64) < self.bottom()
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{} {}x{})", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for Rectangle {
    type Err = VidError;

    /// Parse `x,y,width,height`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(VidError::InvalidArgument(format!(
                "region must be x,y,width,height, got '{}'",
                s
            )));
        }

        let mut values = [0u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| {
                VidError::InvalidArgument(format!("invalid region component '{}'", part))
            })?;
        }

        Ok(Self::new(values[0], values[1], values[2], values[3]))
    }
}

/// Complete media file information as reported by the probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Probed file
    pub path: PathBuf,
    /// Container format name
    pub container: String,
    /// Duration in seconds
    pub duration: f64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: f64,
    /// Whether the file carries at least one audio stream
    pub has_audio: bool,
    /// Codec of the first video stream
    pub video_codec: Option<String>,
    /// Codec of the first audio stream
    pub audio_codec: Option<String>,
    /// File size in bytes
    pub file_size: u64,
}

impl MediaInfo {
    /// Number of whole frames, `floor(duration * fps)`
    pub fn total_frames(&self) -> u64 {
        let frames = (self.duration * self.fps).floor();
        if frames.is_finite() && frames > 0.0 {
            frames as u64
        } else {
            0
        }
    }

    /// Presentation time of a frame index, in seconds
    pub fn frame_time(&self, index: u64) -> f64 {
        if self.fps > 0.0 {
            index as f64 / self.fps
        } else {
            0.0
        }
    }

    /// Check that the media has a decodable picture
    pub fn validate_video(&self) -> VidResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VidError::probe(&self.path, "video dimensions are zero"));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(VidError::probe(&self.path, "frame rate is not positive"));
        }
        if self.total_frames() == 0 {
            return Err(VidError::probe(&self.path, "video contains no frames"));
        }
        Ok(())
    }
}

/// One input/output pair being transcoded
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub total_duration_seconds: f64,
}

impl TranscodeJob {
    /// Create a job; the duration must be positive for progress to be defined
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        total_duration_seconds: f64,
    ) -> VidResult<Self> {
        let input_path = input_path.into();
        if !(total_duration_seconds.is_finite() && total_duration_seconds > 0.0) {
            return Err(VidError::probe(
                &input_path,
                format!("duration must be positive, got {}", total_duration_seconds),
            ));
        }

        Ok(Self {
            input_path,
            output_path: output_path.into(),
            total_duration_seconds,
        })
    }

    /// Map elapsed encoder time onto a percentage capped below completion
    pub fn percent_at(&self, elapsed_seconds: f64) -> f64 {
        (elapsed_seconds / self.total_duration_seconds * 100.0).min(TRANSCODE_PROGRESS_CAP)
    }

    /// Output file extension used for the format lookup
    pub fn output_extension(&self) -> Option<String> {
        extension_of(&self.output_path)
    }
}

/// Lower-cased extension of a path
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Identifier of a job in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Kind of work a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Transcode,
    WatermarkRemoval,
}

/// Lifecycle of a job. `Running` is the only non-terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobState {
    Running,
    Succeeded,
    Failed(String),
    Cancelled,
}

impl JobState {
    /// Whether the job has finished one way or another
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}
