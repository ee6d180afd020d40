//! Error handling module for vidtool

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for vidtool operations
#[derive(Error, Debug)]
pub enum VidError {
    /// Input could not be probed, or reported no usable duration
    #[error("Failed to probe media file {path}: {message}")]
    Probe { path: PathBuf, message: String },

    /// The external encoder exited unsuccessfully. `diagnostics` is the tail
    /// of its output: the last 200 lines for a transcode, the last 64 KiB of
    /// stderr for a frame encode, with earlier output dropped.
    #[error("Encoder exited with {status}. Encoder output:\n{diagnostics}")]
    EncodeProcess { status: String, diagnostics: String },

    /// A specific frame could not be decoded
    #[error("Failed to read frame {index}: {message}")]
    FrameRead { index: u64, message: String },

    /// The watermark region has no area
    #[error("Watermark region is empty ({width}x{height})")]
    EmptyRegion { width: u32, height: u32 },

    /// The watermark region extends past the frame
    #[error("Watermark region {region} does not fit inside a {frame_width}x{frame_height} frame")]
    RegionOutOfBounds {
        region: String,
        frame_width: u32,
        frame_height: u32,
    },

    /// Mask and frame sizes differ
    #[error("Mask is {mask_width}x{mask_height} but frame is {frame_width}x{frame_height}")]
    MaskDimensionMismatch {
        mask_width: u32,
        mask_height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    /// A caller-supplied parameter is out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An external tool could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The job was cancelled by its owner
    #[error("Job cancelled")]
    Cancelled,

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encode/decode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VidError {
    /// Build a probe error for the given path
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        VidError::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Build a frame read error
    pub fn frame_read(index: u64, message: impl Into<String>) -> Self {
        VidError::FrameRead {
            index,
            message: message.into(),
        }
    }

    /// Build a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        VidError::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for vidtool operations
pub type VidResult<T> = std::result::Result<T, VidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_error_carries_diagnostics() {
        let err = VidError::EncodeProcess {
            status: "exit status: 1".to_string(),
            diagnostics: "Unknown encoder 'libfoo'".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit status: 1"));
        assert!(msg.contains("Unknown encoder 'libfoo'"));
    }

    #[test]
    fn test_region_errors_display() {
        let empty = VidError::EmptyRegion { width: 0, height: 20 };
        assert!(empty.to_string().contains("0x20"));

        let mismatch = VidError::MaskDimensionMismatch {
            mask_width: 10,
            mask_height: 10,
            frame_width: 20,
            frame_height: 10,
        };
        let msg = mismatch.to_string();
        assert!(msg.contains("10x10"));
        assert!(msg.contains("20x10"));
    }

    #[test]
    fn test_probe_helper() {
        let err = VidError::probe("/tmp/in.mp4", "duration is zero");
        assert!(matches!(err, VidError::Probe { .. }));
        assert!(err.to_string().contains("in.mp4"));
    }
}
