//! vidtool library
//!
//! Video container conversion driven by the system `ffmpeg`, and removal of a
//! static watermark from a fixed region: a mask is voted from sampled
//! frames, every frame is texture-filled and inpainted under it, and the
//! result is re-encoded with the original audio.
//!
//! Long-running work is started through [`app::JobRegistry`]; each job
//! reports to a [`ports::ProgressSink`] and can be cancelled through its
//! [`app::JobHandle`].

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod imaging;
pub mod ports;
pub mod utils;
pub mod watermark;

// Re-export commonly used types
pub use app::{AppContainer, JobHandle, JobRegistry};
pub use config::AppConfig;
pub use domain::model::{JobId, JobState, MediaInfo, Rectangle};
pub use error::{VidError, VidResult};
pub use ports::ProgressSink;
