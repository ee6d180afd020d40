// Ports - Interface definitions (contracts)

use std::path::Path;

use async_trait::async_trait;

use crate::domain::model::{FrameBuffer, MediaInfo};
use crate::error::VidResult;

/// Receiver of job progress.
///
/// Percentages arrive in non-decreasing order within [0, 100]. Exactly one of
/// `on_success` or `on_failure` is called, once, after the last percentage.
pub trait ProgressSink: Send + Sync {
    /// Called with the job's current completion percentage
    fn on_progress(&self, percent: f64);

    /// Called once when the job completed successfully
    fn on_success(&self);

    /// Called once when the job failed or was cancelled
    fn on_failure(&self, reason: &str);
}

/// Port for media file probing
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// Probe a media file and return its stream information
    async fn probe(&self, path: &Path) -> VidResult<MediaInfo>;
}

/// Random-access frame decoding
pub trait FrameSource {
    /// Information about the opened media
    fn info(&self) -> &MediaInfo;

    /// Decode the frame at `index`
    fn read_frame(&mut self, index: u64) -> VidResult<FrameBuffer>;
}

/// Sequential frame decoding, in presentation order
pub trait FrameStream {
    /// Next decoded frame, or `None` at end of stream
    fn next_frame(&mut self) -> VidResult<Option<FrameBuffer>>;
}

/// Frame encoding into an output file
pub trait FrameWriter {
    /// Append one frame
    fn write_frame(&mut self, frame: &FrameBuffer) -> VidResult<()>;

    /// Flush the encoder and wait until the output file is complete
    fn finish(&mut self) -> VidResult<()>;
}

/// Factory for the decode/encode side of the watermark pipeline
pub trait MediaBackend: Send + Sync {
    fn open_source(&self, info: &MediaInfo) -> VidResult<Box<dyn FrameSource + Send>>;

    fn open_stream(&self, info: &MediaInfo) -> VidResult<Box<dyn FrameStream + Send>>;

    /// Create a writer producing `output`, carrying audio from `info.path`
    fn create_writer(
        &self,
        info: &MediaInfo,
        output: &Path,
    ) -> VidResult<Box<dyn FrameWriter + Send>>;
}
