//! End-to-end watermark removal for one video

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::mask::WatermarkMaskBuilder;
use super::restorer::FrameRestorer;
use super::sampler::FrameSampler;
use crate::config::WatermarkConfig;
use crate::domain::model::{FrameBuffer, JobState, MediaInfo, Rectangle};
use crate::engine::cancel::CancelToken;
use crate::engine::progress::ProgressGate;
use crate::error::{VidError, VidResult};
use crate::imaging;
use crate::ports::{MediaBackend, ProbePort, ProgressSink};

/// Scaled frame shown for region selection
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub image: FrameBuffer,
    /// `preview_height / source_height`; pass to `Rectangle::from_preview`
    pub scale: f64,
    pub source_width: u32,
    pub source_height: u32,
}

/// Builds a mask once, then restores and re-encodes every frame
pub struct WatermarkRemovalPipeline {
    probe: Arc<dyn ProbePort>,
    backend: Arc<dyn MediaBackend>,
    config: WatermarkConfig,
}

impl WatermarkRemovalPipeline {
    pub fn new(probe: Arc<dyn ProbePort>, backend: Arc<dyn MediaBackend>, config: WatermarkConfig) -> Self {
        Self {
            probe,
            backend,
            config,
        }
    }

    /// Remove the watermark inside `region` (source coordinates).
    ///
    /// Every outcome reaches `sink` exactly once. A partially written output
    /// file is left in place on failure.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        region: Rectangle,
        sink: Arc<dyn ProgressSink>,
        cancel: CancelToken,
    ) -> JobState {
        let gate = Arc::new(ProgressGate::new(sink));

        match self.execute(input, output, region, gate.clone(), cancel).await {
            Ok(()) => {
                info!(input = %input.display(), output = %output.display(), "Watermark removal finished");
                gate.succeed();
            }
            Err(VidError::Cancelled) => {
                info!(input = %input.display(), "Watermark removal cancelled");
                gate.cancel();
            }
            Err(e) => {
                warn!(input = %input.display(), error = %e, "Watermark removal failed");
                gate.fail(e.to_string());
            }
        }

        gate.state()
    }

    async fn execute(
        &self,
        input: &Path,
        output: &Path,
        region: Rectangle,
        gate: Arc<ProgressGate>,
        cancel: CancelToken,
    ) -> VidResult<()> {
        let info = self.probe.probe(input).await?;
        info.validate_video()?;
        debug!(
            frames = info.total_frames(),
            width = info.width,
            height = info.height,
            "Probed watermark input"
        );

        let builder = WatermarkMaskBuilder::new(self.config.sample_count, self.config.min_agreement)?;
        let restorer = FrameRestorer::new(self.config.seed, self.config.inpaint_radius);
        let backend = self.backend.clone();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let job = FrameJob {
                backend: backend.as_ref(),
                info: &info,
                output: &output,
                gate: &gate,
                cancel: &cancel,
            };
            job.process(region, &builder, restorer)
        })
        .await
        .map_err(|e| VidError::Io(std::io::Error::other(e)))?
    }

    /// First non-blank frame scaled to the configured preview height
    pub async fn preview(&self, input: &Path) -> VidResult<PreviewFrame> {
        let info = self.probe.probe(input).await?;
        info.validate_video()?;

        let backend = self.backend.clone();
        let threshold = self.config.blank_threshold;
        let height = self.config.preview_height;

        tokio::task::spawn_blocking(move || {
            let mut source = backend.open_source(&info)?;
            let frame = FrameSampler::first_valid_frame(
                source.as_mut(),
                threshold,
                super::sampler::DEFAULT_PREVIEW_SAMPLES,
            )?;
            let (image, scale) = imaging::resize_to_height(&frame, height)?;
            Ok(PreviewFrame {
                image,
                scale,
                source_width: frame.width(),
                source_height: frame.height(),
            })
        })
        .await
        .map_err(|e| VidError::Io(std::io::Error::other(e)))?
    }
}

/// Blocking half of a removal job
struct FrameJob<'a> {
    backend: &'a dyn MediaBackend,
    info: &'a MediaInfo,
    output: &'a Path,
    gate: &'a ProgressGate,
    cancel: &'a CancelToken,
}

impl FrameJob<'_> {
    fn process(
        &self,
        region: Rectangle,
        builder: &WatermarkMaskBuilder,
        mut restorer: FrameRestorer,
    ) -> VidResult<()> {
        let mask = {
            let mut source = self.backend.open_source(self.info)?;
            builder.build(source.as_mut(), region)?
        };
        self.check_cancelled()?;

        let total = self.info.total_frames();
        let mut stream = self.backend.open_stream(self.info)?;
        let mut writer = self.backend.create_writer(self.info, self.output)?;
        let mut processed = 0u64;

        while let Some(frame) = stream.next_frame()? {
            self.check_cancelled()?;

            let restored = restorer.restore(&frame, &mask)?;
            writer.write_frame(&restored)?;
            processed += 1;

            if processed < total {
                self.gate.report(processed as f64 / total as f64 * 100.0);
            }
        }

        drop(stream);
        writer.finish()?;
        debug!(processed, total, "All frames restored");
        Ok(())
    }

    fn check_cancelled(&self) -> VidResult<()> {
        if self.cancel.is_cancelled() {
            Err(VidError::Cancelled)
        } else {
            Ok(())
        }
    }
}
