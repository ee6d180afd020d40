use std::sync::Arc;

use crate::adapters::{FFprobeAdapter, FfmpegBackend, WriterSettings};
use crate::app::jobs::JobRegistry;
use crate::config::AppConfig;
use crate::engine::transcoder::Transcoder;
use crate::ports::{MediaBackend, ProbePort};
use crate::watermark::WatermarkRemovalPipeline;

/// Wires ports to adapters and owns the job registry
pub struct AppContainer {
    config: AppConfig,
    probe: Arc<dyn ProbePort>,
    pipeline: Arc<WatermarkRemovalPipeline>,
    registry: Arc<JobRegistry>,
}

impl AppContainer {
    /// Container backed by the configured ffmpeg/ffprobe binaries
    pub fn new(config: AppConfig) -> Self {
        let probe = Arc::new(FFprobeAdapter::new(&config.tools.ffprobe)) as Arc<dyn ProbePort>;
        let backend = Arc::new(FfmpegBackend::new(
            &config.tools.ffmpeg,
            WriterSettings::from(&config.watermark),
        )) as Arc<dyn MediaBackend>;
        Self::with_ports(config, probe, backend)
    }

    /// Container over caller-supplied ports
    pub fn with_ports(
        config: AppConfig,
        probe: Arc<dyn ProbePort>,
        backend: Arc<dyn MediaBackend>,
    ) -> Self {
        let transcoder = Arc::new(Transcoder::new(
            Arc::clone(&probe),
            &config.tools.ffmpeg,
            config.transcode.clone(),
        ));
        let pipeline = Arc::new(WatermarkRemovalPipeline::new(
            Arc::clone(&probe),
            backend,
            config.watermark.clone(),
        ));
        let registry = Arc::new(JobRegistry::new(transcoder, Arc::clone(&pipeline)));

        Self {
            config,
            probe,
            pipeline,
            registry,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn probe(&self) -> Arc<dyn ProbePort> {
        Arc::clone(&self.probe)
    }

    pub fn pipeline(&self) -> Arc<WatermarkRemovalPipeline> {
        Arc::clone(&self.pipeline)
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.registry)
    }
}
