use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use vidtool::config::{AppConfig, WatermarkConfig};
use vidtool::domain::model::{FrameBuffer, JobState, MediaInfo, Rectangle};
use vidtool::engine::cancel::CancelToken;
use vidtool::error::{VidError, VidResult};
use vidtool::ports::{FrameSource, FrameStream, FrameWriter, MediaBackend, ProbePort, ProgressSink};
use vidtool::watermark::WatermarkRemovalPipeline;
use vidtool::AppContainer;

/// In-memory media used in place of ffmpeg
mod test_utils {
    use super::*;

    pub const WIDTH: u32 = 64;
    pub const HEIGHT: u32 = 48;
    pub const BACKGROUND: u8 = 20;
    pub const REGION: Rectangle = Rectangle {
        x: 40,
        y: 30,
        width: 20,
        height: 14,
    };

    #[derive(Debug, Clone, PartialEq)]
    pub enum Event {
        Progress(f64),
        Success,
        Failure(String),
    }

    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<Event>>,
        cancel_after_first: Option<CancelToken>,
    }

    impl RecordingSink {
        pub fn cancelling(token: CancelToken) -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                cancel_after_first: Some(token),
            }
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        pub fn percents(&self) -> Vec<f64> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Progress(p) => Some(p),
                    _ => None,
                })
                .collect()
        }
    }

    impl ProgressSink for RecordingSink {
        fn on_progress(&self, percent: f64) {
            self.events.lock().unwrap().push(Event::Progress(percent));
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
        }

        fn on_success(&self) {
            self.events.lock().unwrap().push(Event::Success);
        }

        fn on_failure(&self, reason: &str) {
            self.events.lock().unwrap().push(Event::Failure(reason.to_string()));
        }
    }

    /// Check the sink contract: non-decreasing percentages within [0, 100],
    /// 100 only as the last sample, one terminal event at the end
    pub fn assert_well_formed(events: &[Event]) {
        let terminal: Vec<_> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| !matches!(e, Event::Progress(_)))
            .collect();
        assert_eq!(terminal.len(), 1, "expected one terminal event: {:?}", events);
        assert_eq!(terminal[0].0, events.len() - 1, "terminal event must be last");

        let percents: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        for pair in percents.windows(2) {
            assert!(pair[0] <= pair[1], "progress went backwards: {:?}", percents);
        }
        for (i, p) in percents.iter().enumerate() {
            assert!((0.0..=100.0).contains(p));
            if *p >= 100.0 {
                assert_eq!(i, percents.len() - 1, "100% before the end: {:?}", percents);
                assert_eq!(events.last(), Some(&Event::Success));
            }
        }
    }

    pub fn media_info(path: &Path, frames: usize) -> MediaInfo {
        MediaInfo {
            path: path.to_path_buf(),
            container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            duration: frames as f64 / 10.0,
            width: WIDTH,
            height: HEIGHT,
            fps: 10.0,
            has_audio: false,
            video_codec: Some("h264".to_string()),
            audio_codec: None,
            file_size: 0,
        }
    }

    fn fill(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, value: u8) {
        for py in y..y + h {
            for px in x..x + w {
                img.put_pixel(px, py, Rgb([value, value, value]));
            }
        }
    }

    /// Ten frames; a bright logo sits at a fixed spot inside `REGION` on
    /// frames 0..=6, while frames 7..=9 carry a bright blob in another corner
    /// of the region instead
    pub fn watermarked_frames() -> Vec<FrameBuffer> {
        (0..10)
            .map(|i| {
                let mut frame = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([BACKGROUND; 3]));
                if i < 7 {
                    fill(&mut frame, 50, 35, 6, 4, 240);
                } else {
                    fill(&mut frame, 41, 31, 3, 3, 240);
                }
                frame
            })
            .collect()
    }

    pub struct StubProbe {
        pub frames: usize,
    }

    #[async_trait]
    impl ProbePort for StubProbe {
        async fn probe(&self, path: &Path) -> VidResult<MediaInfo> {
            Ok(media_info(path, self.frames))
        }
    }

    pub struct MemoryBackend {
        pub frames: Vec<FrameBuffer>,
        pub written: Arc<Mutex<Vec<FrameBuffer>>>,
        pub finished: Arc<AtomicBool>,
    }

    impl MemoryBackend {
        pub fn new(frames: Vec<FrameBuffer>) -> Self {
            Self {
                frames,
                written: Arc::new(Mutex::new(Vec::new())),
                finished: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    struct MemorySource {
        info: MediaInfo,
        frames: Vec<FrameBuffer>,
    }

    impl FrameSource for MemorySource {
        fn info(&self) -> &MediaInfo {
            &self.info
        }

        fn read_frame(&mut self, index: u64) -> VidResult<FrameBuffer> {
            self.frames
                .get(index as usize)
                .cloned()
                .ok_or_else(|| VidError::frame_read(index, "past end of stream"))
        }
    }

    struct MemoryStream {
        frames: std::vec::IntoIter<FrameBuffer>,
    }

    impl FrameStream for MemoryStream {
        fn next_frame(&mut self) -> VidResult<Option<FrameBuffer>> {
            Ok(self.frames.next())
        }
    }

    struct MemoryWriter {
        written: Arc<Mutex<Vec<FrameBuffer>>>,
        finished: Arc<AtomicBool>,
    }

    impl FrameWriter for MemoryWriter {
        fn write_frame(&mut self, frame: &FrameBuffer) -> VidResult<()> {
            self.written.lock().unwrap().push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> VidResult<()> {
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    impl MediaBackend for MemoryBackend {
        fn open_source(&self, info: &MediaInfo) -> VidResult<Box<dyn FrameSource + Send>> {
            Ok(Box::new(MemorySource {
                info: info.clone(),
                frames: self.frames.clone(),
            }))
        }

        fn open_stream(&self, _info: &MediaInfo) -> VidResult<Box<dyn FrameStream + Send>> {
            Ok(Box::new(MemoryStream {
                frames: self.frames.clone().into_iter(),
            }))
        }

        fn create_writer(&self, _info: &MediaInfo, _output: &Path) -> VidResult<Box<dyn FrameWriter + Send>> {
            Ok(Box::new(MemoryWriter {
                written: self.written.clone(),
                finished: self.finished.clone(),
            }))
        }
    }

    pub fn seeded_config() -> WatermarkConfig {
        WatermarkConfig {
            seed: Some(7),
            ..WatermarkConfig::default()
        }
    }

    pub fn pipeline(backend: Arc<MemoryBackend>, frames: usize) -> WatermarkRemovalPipeline {
        WatermarkRemovalPipeline::new(Arc::new(StubProbe { frames }), backend, seeded_config())
    }
}

mod watermark_pipeline {
    use super::test_utils::*;
    use super::*;

    #[tokio::test]
    async fn test_removes_logo_and_reports_progress() {
        let backend = Arc::new(MemoryBackend::new(watermarked_frames()));
        let pipeline = pipeline(backend.clone(), 10);
        let sink = Arc::new(RecordingSink::default());

        let state = pipeline
            .run(
                Path::new("in.mp4"),
                Path::new("out.mp4"),
                REGION,
                sink.clone(),
                CancelToken::new(),
            )
            .await;

        assert_eq!(state, JobState::Succeeded);
        let events = sink.events();
        assert_well_formed(&events);
        assert_eq!(events.last(), Some(&Event::Success));
        assert_eq!(sink.percents().last().copied(), Some(100.0));

        assert!(backend.finished.load(Ordering::SeqCst));
        let written = backend.written.lock().unwrap();
        assert_eq!(written.len(), 10);
        for frame in written.iter() {
            assert_eq!(frame.dimensions(), (WIDTH, HEIGHT));
        }

        // The logo agreed on seven frames, so it is masked and filled from the
        // surrounding background
        let center = written[0].get_pixel(52, 36);
        assert!(center[0] < 80, "logo pixel not restored: {:?}", center);

        // Pixels outside the region are untouched
        assert_eq!(written[0].get_pixel(5, 5), &Rgb([BACKGROUND; 3]));
    }

    #[tokio::test]
    async fn test_logo_kept_when_agreement_not_reached() {
        let backend = Arc::new(MemoryBackend::new(watermarked_frames()));
        let config = WatermarkConfig {
            min_agreement: 8,
            ..seeded_config()
        };
        let pipeline = WatermarkRemovalPipeline::new(Arc::new(StubProbe { frames: 10 }), backend.clone(), config);
        let sink = Arc::new(RecordingSink::default());

        let state = pipeline
            .run(
                Path::new("in.mp4"),
                Path::new("out.mp4"),
                REGION,
                sink.clone(),
                CancelToken::new(),
            )
            .await;

        assert_eq!(state, JobState::Succeeded);
        let written = backend.written.lock().unwrap();
        assert_eq!(written[0].get_pixel(52, 36), &Rgb([240; 3]));
    }

    #[tokio::test]
    async fn test_region_outside_frame_fails_once() {
        let backend = Arc::new(MemoryBackend::new(watermarked_frames()));
        let pipeline = pipeline(backend.clone(), 10);
        let sink = Arc::new(RecordingSink::default());

        let state = pipeline
            .run(
                Path::new("in.mp4"),
                Path::new("out.mp4"),
                Rectangle::new(60, 40, 10, 10),
                sink.clone(),
                CancelToken::new(),
            )
            .await;

        assert!(matches!(state, JobState::Failed(_)));
        let events = sink.events();
        assert_well_formed(&events);
        match events.last() {
            Some(Event::Failure(reason)) => assert!(reason.contains("does not fit")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(backend.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_between_frames() {
        let backend = Arc::new(MemoryBackend::new(watermarked_frames()));
        let pipeline = pipeline(backend.clone(), 10);
        let token = CancelToken::new();
        let sink = Arc::new(RecordingSink::cancelling(token.clone()));

        let state = pipeline
            .run(Path::new("in.mp4"), Path::new("out.mp4"), REGION, sink.clone(), token)
            .await;

        assert_eq!(state, JobState::Cancelled);
        let events = sink.events();
        assert_well_formed(&events);
        assert_eq!(events.last(), Some(&Event::Failure("Job cancelled".to_string())));
        assert_eq!(backend.written.lock().unwrap().len(), 1);
        assert!(!backend.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_preview_scales_first_bright_frame() {
        let frames: Vec<FrameBuffer> = (0..10)
            .map(|i| {
                let value = if i == 0 { 0 } else { 128 };
                RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([value; 3]))
            })
            .collect();
        let backend = Arc::new(MemoryBackend::new(frames));
        let config = WatermarkConfig {
            preview_height: 24,
            ..seeded_config()
        };
        let pipeline = WatermarkRemovalPipeline::new(Arc::new(StubProbe { frames: 10 }), backend, config);

        let preview = pipeline.preview(Path::new("in.mp4")).await.unwrap();
        assert_eq!(preview.image.dimensions(), (32, 24));
        assert!((preview.scale - 0.5).abs() < 1e-9);
        assert_eq!((preview.source_width, preview.source_height), (WIDTH, HEIGHT));
        assert!(preview.image.get_pixel(10, 10)[0] > 100);

        let region = Rectangle::from_preview(Rectangle::new(20, 15, 10, 7), preview.scale).unwrap();
        assert_eq!(region, REGION);
    }
}

mod job_registry {
    use super::test_utils::*;
    use super::*;

    #[tokio::test]
    async fn test_watermark_job_through_registry() {
        let backend = Arc::new(MemoryBackend::new(watermarked_frames()));
        let config = AppConfig {
            watermark: seeded_config(),
            ..AppConfig::default()
        };
        let container = AppContainer::with_ports(config, Arc::new(StubProbe { frames: 10 }), backend.clone());
        let registry = container.registry();
        let sink = Arc::new(RecordingSink::default());

        let mut handle =
            registry.start_watermark_removal(Path::new("in.mp4"), Path::new("out.mp4"), REGION, sink.clone());
        let state = handle.wait().await;

        assert_eq!(state, JobState::Succeeded);
        assert_eq!(handle.state(), JobState::Succeeded);
        assert_well_formed(&sink.events());
        assert!(registry.active_jobs().is_empty());
        assert!(!registry.cancel(handle.id()));
    }

    #[tokio::test]
    async fn test_job_ids_are_distinct() {
        let backend = Arc::new(MemoryBackend::new(watermarked_frames()));
        let container = AppContainer::with_ports(AppConfig::default(), Arc::new(StubProbe { frames: 10 }), backend);
        let registry = container.registry();

        let mut first = registry.start_watermark_removal(
            Path::new("a.mp4"),
            Path::new("a_out.mp4"),
            REGION,
            Arc::new(RecordingSink::default()),
        );
        let mut second = registry.start_watermark_removal(
            Path::new("b.mp4"),
            Path::new("b_out.mp4"),
            REGION,
            Arc::new(RecordingSink::default()),
        );
        assert_ne!(first.id(), second.id());

        assert_eq!(first.wait().await, JobState::Succeeded);
        assert_eq!(second.wait().await, JobState::Succeeded);
    }
}

/// Transcoder tests against a shell script standing in for ffmpeg
#[cfg(unix)]
mod fake_encoder {
    use super::test_utils::*;
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;
    use vidtool::adapters::exec_ffmpeg::{FfmpegBackend, WriterSettings};
    use vidtool::config::TranscodeConfig;
    use vidtool::engine::transcoder::Transcoder;

    struct FixedDuration(f64);

    #[async_trait]
    impl ProbePort for FixedDuration {
        async fn probe(&self, path: &Path) -> VidResult<MediaInfo> {
            let mut info = media_info(path, 10);
            info.duration = self.0;
            Ok(info)
        }
    }

    fn fake_ffmpeg(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn transcoder(ffmpeg: PathBuf, duration: f64) -> Transcoder {
        Transcoder::new(Arc::new(FixedDuration(duration)), ffmpeg, TranscodeConfig::default())
    }

    #[tokio::test]
    async fn test_progress_from_encoder_output() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = fake_ffmpeg(
            &dir,
            "echo 'frame=  100 fps= 25 q=28.0 size=    256kB time=00:00:50.00 bitrate= 41.9kbits/s speed=2.0x' >&2\nexit 0",
        );
        let sink = Arc::new(RecordingSink::default());

        let state = transcoder(ffmpeg, 100.0)
            .run(
                &dir.path().join("in.mp4"),
                &dir.path().join("out.mkv"),
                sink.clone(),
                CancelToken::new(),
            )
            .await;

        assert_eq!(state, JobState::Succeeded);
        let events = sink.events();
        assert_well_formed(&events);
        let percents = sink.percents();
        assert_eq!(percents.len(), 2);
        assert!((percents[0] - 50.0).abs() < 1e-6);
        assert_eq!(percents[1], 100.0);
    }

    #[tokio::test]
    async fn test_progress_capped_below_completion() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = fake_ffmpeg(&dir, "echo 'time=00:02:30.00' >&2\nexit 0");
        let sink = Arc::new(RecordingSink::default());

        transcoder(ffmpeg, 100.0)
            .run(
                &dir.path().join("in.mp4"),
                &dir.path().join("out.mp4"),
                sink.clone(),
                CancelToken::new(),
            )
            .await;

        assert_eq!(sink.percents(), vec![99.0, 100.0]);
    }

    #[tokio::test]
    async fn test_encoder_failure_carries_diagnostics() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = fake_ffmpeg(&dir, "echo \"Unknown encoder 'libfoo'\" >&2\nexit 1");
        let sink = Arc::new(RecordingSink::default());

        let state = transcoder(ffmpeg, 100.0)
            .run(
                &dir.path().join("in.mp4"),
                &dir.path().join("out.mp4"),
                sink.clone(),
                CancelToken::new(),
            )
            .await;

        match state {
            JobState::Failed(reason) => assert!(reason.contains("Unknown encoder 'libfoo'")),
            other => panic!("expected failure, got {:?}", other),
        }
        let events = sink.events();
        assert_well_formed(&events);
        assert!(sink.percents().is_empty());
    }

    #[tokio::test]
    async fn test_zero_duration_is_probe_failure() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = fake_ffmpeg(&dir, "exit 0");
        let sink = Arc::new(RecordingSink::default());

        let state = transcoder(ffmpeg, 0.0)
            .run(
                &dir.path().join("in.mp4"),
                &dir.path().join("out.mp4"),
                sink.clone(),
                CancelToken::new(),
            )
            .await;

        assert!(matches!(state, JobState::Failed(_)));
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_kills_encoder() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = fake_ffmpeg(&dir, "echo 'time=00:00:10.00' >&2\nexec sleep 30");
        let sink = Arc::new(RecordingSink::default());
        let token = CancelToken::new();

        let transcoder = transcoder(ffmpeg, 100.0);
        let input = dir.path().join("in.mp4");
        let output = dir.path().join("out.mp4");
        let run = transcoder.run(&input, &output, sink.clone(), token.clone());

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            token.cancel();
        };
        let (state, ()) = tokio::time::timeout(Duration::from_secs(10), async { tokio::join!(run, cancel) })
            .await
            .expect("cancellation did not stop the encoder");

        assert_eq!(state, JobState::Cancelled);
        let events = sink.events();
        assert_well_formed(&events);
        assert_eq!(events.last(), Some(&Event::Failure("Job cancelled".to_string())));
    }

    #[tokio::test]
    async fn test_corrupt_input_fails_watermark_job() {
        let dir = TempDir::new().unwrap();
        // Sampled frames decode; the full decode stops after one frame with an error
        let ffmpeg = fake_ffmpeg(
            &dir,
            "case \"$*\" in\n\
             *pipe:0*) cat >/dev/null; exit 0 ;;\n\
             *-frames:v*) head -c 9216 /dev/zero; exit 0 ;;\n\
             *) head -c 9216 /dev/zero; echo 'Invalid data found when processing input' >&2; exit 1 ;;\n\
             esac",
        );
        let config = seeded_config();
        let backend = FfmpegBackend::new(ffmpeg, WriterSettings::from(&config));
        let pipeline = WatermarkRemovalPipeline::new(Arc::new(StubProbe { frames: 10 }), Arc::new(backend), config);
        let sink = Arc::new(RecordingSink::default());

        let state = pipeline
            .run(
                &dir.path().join("in.mp4"),
                &dir.path().join("out.mp4"),
                REGION,
                sink.clone(),
                CancelToken::new(),
            )
            .await;

        match state {
            JobState::Failed(reason) => assert!(reason.contains("Invalid data found"), "{}", reason),
            other => panic!("expected failure, got {:?}", other),
        }
        let events = sink.events();
        assert_well_formed(&events);
        assert!(!events.contains(&Event::Success));
        assert!(sink.percents().iter().all(|p| *p < 100.0));
    }

    #[tokio::test]
    async fn test_missing_encoder_is_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());

        let state = transcoder(dir.path().join("no-such-ffmpeg"), 100.0)
            .run(
                &dir.path().join("in.mp4"),
                &dir.path().join("out.mp4"),
                sink.clone(),
                CancelToken::new(),
            )
            .await;

        match state {
            JobState::Failed(reason) => assert!(reason.contains("Failed to start")),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
