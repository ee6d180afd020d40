//! Transcoding by supervising an external ffmpeg process.
//!
//! The encoder's stderr is read as it arrives and scanned for the `time=`
//! token of its stats line. Elapsed time is mapped onto a percentage of the
//! probed input duration and passed through a [`ProgressGate`], which keeps
//! the percentage below 100 until the encoder has exited cleanly.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::TranscodeConfig;
use crate::domain::format::FormatProfile;
use crate::domain::model::{JobState, TranscodeJob};
use crate::engine::cancel::CancelToken;
use crate::engine::progress::ProgressGate;
use crate::error::{VidError, VidResult};
use crate::ports::{ProbePort, ProgressSink};
use crate::utils::time::TimeParser;

/// Diagnostic lines kept for the failure report
const DIAGNOSTIC_TAIL_LINES: usize = 200;

/// Splits a byte stream into lines on `\n` or `\r`.
///
/// ffmpeg rewrites its stats line in place with carriage returns, so both
/// terminators end a line. Empty lines are dropped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                self.flush_into(&mut lines);
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Return the trailing unterminated line, if any
    pub fn finish(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        self.flush_into(&mut lines);
        lines.pop()
    }

    fn flush_into(&mut self, lines: &mut Vec<String>) {
        if self.pending.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        if !line.is_empty() {
            lines.push(line);
        }
    }
}

/// Last [`DIAGNOSTIC_TAIL_LINES`] lines of encoder output for error reports;
/// the report notes how many earlier lines were dropped
#[derive(Debug, Default)]
struct Diagnostics {
    lines: VecDeque<String>,
    omitted: usize,
}

impl Diagnostics {
    fn push(&mut self, line: &str) {
        if self.lines.len() == DIAGNOSTIC_TAIL_LINES {
            self.lines.pop_front();
            self.omitted += 1;
        }
        self.lines.push_back(line.to_string());
    }

    fn text(&self) -> String {
        let tail = self.lines.iter().cloned().collect::<Vec<_>>().join("\n");
        if self.omitted == 0 {
            tail
        } else {
            format!("[{} earlier lines omitted]\n{}", self.omitted, tail)
        }
    }
}

/// Runs one ffmpeg transcode per call
pub struct Transcoder {
    probe: Arc<dyn ProbePort>,
    ffmpeg: PathBuf,
    settings: TranscodeConfig,
    time_parser: TimeParser,
}

impl Transcoder {
    /// Create a transcoder using `ffmpeg` as the encoder binary
    pub fn new(probe: Arc<dyn ProbePort>, ffmpeg: impl Into<PathBuf>, settings: TranscodeConfig) -> Self {
        Self {
            probe,
            ffmpeg: ffmpeg.into(),
            settings,
            time_parser: TimeParser::new(),
        }
    }

    /// Encoder command line for a job, excluding the program name
    pub fn build_args(job: &TranscodeJob, profile: &FormatProfile, settings: &TranscodeConfig) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            job.input_path.to_string_lossy().to_string(),
        ];
        args.extend(profile.encoder_args());
        args.extend(
            [
                "-loglevel",
                "info",
                "-stats",
                "-b:v",
                settings.video_bitrate.as_str(),
                "-b:a",
                settings.audio_bitrate.as_str(),
                "-copyts",
                "-vsync",
                "0",
                "-y",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(job.output_path.to_string_lossy().to_string());
        args
    }

    /// Transcode `input` into `output`, reporting through `sink`.
    ///
    /// Never returns an error: every outcome reaches the sink exactly once and
    /// is mirrored in the returned terminal state.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        sink: Arc<dyn ProgressSink>,
        cancel: CancelToken,
    ) -> JobState {
        let gate = ProgressGate::new(sink);

        match self.execute(input, output, &gate, &cancel).await {
            Ok(()) => {
                info!(input = %input.display(), output = %output.display(), "Transcode finished");
                gate.succeed();
            }
            Err(VidError::Cancelled) => {
                info!(input = %input.display(), "Transcode cancelled");
                gate.cancel();
            }
            Err(e) => {
                warn!(input = %input.display(), error = %e, "Transcode failed");
                gate.fail(e.to_string());
            }
        }

        gate.state()
    }

    async fn execute(
        &self,
        input: &Path,
        output: &Path,
        gate: &ProgressGate,
        cancel: &CancelToken,
    ) -> VidResult<()> {
        let profile = FormatProfile::for_path(output);
        if profile.is_empty() {
            warn!(
                output = %output.display(),
                "No format profile for output extension, using encoder defaults"
            );
        }

        let info = self.probe.probe(input).await?;
        let job = TranscodeJob::new(input, output, info.duration)?;
        debug!(duration = job.total_duration_seconds, "Probed input");

        if cancel.is_cancelled() {
            return Err(VidError::Cancelled);
        }

        let args = Self::build_args(&job, &profile, &self.settings);
        debug!(program = %self.ffmpeg.display(), ?args, "Spawning encoder");

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| VidError::Spawn {
                program: self.ffmpeg.display().to_string(),
                source,
            })?;

        let result = self.monitor(&mut child, &job, gate, cancel).await;
        if result.is_err() {
            terminate(&mut child).await;
        }
        result
    }

    async fn monitor(
        &self,
        child: &mut Child,
        job: &TranscodeJob,
        gate: &ProgressGate,
        cancel: &CancelToken,
    ) -> VidResult<()> {
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("encoder stderr was not captured"))?;

        let mut splitter = LineSplitter::new();
        let mut diagnostics = Diagnostics::default();
        let mut buf = [0u8; 4096];

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(VidError::Cancelled),
                read = stderr.read(&mut buf) => read?,
            };

            if read == 0 {
                break;
            }

            for line in splitter.push(&buf[..read]) {
                self.handle_line(&line, job, gate, &mut diagnostics);
            }
        }

        if let Some(line) = splitter.finish() {
            self.handle_line(&line, job, gate, &mut diagnostics);
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(VidError::Cancelled),
            status = child.wait() => status?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(VidError::EncodeProcess {
                status: status.to_string(),
                diagnostics: diagnostics.text(),
            })
        }
    }

    fn handle_line(&self, line: &str, job: &TranscodeJob, gate: &ProgressGate, diagnostics: &mut Diagnostics) {
        diagnostics.push(line);
        match self.time_parser.parse_progress_line(line) {
            Ok(Some(elapsed)) => {
                gate.report(job.percent_at(elapsed));
            }
            Ok(None) => {}
            Err(e) => debug!(line, error = %e, "Ignoring unparseable progress line"),
        }
    }
}

/// Kill the encoder, logging instead of failing
async fn terminate(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(e) => debug!(error = %e, "Could not query encoder status before kill"),
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill encoder process");
    }
}
