//! FFmpeg frame decode/encode adapter
//!
//! Frames cross the process boundary as raw `rgb24` over pipes. Decoding is
//! either random access (one short ffmpeg run per frame) or a single
//! sequential stream; encoding writes frames to ffmpeg's stdin and muxes the
//! first audio track of the source back in.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::config::WatermarkConfig;
use crate::domain::model::{FrameBuffer, MediaInfo};
use crate::error::{VidError, VidResult};
use crate::ports::{FrameSource, FrameStream, FrameWriter, MediaBackend};

/// Check whether an ffmpeg binary can be executed
pub fn is_ffmpeg_available(ffmpeg: &Path) -> bool {
    Command::new(ffmpeg)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn frame_len(info: &MediaInfo) -> usize {
    info.width as usize * info.height as usize * 3
}

fn spawn_error(program: &Path, source: std::io::Error) -> VidError {
    VidError::Spawn {
        program: program.display().to_string(),
        source,
    }
}

/// Bytes of child stderr kept for error reports
const STDERR_TAIL_BYTES: usize = 64 * 1024;

/// Reads a child's stderr on a helper thread so the child never blocks on a
/// full pipe; only the last [`STDERR_TAIL_BYTES`] are kept
struct StderrDrain {
    handle: Option<JoinHandle<Vec<u8>>>,
}

impl StderrDrain {
    fn spawn(child: &mut Child) -> Self {
        let handle = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut tail = Vec::new();
                let mut buf = [0u8; 8192];
                loop {
                    match stderr.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            tail.extend_from_slice(&buf[..n]);
                            if tail.len() > STDERR_TAIL_BYTES {
                                let excess = tail.len() - STDERR_TAIL_BYTES;
                                tail.drain(..excess);
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
                tail
            })
        });
        Self { handle }
    }

    /// Wait for stderr to close and return the kept text
    fn finish(&mut self) -> String {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(bytes)) => String::from_utf8_lossy(&bytes).trim().to_string(),
            Some(Err(_)) => {
                warn!("ffmpeg stderr reader panicked");
                String::new()
            }
            None => String::new(),
        }
    }
}

fn failure_text(status: ExitStatus, diagnostics: String) -> String {
    if diagnostics.is_empty() {
        format!("ffmpeg exited with {}", status)
    } else {
        diagnostics
    }
}

/// Kill and reap a child, logging instead of failing
fn terminate(child: &mut Child, what: &str) {
    match child.try_wait() {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(e) => debug!(error = %e, what, "Could not query process status"),
    }
    if let Err(e) = child.kill() {
        warn!(error = %e, what, "Failed to kill ffmpeg process");
    }
    if let Err(e) = child.wait() {
        debug!(error = %e, what, "Failed to reap ffmpeg process");
    }
}

/// Random-access decoder: one ffmpeg invocation per requested frame
pub struct FfmpegFrameSource {
    ffmpeg: PathBuf,
    info: MediaInfo,
}

impl FfmpegFrameSource {
    pub fn new(ffmpeg: impl Into<PathBuf>, info: MediaInfo) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            info,
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn read_frame(&mut self, index: u64) -> VidResult<FrameBuffer> {
        let seek = format!("{:.6}", self.info.frame_time(index));
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss", seek.as_str()])
            .arg("-i")
            .arg(&self.info.path)
            .args([
                "-map", "0:v:0", "-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(&self.ffmpeg, e))?;

        if !output.status.success() {
            return Err(VidError::frame_read(
                index,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let expected = frame_len(&self.info);
        if expected == 0 || output.stdout.len() < expected {
            return Err(VidError::frame_read(
                index,
                format!(
                    "decoder returned {} bytes, expected {}",
                    output.stdout.len(),
                    expected
                ),
            ));
        }

        let mut data = output.stdout;
        data.truncate(expected);
        FrameBuffer::from_raw(self.info.width, self.info.height, data)
            .ok_or_else(|| VidError::frame_read(index, "frame buffer size mismatch"))
    }
}

/// Sequential decoder over every frame of the first video stream
pub struct FfmpegFrameStream {
    child: Child,
    stdout: ChildStdout,
    stderr: StderrDrain,
    finished: bool,
    width: u32,
    height: u32,
    next_index: u64,
}

impl FfmpegFrameStream {
    pub fn open(ffmpeg: &Path, info: &MediaInfo) -> VidResult<Self> {
        let mut child = Command::new(ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(&info.path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(ffmpeg, e))?;

        let stderr = StderrDrain::spawn(&mut child);
        let Some(stdout) = child.stdout.take() else {
            terminate(&mut child, "decoder");
            return Err(VidError::Io(std::io::Error::other(
                "decoder stdout was not captured",
            )));
        };

        Ok(Self {
            child,
            stdout,
            stderr,
            finished: false,
            width: info.width,
            height: info.height,
            next_index: 0,
        })
    }

    /// Reap the decoder once its output is exhausted; a non-zero exit means
    /// the input could not be fully decoded
    fn finish(&mut self) -> VidResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let status = self.child.wait()?;
        let diagnostics = self.stderr.finish();
        if !status.success() {
            return Err(VidError::frame_read(
                self.next_index,
                failure_text(status, diagnostics),
            ));
        }
        Ok(())
    }
}

impl FrameStream for FfmpegFrameStream {
    fn next_frame(&mut self) -> VidResult<Option<FrameBuffer>> {
        let mut data = vec![0u8; self.width as usize * self.height as usize * 3];
        let mut filled = 0;
        while filled < data.len() {
            match self.stdout.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(VidError::frame_read(self.next_index, e.to_string())),
            }
        }

        if filled == 0 {
            return self.finish().map(|()| None);
        }
        if filled < data.len() {
            let truncated = format!("truncated frame: {} of {} bytes", filled, data.len());
            return Err(match self.finish() {
                Err(VidError::FrameRead { index, message }) => VidError::FrameRead {
                    index,
                    message: format!("{}; {}", truncated, message),
                },
                Err(e) => e,
                Ok(()) => VidError::frame_read(self.next_index, truncated),
            });
        }

        let index = self.next_index;
        self.next_index += 1;
        FrameBuffer::from_raw(self.width, self.height, data)
            .map(Some)
            .ok_or_else(|| VidError::frame_read(index, "frame buffer size mismatch"))
    }
}

impl Drop for FfmpegFrameStream {
    fn drop(&mut self) {
        if !self.finished {
            terminate(&mut self.child, "decoder");
        }
    }
}

/// Settings for the re-encode of restored frames
#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub preset: String,
    pub audio_bitrate: String,
    pub threads: usize,
}

impl From<&WatermarkConfig> for WriterSettings {
    fn from(config: &WatermarkConfig) -> Self {
        Self {
            preset: config.preset.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
            threads: config.threads,
        }
    }
}

/// Encoder fed with raw frames on stdin
pub struct FfmpegFrameWriter {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: StderrDrain,
    width: u32,
    height: u32,
}

impl FfmpegFrameWriter {
    /// Encoder arguments, excluding the program name
    pub fn build_args(info: &MediaInfo, output: &Path, settings: &WriterSettings) -> Vec<String> {
        let mut args: Vec<String> = [
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push(format!("{}x{}", info.width, info.height));
        args.push("-r".to_string());
        args.push(format!("{}", info.fps));
        args.extend(["-i", "pipe:0", "-i"].iter().map(|s| s.to_string()));
        args.push(info.path.to_string_lossy().to_string());
        args.extend(
            [
                "-map",
                "0:v:0",
                "-map",
                "1:a:0?",
                "-c:v",
                "libx264",
                "-preset",
                settings.preset.as_str(),
                "-pix_fmt",
                "yuv420p",
                "-vf",
                "pad=ceil(iw/2)*2:ceil(ih/2)*2",
                "-c:a",
                "aac",
                "-b:a",
                settings.audio_bitrate.as_str(),
                "-threads",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(settings.threads.to_string());
        args.push("-y".to_string());
        args.push(output.to_string_lossy().to_string());
        args
    }

    pub fn create(
        ffmpeg: &Path,
        info: &MediaInfo,
        output: &Path,
        settings: &WriterSettings,
    ) -> VidResult<Self> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let args = Self::build_args(info, output, settings);
        debug!(program = %ffmpeg.display(), ?args, "Spawning frame encoder");

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(ffmpeg, e))?;

        let stderr = StderrDrain::spawn(&mut child);
        let Some(stdin) = child.stdin.take() else {
            terminate(&mut child, "encoder");
            return Err(VidError::Io(std::io::Error::other(
                "encoder stdin was not captured",
            )));
        };

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stderr,
            width: info.width,
            height: info.height,
        })
    }
}

impl FrameWriter for FfmpegFrameWriter {
    fn write_frame(&mut self, frame: &FrameBuffer) -> VidResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(VidError::InvalidArgument(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(VidError::InvalidArgument(
                "encoder is already finished".to_string(),
            ));
        };
        let written = stdin.write_all(frame.as_raw());
        match written {
            Ok(()) => Ok(()),
            // The encoder went away; its exit status explains why
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                Err(self.finish().err().unwrap_or(VidError::Io(e)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn finish(&mut self) -> VidResult<()> {
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        let diagnostics = self.stderr.finish();
        if !status.success() {
            return Err(VidError::EncodeProcess {
                status: status.to_string(),
                diagnostics,
            });
        }
        Ok(())
    }
}

impl Drop for FfmpegFrameWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            terminate(&mut child, "encoder");
        }
    }
}

/// [`MediaBackend`] backed by an ffmpeg binary
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    settings: WriterSettings,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: impl Into<PathBuf>, settings: WriterSettings) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            settings,
        }
    }
}

impl MediaBackend for FfmpegBackend {
    fn open_source(&self, info: &MediaInfo) -> VidResult<Box<dyn FrameSource + Send>> {
        Ok(Box::new(FfmpegFrameSource::new(&self.ffmpeg, info.clone())))
    }

    fn open_stream(&self, info: &MediaInfo) -> VidResult<Box<dyn FrameStream + Send>> {
        Ok(Box::new(FfmpegFrameStream::open(&self.ffmpeg, info)?))
    }

    fn create_writer(
        &self,
        info: &MediaInfo,
        output: &Path,
    ) -> VidResult<Box<dyn FrameWriter + Send>> {
        Ok(Box::new(FfmpegFrameWriter::create(
            &self.ffmpeg,
            info,
            output,
            &self.settings,
        )?))
    }
}
