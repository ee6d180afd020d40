//! Job execution engine: progress gating, cancellation and the transcoder

pub mod cancel;
pub mod progress;
pub mod transcoder;

pub use cancel::CancelToken;
pub use progress::{ConsoleProgressSink, JsonProgressSink, NoOpProgressSink, ProgressGate};
pub use transcoder::{LineSplitter, Transcoder};
