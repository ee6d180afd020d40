//! Progress gating and the built-in progress sinks

use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::domain::model::JobState;
use crate::ports::ProgressSink;

/// Percentage reported together with success
pub const COMPLETE_PERCENT: f64 = 100.0;

/// Enforces the progress contract in front of a sink.
///
/// Non-terminal samples are forwarded only while the job is running, only when
/// they strictly exceed the last forwarded value, and never at or above 100.
/// The first terminal transition wins; later ones are ignored. Success is the
/// only path that forwards 100%.
pub struct ProgressGate {
    sink: Arc<dyn ProgressSink>,
    inner: Mutex<GateInner>,
}

struct GateInner {
    last_percent: f64,
    state: JobState,
}

impl ProgressGate {
    /// Create a gate in the `Running` state
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            inner: Mutex::new(GateInner {
                last_percent: 0.0,
                state: JobState::Running,
            }),
        }
    }

    /// Offer a progress sample; returns whether it was forwarded
    pub fn report(&self, percent: f64) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };

        if inner.state.is_terminal()
            || !percent.is_finite()
            || percent <= inner.last_percent
            || percent >= COMPLETE_PERCENT
        {
            return false;
        }

        inner.last_percent = percent;
        self.sink.on_progress(percent);
        true
    }

    /// Emit the final 100% followed by success
    pub fn succeed(&self) -> bool {
        self.finish(JobState::Succeeded)
    }

    /// Report a failure with a human-readable reason
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.finish(JobState::Failed(reason.into()))
    }

    /// Report that the job was cancelled by its owner
    pub fn cancel(&self) -> bool {
        self.finish(JobState::Cancelled)
    }

    fn finish(&self, terminal: JobState) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };

        if inner.state.is_terminal() {
            debug!(
                current = ?inner.state,
                ignored = ?terminal,
                "Ignoring second terminal transition"
            );
            return false;
        }

        match &terminal {
            JobState::Succeeded => {
                inner.last_percent = COMPLETE_PERCENT;
                self.sink.on_progress(COMPLETE_PERCENT);
                self.sink.on_success();
            }
            JobState::Failed(reason) => self.sink.on_failure(reason),
            JobState::Cancelled => self.sink.on_failure("Job cancelled"),
            JobState::Running => {
                warn!("Running is not a terminal state");
                return false;
            }
        }

        inner.state = terminal;
        true
    }

    /// Current job state
    pub fn state(&self) -> JobState {
        self.inner
            .lock()
            .map(|inner| inner.state.clone())
            .unwrap_or_else(|_| JobState::Failed("progress state poisoned".to_string()))
    }

    /// Last forwarded percentage
    pub fn last_percent(&self) -> f64 {
        self.inner
            .lock()
            .map(|inner| inner.last_percent)
            .unwrap_or(0.0)
    }
}

/// Console progress bar for CLI usage
pub struct ConsoleProgressSink {
    label: String,
}

impl ConsoleProgressSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressSink for ConsoleProgressSink {
    fn on_progress(&self, percent: f64) {
        let bar_length = 20;
        let filled = ((percent / 100.0) * bar_length as f64) as usize;
        let filled = filled.min(bar_length);
        let bar = "#".repeat(filled) + &"-".repeat(bar_length - filled);

        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\r{} [{}] {:>5.1}%", self.label, bar, percent);
        let _ = stdout.flush();
    }

    fn on_success(&self) {
        println!("\n{}: done", self.label);
    }

    fn on_failure(&self, reason: &str) {
        println!("\n{}: failed: {}", self.label, reason);
    }
}

/// JSON-lines progress events for machine consumers
pub struct JsonProgressSink {
    job: String,
}

impl JsonProgressSink {
    pub fn new(job: impl Into<String>) -> Self {
        Self { job: job.into() }
    }
}

impl ProgressSink for JsonProgressSink {
    fn on_progress(&self, percent: f64) {
        let event = serde_json::json!({
            "event": "progress",
            "job": self.job,
            "percent": percent,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        println!("{}", event);
    }

    fn on_success(&self) {
        let event = serde_json::json!({
            "event": "success",
            "job": self.job,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        println!("{}", event);
    }

    fn on_failure(&self, reason: &str) {
        let event = serde_json::json!({
            "event": "failure",
            "job": self.job,
            "reason": reason,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        println!("{}", event);
    }
}

/// No-op sink for when progress reporting is disabled
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn on_progress(&self, _percent: f64) {}
    fn on_success(&self) {}
    fn on_failure(&self, _reason: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Progress(f64),
        Success,
        Failure(String),
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ProgressSink for RecordingSink {
        fn on_progress(&self, percent: f64) {
            self.events.lock().unwrap().push(Event::Progress(percent));
        }

        fn on_success(&self) {
            self.events.lock().unwrap().push(Event::Success);
        }

        fn on_failure(&self, reason: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Failure(reason.to_string()));
        }
    }

    fn gate() -> (Arc<RecordingSink>, ProgressGate) {
        let sink = Arc::new(RecordingSink::default());
        let gate = ProgressGate::new(sink.clone());
        (sink, gate)
    }

    #[test]
    fn test_gate_forwards_strictly_increasing_samples() {
        let (sink, gate) = gate();
        assert!(gate.report(10.0));
        assert!(!gate.report(10.0));
        assert!(!gate.report(5.0));
        assert!(gate.report(42.5));
        assert!(!gate.report(f64::NAN));
        assert!(!gate.report(0.0));

        assert_eq!(
            sink.events(),
            vec![Event::Progress(10.0), Event::Progress(42.5)]
        );
        assert_eq!(gate.last_percent(), 42.5);
    }

    #[test]
    fn test_gate_never_forwards_100_before_success() {
        let (sink, gate) = gate();
        gate.report(99.0);
        assert!(!gate.report(100.0));
        assert!(!gate.report(150.0));
        assert!(gate.succeed());

        assert_eq!(
            sink.events(),
            vec![
                Event::Progress(99.0),
                Event::Progress(100.0),
                Event::Success
            ]
        );
        assert_eq!(gate.state(), JobState::Succeeded);
    }

    #[test]
    fn test_gate_terminal_transition_happens_once() {
        let (sink, gate) = gate();
        gate.report(30.0);
        assert!(gate.fail("encoder crashed"));
        assert!(!gate.succeed());
        assert!(!gate.cancel());
        assert!(!gate.report(60.0));

        assert_eq!(
            sink.events(),
            vec![
                Event::Progress(30.0),
                Event::Failure("encoder crashed".to_string())
            ]
        );
        assert_eq!(gate.state(), JobState::Failed("encoder crashed".to_string()));
    }

    #[test]
    fn test_gate_cancel_reports_failure() {
        let (sink, gate) = gate();
        assert!(gate.cancel());
        assert_eq!(gate.state(), JobState::Cancelled);
        assert_eq!(
            sink.events(),
            vec![Event::Failure("Job cancelled".to_string())]
        );
    }

    #[test]
    fn test_builtin_sinks_do_not_panic() {
        let sinks: Vec<Box<dyn ProgressSink>> = vec![
            Box::new(ConsoleProgressSink::new("clip.mp4")),
            Box::new(JsonProgressSink::new("job-1")),
            Box::new(NoOpProgressSink),
        ];
        for sink in sinks {
            sink.on_progress(12.5);
            sink.on_success();
            sink.on_failure("boom");
        }
    }
}
