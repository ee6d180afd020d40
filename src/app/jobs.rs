//! Job registry - caller-facing API for starting and cancelling jobs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, error, info};

use crate::domain::model::{JobId, JobKind, JobState, Rectangle};
use crate::engine::cancel::CancelToken;
use crate::engine::transcoder::Transcoder;
use crate::ports::ProgressSink;
use crate::watermark::WatermarkRemovalPipeline;

/// Snapshot of a running job
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub id: JobId,
    pub kind: JobKind,
    pub input: PathBuf,
    pub output: PathBuf,
}

struct JobEntry {
    summary: JobSummary,
    cancel: CancelToken,
}

type JobTable = Arc<Mutex<HashMap<JobId, JobEntry>>>;

/// Handle to one started job
pub struct JobHandle {
    id: JobId,
    kind: JobKind,
    cancel: CancelToken,
    state: watch::Receiver<JobState>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Request cancellation. A transcode's encoder is killed immediately; a
    /// watermark removal stops before its next frame.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Current state without waiting
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Wait for the job to reach a terminal state
    pub async fn wait(&mut self) -> JobState {
        match self.state.wait_for(JobState::is_terminal).await {
            Ok(state) => (*state).clone(),
            Err(_) => JobState::Failed("job worker stopped unexpectedly".to_string()),
        }
    }
}

/// Registry of running jobs, keyed by [`JobId`].
///
/// Each job runs on its own Tokio task and owns its encoder process or mask
/// exclusively. Entries are removed when the job's worker ends, including
/// when it panics; a panic is reported to the sink as a failure.
pub struct JobRegistry {
    transcoder: Arc<Transcoder>,
    pipeline: Arc<WatermarkRemovalPipeline>,
    jobs: JobTable,
    next_id: AtomicU64,
}

impl JobRegistry {
    pub fn new(transcoder: Arc<Transcoder>, pipeline: Arc<WatermarkRemovalPipeline>) -> Self {
        Self {
            transcoder,
            pipeline,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start transcoding `input` into `output`; must be called inside a Tokio runtime
    pub fn start_transcode(&self, input: &Path, output: &Path, sink: Arc<dyn ProgressSink>) -> JobHandle {
        let transcoder = self.transcoder.clone();
        self.spawn(JobKind::Transcode, input, output, sink, move |input, output, sink, cancel| async move {
            transcoder.run(&input, &output, sink, cancel).await
        })
    }

    /// Start removing the watermark in `region` (source coordinates)
    pub fn start_watermark_removal(
        &self,
        input: &Path,
        output: &Path,
        region: Rectangle,
        sink: Arc<dyn ProgressSink>,
    ) -> JobHandle {
        let pipeline = self.pipeline.clone();
        self.spawn(
            JobKind::WatermarkRemoval,
            input,
            output,
            sink,
            move |input, output, sink, cancel| async move {
                pipeline.run(&input, &output, region, sink, cancel).await
            },
        )
    }

    fn spawn<F, Fut>(
        &self,
        kind: JobKind,
        input: &Path,
        output: &Path,
        sink: Arc<dyn ProgressSink>,
        work: F,
    ) -> JobHandle
    where
        F: FnOnce(PathBuf, PathBuf, Arc<dyn ProgressSink>, CancelToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = JobState> + Send + 'static,
    {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancelToken::new();
        let (state_tx, state_rx) = watch::channel(JobState::Running);

        let summary = JobSummary {
            id,
            kind,
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        };
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(
                id,
                JobEntry {
                    summary,
                    cancel: cancel.clone(),
                },
            );
        }
        info!(%id, ?kind, input = %input.display(), output = %output.display(), "Job started");

        let jobs = self.jobs.clone();
        let (input, output) = (input.to_path_buf(), output.to_path_buf());
        let worker_cancel = cancel.clone();
        tokio::spawn(async move {
            let worker_sink = sink.clone();
            let worker = tokio::spawn(async move { work(input, output, worker_sink, worker_cancel).await });
            let state = match worker.await {
                Ok(state) => state,
                Err(e) => {
                    let reason = worker_failure(e);
                    error!(%id, %reason, "Job worker did not finish");
                    sink.on_failure(&reason);
                    JobState::Failed(reason)
                }
            };
            if let Ok(mut jobs) = jobs.lock() {
                jobs.remove(&id);
            }
            debug!(%id, ?state, "Job finished");
            state_tx.send_replace(state);
        });

        JobHandle {
            id,
            kind,
            cancel,
            state: state_rx,
        }
    }

    /// Cancel a job by id; false when no such job is running
    pub fn cancel(&self, id: JobId) -> bool {
        let Ok(jobs) = self.jobs.lock() else {
            return false;
        };
        match jobs.get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running job
    pub fn cancel_all(&self) {
        if let Ok(jobs) = self.jobs.lock() {
            for entry in jobs.values() {
                entry.cancel.cancel();
            }
        }
    }

    /// Jobs whose workers have not finished yet
    pub fn active_jobs(&self) -> Vec<JobSummary> {
        let mut active: Vec<JobSummary> = self
            .jobs
            .lock()
            .map(|jobs| jobs.values().map(|entry| entry.summary.clone()).collect())
            .unwrap_or_default();
        active.sort_by_key(|job| job.id);
        active
    }
}

fn worker_failure(error: JoinError) -> String {
    if !error.is_panic() {
        return "job worker was aborted".to_string();
    }
    let payload = error.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("job worker panicked: {}", detail),
        None => "job worker panicked".to_string(),
    }
}
