//! Sequential batch transcoding of a directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use walkdir::WalkDir;

use super::jobs::JobRegistry;
use crate::domain::model::JobState;
use crate::error::{VidError, VidResult};
use crate::ports::ProgressSink;
use crate::utils::path::PathUtils;

/// Result of one file in a batch
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub state: JobState,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == JobState::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Video files under `dir`, sorted by path
pub fn collect_inputs(dir: &Path, recursive: bool) -> VidResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(VidError::InvalidArgument(format!(
            "'{}' is not a directory",
            dir.display()
        )));
    }

    let utils = PathUtils::new();
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut inputs: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| utils.is_video_file(p))
        .collect();
    inputs.sort();
    Ok(inputs)
}

/// Transcode each input to `format`, one job at a time
pub async fn run_batch<S>(
    registry: &JobRegistry,
    inputs: &[PathBuf],
    format: &str,
    output_dir: Option<&Path>,
    sink_for: S,
) -> BatchSummary
where
    S: Fn(&Path) -> Arc<dyn ProgressSink>,
{
    let utils = PathUtils::new();
    let mut summary = BatchSummary::default();

    for (n, input) in inputs.iter().enumerate() {
        let output = match utils.transcode_output(input, output_dir, format) {
            Ok(output) => output,
            Err(e) => {
                warn!(input = %input.display(), error = %e, "Skipping batch entry");
                summary.outcomes.push(BatchOutcome {
                    input: input.clone(),
                    output: None,
                    state: JobState::Failed(e.to_string()),
                });
                continue;
            }
        };

        info!(
            current = n + 1,
            total = inputs.len(),
            input = %input.display(),
            "Batch transcode"
        );
        let mut handle = registry.start_transcode(input, &output, sink_for(input));
        let state = handle.wait().await;
        summary.outcomes.push(BatchOutcome {
            input: input.clone(),
            output: Some(output),
            state,
        });
    }

    summary
}
