//! Command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app::{collect_inputs, run_batch, AppContainer, JobHandle};
use crate::cli::args::{BatchArgs, PreviewArgs, ProbeArgs, RemoveWatermarkArgs, TranscodeArgs};
use crate::domain::model::{JobState, MediaInfo, Rectangle};
use crate::engine::progress::{ConsoleProgressSink, JsonProgressSink};
use crate::ports::ProgressSink;
use crate::utils::path::PathUtils;
use crate::utils::Utils;

/// Progress sink for one job, labelled by its input file name
pub fn progress_sink(input: &Path, json: bool) -> Arc<dyn ProgressSink> {
    let label = input
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| input.display().to_string());
    if json {
        Arc::new(JsonProgressSink::new(label))
    } else {
        Arc::new(ConsoleProgressSink::new(label))
    }
}

fn ensure_input_exists(input: &Path) -> Result<()> {
    if !input.is_file() {
        return Err(anyhow::anyhow!("Input file does not exist: {}", input.display()));
    }
    Ok(())
}

/// Wait for a job, cancelling it on Ctrl-C
async fn wait_for_job(mut handle: JobHandle) -> JobState {
    let finished = tokio::select! {
        state = handle.wait() => Some(state),
        _ = tokio::signal::ctrl_c() => None,
    };

    match finished {
        Some(state) => state,
        None => {
            warn!(id = %handle.id(), "Interrupted, cancelling job");
            handle.cancel();
            handle.wait().await
        }
    }
}

fn into_result(state: JobState) -> Result<()> {
    match state {
        JobState::Succeeded => Ok(()),
        JobState::Failed(reason) => Err(anyhow::anyhow!(reason)),
        JobState::Cancelled => Err(anyhow::anyhow!("Job cancelled")),
        JobState::Running => Err(anyhow::anyhow!("Job did not finish")),
    }
}

/// Execute the transcode command
pub async fn transcode(container: &AppContainer, args: TranscodeArgs, json_progress: bool) -> Result<()> {
    ensure_input_exists(&args.input)?;

    let output = match (args.output, args.format) {
        (Some(output), _) => output,
        (None, format) => {
            let format = format.unwrap_or_else(|| container.config().transcode.default_format.clone());
            PathUtils::new()
                .transcode_output(&args.input, container.config().output_dir.as_deref(), &format)
                .context("Failed to derive output path")?
        }
    };
    info!(input = %args.input.display(), output = %output.display(), "Transcoding");

    let handle = container.registry().start_transcode(
        &args.input,
        &output,
        progress_sink(&args.input, json_progress),
    );
    into_result(wait_for_job(handle).await)
        .with_context(|| format!("Failed to transcode {}", args.input.display()))?;

    if !json_progress {
        println!("Saved: {}", output.display());
    }
    Ok(())
}

/// Execute the remove-watermark command
pub async fn remove_watermark(
    container: &AppContainer,
    args: RemoveWatermarkArgs,
    json_progress: bool,
) -> Result<()> {
    ensure_input_exists(&args.input)?;

    let region = match args.preview_scale {
        Some(scale) => Rectangle::from_preview(args.region, scale)
            .context("Failed to convert preview region to source coordinates")?,
        None => args.region,
    };

    let output = match args.output {
        Some(output) => output,
        None => PathUtils::new()
            .watermark_output(&args.input, container.config().output_dir.as_deref())
            .context("Failed to derive output path")?,
    };
    info!(
        input = %args.input.display(),
        output = %output.display(),
        %region,
        "Removing watermark"
    );

    let handle = container.registry().start_watermark_removal(
        &args.input,
        &output,
        region,
        progress_sink(&args.input, json_progress),
    );
    into_result(wait_for_job(handle).await)
        .with_context(|| format!("Failed to remove watermark from {}", args.input.display()))?;

    if !json_progress {
        println!("Saved: {}", output.display());
    }
    Ok(())
}

/// Execute the preview command
pub async fn preview(container: &AppContainer, args: PreviewArgs) -> Result<()> {
    ensure_input_exists(&args.input)?;

    let output = match args.output {
        Some(output) => output,
        None => PathUtils::new()
            .derive_output(&args.input, container.config().output_dir.as_deref(), "_preview", "png")
            .context("Failed to derive preview path")?,
    };

    let frame = container
        .pipeline()
        .preview(&args.input)
        .await
        .context("Failed to render preview frame")?;
    frame
        .image
        .save(&output)
        .with_context(|| format!("Failed to write preview image {}", output.display()))?;

    println!("Preview: {}", output.display());
    println!(
        "Source: {}x{}  Preview: {}x{}  Scale: {:.6}",
        frame.source_width,
        frame.source_height,
        frame.image.width(),
        frame.image.height(),
        frame.scale
    );
    println!("Pass --preview-scale {:.6} with a region measured on this image.", frame.scale);
    Ok(())
}

/// Execute the probe command
pub async fn probe(container: &AppContainer, args: ProbeArgs) -> Result<()> {
    ensure_input_exists(&args.input)?;

    let info = container
        .probe()
        .probe(&args.input)
        .await
        .context("Failed to inspect input file")?;

    if args.json {
        let json = serde_json::to_string_pretty(&info).context("Failed to serialize media info to JSON")?;
        println!("{}", json);
    } else {
        display_media_info(&info);
    }
    Ok(())
}

/// Execute the batch command
pub async fn batch(container: &AppContainer, args: BatchArgs, json_progress: bool) -> Result<()> {
    let inputs = collect_inputs(&args.dir, args.recursive)
        .with_context(|| format!("Failed to scan {}", args.dir.display()))?;
    if inputs.is_empty() {
        println!("No video files found in {}", args.dir.display());
        return Ok(());
    }
    info!(count = inputs.len(), format = %args.format, "Starting batch");

    let registry = container.registry();
    let output_dir: Option<PathBuf> = container.config().output_dir.clone();
    let summary = tokio::select! {
        summary = run_batch(
            &registry,
            &inputs,
            &args.format,
            output_dir.as_deref(),
            |input| progress_sink(input, json_progress),
        ) => summary,
        _ = tokio::signal::ctrl_c() => {
            registry.cancel_all();
            return Err(anyhow::anyhow!("Batch interrupted"));
        }
    };

    for outcome in &summary.outcomes {
        if let JobState::Failed(reason) = &outcome.state {
            eprintln!("Failed: {}: {}", outcome.input.display(), reason);
        }
    }
    println!(
        "Batch finished: {} succeeded, {} failed",
        summary.succeeded(),
        summary.failed()
    );

    if summary.failed() > 0 {
        return Err(anyhow::anyhow!("{} of {} files failed", summary.failed(), summary.outcomes.len()));
    }
    Ok(())
}

/// Display media information in human-readable format
fn display_media_info(info: &MediaInfo) {
    println!("Media Information");
    println!("=================");
    println!("File: {}", info.path.display());
    println!("Container: {}", info.container);
    println!("Duration: {}", Utils::format_duration(Duration::try_from_secs_f64(info.duration).unwrap_or_default()));
    println!("File Size: {}", Utils::format_file_size(info.file_size));
    println!("Video: {}x{} @ {:.3} fps", info.width, info.height, info.fps);
    if let Some(codec) = &info.video_codec {
        println!("  Codec: {}", codec);
    }
    println!("  Frames: {}", info.total_frames());
    if info.has_audio {
        println!("Audio: {}", info.audio_codec.as_deref().unwrap_or("present"));
    } else {
        println!("Audio: none");
    }
}
