//! Output path derivation and input file recognition

use crate::error::{VidError, VidResult};
use std::path::{Path, PathBuf};

/// Extensions accepted as video inputs when scanning directories
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv"];

/// Suffix appended to the stem of watermark-free outputs
pub const WATERMARK_FREE_SUFFIX: &str = "_nowatermark";

/// Path utilities
pub struct PathUtils;

impl PathUtils {
    /// Create a new path utils instance
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}

impl Default for PathUtils {
    fn default() -> Self {
        Self::new()
    }
}

impl PathUtils {
    /// Get lower-cased file extension from path
    pub fn get_extension(&self, path: &Path) -> Option<String> {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Get file stem (name without extension) from path
    pub fn get_stem(&self, path: &Path) -> Option<String> {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
    }

    /// Check whether a path looks like a supported video input
    pub fn is_video_file(&self, path: &Path) -> bool {
        self.get_extension(path)
            .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Derive `<dir>/<stem><suffix>.<extension>` for an input.
    ///
    /// `dir` is the configured output directory, or the input's own
    /// directory when none is configured.
    pub fn derive_output(
        &self,
        input: &Path,
        output_dir: Option<&Path>,
        suffix: &str,
        extension: &str,
    ) -> VidResult<PathBuf> {
        let stem = self.get_stem(input).ok_or_else(|| {
            VidError::InvalidArgument(format!("input path '{}' has no file name", input.display()))
        })?;

        let dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };

        let extension = extension.trim_start_matches('.');
        Ok(dir.join(format!("{}{}.{}", stem, suffix, extension)))
    }

    /// Output path for a transcode to `format`
    pub fn transcode_output(
        &self,
        input: &Path,
        output_dir: Option<&Path>,
        format: &str,
    ) -> VidResult<PathBuf> {
        let output = self.derive_output(input, output_dir, "", format)?;
        if output == input {
            return Err(VidError::InvalidArgument(format!(
                "output would overwrite the input file '{}'",
                input.display()
            )));
        }
        Ok(output)
    }

    /// Output path for a watermark removal
    pub fn watermark_output(&self, input: &Path, output_dir: Option<&Path>) -> VidResult<PathBuf> {
        self.derive_output(input, output_dir, WATERMARK_FREE_SUFFIX, "mp4")
    }
}
