//! Time parsing and formatting utilities

use crate::error::{VidError, VidResult};

/// Marker ffmpeg puts in front of the elapsed output time on its stats line
const TIME_MARKER: &str = "time=";

/// Time parser for encoder clock values
pub struct TimeParser;

impl TimeParser {
    /// Create a new time parser
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}

impl Default for TimeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeParser {
    /// Parse a clock value (`HH:MM:SS.ss`, `MM:SS.ss` or plain seconds) to seconds
    pub fn parse_time(&self, time_str: &str) -> VidResult<f64> {
        let time_str = time_str.trim();

        // Try parsing as seconds (float)
        if let Ok(seconds) = time_str.parse::<f64>() {
            return Ok(seconds);
        }

        let parts: Vec<&str> = time_str.split(':').collect();
        let invalid = || VidError::InvalidArgument(format!("invalid time value '{}'", time_str));

        match parts.as_slice() {
            [minutes, seconds] => {
                let minutes: f64 = minutes.parse().map_err(|_| invalid())?;
                let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
                Ok(minutes * 60.0 + seconds)
            }
            [hours, minutes, seconds] => {
                let negative = hours.starts_with('-');
                let hours: f64 = hours.trim_start_matches('-').parse().map_err(|_| invalid())?;
                let minutes: f64 = minutes.parse().map_err(|_| invalid())?;
                let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
                let total = hours * 3600.0 + minutes * 60.0 + seconds;
                Ok(if negative { -total } else { total })
            }
            _ => Err(invalid()),
        }
    }

    /// Extract the elapsed time from an encoder diagnostic line.
    ///
    /// Returns `Ok(None)` when the line carries no `time=` token or the
    /// encoder reports `N/A`, and an error when the token is malformed.
    pub fn parse_progress_line(&self, line: &str) -> VidResult<Option<f64>> {
        let Some(pos) = line.find(TIME_MARKER) else {
            return Ok(None);
        };

        let token = line[pos + TIME_MARKER.len()..]
            .split_whitespace()
            .next()
            .unwrap_or("");

        if token.is_empty() || token == "N/A" {
            return Ok(None);
        }

        self.parse_time(token).map(Some)
    }

    /// Format seconds to HH:MM:SS.ms string
    pub fn format_time(&self, seconds: f64) -> String {
        let hours = (seconds / 3600.0) as u32;
        let minutes = ((seconds % 3600.0) / 60.0) as u32;
        let secs = (seconds % 60.0) as u32;
        let milliseconds = ((seconds % 1.0) * 1000.0) as u32;

        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, milliseconds)
    }
}
