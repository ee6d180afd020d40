//! Deterministic frame sampling

use tracing::debug;

use crate::domain::model::FrameBuffer;
use crate::error::VidResult;
use crate::imaging::mean_intensity;
use crate::ports::FrameSource;

/// Frames inspected when looking for a non-blank preview frame
pub const DEFAULT_PREVIEW_SAMPLES: usize = 10;

/// Mean intensity a preview frame must exceed
pub const DEFAULT_BLANK_THRESHOLD: f64 = 10.0;

pub struct FrameSampler;

impl FrameSampler {
    /// `count` evenly spaced indices over `[0, total_frames)`.
    ///
    /// `index_i = floor(i * total_frames / count)`, so the sequence is
    /// non-decreasing and starts at 0.
    pub fn sample(total_frames: u64, count: usize) -> Vec<u64> {
        (0..count)
            .map(|i| (i as u128 * total_frames as u128 / count as u128) as u64)
            .collect()
    }

    /// First sampled frame brighter than `threshold`, else frame 0.
    ///
    /// Candidates that fail to decode are skipped; only a failure to decode
    /// the fallback frame is reported.
    pub fn first_valid_frame(
        source: &mut dyn FrameSource,
        threshold: f64,
        count: usize,
    ) -> VidResult<FrameBuffer> {
        let total = source.info().total_frames();
        for index in Self::sample(total, count) {
            match source.read_frame(index) {
                Ok(frame) => {
                    let mean = mean_intensity(&frame);
                    if mean > threshold {
                        debug!(index, mean, "Found non-blank preview frame");
                        return Ok(frame);
                    }
                }
                Err(e) => debug!(index, error = %e, "Skipping undecodable preview candidate"),
            }
        }

        debug!("No sampled frame above threshold, falling back to frame 0");
        source.read_frame(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::MediaInfo;
    use crate::error::VidError;
    use image::Rgb;
    use std::path::PathBuf;

    struct Brightness {
        info: MediaInfo,
        levels: Vec<u8>,
        broken: Vec<u64>,
    }

    impl FrameSource for Brightness {
        fn info(&self) -> &MediaInfo {
            &self.info
        }

        fn read_frame(&mut self, index: u64) -> VidResult<FrameBuffer> {
            if self.broken.contains(&index) {
                return Err(VidError::frame_read(index, "corrupt"));
            }
            let level = self.levels[index as usize];
            Ok(FrameBuffer::from_pixel(4, 4, Rgb([level, level, level])))
        }
    }

    fn source(levels: Vec<u8>, broken: Vec<u64>) -> Brightness {
        Brightness {
            info: MediaInfo {
                path: PathBuf::from("mem"),
                container: String::new(),
                duration: levels.len() as f64,
                width: 4,
                height: 4,
                fps: 1.0,
                has_audio: false,
                video_codec: None,
                audio_codec: None,
                file_size: 0,
            },
            levels,
            broken,
        }
    }

    #[test]
    fn test_sample_evenly_spaced() {
        assert_eq!(FrameSampler::sample(100, 10), vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90]);
        assert_eq!(FrameSampler::sample(7, 3), vec![0, 2, 4]);
        assert!(FrameSampler::sample(100, 0).is_empty());
    }

    #[test]
    fn test_sample_more_than_total() {
        let indices = FrameSampler::sample(3, 10);
        assert_eq!(indices.len(), 10);
        assert_eq!(indices[0], 0);
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
        assert!(indices.iter().all(|&i| i < 3));
    }

    #[test]
    fn test_first_valid_frame_skips_dark_frames() {
        let mut src = source(vec![0, 0, 0, 0, 0, 50, 50, 50, 50, 50], vec![]);
        let frame = FrameSampler::first_valid_frame(&mut src, 10.0, 10).unwrap();
        assert_eq!(frame.get_pixel(0, 0)[0], 50);
    }

    #[test]
    fn test_first_valid_frame_falls_back_to_first() {
        let mut src = source(vec![3; 10], vec![]);
        let frame = FrameSampler::first_valid_frame(&mut src, 10.0, 10).unwrap();
        assert_eq!(frame.get_pixel(0, 0)[0], 3);
    }

    #[test]
    fn test_first_valid_frame_skips_broken_candidates() {
        let mut src = source(vec![0, 80, 90, 0], vec![1]);
        let frame = FrameSampler::first_valid_frame(&mut src, 10.0, 4).unwrap();
        assert_eq!(frame.get_pixel(0, 0)[0], 90);

        let mut all_broken = source(vec![0, 0], vec![0, 1]);
        assert!(FrameSampler::first_valid_frame(&mut all_broken, 10.0, 2).is_err());
    }
}
