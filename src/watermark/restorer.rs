//! Masked-region reconstruction: texture synthesis followed by inpainting

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::mask::{WatermarkMask, MASK_DILATE_KERNEL};
use crate::domain::model::FrameBuffer;
use crate::error::{VidError, VidResult};
use crate::imaging;

/// Dilation passes that define the sampling ring around the mask
const RING_ITERATIONS: u32 = 2;

/// Default Telea neighbourhood radius
pub const DEFAULT_INPAINT_RADIUS: u32 = 3;

/// Mean and population standard deviation of one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub mean: f32,
    pub std_dev: f32,
}

/// Replaces masked pixels with plausible background.
///
/// Each channel of the masked area is first filled with noise drawn from the
/// brightness distribution of a ring around the mask, then Telea inpainting
/// smooths the result into its surroundings.
pub struct FrameRestorer<R = StdRng> {
    rng: R,
    inpaint_radius: u32,
}

impl FrameRestorer<StdRng> {
    /// Restorer with a seeded generator, or a randomly seeded one
    pub fn new(seed: Option<u64>, inpaint_radius: u32) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self::with_rng(rng, inpaint_radius)
    }
}

impl<R: Rng> FrameRestorer<R> {
    pub fn with_rng(rng: R, inpaint_radius: u32) -> Self {
        Self {
            rng,
            inpaint_radius,
        }
    }

    /// Restore one frame; the output has the frame's dimensions
    pub fn restore(&mut self, frame: &FrameBuffer, mask: &WatermarkMask) -> VidResult<FrameBuffer> {
        let (width, height) = frame.dimensions();
        let (mask_width, mask_height) = mask.dimensions();
        if (mask_width, mask_height) != (width, height) {
            return Err(VidError::MaskDimensionMismatch {
                mask_width,
                mask_height,
                frame_width: width,
                frame_height: height,
            });
        }

        let mask_image = mask.as_image();
        let ring = imaging::dilate(mask_image, MASK_DILATE_KERNEL, RING_ITERATIONS);
        let stats = ring_stats(frame, mask_image.as_raw(), ring.as_raw());

        let synthesized = self.synthesize(frame, mask_image.as_raw(), &stats)?;
        imaging::inpaint_telea(&synthesized, mask_image, self.inpaint_radius)
    }

    /// Copy of `frame` with masked pixels drawn from `N(mean, std_dev)` per
    /// channel; channels without statistics are left unchanged
    pub fn synthesize(
        &mut self,
        frame: &FrameBuffer,
        mask: &[u8],
        stats: &[Option<ChannelStats>; 3],
    ) -> VidResult<FrameBuffer> {
        let mut synthesized = frame.clone();
        for (channel, channel_stats) in stats.iter().enumerate() {
            let Some(ChannelStats { mean, std_dev }) = *channel_stats else {
                continue;
            };
            let normal = Normal::new(mean, std_dev).map_err(|e| {
                VidError::InvalidArgument(format!(
                    "channel {} statistics ({}, {}): {}",
                    channel, mean, std_dev, e
                ))
            })?;
            for (i, px) in synthesized.pixels_mut().enumerate() {
                if mask[i] == 0 {
                    continue;
                }
                let value = normal.sample(&mut self.rng).clamp(0.0, 1.0);
                px[channel] = (value * 255.0) as u8;
            }
        }
        Ok(synthesized)
    }
}

/// Per-channel statistics over pixels in `ring` but not in `mask`.
///
/// `None` for every channel when the ring is empty.
pub fn ring_stats(frame: &FrameBuffer, mask: &[u8], ring: &[u8]) -> [Option<ChannelStats>; 3] {
    let mut sum = [0.0f64; 3];
    let mut sum_sq = [0.0f64; 3];
    let mut count = 0usize;

    for (i, px) in frame.pixels().enumerate() {
        if ring[i] == 0 || mask[i] != 0 {
            continue;
        }
        count += 1;
        for channel in 0..3 {
            let v = f64::from(px[channel]) / 255.0;
            sum[channel] += v;
            sum_sq[channel] += v * v;
        }
    }

    if count == 0 {
        return [None; 3];
    }

    let n = count as f64;
    let mut stats = [None; 3];
    for channel in 0..3 {
        let mean = sum[channel] / n;
        let variance = (sum_sq[channel] / n - mean * mean).max(0.0);
        stats[channel] = Some(ChannelStats {
            mean: mean as f32,
            std_dev: variance.sqrt() as f32,
        });
    }
    stats
}
