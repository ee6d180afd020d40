//! Watermark mask construction from agreement across sampled frames

use image::{GrayImage, Luma};
use tracing::{debug, info};

use super::sampler::FrameSampler;
use crate::domain::model::{FrameBuffer, Rectangle};
use crate::error::{VidError, VidResult};
use crate::imaging::{self, MASK_ON};
use crate::ports::FrameSource;

/// Side of the square structuring element used to widen the mask
pub const MASK_DILATE_KERNEL: u32 = 5;

/// Binary full-frame mask; `MASK_ON` marks watermark pixels
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkMask {
    image: GrayImage,
    region: Rectangle,
}

impl WatermarkMask {
    /// Wrap an existing binary mask; non-zero pixels count as watermark
    pub fn from_image(image: GrayImage, region: Rectangle) -> Self {
        Self { image, region }
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Region the mask was built from
    pub fn region(&self) -> Rectangle {
        self.region
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y)[0] != 0
    }

    /// Number of watermark pixels
    pub fn coverage(&self) -> usize {
        self.image.pixels().filter(|p| p[0] != 0).count()
    }
}

/// Builds a [`WatermarkMask`] from per-frame Otsu candidates
#[derive(Debug, Clone)]
pub struct WatermarkMaskBuilder {
    sample_count: usize,
    min_agreement: usize,
}

impl Default for WatermarkMaskBuilder {
    fn default() -> Self {
        Self {
            sample_count: 10,
            min_agreement: 7,
        }
    }
}

impl WatermarkMaskBuilder {
    /// `min_agreement` must lie in `1..=sample_count`
    pub fn new(sample_count: usize, min_agreement: usize) -> VidResult<Self> {
        if sample_count == 0 {
            return Err(VidError::InvalidArgument(
                "sample count must be at least 1".to_string(),
            ));
        }
        if min_agreement == 0 || min_agreement > sample_count {
            return Err(VidError::InvalidArgument(format!(
                "minimum agreement must be between 1 and {}, got {}",
                sample_count, min_agreement
            )));
        }
        Ok(Self {
            sample_count,
            min_agreement,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn min_agreement(&self) -> usize {
        self.min_agreement
    }

    /// Sample frames from `source` and build the mask for `region`
    pub fn build(&self, source: &mut dyn FrameSource, region: Rectangle) -> VidResult<WatermarkMask> {
        let (width, height) = (source.info().width, source.info().height);
        check_region(region, width, height)?;

        let indices = FrameSampler::sample(source.info().total_frames(), self.sample_count);
        debug!(?indices, "Sampling frames for watermark mask");

        let frames = indices
            .iter()
            .map(|&index| source.read_frame(index))
            .collect::<VidResult<Vec<_>>>()?;

        self.build_from_frames(&frames, region)
    }

    /// Build the mask from already decoded frames
    pub fn build_from_frames(&self, frames: &[FrameBuffer], region: Rectangle) -> VidResult<WatermarkMask> {
        let Some(first) = frames.first() else {
            return Err(VidError::InvalidArgument(
                "no frames to build a mask from".to_string(),
            ));
        };
        let (width, height) = first.dimensions();
        check_region(region, width, height)?;

        let mut agreement = vec![0usize; region.width as usize * region.height as usize];
        for frame in frames {
            if frame.dimensions() != (width, height) {
                return Err(VidError::MaskDimensionMismatch {
                    mask_width: width,
                    mask_height: height,
                    frame_width: frame.width(),
                    frame_height: frame.height(),
                });
            }

            let candidate = imaging::otsu_binarize(&imaging::to_gray(&imaging::crop(frame, region)?));
            for (slot, px) in agreement.iter_mut().zip(candidate.pixels()) {
                if px[0] == MASK_ON {
                    *slot += 1;
                }
            }
        }

        let mut committed = GrayImage::new(width, height);
        for (i, &votes) in agreement.iter().enumerate() {
            if votes >= self.min_agreement {
                let x = region.x + (i % region.width as usize) as u32;
                let y = region.y + (i / region.width as usize) as u32;
                committed.put_pixel(x, y, Luma([MASK_ON]));
            }
        }

        let mask = WatermarkMask::from_image(
            imaging::dilate(&committed, MASK_DILATE_KERNEL, 1),
            region,
        );
        info!(
            %region,
            frames = frames.len(),
            coverage = mask.coverage(),
            "Built watermark mask"
        );
        Ok(mask)
    }
}

fn check_region(region: Rectangle, width: u32, height: u32) -> VidResult<()> {
    if region.is_empty() {
        return Err(VidError::EmptyRegion {
            width: region.width,
            height: region.height,
        });
    }
    if !region.fits_within(width, height) {
        return Err(VidError::RegionOutOfBounds {
            region: region.to_string(),
            frame_width: width,
            frame_height: height,
        });
    }
    Ok(())
}
