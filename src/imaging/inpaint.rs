//! Telea inpainting by fast marching.
//!
//! Masked pixels are filled in order of their distance from the mask
//! boundary. Each new pixel is a weighted average of the already-known pixels
//! within `radius`, weighted by direction along the marching front, distance,
//! and level-set proximity.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use image::{GrayImage, Rgb, RgbImage};

use crate::error::{VidError, VidResult};

const UNKNOWN_DISTANCE: f32 = 1.0e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Known,
    Band,
    Inside,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    order: u64,
    x: u32,
    y: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Min-heap on distance, first-in first-out on ties
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.order.cmp(&self.order))
    }
}

struct Field {
    width: u32,
    height: u32,
    flags: Vec<Flag>,
    distance: Vec<f32>,
}

impl Field {
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn flag(&self, x: i64, y: i64) -> Flag {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return Flag::Inside;
        }
        self.flags[self.idx(x as u32, y as u32)]
    }

    fn dist(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return UNKNOWN_DISTANCE;
        }
        self.distance[self.idx(x as u32, y as u32)]
    }

    /// Eikonal update from two orthogonal neighbours
    fn solve(&self, (x1, y1): (i64, i64), (x2, y2): (i64, i64)) -> f32 {
        let a = self.dist(x1, y1);
        let b = self.dist(x2, y2);
        let a_known = self.flag(x1, y1) != Flag::Inside;
        let b_known = self.flag(x2, y2) != Flag::Inside;

        match (a_known, b_known) {
            (true, true) => {
                let diff = a - b;
                if diff.abs() >= 1.0 {
                    1.0 + a.min(b)
                } else {
                    (a + b + (2.0 - diff * diff).sqrt()) * 0.5
                }
            }
            (true, false) => 1.0 + a,
            (false, true) => 1.0 + b,
            (false, false) => 1.0 + a.min(b),
        }
    }

    fn arrival(&self, x: i64, y: i64) -> f32 {
        self.solve((x, y - 1), (x - 1, y))
            .min(self.solve((x, y + 1), (x + 1, y)))
            .min(self.solve((x, y - 1), (x + 1, y)))
            .min(self.solve((x, y + 1), (x - 1, y)))
    }

    /// Gradient of the distance field, using only non-inside neighbours
    fn gradient(&self, x: i64, y: i64) -> (f32, f32) {
        let axis = |fwd: (i64, i64), back: (i64, i64)| -> f32 {
            let here = self.dist(x, y);
            let fwd_ok = self.flag(fwd.0, fwd.1) != Flag::Inside;
            let back_ok = self.flag(back.0, back.1) != Flag::Inside;
            match (fwd_ok, back_ok) {
                (true, true) => (self.dist(fwd.0, fwd.1) - self.dist(back.0, back.1)) * 0.5,
                (true, false) => self.dist(fwd.0, fwd.1) - here,
                (false, true) => here - self.dist(back.0, back.1),
                (false, false) => 0.0,
            }
        };
        (
            axis((x + 1, y), (x - 1, y)),
            axis((x, y + 1), (x, y - 1)),
        )
    }
}

/// Fill the pixels where `mask` is non-zero from their surroundings.
///
/// Pixels outside the mask are returned unchanged. A mask covering the whole
/// image has no known boundary and leaves the image as it is.
pub fn inpaint_telea(img: &RgbImage, mask: &GrayImage, radius: u32) -> VidResult<RgbImage> {
    let (width, height) = img.dimensions();
    if mask.dimensions() != (width, height) {
        let (mask_width, mask_height) = mask.dimensions();
        return Err(VidError::MaskDimensionMismatch {
            mask_width,
            mask_height,
            frame_width: width,
            frame_height: height,
        });
    }

    let mut out = img.clone();
    let pixel_count = width as usize * height as usize;
    let mut field = Field {
        width,
        height,
        flags: vec![Flag::Known; pixel_count],
        distance: vec![0.0; pixel_count],
    };

    for (x, y, px) in mask.enumerate_pixels() {
        if px[0] != 0 {
            let i = field.idx(x, y);
            field.flags[i] = Flag::Inside;
            field.distance[i] = UNKNOWN_DISTANCE;
        }
    }

    // Seed the front with known pixels touching the mask
    let mut heap = BinaryHeap::new();
    let mut order = 0u64;
    for y in 0..height {
        for x in 0..width {
            let i = field.idx(x, y);
            if field.flags[i] != Flag::Known {
                continue;
            }
            let touches_mask = neighbours(x, y)
                .iter()
                .any(|&(nx, ny)| field.flag(nx, ny) == Flag::Inside && in_bounds(nx, ny, width, height));
            if touches_mask {
                field.flags[i] = Flag::Band;
                heap.push(Candidate {
                    distance: 0.0,
                    order,
                    x,
                    y,
                });
                order += 1;
            }
        }
    }

    while let Some(Candidate { x, y, .. }) = heap.pop() {
        let i = field.idx(x, y);
        field.flags[i] = Flag::Known;

        for (nx, ny) in neighbours(x, y) {
            if !in_bounds(nx, ny, width, height) || field.flag(nx, ny) != Flag::Inside {
                continue;
            }
            let (ux, uy) = (nx as u32, ny as u32);
            let distance = field.arrival(nx, ny);
            let ni = field.idx(ux, uy);
            field.distance[ni] = distance;

            let filled = fill_pixel(&out, &field, ux, uy, radius);
            if let Some(value) = filled {
                out.put_pixel(ux, uy, value);
            }

            field.flags[ni] = Flag::Band;
            heap.push(Candidate {
                distance,
                order,
                x: ux,
                y: uy,
            });
            order += 1;
        }
    }

    Ok(out)
}

fn neighbours(x: u32, y: u32) -> [(i64, i64); 4] {
    let (x, y) = (i64::from(x), i64::from(y));
    [(x, y - 1), (x - 1, y), (x, y + 1), (x + 1, y)]
}

fn in_bounds(x: i64, y: i64, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && x < i64::from(width) && y < i64::from(height)
}

fn fill_pixel(img: &RgbImage, field: &Field, x: u32, y: u32, radius: u32) -> Option<Rgb<u8>> {
    let (px, py) = (i64::from(x), i64::from(y));
    let r = i64::from(radius);
    let (grad_x, grad_y) = field.gradient(px, py);
    let here = field.dist(px, py);

    let mut acc = [0.0f32; 3];
    let mut total_weight = 0.0f32;

    for qy in (py - r)..=(py + r) {
        for qx in (px - r)..=(px + r) {
            if !in_bounds(qx, qy, field.width, field.height)
                || field.flag(qx, qy) == Flag::Inside
            {
                continue;
            }
            let (dx, dy) = ((px - qx) as f32, (py - qy) as f32);
            let len2 = dx * dx + dy * dy;
            if len2 == 0.0 || len2 > (r * r) as f32 {
                continue;
            }

            let dst = 1.0 / (len2 * len2.sqrt());
            let lev = 1.0 / (1.0 + (field.dist(qx, qy) - here).abs());
            let mut dir = dx * grad_x + dy * grad_y;
            if dir.abs() <= 0.01 {
                dir = 1.0e-6;
            }
            let weight = (dst * lev * dir).abs();

            let q = img.get_pixel(qx as u32, qy as u32);
            for (channel, slot) in acc.iter_mut().enumerate() {
                *slot += weight * f32::from(q[channel]);
            }
            total_weight += weight;
        }
    }

    if total_weight <= 0.0 {
        return None;
    }

    let mut value = [0u8; 3];
    for (channel, slot) in value.iter_mut().enumerate() {
        *slot = (acc[channel] / total_weight).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(value))
}
