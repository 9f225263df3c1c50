//! Rotated square regions of an image and bilinear resampling into model input.
//!
//! A [`Roi`] is the one geometric primitive of the pipeline: the letterboxed
//! palm detector input is an axis-aligned ROI enclosing the whole image, and
//! the landmark model input is a rotated ROI around the selected palm.
//! Crop-space points map back to image pixels through [`Roi::to_image`].

use std::f32::consts::{FRAC_PI_2, PI};

use image::RgbImage;

use crate::palm::PalmDetection;

/// Enlargement of the palm box when deriving the hand ROI.
const HAND_ROI_SCALE: f32 = 2.6;
/// Shift of the hand ROI along its own vertical axis, in box heights.
const HAND_ROI_SHIFT_Y: f32 = -0.5;

const WRIST_KEYPOINT: usize = 0;
const MIDDLE_MCP_KEYPOINT: usize = 2;

/// A square region of an image, in pixel coordinates, rotated by `rotation`
/// radians (clockwise in image space) around its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub x_center: f32,
    pub y_center: f32,
    pub size: f32,
    pub rotation: f32,
}

impl Roi {
    /// Axis-aligned square centered on the image and covering all of it. The
    /// shorter dimension ends up padded on both sides.
    pub fn enclosing(width: u32, height: u32) -> Self {
        Self {
            x_center: width as f32 / 2.0,
            y_center: height as f32 / 2.0,
            size: width.max(height) as f32,
            rotation: 0.0,
        }
    }

    /// Hand region derived from a palm detection in image pixels.
    ///
    /// The rotation aligns the wrist to middle-finger-MCP direction with the
    /// crop's upward axis.
    pub fn from_palm(palm: &PalmDetection) -> Self {
        let [x0, y0] = palm.keypoints[WRIST_KEYPOINT];
        let [x2, y2] = palm.keypoints[MIDDLE_MCP_KEYPOINT];
        let rotation = normalize_radians(FRAC_PI_2 - (-(y2 - y0)).atan2(x2 - x0));

        let (sin, cos) = rotation.sin_cos();
        let shift = palm.height * HAND_ROI_SHIFT_Y;
        Self {
            x_center: palm.x_center - shift * sin,
            y_center: palm.y_center + shift * cos,
            size: palm.width.max(palm.height) * HAND_ROI_SCALE,
            rotation,
        }
    }

    /// Map a crop-normalized point (`[0, 1]` across the ROI) to image pixels.
    pub fn to_image(&self, u: f32, v: f32) -> [f32; 2] {
        let lx = (u - 0.5) * self.size;
        let ly = (v - 0.5) * self.size;
        let (sin, cos) = self.rotation.sin_cos();
        [
            self.x_center + lx * cos - ly * sin,
            self.y_center + lx * sin + ly * cos,
        ]
    }

    /// Resample the ROI into an `out_size`×`out_size` RGB tensor, row-major
    /// HWC, channels scaled to `[0, 1]`. Points outside the image are black.
    pub fn sample(&self, image: &RgbImage, out_size: usize) -> Vec<f32> {
        let mut data = Vec::with_capacity(out_size * out_size * 3);
        let step = 1.0 / out_size as f32;
        for row in 0..out_size {
            let v = (row as f32 + 0.5) * step;
            for col in 0..out_size {
                let u = (col as f32 + 0.5) * step;
                let [x, y] = self.to_image(u, v);
                data.extend_from_slice(&bilinear(image, x - 0.5, y - 0.5));
            }
        }
        data
    }
}

/// Wrap an angle into `[-π, π)`.
fn normalize_radians(angle: f32) -> f32 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}

/// Bilinear sample at continuous pixel-index coordinates, zero outside.
fn bilinear(image: &RgbImage, x: f32, y: f32) -> [f32; 3] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let mut out = [0.0f32; 3];
    for (dy, wy) in [(0, 1.0 - fy), (1, fy)] {
        for (dx, wx) in [(0, 1.0 - fx), (1, fx)] {
            let weight = wx * wy;
            if weight == 0.0 {
                continue;
            }
            if let Some(px) = pixel(image, x0 as i64 + dx, y0 as i64 + dy) {
                for (o, &c) in out.iter_mut().zip(&px.0) {
                    *o += weight * c as f32 / 255.0;
                }
            }
        }
    }
    out
}

fn pixel(image: &RgbImage, x: i64, y: i64) -> Option<&image::Rgb<u8>> {
    if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
        return None;
    }
    Some(image.get_pixel(x as u32, y as u32))
}

/// Reorder an HWC tensor into CHW.
#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
pub(crate) fn hwc_to_chw(hwc: &[f32], size: usize) -> Vec<f32> {
    let plane = size * size;
    let mut chw = vec![0.0f32; hwc.len()];
    for (i, px) in hwc.chunks_exact(3).enumerate() {
        for (c, &value) in px.iter().enumerate() {
            chw[c * plane + i] = value;
        }
    }
    chw
}
