//! Image conversion primitive
//!
//! Resizes a decoded RGB frame to the network resolution and splits it into
//! BGR planes, the native layout of the model input.

use frame_source::Frame;
use image::imageops::{self, FilterType};
use ndarray::Array3;
use tracing::trace;

use crate::RuntimeError;

/// Planar 8-bit BGR image, shape `[3, height, width]`
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarImage {
    pub data: Array3<u8>,
}

impl PlanarImage {
    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }
}

/// Convert `frame` into a `height x width` BGR planar image.
///
/// The crop region is the whole frame; aspect ratio is not preserved.
pub fn convert_to_planar(frame: &Frame, height: usize, width: usize) -> Result<PlanarImage, RuntimeError> {
    let src = frame.as_image().ok_or_else(|| RuntimeError::ShapeMismatch {
        expected: vec![frame.height as usize, frame.width as usize, 3],
        actual: vec![frame.data.len()],
    })?;

    let mut planes = Array3::<u8>::zeros((3, height, width));

    if src.dimensions() == (width as u32, height as u32) {
        for (x, y, pixel) in src.enumerate_pixels() {
            write_bgr(&mut planes, x as usize, y as usize, pixel.0);
        }
    } else {
        trace!("Resizing {}x{} -> {}x{}", frame.width, frame.height, width, height);
        let resized = imageops::resize(&src, width as u32, height as u32, FilterType::Triangle);
        for (x, y, pixel) in resized.enumerate_pixels() {
            write_bgr(&mut planes, x as usize, y as usize, pixel.0);
        }
    }

    Ok(PlanarImage { data: planes })
}

fn write_bgr(planes: &mut Array3<u8>, x: usize, y: usize, rgb: [u8; 3]) {
    planes[[0, y, x]] = rgb[2];
    planes[[1, y, x]] = rgb[1];
    planes[[2, y, x]] = rgb[0];
}
