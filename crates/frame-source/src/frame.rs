//! Decoded frame type

use image::{ImageBuffer, Rgb, RgbImage};

use crate::SourceError;

/// Decoded RGB frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Position of the frame within its source
    pub sequence: u32,
}

impl Frame {
    /// Create a frame from raw packed RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, SourceError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(SourceError::InvalidBuffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// Create a frame filled with a single color
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_rgb_image(RgbImage::from_pixel(width, height, Rgb(rgb)), 0)
    }

    /// Take ownership of an `image` RGB buffer
    pub fn from_rgb_image(img: RgbImage, sequence: u32) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: img.into_raw(),
            width,
            height,
            sequence,
        }
    }

    /// Borrow the pixel data as an `image` buffer view
    pub fn as_image(&self) -> Option<ImageBuffer<Rgb<u8>, &[u8]>> {
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Frame size as `(width, height)`
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
