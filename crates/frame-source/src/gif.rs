//! Animated GIF video source

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageDecoder};
use tracing::info;

use crate::{Frame, SourceError, VideoSource};

/// Video source decoding the frames of an animated GIF.
///
/// Frames are composited onto the logical screen, so every frame has the
/// declared size.
pub struct GifSource {
    uri: String,
    width: u32,
    height: u32,
    frames: image::Frames<'static>,
    sequence: u32,
}

impl GifSource {
    /// Open a GIF file
    pub fn open(uri: &str) -> Result<Self, SourceError> {
        let open_err = |reason: String| SourceError::Open {
            path: PathBuf::from(uri),
            reason,
        };

        let file = File::open(uri).map_err(|e| open_err(e.to_string()))?;
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| open_err(e.to_string()))?;
        let (width, height) = decoder.dimensions();
        info!("Opened GIF source {} ({}x{})", uri, width, height);

        Ok(Self {
            uri: uri.to_string(),
            width,
            height,
            frames: decoder.into_frames(),
            sequence: 0,
        })
    }
}

impl VideoSource for GifSource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn declared_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let frame = match self.frames.next() {
            None => return Ok(None),
            Some(frame) => frame.map_err(|e| SourceError::Decode {
                path: PathBuf::from(&self.uri),
                reason: e.to_string(),
            })?,
        };

        let rgb = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
        let decoded = Frame::from_rgb_image(rgb, self.sequence);
        self.sequence += 1;
        Ok(Some(decoded))
    }
}
