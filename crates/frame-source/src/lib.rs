//! Frame Sources for the Batch Classifier
//!
//! Decodes the images and video frames that feed the classification
//! pipeline. Supports:
//! - Still images in any format the `image` crate decodes (JPEG, PNG, BMP, ...)
//! - Animated GIF files as video sources
//! - Directories of still frames as video sources (lexicographic order)

pub mod frame;
pub mod gif;
pub mod sequence;

pub use frame::Frame;
pub use gif::GifSource;
pub use sequence::FrameSequenceSource;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Frame source error types
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open source {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Invalid frame buffer: expected {expected} bytes, got {actual}")]
    InvalidBuffer { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stream of decoded frames with a fixed declared resolution.
///
/// Every frame a healthy source yields matches [`declared_size`](Self::declared_size).
/// Callers treat a mismatch as a drained or broken stream.
pub trait VideoSource {
    /// Source URI as given by the caller
    fn uri(&self) -> &str;

    /// Declared frame size as `(width, height)`
    fn declared_size(&self) -> (u32, u32);

    /// Decode the next frame, `None` once the stream is exhausted
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

/// Decode a still image file into an RGB frame
pub fn load_image(path: impl AsRef<Path>) -> Result<Frame, SourceError> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| SourceError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let rgb = img.to_rgb8();
    debug!("Decoded {} ({}x{})", path.display(), rgb.width(), rgb.height());
    Ok(Frame::from_rgb_image(rgb, 0))
}

/// Open a video source by URI.
///
/// Directories are read as frame sequences; any other path is opened as an
/// animated GIF.
pub fn open_source(uri: &str) -> Result<Box<dyn VideoSource>, SourceError> {
    let path = Path::new(uri);
    if path.is_dir() {
        Ok(Box::new(FrameSequenceSource::open(uri)?))
    } else {
        Ok(Box::new(GifSource::open(uri)?))
    }
}
