//! Directory-of-frames video source

use std::path::PathBuf;

use image::ImageFormat;
use tracing::{info, warn};

use crate::{load_image, Frame, SourceError, VideoSource};

/// Video source reading still frames from a directory in lexicographic order.
///
/// The declared size is the size of the first frame. Later frames of another
/// size are returned as-is so callers can detect the drift.
pub struct FrameSequenceSource {
    uri: String,
    paths: Vec<PathBuf>,
    next: usize,
    width: u32,
    height: u32,
}

impl FrameSequenceSource {
    /// Open a directory of frames
    pub fn open(uri: &str) -> Result<Self, SourceError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(uri)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && ImageFormat::from_path(p).is_ok())
            .collect();
        paths.sort();

        let first = paths.first().ok_or_else(|| SourceError::Open {
            path: PathBuf::from(uri),
            reason: "directory contains no image frames".to_string(),
        })?;

        let (width, height) = image::image_dimensions(first).map_err(|e| SourceError::Open {
            path: first.clone(),
            reason: e.to_string(),
        })?;

        info!(
            "Opened frame sequence {} ({} frames, {}x{})",
            uri,
            paths.len(),
            width,
            height
        );

        Ok(Self {
            uri: uri.to_string(),
            paths,
            next: 0,
            width,
            height,
        })
    }

    /// Number of frames not yet read
    pub fn remaining(&self) -> usize {
        self.paths.len() - self.next
    }
}

impl VideoSource for FrameSequenceSource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn declared_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };

        let mut frame = load_image(path)?;
        frame.sequence = self.next as u32;
        self.next += 1;

        if frame.size() != (self.width, self.height) {
            warn!(
                "Frame {} is {}x{}, source declared {}x{}",
                path.display(),
                frame.width,
                frame.height,
                self.width,
                self.height
            );
        }
        Ok(Some(frame))
    }
}
