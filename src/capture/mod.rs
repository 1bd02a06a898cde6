//! Screen Capture Layer
//!
//! Frames arrive from an external capture collaborator (screen projection,
//! a file, a camera). This layer only fixes the memory layout contract of a
//! frame and knows how to strip it down to packed RGB.

pub mod frame;

pub use frame::{extract, PixelBuffer, PixelFormat, RawFrame};

use anyhow::Result;
use std::path::PathBuf;

/// Anything that can hand over one captured frame on demand
pub trait FrameSource {
    /// Capture a single frame
    fn capture(&mut self) -> Result<RawFrame>;
}

/// Frame source that reads an image file on every capture
#[derive(Debug, Clone)]
pub struct ImageFileSource {
    path: PathBuf,
}

impl ImageFileSource {
    /// Create a source for the given image file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSource for ImageFileSource {
    fn capture(&mut self) -> Result<RawFrame> {
        RawFrame::open(&self.path)
    }
}
