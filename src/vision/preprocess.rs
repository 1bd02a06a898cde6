//! Image preprocessing for the recognition model
//!
//! Resizes a packed RGB buffer to the model's fixed input resolution,
//! normalizes every channel into [-1, 1] and lays the values out in the
//! order the backend was configured for.

use ndarray::{Array3, ArrayView4};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::PixelBuffer;
use crate::error::{InitError, OcrError};

/// Number of colour channels fed to the model
pub const CHANNELS: usize = 3;

/// Order of values inside the input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// Row-major, R,G,B interleaved per pixel: shape `[1, H, W, 3]`
    #[default]
    Interleaved,
    /// One plane per channel: shape `[1, 3, H, W]` (PaddleOCR ONNX exports)
    Planar,
}

impl TensorLayout {
    /// 4-D tensor shape for a `width x height` input
    pub fn shape(&self, width: u32, height: u32) -> [usize; 4] {
        let (w, h) = (width as usize, height as usize);
        match self {
            TensorLayout::Interleaved => [1, h, w, CHANNELS],
            TensorLayout::Planar => [1, CHANNELS, h, w],
        }
    }
}

/// Resampling policy used to reach the model resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resample {
    /// Nearest neighbour, source index `x * src / dst`
    #[default]
    Nearest,
    /// Bilinear with half-pixel centres and clamped edges
    Bilinear,
}

/// Normalized model input, `width * height * 3` values in [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Vec<f32>,
    width: u32,
    height: u32,
    layout: TensorLayout,
}

impl InputTensor {
    /// Wrap flat tensor data, checking it matches the declared shape
    pub fn new(data: Vec<f32>, width: u32, height: u32, layout: TensorLayout) -> Result<Self, OcrError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(OcrError::shape("input tensor", expected, data.len()));
        }
        Ok(Self {
            data,
            width,
            height,
            layout,
        })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    /// 4-D shape including the batch dimension
    pub fn shape(&self) -> [usize; 4] {
        self.layout.shape(self.width, self.height)
    }

    /// Borrow as a 4-D array for backends that take ndarray input
    pub fn view(&self) -> Result<ArrayView4<'_, f32>, OcrError> {
        ArrayView4::from_shape(self.shape(), &self.data)
            .map_err(|_| OcrError::shape("input tensor", self.shape().iter().product(), self.len()))
    }
}

/// Map a channel value from [0, 255] to [-1, 1]
#[inline]
pub fn normalize(channel: u8) -> f32 {
    ((channel as f32 / 255.0) - 0.5) * 2.0
}

/// Resample a pixel buffer to `width x height`
pub fn resize(
    pixels: &PixelBuffer,
    width: u32,
    height: u32,
    resample: Resample,
) -> Result<PixelBuffer, OcrError> {
    if width == 0 || height == 0 || pixels.width() == 0 || pixels.height() == 0 {
        return Err(OcrError::InvalidFrame(format!(
            "cannot resize {}x{} to {}x{}",
            pixels.width(),
            pixels.height(),
            width,
            height
        )));
    }

    if (pixels.width(), pixels.height()) == (width, height) {
        return Ok(pixels.clone());
    }

    let data = match resample {
        Resample::Nearest => resize_nearest(pixels, width, height),
        Resample::Bilinear => resize_bilinear(pixels, width, height),
    };
    PixelBuffer::new(data, width, height)
}

fn resize_nearest(pixels: &PixelBuffer, width: u32, height: u32) -> Vec<u8> {
    let src = pixels.as_bytes();
    let src_w = pixels.width() as usize;
    let xs: Vec<usize> = (0..width as u64)
        .map(|x| (x * pixels.width() as u64 / width as u64) as usize)
        .collect();

    let mut out = Vec::with_capacity(width as usize * height as usize * CHANNELS);
    for y in 0..height as u64 {
        let sy = (y * pixels.height() as u64 / height as u64) as usize;
        let row = &src[sy * src_w * CHANNELS..(sy + 1) * src_w * CHANNELS];
        for &sx in &xs {
            out.extend_from_slice(&row[sx * CHANNELS..(sx + 1) * CHANNELS]);
        }
    }
    out
}

/// Neighbouring source indices and the weight of the second one
fn bilinear_taps(dst: u32, dst_len: u32, src_len: u32) -> (usize, usize, f32) {
    let scale = src_len as f32 / dst_len as f32;
    let max = (src_len - 1) as f32;
    let s = ((dst as f32 + 0.5) * scale - 0.5).clamp(0.0, max);
    let i0 = s.floor() as usize;
    let i1 = (i0 + 1).min(src_len as usize - 1);
    (i0, i1, s - i0 as f32)
}

fn resize_bilinear(pixels: &PixelBuffer, width: u32, height: u32) -> Vec<u8> {
    let src = pixels.as_bytes();
    let src_w = pixels.width() as usize;
    let at = |x: usize, y: usize, c: usize| src[(y * src_w + x) * CHANNELS + c] as f32;
    let xs: Vec<_> = (0..width)
        .map(|x| bilinear_taps(x, width, pixels.width()))
        .collect();

    let mut out = Vec::with_capacity(width as usize * height as usize * CHANNELS);
    for y in 0..height {
        let (y0, y1, fy) = bilinear_taps(y, height, pixels.height());
        for &(x0, x1, fx) in &xs {
            for c in 0..CHANNELS {
                let top = at(x0, y0, c) * (1.0 - fx) + at(x1, y0, c) * fx;
                let bottom = at(x0, y1, c) * (1.0 - fx) + at(x1, y1, c) * fx;
                let value = top * (1.0 - fy) + bottom * fy;
                out.push(value.round().clamp(0.0, 255.0) as u8);
            }
        }
    }
    out
}

/// Turns pixel buffers into input tensors of one fixed shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorPreprocessor {
    width: u32,
    height: u32,
    layout: TensorLayout,
    resample: Resample,
}

impl TensorPreprocessor {
    /// Pin the model resolution, layout and resampling policy
    pub fn new(width: u32, height: u32, layout: TensorLayout, resample: Resample) -> Result<Self, InitError> {
        if width == 0 || height == 0 {
            return Err(InitError::Config(format!(
                "model input must be at least 1x1, got {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            resample,
        })
    }

    /// Model input width
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Model input height
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    /// Number of values every produced tensor holds
    pub fn tensor_len(&self) -> usize {
        self.width as usize * self.height as usize * CHANNELS
    }

    /// Resize, normalize and lay out a pixel buffer
    pub fn preprocess(&self, pixels: &PixelBuffer) -> Result<InputTensor, OcrError> {
        let resized = resize(pixels, self.width, self.height, self.resample)?;
        let (w, h) = (self.width as usize, self.height as usize);

        let hwc = Array3::from_shape_vec(
            (h, w, CHANNELS),
            resized.as_bytes().iter().map(|&c| normalize(c)).collect(),
        )
        .map_err(|_| OcrError::shape("preprocess", self.tensor_len(), resized.as_bytes().len()))?;

        let data: Vec<f32> = match self.layout {
            TensorLayout::Interleaved => hwc.iter().copied().collect(),
            TensorLayout::Planar => hwc.view().permuted_axes([2, 0, 1]).iter().copied().collect(),
        };

        debug!(
            "Preprocessed {}x{} -> {:?} ({:?}, {:?})",
            pixels.width(),
            pixels.height(),
            self.layout.shape(self.width, self.height),
            self.layout,
            self.resample
        );

        InputTensor::new(data, self.width, self.height, self.layout)
    }
}

/// One-shot form of [`TensorPreprocessor::preprocess`]
pub fn preprocess(
    pixels: &PixelBuffer,
    model_width: u32,
    model_height: u32,
    layout: TensorLayout,
    resample: Resample,
) -> Result<InputTensor, OcrError> {
    TensorPreprocessor::new(model_width, model_height, layout, resample)
        .map_err(|e| OcrError::InvalidFrame(e.to_string()))?
        .preprocess(pixels)
}
