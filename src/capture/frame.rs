//! Frame data structures for captured screen content
//!
//! A [`RawFrame`] is the buffer exactly as the compositor hands it over:
//! rows may be padded past the logical width and every pixel carries an
//! alpha byte. [`extract`] turns it into a tightly packed [`PixelBuffer`].

use anyhow::{Context, Result};
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use crate::error::OcrError;

/// Channel order of a raw frame. Both formats are 4 bytes per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// R, G, B, A (Android `RGBA_8888`)
    #[default]
    Rgba8,
    /// B, G, R, A (Windows/DirectX surfaces)
    Bgra8,
}

impl PixelFormat {
    /// Bytes occupied by one pixel in this format
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }

    /// Byte offsets of the R, G and B channels inside one pixel
    fn rgb_offsets(&self) -> [usize; 3] {
        match self {
            PixelFormat::Rgba8 => [0, 1, 2],
            PixelFormat::Bgra8 => [2, 1, 0],
        }
    }
}

/// A captured frame from the screen
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Raw pixel data, possibly row-padded
    pub data: Vec<u8>,
    /// Bytes from the start of one row to the start of the next
    pub row_stride_bytes: usize,
    /// Bytes from the start of one pixel to the start of the next
    pub pixel_stride_bytes: usize,
    /// Logical frame width in pixels
    pub width: u32,
    /// Logical frame height in pixels
    pub height: u32,
    /// Channel order
    pub format: PixelFormat,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl RawFrame {
    /// Create a new RGBA frame with explicit strides
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        row_stride_bytes: usize,
        pixel_stride_bytes: usize,
    ) -> Self {
        Self {
            data,
            row_stride_bytes,
            pixel_stride_bytes,
            width,
            height,
            format: PixelFormat::Rgba8,
            timestamp: Instant::now(),
        }
    }

    /// Create an unpadded RGBA frame (`row_stride == width * 4`)
    pub fn packed(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self::new(data, width, height, width as usize * 4, 4)
    }

    /// Override the channel order
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Build a packed RGBA frame from a decoded image
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::packed(rgba.into_raw(), width, height)
    }

    /// Load a frame from an image file
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("Failed to load frame image: {:?}", path))?;
        Ok(Self::from_image(&image))
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Strip padding and alpha, see [`extract`]
    pub fn extract(&self) -> Result<PixelBuffer, OcrError> {
        extract(self)
    }

    /// Minimum buffer length implied by the declared layout
    fn required_len(&self) -> Result<usize, OcrError> {
        self.row_stride_bytes
            .checked_mul(self.height as usize)
            .ok_or_else(|| OcrError::InvalidFrame("row stride * height overflows".to_string()))
    }

    fn validate_layout(&self) -> Result<(), OcrError> {
        if self.width == 0 || self.height == 0 {
            return Err(OcrError::InvalidFrame(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }

        let bpp = self.format.bytes_per_pixel();
        if self.pixel_stride_bytes < bpp {
            return Err(OcrError::InvalidFrame(format!(
                "pixel stride {} is smaller than the {} bytes of a pixel",
                self.pixel_stride_bytes, bpp
            )));
        }

        let row_bytes = (self.width as usize)
            .checked_mul(self.pixel_stride_bytes)
            .ok_or_else(|| OcrError::InvalidFrame("width * pixel stride overflows".to_string()))?;
        if self.row_stride_bytes < row_bytes {
            return Err(OcrError::InvalidFrame(format!(
                "row stride {} is smaller than width {} * pixel stride {}",
                self.row_stride_bytes, self.width, self.pixel_stride_bytes
            )));
        }

        Ok(())
    }
}

/// Tightly packed RGB pixels, `width * height * 3` bytes, no row padding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    /// Wrap packed RGB bytes, checking the length invariant
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, OcrError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(OcrError::shape("pixel buffer", expected, data.len()));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Buffer width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Buffer height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGB bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// RGB triple at (x, y). Panics when out of bounds, like slice indexing.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Copy into an `image` buffer, e.g. to dump what the model sees
    pub fn to_rgb_image(&self) -> RgbImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| Rgb(self.pixel(x, y)))
    }
}

/// Convert a raw frame into a packed RGB buffer of exactly `width * height` pixels.
///
/// Each output row is read from `y * row_stride_bytes`, one pixel every
/// `pixel_stride_bytes`; bytes past the logical width and the alpha channel
/// are dropped. Fails with [`OcrError::TruncatedFrame`] instead of reading
/// past the end of a short buffer.
pub fn extract(frame: &RawFrame) -> Result<PixelBuffer, OcrError> {
    frame.validate_layout()?;

    let required = frame.required_len()?;
    if frame.data.len() < required {
        return Err(OcrError::TruncatedFrame {
            expected: required,
            actual: frame.data.len(),
        });
    }

    let width = frame.width as usize;
    let height = frame.height as usize;
    let row_bytes = width * frame.pixel_stride_bytes;
    let [r, g, b] = frame.format.rgb_offsets();

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in frame.data.chunks_exact(frame.row_stride_bytes).take(height) {
        for px in row[..row_bytes].chunks_exact(frame.pixel_stride_bytes) {
            rgb.extend_from_slice(&[px[r], px[g], px[b]]);
        }
    }

    debug!(
        "Extracted {}x{} frame (row stride {}, pixel stride {}, {} padding bytes/row)",
        frame.width,
        frame.height,
        frame.row_stride_bytes,
        frame.pixel_stride_bytes,
        frame.row_stride_bytes - row_bytes
    );

    PixelBuffer::new(rgb, frame.width, frame.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic RGBA test pattern, `width * height * 4` bytes
    fn pattern(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| {
                let v = (i * 7) as u8;
                [v, v.wrapping_add(1), v.wrapping_add(2), 0xFF]
            })
            .collect()
    }

    /// Re-lay a packed RGBA buffer with `padding` filler bytes after each row
    fn pad_rows(packed: &[u8], width: u32, padding: usize, filler: u8) -> Vec<u8> {
        packed
            .chunks_exact(width as usize * 4)
            .flat_map(|row| row.iter().copied().chain(std::iter::repeat(filler).take(padding)))
            .collect()
    }

    fn strip_alpha(packed: &[u8]) -> Vec<u8> {
        packed
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    }

    #[test]
    fn test_unpadded_frame_is_alpha_stripped() {
        let data = pattern(5, 3);
        let frame = RawFrame::packed(data.clone(), 5, 3);

        let pixels = extract(&frame).unwrap();

        assert_eq!(pixels.as_bytes(), strip_alpha(&data).as_slice());
        assert_eq!((pixels.width(), pixels.height()), (5, 3));
    }

    #[test]
    fn test_row_padding_is_ignored() {
        let packed = pattern(7, 4);
        let expected = strip_alpha(&packed);

        for (padding, filler) in [(4usize, 0x00u8), (16, 0xAB), (60, 0xFF)] {
            let data = pad_rows(&packed, 7, padding, filler);
            let frame = RawFrame::new(data, 7, 4, 7 * 4 + padding, 4);

            let pixels = extract(&frame).unwrap();

            assert_eq!(pixels.as_bytes().len(), 7 * 4 * 3);
            assert_eq!(pixels.as_bytes(), expected.as_slice());
        }
    }

    #[test]
    fn test_wide_pixel_stride() {
        // 8-byte pixels: RGBA followed by four junk bytes
        let data: Vec<u8> = (0..6u8)
            .flat_map(|i| [i, i + 10, i + 20, 0xFF, 0xEE, 0xEE, 0xEE, 0xEE])
            .collect();
        let frame = RawFrame::new(data, 3, 2, 24, 8);

        let pixels = extract(&frame).unwrap();

        assert_eq!(pixels.pixel(0, 0), [0, 10, 20]);
        assert_eq!(pixels.pixel(2, 1), [5, 15, 25]);
    }

    #[test]
    fn test_truncated_frame() {
        let frame = RawFrame::new(vec![0; 100 * 3 - 1], 20, 3, 100, 4);

        assert_eq!(
            extract(&frame),
            Err(OcrError::TruncatedFrame {
                expected: 300,
                actual: 299
            })
        );
    }

    #[test]
    fn test_longer_buffer_is_accepted() {
        let mut data = pattern(2, 2);
        data.extend_from_slice(&[9; 13]);
        let frame = RawFrame::packed(data, 2, 2);

        assert_eq!(extract(&frame).unwrap().as_bytes().len(), 12);
    }

    #[test]
    fn test_bgra_is_swizzled() {
        let frame = RawFrame::packed(vec![30, 20, 10, 255], 1, 1).with_format(PixelFormat::Bgra8);

        assert_eq!(extract(&frame).unwrap().pixel(0, 0), [10, 20, 30]);
    }

    #[test]
    fn test_invalid_layouts() {
        let narrow_stride = RawFrame::new(vec![0; 64], 4, 4, 12, 4);
        assert!(matches!(extract(&narrow_stride), Err(OcrError::InvalidFrame(_))));

        let small_pixel = RawFrame::new(vec![0; 64], 4, 4, 16, 3);
        assert!(matches!(extract(&small_pixel), Err(OcrError::InvalidFrame(_))));

        let empty = RawFrame::packed(vec![], 0, 0);
        assert!(matches!(extract(&empty), Err(OcrError::InvalidFrame(_))));
    }

    #[test]
    fn test_from_image() {
        let img = image::RgbaImage::from_fn(3, 2, |x, y| image::Rgba([x as u8, y as u8, 7, 128]));
        let frame = RawFrame::from_image(&DynamicImage::ImageRgba8(img));

        assert_eq!(frame.dimensions(), (3, 2));
        assert_eq!(frame.row_stride_bytes, 12);
        assert_eq!(frame.extract().unwrap().pixel(2, 1), [2, 1, 7]);
    }

    #[test]
    fn test_to_rgb_image() {
        let pixels = PixelBuffer::new(vec![1, 2, 3, 4, 5, 6], 2, 1).unwrap();
        let img = pixels.to_rgb_image();

        assert_eq!(img.get_pixel(1, 0), &Rgb([4, 5, 6]));
    }

    #[test]
    fn test_pixel_buffer_length_invariant() {
        assert_eq!(
            PixelBuffer::new(vec![0; 5], 1, 2),
            Err(OcrError::shape("pixel buffer", 6, 5))
        );
    }
}
