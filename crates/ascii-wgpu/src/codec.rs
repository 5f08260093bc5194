//! Image file decoding and encoding
//!
//! The pipeline only sees [`PixelBuffer`]s; turning files into buffers and
//! back is the job of an [`ImageCodec`]. [`ImageCrateCodec`] backs it with the
//! `image` crate.

use std::path::Path;

use crate::error::CodecError;

/// Host-side pixels in row-major order, 8 bits per channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// 1 (luma), 2 (luma + alpha), 3 (RGB) or 4 (RGBA)
    pub channels: u8,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Wraps `data`, checking that it holds exactly `width * height * channels` bytes
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, CodecError> {
        if !(1..=4).contains(&channels) {
            return Err(CodecError::InvalidBuffer(format!("unsupported channel count {channels}")));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(CodecError::InvalidBuffer(format!("expected {expected} bytes, got {}", data.len())));
        }
        Ok(Self { width, height, channels, data })
    }

    /// Bytes in one row
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Expands the buffer to RGBA8, replicating luma and filling missing alpha
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for texel in self.data.chunks_exact(self.channels as usize) {
            match *texel {
                [l] => rgba.extend_from_slice(&[l, l, l, 255]),
                [l, a] => rgba.extend_from_slice(&[l, l, l, a]),
                [r, g, b] => rgba.extend_from_slice(&[r, g, b, 255]),
                [r, g, b, a] => rgba.extend_from_slice(&[r, g, b, a]),
                _ => unreachable!("channel count is validated to 1..=4"),
            }
        }
        rgba
    }
}

/// Decodes image files into pixels and encodes pixels into PNG files
pub trait ImageCodec {
    fn decode(&self, path: &Path) -> Result<PixelBuffer, CodecError>;

    /// Writes `pixels` as an image at `path`
    ///
    /// # Arguments
    /// * `path` - Destination file
    /// * `pixels` - Pixels to write; rows are `pixels.row_stride()` bytes apart
    /// * `vertical_flip` - Whether the last row of `pixels` is the top of the image
    fn encode(&self, path: &Path, pixels: &PixelBuffer, vertical_flip: bool) -> Result<(), CodecError>;
}

/// [`ImageCodec`] backed by the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateCodec;

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, path: &Path) -> Result<PixelBuffer, CodecError> {
        let image = image::open(path)?;
        let (width, height) = (image.width(), image.height());

        // Keep the source channel count; 16-bit and float images are narrowed to 8 bits
        let (channels, data) = match image.color().channel_count() {
            1 => (1, image.into_luma8().into_raw()),
            2 => (2, image.into_luma_alpha8().into_raw()),
            3 => (3, image.into_rgb8().into_raw()),
            _ => (4, image.into_rgba8().into_raw()),
        };

        PixelBuffer::new(width, height, channels, data)
    }

    fn encode(&self, path: &Path, pixels: &PixelBuffer, vertical_flip: bool) -> Result<(), CodecError> {
        let color_type = match pixels.channels {
            1 => image::ExtendedColorType::L8,
            2 => image::ExtendedColorType::La8,
            3 => image::ExtendedColorType::Rgb8,
            _ => image::ExtendedColorType::Rgba8,
        };

        if !vertical_flip {
            image::save_buffer_with_format(path, &pixels.data, pixels.width, pixels.height, color_type, image::ImageFormat::Png)?;
            return Ok(());
        }

        let stride = pixels.row_stride();
        let mut flipped = Vec::with_capacity(pixels.data.len());
        for row in pixels.data.chunks_exact(stride).rev() {
            flipped.extend_from_slice(row);
        }
        image::save_buffer_with_format(path, &flipped, pixels.width, pixels.height, color_type, image::ImageFormat::Png)?;
        Ok(())
    }
}
