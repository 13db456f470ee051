//! Decoded frame buffers as produced by decode strategies.

use image::RgbaImage;

use crate::error::{MediaError, MediaResult};

/// Pixel payload of a decoded frame.
///
/// Decoders hand back whatever layout is natural to them; [`DecodedFrame::into_rgba`]
/// normalizes everything to interleaved 8-bit RGBA.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    /// 8-bit RGBA, 4 bytes per pixel
    Rgba(Vec<u8>),
    /// 8-bit RGB, 3 bytes per pixel
    Rgb(Vec<u8>),
    /// 8-bit BGR, 3 bytes per pixel
    Bgr(Vec<u8>),
    /// 8-bit grayscale, 1 byte per pixel
    Gray(Vec<u8>),
    /// Already-encoded JPEG still
    Jpeg(Vec<u8>),
}

impl PixelData {
    fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelData::Rgba(_) => Some(4),
            PixelData::Rgb(_) | PixelData::Bgr(_) => Some(3),
            PixelData::Gray(_) => Some(1),
            PixelData::Jpeg(_) => None,
        }
    }

    fn len(&self) -> usize {
        match self {
            PixelData::Rgba(b)
            | PixelData::Rgb(b)
            | PixelData::Bgr(b)
            | PixelData::Gray(b)
            | PixelData::Jpeg(b) => b.len(),
        }
    }
}

/// One frame returned by a decode strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: PixelData,
}

impl DecodedFrame {
    pub fn new(width: u32, height: u32, pixels: PixelData) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Check that the buffer size matches the declared dimensions.
    pub fn validate(&self) -> MediaResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MediaError::invalid_output(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let Some(bpp) = self.pixels.bytes_per_pixel() else {
            if self.pixels.len() == 0 {
                return Err(MediaError::invalid_output("empty JPEG payload"));
            }
            return Ok(());
        };
        let expected = self.width as usize * self.height as usize * bpp;
        if self.pixels.len() != expected {
            return Err(MediaError::invalid_output(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                self.width,
                self.height,
                self.pixels.len()
            )));
        }
        Ok(())
    }

    /// Convert to an RGBA image, dropping nothing but adding opaque alpha
    /// where the source has none.
    pub fn into_rgba(self) -> MediaResult<RgbaImage> {
        self.validate()?;
        let (width, height) = (self.width, self.height);

        let rgba = match self.pixels {
            PixelData::Rgba(buf) => buf,
            PixelData::Rgb(buf) => expand(&buf, 3, |px| [px[0], px[1], px[2], 255]),
            PixelData::Bgr(buf) => expand(&buf, 3, |px| [px[2], px[1], px[0], 255]),
            PixelData::Gray(buf) => expand(&buf, 1, |px| [px[0], px[0], px[0], 255]),
            PixelData::Jpeg(buf) => {
                let decoded =
                    image::load_from_memory_with_format(&buf, image::ImageFormat::Jpeg)?;
                return Ok(decoded.to_rgba8());
            }
        };

        RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| MediaError::internal("RGBA buffer does not match dimensions"))
    }
}

fn expand(buf: &[u8], stride: usize, f: impl Fn(&[u8]) -> [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len() / stride * 4);
    for px in buf.chunks_exact(stride) {
        out.extend_from_slice(&f(px));
    }
    out
}
