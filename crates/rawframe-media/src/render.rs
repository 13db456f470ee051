//! Turn a decoded frame into the bytes a caller asked for.
//!
//! Everything is CPU-bound; callers on the async runtime should wrap
//! [`render_frame`] in `spawn_blocking`.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::ColorType;

use rawframe_models::{OutputFormat, Quality};

use crate::error::MediaResult;
use crate::frame::{DecodedFrame, PixelData};

/// Final frame payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

/// Scale `frame` to the quality tier and encode it as `format`.
///
/// A JPEG from the decoder that already has the right size is passed
/// through untouched.
pub fn render_frame(
    frame: DecodedFrame,
    quality: Quality,
    format: OutputFormat,
) -> MediaResult<RenderedFrame> {
    let (target_w, target_h) = quality.target_dimensions(frame.width, frame.height);

    if format == OutputFormat::Jpeg
        && (target_w, target_h) == (frame.width, frame.height)
        && matches!(frame.pixels, PixelData::Jpeg(_))
    {
        if let PixelData::Jpeg(bytes) = frame.pixels {
            return Ok(RenderedFrame {
                bytes,
                width: target_w,
                height: target_h,
                format,
            });
        }
    }

    let mut rgba = frame.into_rgba()?;
    if (rgba.width(), rgba.height()) != (target_w, target_h) {
        rgba = imageops::resize(&rgba, target_w, target_h, FilterType::Triangle);
    }

    let (width, height) = rgba.dimensions();
    let bytes = match format {
        OutputFormat::Rgba => rgba.into_raw(),
        OutputFormat::Jpeg => {
            // JPEG carries no alpha
            let rgb: Vec<u8> = rgba
                .as_raw()
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            let mut out = Vec::new();
            JpegEncoder::new_with_quality(&mut out, quality.jpeg_quality()).encode(
                &rgb,
                width,
                height,
                ColorType::Rgb8,
            )?;
            out
        }
    };

    Ok(RenderedFrame {
        bytes,
        width,
        height,
        format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> DecodedFrame {
        let mut buf = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                buf.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128]);
            }
        }
        DecodedFrame::new(width, height, PixelData::Rgb(buf))
    }

    #[test]
    fn test_rgba_native_size() {
        let out = render_frame(gradient(4, 2), Quality::High, OutputFormat::Rgba).unwrap();
        assert_eq!((out.width, out.height), (4, 2));
        assert_eq!(out.bytes.len(), 4 * 2 * 4);
        assert_eq!(&out.bytes[..4], &[0, 0, 128, 255]);
    }

    #[test]
    fn test_low_quality_downscales() {
        let out = render_frame(gradient(1280, 720), Quality::Low, OutputFormat::Rgba).unwrap();
        assert_eq!((out.width, out.height), (640, 360));
        assert_eq!(out.bytes.len(), 640 * 360 * 4);
    }

    #[test]
    fn test_jpeg_encoding() {
        let out = render_frame(gradient(64, 32), Quality::Medium, OutputFormat::Jpeg).unwrap();
        assert_eq!(&out.bytes[..3], &[0xFF, 0xD8, 0xFF]);
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 32));
    }

    #[test]
    fn test_jpeg_passthrough() {
        let jpeg = render_frame(gradient(16, 16), Quality::High, OutputFormat::Jpeg)
            .unwrap()
            .bytes;
        let frame = DecodedFrame::new(16, 16, PixelData::Jpeg(jpeg.clone()));
        let out = render_frame(frame, Quality::Low, OutputFormat::Jpeg).unwrap();
        assert_eq!(out.bytes, jpeg);
    }
}
