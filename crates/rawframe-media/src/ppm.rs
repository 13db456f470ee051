//! Binary PPM/PGM (P6/P5) parsing.
//!
//! The helper extractor, dcraw and FFmpeg's `ppm` encoder all emit netpbm
//! images, so this is the common interchange format for subprocess decoders.

use crate::error::{MediaError, MediaResult};
use crate::frame::{DecodedFrame, PixelData};

/// Whether `data` starts with a binary netpbm magic.
pub fn is_ppm(data: &[u8]) -> bool {
    data.starts_with(b"P6") || data.starts_with(b"P5")
}

/// Parse a binary PPM (P6) or PGM (P5) image.
///
/// 16-bit samples (maxval > 255) are reduced to their high byte.
pub fn parse_ppm(data: &[u8]) -> MediaResult<DecodedFrame> {
    let mut cursor = Cursor { data, pos: 0 };

    let magic = cursor.token()?;
    let channels = match magic {
        b"P6" => 3,
        b"P5" => 1,
        other => {
            return Err(MediaError::invalid_output(format!(
                "unsupported netpbm magic {:?}",
                String::from_utf8_lossy(other)
            )))
        }
    };

    let width = cursor.number()?;
    let height = cursor.number()?;
    let maxval = cursor.number()?;
    if maxval == 0 || maxval > 65535 {
        return Err(MediaError::invalid_output(format!("bad maxval {}", maxval)));
    }

    // Exactly one whitespace byte separates the header from the raster
    if !cursor.skip_single_whitespace() {
        return Err(MediaError::invalid_output("truncated header"));
    }

    let sample_bytes = if maxval > 255 { 2 } else { 1 };
    let samples = width as usize * height as usize * channels;
    let raster = &data[cursor.pos..];
    if raster.len() < samples * sample_bytes {
        return Err(MediaError::invalid_output(format!(
            "raster too short: expected {} bytes, got {}",
            samples * sample_bytes,
            raster.len()
        )));
    }

    let pixels: Vec<u8> = if sample_bytes == 2 {
        raster[..samples * 2].chunks_exact(2).map(|s| s[0]).collect()
    } else {
        raster[..samples].to_vec()
    };

    let pixels = if channels == 3 {
        PixelData::Rgb(pixels)
    } else {
        PixelData::Gray(pixels)
    };

    let frame = DecodedFrame::new(width, height, pixels);
    frame.validate()?;
    Ok(frame)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            if b == b'#' {
                while self.pos < self.data.len() && self.data[self.pos] != b'\n' {
                    self.pos += 1;
                }
            } else if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn token(&mut self) -> MediaResult<&'a [u8]> {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        while self.pos < self.data.len() && !self.data[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(MediaError::invalid_output("truncated header"));
        }
        Ok(&self.data[start..self.pos])
    }

    fn number(&mut self) -> MediaResult<u32> {
        let token = self.token()?;
        std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                MediaError::invalid_output(format!(
                    "bad header field {:?}",
                    String::from_utf8_lossy(token)
                ))
            })
    }

    fn skip_single_whitespace(&mut self) -> bool {
        match self.data.get(self.pos) {
            Some(b) if b.is_ascii_whitespace() => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ppm(header: &str, raster: &[u8]) -> Vec<u8> {
        let mut data = header.as_bytes().to_vec();
        data.extend_from_slice(raster);
        data
    }

    #[test]
    fn test_parse_p6() {
        let data = ppm("P6\n2 1\n255\n", &[1, 2, 3, 4, 5, 6]);
        let frame = parse_ppm(&data).unwrap();
        assert_eq!((frame.width, frame.height), (2, 1));
        assert_eq!(frame.pixels, PixelData::Rgb(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn test_header_comments() {
        let data = ppm("P6 # from dcraw\n# size\n1 1 255\n", &[9, 8, 7]);
        let frame = parse_ppm(&data).unwrap();
        assert_eq!(frame.pixels, PixelData::Rgb(vec![9, 8, 7]));
    }

    #[test]
    fn test_raster_starting_with_whitespace_byte() {
        // First sample is 0x0A, which must not be eaten by header parsing
        let data = ppm("P5\n2 1\n255\n", &[b'\n', 200]);
        let frame = parse_ppm(&data).unwrap();
        assert_eq!(frame.pixels, PixelData::Gray(vec![b'\n', 200]));
    }

    #[test]
    fn test_sixteen_bit_takes_high_byte() {
        let data = ppm("P5\n1 1\n65535\n", &[0xAB, 0xCD]);
        let frame = parse_ppm(&data).unwrap();
        assert_eq!(frame.pixels, PixelData::Gray(vec![0xAB]));
    }

    #[test]
    fn test_truncated_raster() {
        let data = ppm("P6\n2 2\n255\n", &[0; 5]);
        assert!(matches!(parse_ppm(&data), Err(MediaError::InvalidOutput(_))));
    }

    #[test]
    fn test_rejects_other_formats() {
        assert!(!is_ppm(&[0xFF, 0xD8, 0xFF]));
        assert!(parse_ppm(b"P3\n1 1\n255\n0 0 0\n").is_err());
    }
}
