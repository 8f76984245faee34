//! Raw pixel data handed to the converter.

use serde::{Deserialize, Serialize};

use super::Bounds;
use crate::error::ExportError;

/// Largest pixel buffer a [`Pixmap`] may hold (512 MiB).
pub const MAX_PIXMAP_BYTES: usize = 512 * 1024 * 1024;

/// 8-bit interleaved pixel data.
///
/// `channels` is 1 (gray), 3 (RGB) or 4 (RGBA).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl Pixmap {
    /// Build a pixmap, checking that `pixels` matches the dimensions.
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Result<Self, ExportError> {
        pixel_format(channels)?;
        let expected = byte_len(width, height, channels)?;
        if pixels.len() != expected {
            return Err(ExportError::InvalidPixmap {
                width,
                height,
                channels,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Solid RGBA pixmap.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, ExportError> {
        let len = byte_len(width, height, 4)?;
        let pixels = rgba.iter().copied().cycle().take(len).collect();
        Ok(Self {
            width,
            height,
            channels: 4,
            pixels,
        })
    }

    /// Solid pixmap covering `bounds`. Inverted or empty bounds give an empty pixmap.
    pub fn from_bounds(bounds: &Bounds, rgba: [u8; 4]) -> Result<Self, ExportError> {
        Self::filled(bounds.width(), bounds.height(), rgba)
    }

    /// A 0x0 (or 0xN) pixmap, e.g. after a layer's contents were deleted.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// ImageMagick raw input format for this pixmap.
    pub fn pixel_format(&self) -> Result<&'static str, ExportError> {
        pixel_format(self.channels)
    }
}

/// Buffer size for the given dimensions, capped at [`MAX_PIXMAP_BYTES`].
fn byte_len(width: u32, height: u32, channels: u8) -> Result<usize, ExportError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels as usize))
        .filter(|&n| n <= MAX_PIXMAP_BYTES)
        .ok_or(ExportError::PixmapTooLarge {
            width,
            height,
            channels,
            limit: MAX_PIXMAP_BYTES,
        })
}

fn pixel_format(channels: u8) -> Result<&'static str, ExportError> {
    match channels {
        1 => Ok("gray"),
        3 => Ok("rgb"),
        4 => Ok("rgba"),
        other => Err(ExportError::UnsupportedChannels(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn new_checks_buffer_length() {
        assert!(Pixmap::new(2, 2, 3, vec![0; 12]).is_ok());
        let err = Pixmap::new(2, 2, 4, vec![0; 12]).unwrap_err();
        assert!(matches!(
            err,
            ExportError::InvalidPixmap {
                expected: 16,
                actual: 12,
                ..
            }
        ));
    }

    #[test]
    fn new_rejects_unknown_channel_count() {
        let err = Pixmap::new(1, 1, 2, vec![0; 2]).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedChannels(2)));
    }

    #[test]
    fn filled_repeats_color() {
        let p = Pixmap::filled(2, 1, [1, 2, 3, 4]).unwrap();
        assert_eq!(p.pixels, vec![1, 2, 3, 4, 1, 2, 3, 4]);
        assert_eq!(p.pixel_format().unwrap(), "rgba");
    }

    #[test]
    fn from_empty_bounds_is_empty() {
        let p = Pixmap::from_bounds(&Bounds::new(10, 50, 10, 0), [0; 4]).unwrap();
        assert!(p.is_empty());
        assert!(p.pixels.is_empty());

        let p = Pixmap::from_bounds(&Bounds::new(0, 3, 2, 0), [0; 4]).unwrap();
        assert!(!p.is_empty());
        assert_eq!(p.pixels.len(), 3 * 2 * 4);
    }

    #[rstest]
    #[case::full_range(Bounds::new(i64::MIN, i64::MAX, i64::MAX, i64::MIN))]
    #[case::wide_strip(Bounds::new(0, i64::MAX, 1, 0))]
    #[case::just_over_limit(Bounds::new(0, 16_385, 8_192, 0))]
    fn oversized_bounds_are_rejected(#[case] bounds: Bounds) {
        let err = Pixmap::from_bounds(&bounds, [0; 4]).unwrap_err();
        assert!(matches!(err, ExportError::PixmapTooLarge { limit: MAX_PIXMAP_BYTES, .. }));
    }

    #[test]
    fn zero_area_skips_size_limit() {
        // 0 x u32::MAX は空 pixmap
        let p = Pixmap::from_bounds(&Bounds::new(0, 0, i64::MAX, 0), [0; 4]).unwrap();
        assert!(p.is_empty());
    }

    #[test]
    fn new_rejects_oversized_buffer_without_overflow() {
        let err = Pixmap::new(u32::MAX, u32::MAX, 4, Vec::new()).unwrap_err();
        assert!(matches!(err, ExportError::PixmapTooLarge { .. }));
    }
}
