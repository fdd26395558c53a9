//! Pixel sampling over captured buffers
//!
//! A [`FrameView`] reads pixels out of a tightly packed BGRA buffer filled by
//! [`crate::CaptureSession::capture`]. Color checks compare each channel
//! against a target with an absolute tolerance.

use crate::error::{CaptureError, CaptureResult};
use crate::types::{CapturedRegion, PixelFormat, BYTES_PER_PIXEL};

/// One captured pixel in buffer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bgra {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

impl Bgra {
    pub fn new(b: u8, g: u8, r: u8, a: u8) -> Self {
        Self { b, g, r, a }
    }

    pub fn to_rgb(self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }
}

impl From<[u8; 4]> for Bgra {
    fn from(bytes: [u8; 4]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

/// Color without alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// True when every channel differs from `target` by at most `tolerance`
    pub fn within_tolerance(&self, target: Rgb, tolerance: u8) -> bool {
        self.r.abs_diff(target.r) <= tolerance
            && self.g.abs_diff(target.g) <= tolerance
            && self.b.abs_diff(target.b) <= tolerance
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

/// Expected color at a point of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelCheck {
    /// (x, y) relative to the captured region
    pub point: (u32, u32),
    pub target: Rgb,
    /// Maximum per-channel difference, 0 for an exact match
    pub tolerance: u8,
}

impl PixelCheck {
    pub fn new(point: (u32, u32), target: impl Into<Rgb>) -> Self {
        Self {
            point,
            target: target.into(),
            tolerance: 0,
        }
    }

    pub fn with_tolerance(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Read-only view of a captured BGRA frame
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> FrameView<'a> {
    /// View `data` as `width` x `height` tightly packed pixels
    pub fn new(data: &'a [u8], width: u32, height: u32) -> CaptureResult<Self> {
        let required = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
            .ok_or_else(|| {
                CaptureError::InvalidRegion(format!("{}x{} frame overflows", width, height))
            })?;
        if data.len() < required {
            return Err(CaptureError::BufferTooSmall {
                required,
                provided: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// View the part of `data` a capture actually wrote
    pub fn from_captured(data: &'a [u8], captured: &CapturedRegion) -> CaptureResult<Self> {
        Self::new(data, captured.width, captured.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        PixelFormat::BGRA8
    }

    /// Pixel at `(x, y)`, `None` outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<Bgra> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let bytes: [u8; 4] = self.data[offset..offset + BYTES_PER_PIXEL].try_into().ok()?;
        Some(Bgra::from(bytes))
    }

    pub fn rgb(&self, x: u32, y: u32) -> Option<Rgb> {
        self.pixel(x, y).map(Bgra::to_rgb)
    }

    /// Whether the pixel at the check's point matches. Points outside the frame never match.
    pub fn check(&self, check: &PixelCheck) -> bool {
        let (x, y) = check.point;
        self.rgb(x, y)
            .is_some_and(|rgb| rgb.within_tolerance(check.target, check.tolerance))
    }

    pub fn check_all(&self, checks: &[PixelCheck]) -> Vec<bool> {
        checks.iter().map(|check| self.check(check)).collect()
    }

    /// Row `y` as raw BGRA bytes
    pub fn row(&self, y: u32) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.width as usize * BYTES_PER_PIXEL;
        let start = y as usize * stride;
        self.data.get(start..start + stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_2x2() -> Vec<u8> {
        vec![
            0x10, 0x20, 0x30, 0xFF, // (0,0)
            0x00, 0x00, 0xFF, 0xFF, // (1,0) pure red
            0xFF, 0x00, 0x00, 0xFF, // (0,1) pure blue
            0x80, 0x80, 0x80, 0x00, // (1,1)
        ]
    }

    #[test]
    fn test_pixel_reads_bgra_order() {
        let data = frame_2x2();
        let view = FrameView::new(&data, 2, 2).unwrap();

        assert_eq!(view.pixel(0, 0), Some(Bgra::new(0x10, 0x20, 0x30, 0xFF)));
        assert_eq!(view.rgb(1, 0), Some(Rgb::new(0xFF, 0, 0)));
        assert_eq!(view.rgb(0, 1), Some(Rgb::new(0, 0, 0xFF)));
        assert_eq!(view.pixel(2, 0), None);
        assert_eq!(view.pixel(0, 2), None);
    }

    #[test]
    fn test_tolerance_is_per_channel() {
        let color = Rgb::new(100, 150, 200);
        assert!(color.within_tolerance(Rgb::new(100, 150, 200), 0));
        assert!(color.within_tolerance(Rgb::new(105, 145, 200), 5));
        assert!(!color.within_tolerance(Rgb::new(106, 150, 200), 5));
        assert!(color.within_tolerance(Rgb::new(0, 0, 0), 255));
    }

    #[test]
    fn test_check_all() {
        let data = frame_2x2();
        let view = FrameView::new(&data, 2, 2).unwrap();

        let results = view.check_all(&[
            PixelCheck::new((1, 0), (255, 0, 0)),
            PixelCheck::new((0, 1), (10, 0, 250)).with_tolerance(10),
            PixelCheck::new((0, 1), (10, 0, 250)),
            PixelCheck::new((5, 5), (0, 0, 0)).with_tolerance(255),
        ]);

        assert_eq!(results, vec![true, true, false, false]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let data = vec![0u8; 15];
        assert!(matches!(
            FrameView::new(&data, 2, 2),
            Err(CaptureError::BufferTooSmall { required: 16, provided: 15 })
        ));
    }

    #[test]
    fn test_overflowing_dimensions_rejected() {
        assert!(matches!(
            FrameView::new(&[], u32::MAX, u32::MAX),
            Err(CaptureError::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_view_of_partial_capture() {
        let data = frame_2x2();
        let captured = CapturedRegion {
            width: 1,
            height: 2,
            requested_width: 4,
            requested_height: 2,
        };
        let view = FrameView::from_captured(&data, &captured).unwrap();
        assert_eq!(view.width(), 1);
        assert_eq!(view.row(1), Some(&data[4..8]));
    }
}
