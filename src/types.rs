//! Core types shared by the capture session, its backends and the C API

use std::fmt;
use std::time::Duration;

use crate::error::{CaptureError, CaptureResult};

/// Bytes per pixel of every captured buffer. Channel order is blue, green, red, alpha.
pub const BYTES_PER_PIXEL: usize = 4;

/// Pixel layout of captured buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// Blue, Green, Red, Alpha (8 bits per channel)
    #[default]
    BGRA8,
}

impl PixelFormat {
    /// Get the number of bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::BGRA8 => BYTES_PER_PIXEL,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::BGRA8 => write!(f, "BGRA8"),
        }
    }
}

/// Native size of a duplicated output, read from the duplication descriptor at init time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputGeometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl OutputGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Get the total pixel count
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// The whole output as a capture region
    pub fn bounds(&self) -> CaptureRegion {
        CaptureRegion::new(0, 0, self.width, self.height)
    }
}

/// Capture region specification, in output coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Bytes a caller buffer needs to hold this region tightly packed,
    /// `None` if that does not fit in `usize`
    pub fn byte_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(BYTES_PER_PIXEL)
    }

    /// Resolve the region against an output.
    ///
    /// The origin must lie on the output and both dimensions must be non-zero.
    /// The right and bottom edges are clamped to the output size, so the
    /// returned box may be smaller than the request.
    pub fn clamp_to(&self, geometry: OutputGeometry) -> CaptureResult<SourceBox> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::InvalidRegion(format!(
                "empty region {}x{}",
                self.width, self.height
            )));
        }
        if self.x < 0 || self.y < 0 {
            return Err(CaptureError::InvalidRegion(format!(
                "negative origin ({}, {})",
                self.x, self.y
            )));
        }

        let left = self.x as u32;
        let top = self.y as u32;
        if left >= geometry.width || top >= geometry.height {
            return Err(CaptureError::InvalidRegion(format!(
                "origin ({}, {}) outside {}x{} output",
                left, top, geometry.width, geometry.height
            )));
        }

        Ok(SourceBox {
            left,
            top,
            right: left.saturating_add(self.width).min(geometry.width),
            bottom: top.saturating_add(self.height).min(geometry.height),
        })
    }
}

/// Half-open source rectangle `[left, right) x [top, bottom)` copied out of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl SourceBox {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// What a successful capture actually wrote into the caller buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedRegion {
    /// Width of the copied rectangle (clamped to the output)
    pub width: u32,
    /// Height of the copied rectangle (clamped to the output)
    pub height: u32,
    /// Width the caller asked for
    pub requested_width: u32,
    /// Height the caller asked for
    pub requested_height: u32,
}

impl CapturedRegion {
    /// True when the request ran off the right or bottom edge of the output.
    /// Only `byte_len()` bytes at the start of the buffer were written.
    pub fn is_partial(&self) -> bool {
        self.width < self.requested_width || self.height < self.requested_height
    }

    /// Bytes written into the caller buffer
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

/// Capture session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Milliseconds to wait for a new frame. Zero never blocks.
    pub acquire_timeout_ms: u32,
    /// Retries of a recoverable failure in `capture_with_retry`
    pub max_retries: u32,
    /// Delay between retries
    pub retry_delay: Duration,
    /// Rebuild the duplication chain once when `capture_with_retry` hits access loss
    pub reinit_on_access_lost: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 0,
            max_retries: 3,
            retry_delay: Duration::from_millis(16),
            reinit_on_access_lost: false,
        }
    }
}

impl SessionConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.acquire_timeout_ms > 1000 {
            return Err(format!(
                "Acquire timeout must be at most 1000ms, got {}",
                self.acquire_timeout_ms
            ));
        }
        if self.retry_delay > Duration::from_secs(1) {
            return Err(format!(
                "Retry delay must be at most 1s, got {:?}",
                self.retry_delay
            ));
        }
        Ok(())
    }
}

/// Session statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub total_captures: u64,
    pub successful_captures: u64,
    /// Captures that found no new frame
    pub unavailable_frames: u64,
    pub failed_captures: u64,
    pub access_lost: u64,
    /// Times the device/duplication chain was built
    pub chain_builds: u64,
    pub staging_allocations: u64,
    pub total_bytes_copied: u64,
}

impl SessionStats {
    /// Get success rate as percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_captures == 0 {
            0.0
        } else {
            (self.successful_captures as f64 / self.total_captures as f64) * 100.0
        }
    }
}
