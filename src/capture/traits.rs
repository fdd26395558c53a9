//! Traits separating the capture state machine from the platform duplication API

use crate::error::CaptureResult;
use crate::types::{OutputGeometry, SourceBox};

/// Entry point of a capture implementation
pub trait CaptureBackend {
    /// Live duplication chain produced by [`CaptureBackend::open`]
    type Duplication: OutputDuplication;

    /// Build the device and duplication chain for one output.
    ///
    /// Intermediate interfaces used only to reach the output are released
    /// before this returns, on success and on failure.
    fn open(&mut self, output_index: u32) -> CaptureResult<Self::Duplication>;

    /// Get the implementation name
    fn implementation_name(&self) -> String;

    /// Check if frames are produced by GPU hardware
    fn is_hardware_accelerated(&self) -> bool {
        false
    }
}

/// Dimensions of a staging surface
pub trait StagingSurface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// A live subscription to an output's frame stream, together with the device
/// and context that own it. Dropping it releases device, context and
/// subscription.
///
/// At most one frame is in flight: every successful
/// [`OutputDuplication::acquire_next_frame`] must be followed by exactly one
/// [`OutputDuplication::release_frame`].
pub trait OutputDuplication {
    type Staging: StagingSurface;

    /// Output size recorded from the duplication descriptor
    fn geometry(&self) -> OutputGeometry;

    /// Allocate a CPU-readable surface of exactly `width` x `height`
    fn create_staging(&mut self, width: u32, height: u32) -> CaptureResult<Self::Staging>;

    /// Take the next frame. Fails with `NoFrameAvailable` when nothing new was
    /// presented within `timeout_ms` and with `AccessLost` when the
    /// subscription is dead.
    fn acquire_next_frame(&mut self, timeout_ms: u32) -> CaptureResult<()>;

    /// GPU-side copy of `source` out of the acquired frame into `staging` at (0, 0).
    /// The per-frame resource handle is released before returning.
    fn copy_region(&mut self, staging: &mut Self::Staging, source: SourceBox) -> CaptureResult<()>;

    /// Map `staging` for CPU read, hand the mapped rows to `sink`, unmap.
    fn read_staging(
        &mut self,
        staging: &mut Self::Staging,
        sink: &mut dyn FnMut(MappedRows<'_>),
    ) -> CaptureResult<()>;

    /// Return the in-flight frame to the subscription's pool
    fn release_frame(&mut self) -> CaptureResult<()>;
}

/// A mapped staging surface as seen by the CPU
#[derive(Debug, Clone, Copy)]
pub struct MappedRows<'a> {
    /// Mapped bytes, at least `row_pitch * (rows - 1) + row_bytes` long
    pub data: &'a [u8],
    /// Byte stride between consecutive rows, chosen by the driver
    pub row_pitch: usize,
}
