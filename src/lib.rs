//! Display output capture library
//!
//! Pulls rectangular regions of a display output's latest frame into caller
//! memory through DXGI Desktop Duplication. A session keeps one duplication
//! chain and one staging surface alive between calls, never blocks waiting
//! for a frame, and tells the caller whether a failure means "try again next
//! tick", "fix the request", or "the output is gone, initialize again".
//!
//! # Example
//!
//! ```no_run
//! use dupcap::{open_output, CaptureRegion, FailureKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = open_output(0)?;
//! let region = CaptureRegion::new(100, 100, 320, 240);
//! let mut buffer = vec![0u8; region.byte_len().ok_or("region too large")?];
//!
//! match session.capture(region, &mut buffer) {
//!     Ok(captured) => println!("Captured {}x{}", captured.width, captured.height),
//!     Err(e) if e.kind() == FailureKind::Transient => println!("No new frame yet"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod capture;
pub mod error;
pub mod pixel;
pub mod types;

#[cfg(feature = "c-api")]
pub mod ffi;

// Re-export main types
pub use capture::{CaptureBackend, CaptureSession, PlatformBackend};
pub use error::{CaptureError, CaptureResult, FailureKind};
pub use pixel::{Bgra, FrameView, PixelCheck, Rgb};
pub use types::{
    CaptureRegion, CapturedRegion, OutputGeometry, PixelFormat, SessionConfig, SessionStats,
    BYTES_PER_PIXEL,
};

/// Open a session on `output_index` with the platform backend
pub fn open_output(output_index: u32) -> CaptureResult<CaptureSession<PlatformBackend>> {
    open_output_with_config(output_index, SessionConfig::default())
}

/// Open a session on `output_index` with custom configuration
pub fn open_output_with_config(
    output_index: u32,
    config: SessionConfig,
) -> CaptureResult<CaptureSession<PlatformBackend>> {
    let mut session = CaptureSession::with_config(capture::platform_backend(), config)?;
    session.init(output_index)?;
    Ok(session)
}

/// Library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get library capabilities
pub fn capabilities() -> String {
    let backend = capture::platform_backend();
    let mut caps = vec![backend.implementation_name()];

    if backend.is_hardware_accelerated() {
        caps.push("Hardware".to_string());
    }

    caps.push(PixelFormat::default().to_string());

    #[cfg(feature = "c-api")]
    caps.push("C API".to_string());

    caps.join(", ")
}
