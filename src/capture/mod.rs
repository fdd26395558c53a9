//! Output capture: session state machine and platform backends

#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod readback;
pub mod session;
pub mod staging;
pub mod traits;
pub mod unsupported;

#[cfg(target_os = "windows")]
pub mod windows;

pub use session::CaptureSession;
pub use traits::{CaptureBackend, MappedRows, OutputDuplication, StagingSurface};

/// Backend used by [`crate::open_output`] and the C API on this target
#[cfg(target_os = "windows")]
pub type PlatformBackend = windows::DxgiBackend;

/// Backend used by [`crate::open_output`] and the C API on this target
#[cfg(not(target_os = "windows"))]
pub type PlatformBackend = unsupported::UnsupportedBackend;

/// Create the platform backend
pub fn platform_backend() -> PlatformBackend {
    PlatformBackend::new()
}
