//! Error types for the dupcap library

use thiserror::Error;

/// How a failed call affects the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Nothing is wrong; the output has not produced a new frame yet. Retry on a later tick.
    Transient,
    /// The call failed but the session is unchanged. The caller may retry or adjust inputs.
    Recoverable,
    /// The duplication chain was lost and has been torn down. Call `init` again.
    Fatal,
}

impl FailureKind {
    /// Status code used by the C API (`0` is reserved for success)
    pub fn status_code(self) -> i32 {
        match self {
            FailureKind::Transient => 1,
            FailureKind::Recoverable => 2,
            FailureKind::Fatal => 3,
        }
    }
}

/// Main error type for capture session operations
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Operation requires an initialized session
    #[error("Capture session is not initialized")]
    NotInitialized,

    /// No output exists at the requested index on the adapter
    #[error("Output not found: index {0}")]
    OutputNotFound(u32),

    /// Creating the hardware device or walking to its adapter failed
    #[error("Device creation failed: {0}")]
    DeviceCreationFailed(String),

    /// The output refused a duplication subscription
    #[error("Output duplication unavailable: {0}")]
    DuplicationUnavailable(String),

    /// The output has not presented a new frame since the last acquisition
    #[error("No new frame available")]
    NoFrameAvailable,

    /// Access to the duplicated output was lost (mode change, desktop switch, device reset)
    #[error("Access to the duplicated output was lost")]
    AccessLost,

    /// Requested region cannot be captured from this output
    #[error("Invalid capture region: {0}")]
    InvalidRegion(String),

    /// Caller buffer cannot hold the requested region
    #[error("Output buffer too small: need {required} bytes, got {provided}")]
    BufferTooSmall { required: usize, provided: usize },

    /// Allocating the CPU-readable staging surface failed
    #[error("Staging surface allocation failed for {width}x{height}")]
    StagingAllocationFailed { width: u32, height: u32 },

    /// Mapping the staging surface for CPU read failed
    #[error("Failed to map staging surface: {0}")]
    MapFailed(String),

    /// Acquiring or copying the frame failed for a reason that may clear by itself
    #[error("Frame acquisition failed: {0}")]
    AcquireFailed(String),

    /// Invalid session configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Platform-specific error
    #[error("Platform error: {0}")]
    PlatformError(String),

    /// Windows-specific error
    #[cfg(windows)]
    #[error("Windows error: {0}")]
    WindowsError(#[from] windows::core::Error),

    /// Other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Combined result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Convert error code to human-readable string
pub fn error_code_to_string(code: i32) -> String {
    match code {
        0 => "Success".to_string(),
        -1001 => "Session not initialized".to_string(),
        -1002 => "Output not found".to_string(),
        -1003 => "Device creation failed".to_string(),
        -1004 => "Duplication unavailable".to_string(),
        -1005 => "No new frame".to_string(),
        -1006 => "Access lost".to_string(),
        -1007 => "Invalid region".to_string(),
        -1008 => "Buffer too small".to_string(),
        -1009 => "Staging allocation failed".to_string(),
        -1010 => "Map failed".to_string(),
        -1011 => "Acquire failed".to_string(),
        -1012 => "Invalid configuration".to_string(),
        -1013 => "Platform error".to_string(),
        -1014 => "Windows error".to_string(),
        _ => format!("Unknown error code: {}", code),
    }
}

impl CaptureError {
    /// Classify the error by its effect on the session
    pub fn kind(&self) -> FailureKind {
        match self {
            CaptureError::NoFrameAvailable => FailureKind::Transient,
            CaptureError::AccessLost => FailureKind::Fatal,
            _ => FailureKind::Recoverable,
        }
    }

    /// Check if the error is recoverable (worth retrying without reinitializing)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CaptureError::NoFrameAvailable
                | CaptureError::StagingAllocationFailed { .. }
                | CaptureError::MapFailed(_)
                | CaptureError::AcquireFailed(_)
        )
    }

    /// Check if the error tore the session down
    pub fn is_fatal(&self) -> bool {
        self.kind() == FailureKind::Fatal
    }

    /// Get error code for FFI
    pub fn to_error_code(&self) -> i32 {
        match self {
            CaptureError::NotInitialized => -1001,
            CaptureError::OutputNotFound(_) => -1002,
            CaptureError::DeviceCreationFailed(_) => -1003,
            CaptureError::DuplicationUnavailable(_) => -1004,
            CaptureError::NoFrameAvailable => -1005,
            CaptureError::AccessLost => -1006,
            CaptureError::InvalidRegion(_) => -1007,
            CaptureError::BufferTooSmall { .. } => -1008,
            CaptureError::StagingAllocationFailed { .. } => -1009,
            CaptureError::MapFailed(_) => -1010,
            CaptureError::AcquireFailed(_) => -1011,
            CaptureError::InvalidConfiguration(_) => -1012,
            CaptureError::PlatformError(_) => -1013,
            #[cfg(windows)]
            CaptureError::WindowsError(_) => -1014,
            CaptureError::Other(_) => -1999,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_display() {
        let err = CaptureError::OutputNotFound(2);
        assert_eq!(err.to_string(), "Output not found: index 2");

        let err = CaptureError::BufferTooSmall {
            required: 400,
            provided: 16,
        };
        assert_eq!(
            err.to_string(),
            "Output buffer too small: need 400 bytes, got 16"
        );
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(CaptureError::NoFrameAvailable.kind(), FailureKind::Transient);
        assert_eq!(CaptureError::AccessLost.kind(), FailureKind::Fatal);
        assert_eq!(CaptureError::NotInitialized.kind(), FailureKind::Recoverable);
        assert_eq!(
            CaptureError::MapFailed("E_OUTOFMEMORY".into()).kind(),
            FailureKind::Recoverable
        );
        assert!(CaptureError::AccessLost.is_fatal());
        assert!(!CaptureError::NoFrameAvailable.is_fatal());
    }

    #[test]
    fn test_error_code_conversion() {
        let err = CaptureError::AccessLost;
        assert_eq!(err.to_error_code(), -1006);
        assert_eq!(error_code_to_string(err.to_error_code()), "Access lost");
        assert_eq!(error_code_to_string(-42), "Unknown error code: -42");
    }

    #[test]
    fn test_is_recoverable() {
        assert!(CaptureError::NoFrameAvailable.is_recoverable());
        assert!(CaptureError::StagingAllocationFailed { width: 4, height: 4 }.is_recoverable());
        assert!(!CaptureError::AccessLost.is_recoverable());
        assert!(!CaptureError::InvalidRegion("negative origin".into()).is_recoverable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(FailureKind::Transient.status_code(), 1);
        assert_eq!(FailureKind::Recoverable.status_code(), 2);
        assert_eq!(FailureKind::Fatal.status_code(), 3);
    }
}
