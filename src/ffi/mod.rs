//! FFI/C API for the dupcap library
//!
//! Exposes one process-wide capture session through plain C calls. Every
//! call that can fail returns `bool`; `dupcap_last_status` tells a caller
//! whether the last failure was worth retrying or requires a new
//! `dupcap_init`. Calls are serialized on a process-wide mutex.

use std::{ffi::CString, slice};

use libc::{c_char, c_int};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::{
    capture::{platform_backend, CaptureSession, PlatformBackend},
    error::{CaptureError, CaptureResult},
    types::CaptureRegion,
};

// Status codes returned by `dupcap_last_status`
pub const DUPCAP_STATUS_OK: c_int = 0;
pub const DUPCAP_STATUS_TRANSIENT: c_int = 1;
pub const DUPCAP_STATUS_RECOVERABLE: c_int = 2;
pub const DUPCAP_STATUS_FATAL: c_int = 3;

struct FfiState {
    session: Option<CaptureSession<PlatformBackend>>,
    last_status: c_int,
    last_error: c_int,
}

impl FfiState {
    fn record<T>(&mut self, result: CaptureResult<T>) -> bool {
        match result {
            Ok(_) => {
                self.last_status = DUPCAP_STATUS_OK;
                self.last_error = 0;
                true
            }
            Err(e) => {
                self.last_status = e.kind().status_code();
                self.last_error = e.to_error_code();
                false
            }
        }
    }
}

static STATE: Lazy<Mutex<FfiState>> = Lazy::new(|| {
    Mutex::new(FfiState {
        session: None,
        last_status: DUPCAP_STATUS_OK,
        last_error: 0,
    })
});

/// Initialize the capture session on output `output_index`.
/// Returns true immediately if already initialized.
#[no_mangle]
pub extern "C" fn dupcap_init(output_index: c_int) -> bool {
    let mut state = STATE.lock();

    let Ok(index) = u32::try_from(output_index) else {
        return state.record::<()>(Err(CaptureError::InvalidConfiguration(format!(
            "negative output index {}",
            output_index
        ))));
    };

    let session = state
        .session
        .get_or_insert_with(|| CaptureSession::new(platform_backend()));
    let result = session.init(index);

    state.record(result)
}

/// Capture a `width` x `height` region at (`x`, `y`) into `buffer` as
/// tightly packed BGRA.
///
/// # Safety
/// `buffer` must be null or point to at least `width * height * 4` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn dupcap_capture(
    x: c_int,
    y: c_int,
    width: c_int,
    height: c_int,
    buffer: *mut u8,
) -> bool {
    let mut state = STATE.lock();

    if buffer.is_null() {
        return state.record::<()>(Err(CaptureError::InvalidRegion("null buffer".to_string())));
    }
    if width <= 0 || height <= 0 {
        return state.record::<()>(Err(CaptureError::InvalidRegion(format!(
            "non-positive size {}x{}",
            width, height
        ))));
    }

    let region = CaptureRegion::new(x, y, width as u32, height as u32);
    let Some(len) = region.byte_len() else {
        return state.record::<()>(Err(CaptureError::InvalidRegion(format!(
            "{}x{} region overflows",
            width, height
        ))));
    };

    let result = match state.session.as_mut() {
        Some(session) => {
            let buffer = slice::from_raw_parts_mut(buffer, len);
            session.capture(region, buffer)
        }
        None => Err(CaptureError::NotInitialized),
    };

    state.record(result)
}

/// Output width, 0 if not initialized
#[no_mangle]
pub extern "C" fn dupcap_get_width() -> c_int {
    let state = STATE.lock();
    state
        .session
        .as_ref()
        .map_or(0, |s| c_int::try_from(s.width()).unwrap_or(c_int::MAX))
}

/// Output height, 0 if not initialized
#[no_mangle]
pub extern "C" fn dupcap_get_height() -> c_int {
    let state = STATE.lock();
    state
        .session
        .as_ref()
        .map_or(0, |s| c_int::try_from(s.height()).unwrap_or(c_int::MAX))
}

/// Release every capture resource. Safe to call repeatedly.
#[no_mangle]
pub extern "C" fn dupcap_cleanup() {
    let mut state = STATE.lock();
    if let Some(session) = state.session.as_mut() {
        session.cleanup();
    }
    state.last_status = DUPCAP_STATUS_OK;
    state.last_error = 0;
}

/// Status of the last init/capture/cleanup call
#[no_mangle]
pub extern "C" fn dupcap_last_status() -> c_int {
    STATE.lock().last_status
}

/// Error code of the last init/capture call, 0 after success.
/// See [`crate::error::error_code_to_string`] for the table.
#[no_mangle]
pub extern "C" fn dupcap_last_error() -> c_int {
    STATE.lock().last_error
}

/// Get library version
#[no_mangle]
pub extern "C" fn dupcap_version() -> *const c_char {
    static VERSION: Lazy<CString> =
        Lazy::new(|| CString::new(crate::version()).unwrap_or_default());
    VERSION.as_ptr()
}
