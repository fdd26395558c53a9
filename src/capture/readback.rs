//! CPU-side readback of a mapped staging surface into tightly packed caller memory

use crate::capture::traits::MappedRows;
use crate::error::{CaptureError, CaptureResult};
use crate::types::BYTES_PER_PIXEL;

/// Copy `height` rows of `width` pixels from a pitched surface into `dst`.
///
/// Row `r` is read from `r * row_pitch` and written to `r * width * 4`, so the
/// destination has no padding. Bytes past `width * height * 4` are not touched.
/// Returns the number of bytes written.
pub fn copy_rows(src: MappedRows<'_>, dst: &mut [u8], width: u32, height: u32) -> CaptureResult<usize> {
    let row_bytes = width as usize * BYTES_PER_PIXEL;
    let rows = height as usize;
    let total = row_bytes * rows;

    if rows == 0 || row_bytes == 0 {
        return Ok(0);
    }
    if src.row_pitch < row_bytes {
        return Err(CaptureError::MapFailed(format!(
            "row pitch {} shorter than row of {} bytes",
            src.row_pitch, row_bytes
        )));
    }
    let src_needed = src.row_pitch * (rows - 1) + row_bytes;
    if src.data.len() < src_needed {
        return Err(CaptureError::MapFailed(format!(
            "mapped surface holds {} bytes, {} rows need {}",
            src.data.len(),
            rows,
            src_needed
        )));
    }
    if dst.len() < total {
        return Err(CaptureError::BufferTooSmall {
            required: total,
            provided: dst.len(),
        });
    }

    if src.row_pitch == row_bytes {
        // No padding: one contiguous block
        dst[..total].copy_from_slice(&src.data[..total]);
        return Ok(total);
    }

    for (row, out) in dst[..total].chunks_exact_mut(row_bytes).enumerate() {
        let offset = row * src.row_pitch;
        out.copy_from_slice(&src.data[offset..offset + row_bytes]);
    }

    Ok(total)
}

/// Round a row size up to the driver's pitch alignment
pub fn aligned_pitch(row_bytes: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        row_bytes
    } else {
        row_bytes.div_ceil(alignment) * alignment
    }
}
