//! Reusable CPU-readable staging surface

use crate::capture::traits::{OutputDuplication, StagingSurface};
use crate::error::CaptureResult;

/// Holds at most one staging surface, sized to the last serviced request.
///
/// A request with the same dimensions reuses the surface; any other size
/// drops it and allocates a new one.
pub struct StagingCache<S> {
    surface: Option<S>,
    allocations: u64,
}

impl<S: StagingSurface> StagingCache<S> {
    pub fn new() -> Self {
        Self {
            surface: None,
            allocations: 0,
        }
    }

    /// Return a surface of exactly `width` x `height`, allocating through
    /// `duplication` when the cached one does not match.
    ///
    /// On allocation failure the cache is left empty.
    pub fn ensure<D>(&mut self, duplication: &mut D, width: u32, height: u32) -> CaptureResult<&mut S>
    where
        D: OutputDuplication<Staging = S>,
    {
        let surface = match self.surface.take() {
            Some(cached) if cached.width() == width && cached.height() == height => cached,
            stale => {
                if let Some(old) = stale {
                    log::debug!(
                        "Dropping {}x{} staging surface for {}x{} request",
                        old.width(),
                        old.height(),
                        width,
                        height
                    );
                    drop(old);
                }
                let fresh = duplication.create_staging(width, height)?;
                self.allocations += 1;
                fresh
            }
        };

        Ok(self.surface.insert(surface))
    }

    /// Dimensions of the cached surface, if any
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.surface.as_ref().map(|s| (s.width(), s.height()))
    }

    /// Surfaces allocated over the cache's lifetime
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Release the cached surface
    pub fn clear(&mut self) {
        self.surface = None;
    }
}

impl<S: StagingSurface> Default for StagingCache<S> {
    fn default() -> Self {
        Self::new()
    }
}
