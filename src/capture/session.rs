//! Capture session state machine
//!
//! A [`CaptureSession`] owns one duplication chain at a time. `init` builds
//! it, `capture` pulls a region of the next frame into caller memory,
//! `cleanup` tears it down. Access loss during `capture` tears the chain
//! down as well; the caller has to `init` again.

use std::thread;

use crate::capture::readback::copy_rows;
use crate::capture::staging::StagingCache;
use crate::capture::traits::{CaptureBackend, MappedRows, OutputDuplication};
use crate::error::{CaptureError, CaptureResult, FailureKind};
use crate::types::{CaptureRegion, CapturedRegion, OutputGeometry, SessionConfig, SessionStats};

/// Everything that lives between a successful `init` and the next teardown.
///
/// Fields drop in declaration order, so the staging surface goes before the
/// duplication that allocated it.
struct ActiveChain<D: OutputDuplication> {
    staging: StagingCache<D::Staging>,
    duplication: D,
    geometry: OutputGeometry,
    output_index: u32,
}

/// An acquired frame. Dropping the lease returns the frame to the subscription.
struct FrameLease<'a, D: OutputDuplication> {
    duplication: &'a mut D,
    held: bool,
}

impl<'a, D: OutputDuplication> FrameLease<'a, D> {
    fn acquire(duplication: &'a mut D, timeout_ms: u32) -> CaptureResult<Self> {
        duplication.acquire_next_frame(timeout_ms)?;
        Ok(Self {
            duplication,
            held: true,
        })
    }

    fn duplication(&mut self) -> &mut D {
        self.duplication
    }

    /// Release explicitly so the caller sees the error
    fn release(mut self) -> CaptureResult<()> {
        self.held = false;
        self.duplication.release_frame()
    }
}

impl<D: OutputDuplication> Drop for FrameLease<'_, D> {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.duplication.release_frame() {
                log::warn!("Failed to release frame on error path: {}", e);
            }
        }
    }
}

/// Capture session over one output
pub struct CaptureSession<B: CaptureBackend> {
    chain: Option<ActiveChain<B::Duplication>>,
    backend: B,
    config: SessionConfig,
    stats: SessionStats,
}

impl<B: CaptureBackend> CaptureSession<B> {
    /// Create an uninitialized session with default configuration
    pub fn new(backend: B) -> Self {
        Self {
            chain: None,
            backend,
            config: SessionConfig::default(),
            stats: SessionStats::default(),
        }
    }

    /// Create an uninitialized session with custom configuration
    pub fn with_config(backend: B, config: SessionConfig) -> CaptureResult<Self> {
        config.validate().map_err(CaptureError::InvalidConfiguration)?;

        Ok(Self {
            chain: None,
            backend,
            config,
            stats: SessionStats::default(),
        })
    }

    /// Build the duplication chain for `output_index`.
    ///
    /// Succeeds without touching the backend when a chain already exists,
    /// whatever index it was built for. On failure nothing is retained.
    pub fn init(&mut self, output_index: u32) -> CaptureResult<()> {
        if let Some(chain) = &self.chain {
            if chain.output_index != output_index {
                log::debug!(
                    "Session already bound to output {}, ignoring init({})",
                    chain.output_index,
                    output_index
                );
            }
            return Ok(());
        }

        let duplication = self.backend.open(output_index)?;
        let geometry = duplication.geometry();

        log::debug!(
            "{} session initialized on output {} ({}x{})",
            self.backend.implementation_name(),
            output_index,
            geometry.width,
            geometry.height
        );

        self.chain = Some(ActiveChain {
            staging: StagingCache::new(),
            duplication,
            geometry,
            output_index,
        });
        self.stats.chain_builds += 1;

        Ok(())
    }

    /// Copy `region` of the next frame into `buffer`, tightly packed BGRA.
    ///
    /// The right and bottom edges are clamped to the output; the returned
    /// [`CapturedRegion`] says how much was actually written. On access loss
    /// the session is torn down before the error is returned.
    pub fn capture(
        &mut self,
        region: CaptureRegion,
        buffer: &mut [u8],
    ) -> CaptureResult<CapturedRegion> {
        self.stats.total_captures += 1;

        let result = self.capture_frame(region, buffer);

        match &result {
            Ok(captured) => {
                self.stats.successful_captures += 1;
                self.stats.total_bytes_copied += captured.byte_len() as u64;
            }
            Err(e) => match e.kind() {
                FailureKind::Transient => {
                    self.stats.unavailable_frames += 1;
                    log::trace!("No new frame for {:?}", region);
                }
                FailureKind::Recoverable => {
                    self.stats.failed_captures += 1;
                    log::debug!("Capture of {:?} failed: {}", region, e);
                }
                FailureKind::Fatal => {
                    self.stats.failed_captures += 1;
                    self.stats.access_lost += 1;
                    log::warn!("{}; tearing down capture session", e);
                    self.cleanup();
                }
            },
        }

        result
    }

    fn capture_frame(
        &mut self,
        region: CaptureRegion,
        buffer: &mut [u8],
    ) -> CaptureResult<CapturedRegion> {
        let chain = self.chain.as_mut().ok_or(CaptureError::NotInitialized)?;

        let source = region.clamp_to(chain.geometry)?;

        let required = region.byte_len().ok_or_else(|| {
            CaptureError::InvalidRegion(format!(
                "{}x{} region overflows the address space",
                region.width, region.height
            ))
        })?;
        if buffer.len() < required {
            return Err(CaptureError::BufferTooSmall {
                required,
                provided: buffer.len(),
            });
        }

        let reallocating = chain.staging.dimensions() != Some((region.width, region.height));
        let staging = chain
            .staging
            .ensure(&mut chain.duplication, region.width, region.height)?;
        if reallocating {
            self.stats.staging_allocations += 1;
        }

        let mut lease = FrameLease::acquire(&mut chain.duplication, self.config.acquire_timeout_ms)?;
        lease.duplication().copy_region(staging, source)?;

        let mut copied = Ok(0);
        lease.duplication().read_staging(staging, &mut |rows: MappedRows<'_>| {
            copied = copy_rows(rows, buffer, source.width(), source.height());
        })?;
        copied?;

        lease.release()?;

        Ok(CapturedRegion {
            width: source.width(),
            height: source.height(),
            requested_width: region.width,
            requested_height: region.height,
        })
    }

    /// [`CaptureSession::capture`] with the configured retry policy.
    ///
    /// Failures where [`CaptureError::is_recoverable`] holds (no frame,
    /// staging, map or acquire failures) are retried up to `max_retries`
    /// times, sleeping `retry_delay` between attempts. With `reinit_on_access_lost` set, one
    /// access loss rebuilds the chain on the same output and keeps going.
    pub fn capture_with_retry(
        &mut self,
        region: CaptureRegion,
        buffer: &mut [u8],
    ) -> CaptureResult<CapturedRegion> {
        let mut attempt = 0;
        let mut reinitialized = false;

        loop {
            let output_index = self.output_index();

            match self.capture(region, buffer) {
                Ok(captured) => return Ok(captured),
                Err(e) if e.is_recoverable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    thread::sleep(self.config.retry_delay);
                    log::debug!("Retry attempt {} for {:?}", attempt, region);
                }
                Err(e) if e.is_fatal() && self.config.reinit_on_access_lost && !reinitialized => {
                    let Some(index) = output_index else {
                        return Err(e);
                    };
                    reinitialized = true;
                    log::warn!("Reinitializing output {} after access loss", index);
                    self.init(index)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Release every resource and return to the uninitialized state.
    /// Safe to call at any time, any number of times.
    pub fn cleanup(&mut self) {
        if let Some(mut chain) = self.chain.take() {
            chain.staging.clear();
            log::debug!("Released duplication of output {}", chain.output_index);
        }
    }

    /// Output width, zero when uninitialized
    pub fn width(&self) -> u32 {
        self.geometry().map_or(0, |g| g.width)
    }

    /// Output height, zero when uninitialized
    pub fn height(&self) -> u32 {
        self.geometry().map_or(0, |g| g.height)
    }

    pub fn geometry(&self) -> Option<OutputGeometry> {
        self.chain.as_ref().map(|chain| chain.geometry)
    }

    pub fn is_initialized(&self) -> bool {
        self.chain.is_some()
    }

    /// Output the live chain is bound to
    pub fn output_index(&self) -> Option<u32> {
        self.chain.as_ref().map(|chain| chain.output_index)
    }

    /// Size of the cached staging surface
    pub fn staging_dimensions(&self) -> Option<(u32, u32)> {
        self.chain.as_ref().and_then(|chain| chain.staging.dimensions())
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = SessionStats::default();
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get the implementation name
    pub fn implementation_name(&self) -> String {
        self.backend.implementation_name()
    }
}

impl<B: CaptureBackend> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::{AcquireOutcome, MockBackend};

    #[test]
    fn test_lease_releases_on_map_failure() {
        let backend = MockBackend::new(32, 32);
        let handle = backend.handle();
        let mut session = CaptureSession::new(backend);
        session.init(0).unwrap();

        handle.fail_next_map();
        let mut buffer = vec![0u8; 8 * 8 * 4];
        let err = session
            .capture(CaptureRegion::new(0, 0, 8, 8), &mut buffer)
            .unwrap_err();

        assert!(matches!(err, CaptureError::MapFailed(_)));
        assert!(session.is_initialized());
        assert_eq!(handle.counters().frames_in_flight(), 0);

        assert!(session.capture(CaptureRegion::new(0, 0, 8, 8), &mut buffer).is_ok());
    }

    #[test]
    fn test_staging_survives_no_frame() {
        let backend = MockBackend::new(32, 32);
        let handle = backend.handle();
        let mut session = CaptureSession::new(backend);
        session.init(0).unwrap();

        handle.script_acquire(&[AcquireOutcome::NoFrame]);
        let mut buffer = vec![0u8; 4 * 4 * 4];
        let err = session
            .capture(CaptureRegion::new(0, 0, 4, 4), &mut buffer)
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Transient);
        assert_eq!(session.staging_dimensions(), Some((4, 4)));
        assert_eq!(session.stats().unavailable_frames, 1);
        assert_eq!(session.stats().failed_captures, 0);
    }

    #[test]
    fn test_fatal_failure_tears_down() {
        let backend = MockBackend::new(32, 32);
        let handle = backend.handle();
        let mut session = CaptureSession::new(backend);
        session.init(0).unwrap();

        handle.script_acquire(&[AcquireOutcome::AccessLost]);
        let mut buffer = vec![0u8; 4 * 4 * 4];
        assert!(session.capture(CaptureRegion::new(0, 0, 4, 4), &mut buffer).is_err());

        let counters = handle.counters();
        assert!(!session.is_initialized());
        assert_eq!(session.width(), 0);
        assert_eq!(counters.live_duplications(), 0);
        assert_eq!(counters.live_staging(), 0);
        assert_eq!(session.stats().access_lost, 1);
    }

    #[test]
    fn test_retry_rides_out_missing_frames() {
        let backend = MockBackend::new(16, 16);
        let handle = backend.handle();
        let config = SessionConfig {
            retry_delay: std::time::Duration::ZERO,
            ..Default::default()
        };
        let mut session = CaptureSession::with_config(backend, config).unwrap();
        session.init(0).unwrap();

        handle.script_acquire(&[AcquireOutcome::NoFrame, AcquireOutcome::NoFrame]);
        let mut buffer = vec![0u8; 16 * 16 * 4];
        let captured = session
            .capture_with_retry(CaptureRegion::new(0, 0, 16, 16), &mut buffer)
            .unwrap();

        assert_eq!(captured.width, 16);
        assert_eq!(session.stats().total_captures, 3);
        assert_eq!(session.stats().successful_captures, 1);
    }

    #[test]
    fn test_retry_rides_out_acquire_failure() {
        let backend = MockBackend::new(16, 16);
        let handle = backend.handle();
        let config = SessionConfig {
            retry_delay: std::time::Duration::ZERO,
            ..Default::default()
        };
        let mut session = CaptureSession::with_config(backend, config).unwrap();
        session.init(0).unwrap();

        handle.script_acquire(&[AcquireOutcome::Fail, AcquireOutcome::Frame]);
        let mut buffer = vec![0u8; 4 * 4 * 4];
        session
            .capture_with_retry(CaptureRegion::new(0, 0, 4, 4), &mut buffer)
            .unwrap();

        assert_eq!(session.stats().total_captures, 2);
        assert_eq!(session.stats().successful_captures, 1);
        assert_eq!(session.stats().failed_captures, 1);
        assert!(session.is_initialized());
        assert_eq!(handle.counters().chain_builds, 1);
    }

    #[test]
    fn test_retry_reinitializes_once_after_access_loss() {
        let backend = MockBackend::new(16, 16);
        let handle = backend.handle();
        let config = SessionConfig {
            retry_delay: std::time::Duration::ZERO,
            reinit_on_access_lost: true,
            ..Default::default()
        };
        let mut session = CaptureSession::with_config(backend, config).unwrap();
        session.init(0).unwrap();

        handle.script_acquire(&[AcquireOutcome::AccessLost]);
        let mut buffer = vec![0u8; 8 * 8 * 4];
        assert!(session
            .capture_with_retry(CaptureRegion::new(0, 0, 8, 8), &mut buffer)
            .is_ok());
        assert_eq!(session.stats().chain_builds, 2);

        handle.script_acquire(&[AcquireOutcome::AccessLost, AcquireOutcome::AccessLost]);
        let err = session
            .capture_with_retry(CaptureRegion::new(0, 0, 8, 8), &mut buffer)
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(!session.is_initialized());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig {
            acquire_timeout_ms: 10_000,
            ..Default::default()
        };
        assert!(matches!(
            CaptureSession::with_config(MockBackend::new(8, 8), config),
            Err(CaptureError::InvalidConfiguration(_))
        ));
    }
}
