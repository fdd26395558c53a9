//! In-memory duplication backend.
//!
//! Serves a deterministic BGRA test pattern per output, pads staging rows the
//! way drivers do, and can be scripted to report "no frame yet", access loss,
//! allocation and map failures. A [`MockHandle`] shared with the backend
//! exposes resource counters so callers can check that every acquired frame
//! and every allocated surface was released.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::capture::readback::aligned_pitch;
use crate::capture::traits::{CaptureBackend, MappedRows, OutputDuplication, StagingSurface};
use crate::error::{CaptureError, CaptureResult};
use crate::types::{OutputGeometry, SourceBox, BYTES_PER_PIXEL};

/// Row pitch alignment used unless overridden
pub const DEFAULT_PITCH_ALIGNMENT: usize = 256;

/// Scripted result of the next `acquire_next_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// A new frame is ready
    Frame,
    /// Nothing presented since the last acquisition
    NoFrame,
    /// The subscription died; every later acquire on it fails the same way
    AccessLost,
    /// Some other acquisition error
    Fail,
}

/// Resource counters observed by a [`MockHandle`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCounters {
    pub chain_builds: u64,
    pub duplications_dropped: u64,
    pub staging_allocations: u64,
    pub staging_dropped: u64,
    pub frames_acquired: u64,
    pub frames_released: u64,
    pub region_copies: u64,
    pub maps: u64,
    pub unmaps: u64,
}

impl MockCounters {
    /// Duplication chains currently alive
    pub fn live_duplications(&self) -> u64 {
        self.chain_builds - self.duplications_dropped
    }

    /// Staging surfaces currently alive
    pub fn live_staging(&self) -> u64 {
        self.staging_allocations - self.staging_dropped
    }

    /// Frames acquired and not yet released
    pub fn frames_in_flight(&self) -> u64 {
        self.frames_acquired - self.frames_released
    }
}

struct MockOutput {
    geometry: OutputGeometry,
    pixels: Vec<u8>,
}

impl MockOutput {
    fn new(width: u32, height: u32) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&MockBackend::pattern_pixel(x, y));
            }
        }
        Self {
            geometry: OutputGeometry::new(width, height),
            pixels,
        }
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.geometry.width || y >= self.geometry.height {
            return None;
        }
        Some((y as usize * self.geometry.width as usize + x as usize) * BYTES_PER_PIXEL)
    }
}

struct MockState {
    outputs: Vec<MockOutput>,
    pitch_alignment: usize,
    acquire_script: VecDeque<AcquireOutcome>,
    fail_next_open: bool,
    fail_next_staging: bool,
    fail_next_map: bool,
    counters: MockCounters,
}

/// Backend serving synthetic outputs from memory
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// One output of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_outputs(&[(width, height)])
    }

    /// Several outputs, enumerated in order
    pub fn with_outputs(sizes: &[(u32, u32)]) -> Self {
        let outputs = sizes
            .iter()
            .map(|&(width, height)| MockOutput::new(width, height))
            .collect();

        Self {
            state: Arc::new(Mutex::new(MockState {
                outputs,
                pitch_alignment: DEFAULT_PITCH_ALIGNMENT,
                acquire_script: VecDeque::new(),
                fail_next_open: false,
                fail_next_staging: false,
                fail_next_map: false,
                counters: MockCounters::default(),
            })),
        }
    }

    /// Override the staging row pitch alignment (1 disables padding)
    pub fn with_pitch_alignment(self, alignment: usize) -> Self {
        self.state.lock().pitch_alignment = alignment.max(1);
        self
    }

    /// Control handle sharing state with this backend
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Pixel the test pattern holds at `(x, y)`, in BGRA order
    pub fn pattern_pixel(x: u32, y: u32) -> [u8; 4] {
        [
            (x & 0xFF) as u8,
            (y & 0xFF) as u8,
            (((x >> 8) & 0x0F) | (((y >> 8) & 0x0F) << 4)) as u8,
            0xFF,
        ]
    }
}

impl CaptureBackend for MockBackend {
    type Duplication = MockDuplication;

    fn open(&mut self, output_index: u32) -> CaptureResult<MockDuplication> {
        let mut state = self.state.lock();

        if state.fail_next_open {
            state.fail_next_open = false;
            return Err(CaptureError::DeviceCreationFailed(
                "scripted device failure".to_string(),
            ));
        }

        let geometry = state
            .outputs
            .get(output_index as usize)
            .map(|output| output.geometry)
            .ok_or(CaptureError::OutputNotFound(output_index))?;

        state.counters.chain_builds += 1;

        Ok(MockDuplication {
            state: Arc::clone(&self.state),
            output_index: output_index as usize,
            geometry,
            holding_frame: false,
            lost: false,
        })
    }

    fn implementation_name(&self) -> String {
        "Mock Duplication".to_string()
    }
}

/// Duplication chain over a synthetic output
pub struct MockDuplication {
    state: Arc<Mutex<MockState>>,
    output_index: usize,
    geometry: OutputGeometry,
    holding_frame: bool,
    lost: bool,
}

impl OutputDuplication for MockDuplication {
    type Staging = MockStaging;

    fn geometry(&self) -> OutputGeometry {
        self.geometry
    }

    fn create_staging(&mut self, width: u32, height: u32) -> CaptureResult<MockStaging> {
        let mut state = self.state.lock();

        if state.fail_next_staging {
            state.fail_next_staging = false;
            return Err(CaptureError::StagingAllocationFailed { width, height });
        }

        let row_pitch = aligned_pitch(width as usize * BYTES_PER_PIXEL, state.pitch_alignment);
        state.counters.staging_allocations += 1;

        Ok(MockStaging {
            state: Arc::clone(&self.state),
            width,
            height,
            row_pitch,
            // Uninitialized GPU memory is not zero; make stale bytes visible
            data: vec![0xCD; row_pitch * height as usize],
        })
    }

    fn acquire_next_frame(&mut self, _timeout_ms: u32) -> CaptureResult<()> {
        if self.holding_frame {
            return Err(CaptureError::AcquireFailed(
                "previous frame was not released".to_string(),
            ));
        }
        if self.lost {
            return Err(CaptureError::AccessLost);
        }

        let mut state = self.state.lock();
        match state.acquire_script.pop_front().unwrap_or(AcquireOutcome::Frame) {
            AcquireOutcome::Frame => {
                state.counters.frames_acquired += 1;
                self.holding_frame = true;
                Ok(())
            }
            AcquireOutcome::NoFrame => Err(CaptureError::NoFrameAvailable),
            AcquireOutcome::AccessLost => {
                self.lost = true;
                Err(CaptureError::AccessLost)
            }
            AcquireOutcome::Fail => Err(CaptureError::AcquireFailed(
                "scripted acquisition failure".to_string(),
            )),
        }
    }

    fn copy_region(&mut self, staging: &mut MockStaging, source: SourceBox) -> CaptureResult<()> {
        if !self.holding_frame {
            return Err(CaptureError::AcquireFailed("no frame acquired".to_string()));
        }
        if source.width() > staging.width || source.height() > staging.height {
            return Err(CaptureError::InvalidRegion(format!(
                "{}x{} box does not fit {}x{} staging surface",
                source.width(),
                source.height(),
                staging.width,
                staging.height
            )));
        }

        let mut state = self.state.lock();
        state.counters.region_copies += 1;

        let output = &state.outputs[self.output_index];
        let row_bytes = source.width() as usize * BYTES_PER_PIXEL;
        for row in 0..source.height() {
            let Some(from) = output.offset(source.left, source.top + row) else {
                break;
            };
            let to = row as usize * staging.row_pitch;
            staging.data[to..to + row_bytes].copy_from_slice(&output.pixels[from..from + row_bytes]);
        }

        Ok(())
    }

    fn read_staging(
        &mut self,
        staging: &mut MockStaging,
        sink: &mut dyn FnMut(MappedRows<'_>),
    ) -> CaptureResult<()> {
        {
            let mut state = self.state.lock();
            if state.fail_next_map {
                state.fail_next_map = false;
                return Err(CaptureError::MapFailed("scripted map failure".to_string()));
            }
            state.counters.maps += 1;
        }

        sink(MappedRows {
            data: &staging.data,
            row_pitch: staging.row_pitch,
        });

        self.state.lock().counters.unmaps += 1;
        Ok(())
    }

    fn release_frame(&mut self) -> CaptureResult<()> {
        if !self.holding_frame {
            return Err(CaptureError::AcquireFailed("no frame to release".to_string()));
        }
        self.holding_frame = false;
        self.state.lock().counters.frames_released += 1;
        Ok(())
    }
}

impl Drop for MockDuplication {
    fn drop(&mut self) {
        self.state.lock().counters.duplications_dropped += 1;
    }
}

/// CPU-side stand-in for a staging texture
pub struct MockStaging {
    state: Arc<Mutex<MockState>>,
    width: u32,
    height: u32,
    row_pitch: usize,
    data: Vec<u8>,
}

impl MockStaging {
    pub fn row_pitch(&self) -> usize {
        self.row_pitch
    }
}

impl StagingSurface for MockStaging {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for MockStaging {
    fn drop(&mut self) {
        self.state.lock().counters.staging_dropped += 1;
    }
}

/// Scripting and inspection handle for a [`MockBackend`]
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Queue outcomes for upcoming acquisitions; an empty queue yields frames
    pub fn script_acquire(&self, outcomes: &[AcquireOutcome]) {
        self.state.lock().acquire_script.extend(outcomes.iter().copied());
    }

    pub fn fail_next_open(&self) {
        self.state.lock().fail_next_open = true;
    }

    pub fn fail_next_staging(&self) {
        self.state.lock().fail_next_staging = true;
    }

    pub fn fail_next_map(&self) {
        self.state.lock().fail_next_map = true;
    }

    /// Snapshot of the resource counters
    pub fn counters(&self) -> MockCounters {
        self.state.lock().counters.clone()
    }

    /// Change an output's mode. Chains opened later see the new size and a
    /// fresh test pattern.
    pub fn set_output_size(&self, output_index: usize, width: u32, height: u32) {
        let mut state = self.state.lock();
        if let Some(output) = state.outputs.get_mut(output_index) {
            *output = MockOutput::new(width, height);
        }
    }

    /// Overwrite one pixel of an output
    pub fn paint(&self, output_index: usize, x: u32, y: u32, bgra: [u8; 4]) {
        let mut state = self.state.lock();
        if let Some(output) = state.outputs.get_mut(output_index) {
            if let Some(offset) = output.offset(x, y) {
                output.pixels[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&bgra);
            }
        }
    }

    /// Current pixel of an output, in BGRA order
    pub fn pixel(&self, output_index: usize, x: u32, y: u32) -> Option<[u8; 4]> {
        let state = self.state.lock();
        let output = state.outputs.get(output_index)?;
        let offset = output.offset(x, y)?;
        let mut bgra = [0u8; 4];
        bgra.copy_from_slice(&output.pixels[offset..offset + BYTES_PER_PIXEL]);
        Some(bgra)
    }
}
