//! Backend for targets without a desktop duplication API

use crate::capture::traits::{CaptureBackend, MappedRows, OutputDuplication, StagingSurface};
use crate::error::{CaptureError, CaptureResult};
use crate::types::{OutputGeometry, SourceBox};

/// Backend whose chain never opens
#[derive(Debug, Default)]
pub struct UnsupportedBackend;

impl UnsupportedBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for UnsupportedBackend {
    type Duplication = NoDuplication;

    fn open(&mut self, _output_index: u32) -> CaptureResult<NoDuplication> {
        Err(CaptureError::PlatformError(
            "Desktop duplication is only available on Windows".to_string(),
        ))
    }

    fn implementation_name(&self) -> String {
        "Unsupported".to_string()
    }
}

/// Uninhabited: [`UnsupportedBackend::open`] never produces one
pub enum NoDuplication {}

impl StagingSurface for NoDuplication {
    fn width(&self) -> u32 {
        match *self {}
    }

    fn height(&self) -> u32 {
        match *self {}
    }
}

impl OutputDuplication for NoDuplication {
    type Staging = NoDuplication;

    fn geometry(&self) -> OutputGeometry {
        match *self {}
    }

    fn create_staging(&mut self, _width: u32, _height: u32) -> CaptureResult<NoDuplication> {
        match *self {}
    }

    fn acquire_next_frame(&mut self, _timeout_ms: u32) -> CaptureResult<()> {
        match *self {}
    }

    fn copy_region(&mut self, _staging: &mut NoDuplication, _source: SourceBox) -> CaptureResult<()> {
        match *self {}
    }

    fn read_staging(
        &mut self,
        _staging: &mut NoDuplication,
        _sink: &mut dyn FnMut(MappedRows<'_>),
    ) -> CaptureResult<()> {
        match *self {}
    }

    fn release_frame(&mut self) -> CaptureResult<()> {
        match *self {}
    }
}
