//! DXGI Desktop Duplication chain: device, context, duplication subscription

use std::slice;

use windows::{
    core::Interface,
    Win32::{
        Foundation::HMODULE,
        Graphics::{
            Direct3D::{D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL},
            Direct3D11::{
                D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D, D3D11_BOX,
                D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAPPED_SUBRESOURCE,
                D3D11_MAP_READ, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
            },
            Dxgi::{
                Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC},
                IDXGIAdapter, IDXGIDevice, IDXGIOutput, IDXGIOutput1, IDXGIOutputDuplication,
                IDXGIResource, DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_NOT_FOUND,
                DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_FRAME_INFO,
            },
        },
    },
};

use crate::{
    capture::traits::{CaptureBackend, MappedRows, OutputDuplication, StagingSurface},
    error::{CaptureError, CaptureResult},
    types::{OutputGeometry, SourceBox, BYTES_PER_PIXEL},
};

/// Desktop Duplication backend on the primary hardware adapter
#[derive(Debug, Default)]
pub struct DxgiBackend;

impl DxgiBackend {
    pub fn new() -> Self {
        Self
    }
}

fn create_device() -> CaptureResult<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;
    let mut feature_level = D3D_FEATURE_LEVEL::default();

    unsafe {
        D3D11CreateDevice(
            None::<&IDXGIAdapter>,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE::default(),
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            None,
            D3D11_SDK_VERSION,
            Some(&mut device),
            Some(&mut feature_level),
            Some(&mut context),
        )
    }
    .map_err(|e| CaptureError::DeviceCreationFailed(format!("D3D11CreateDevice: {e}")))?;

    match (device, context) {
        (Some(device), Some(context)) => {
            log::debug!("Created D3D11 device at feature level {:#x}", feature_level.0);
            Ok((device, context))
        }
        _ => Err(CaptureError::DeviceCreationFailed(
            "D3D11CreateDevice returned no device".to_string(),
        )),
    }
}

impl CaptureBackend for DxgiBackend {
    type Duplication = DxgiDuplication;

    fn open(&mut self, output_index: u32) -> CaptureResult<DxgiDuplication> {
        let (device, context) = create_device()?;

        // Each stepping-stone interface drops as soon as the next one is obtained.
        // On any early return, device and context drop with them.
        let duplication = {
            let dxgi_device: IDXGIDevice = device
                .cast()
                .map_err(|e| CaptureError::DeviceCreationFailed(format!("IDXGIDevice: {e}")))?;

            let adapter: IDXGIAdapter = unsafe { dxgi_device.GetAdapter() }
                .map_err(|e| CaptureError::DeviceCreationFailed(format!("GetAdapter: {e}")))?;
            drop(dxgi_device);

            let output: IDXGIOutput = unsafe { adapter.EnumOutputs(output_index) }.map_err(|e| {
                if e.code() == DXGI_ERROR_NOT_FOUND {
                    CaptureError::OutputNotFound(output_index)
                } else {
                    CaptureError::WindowsError(e)
                }
            })?;
            drop(adapter);

            let output1: IDXGIOutput1 = output
                .cast()
                .map_err(|e| CaptureError::DuplicationUnavailable(format!("IDXGIOutput1: {e}")))?;
            drop(output);

            unsafe { output1.DuplicateOutput(&device) }
                .map_err(|e| CaptureError::DuplicationUnavailable(format!("DuplicateOutput: {e}")))?
        };

        let desc = unsafe { duplication.GetDesc() };
        let geometry = OutputGeometry::new(desc.ModeDesc.Width, desc.ModeDesc.Height);

        log::debug!(
            "Duplicating output {} at {}x{}",
            output_index,
            geometry.width,
            geometry.height
        );

        Ok(DxgiDuplication {
            frame: None,
            duplication,
            context,
            device,
            geometry,
        })
    }

    fn implementation_name(&self) -> String {
        "DXGI Desktop Duplication".to_string()
    }

    fn is_hardware_accelerated(&self) -> bool {
        true
    }
}

/// Live duplication of one output.
///
/// Fields drop in declaration order: pending frame resource, subscription,
/// context, device.
pub struct DxgiDuplication {
    frame: Option<IDXGIResource>,
    duplication: IDXGIOutputDuplication,
    context: ID3D11DeviceContext,
    device: ID3D11Device,
    geometry: OutputGeometry,
}

// SAFETY: the chain is only ever driven by one thread at a time, through
// `&mut self`; the device context is never shared outside it.
unsafe impl Send for DxgiDuplication {}

impl OutputDuplication for DxgiDuplication {
    type Staging = DxgiStaging;

    fn geometry(&self) -> OutputGeometry {
        self.geometry
    }

    fn create_staging(&mut self, width: u32, height: u32) -> CaptureResult<DxgiStaging> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        let mut texture: Option<ID3D11Texture2D> = None;
        let created = unsafe { self.device.CreateTexture2D(&desc, None, Some(&mut texture)) };

        match (created, texture) {
            (Ok(()), Some(texture)) => Ok(DxgiStaging {
                texture,
                width,
                height,
            }),
            (Err(e), _) => {
                log::debug!("CreateTexture2D {}x{} failed: {}", width, height, e);
                Err(CaptureError::StagingAllocationFailed { width, height })
            }
            (Ok(()), None) => Err(CaptureError::StagingAllocationFailed { width, height }),
        }
    }

    fn acquire_next_frame(&mut self, timeout_ms: u32) -> CaptureResult<()> {
        let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;

        match unsafe {
            self.duplication
                .AcquireNextFrame(timeout_ms, &mut frame_info, &mut resource)
        } {
            Ok(()) => {}
            Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => {
                return Err(CaptureError::NoFrameAvailable)
            }
            Err(e) if e.code() == DXGI_ERROR_ACCESS_LOST => return Err(CaptureError::AccessLost),
            Err(e) => return Err(CaptureError::AcquireFailed(e.to_string())),
        }

        match resource {
            Some(resource) => {
                self.frame = Some(resource);
                Ok(())
            }
            None => {
                // Acquired without a surface; give the slot back before failing
                if let Err(e) = unsafe { self.duplication.ReleaseFrame() } {
                    log::warn!("Failed to release frame without a surface: {}", e);
                }
                Err(CaptureError::AcquireFailed(
                    "AcquireNextFrame returned no resource".to_string(),
                ))
            }
        }
    }

    fn copy_region(&mut self, staging: &mut DxgiStaging, source: SourceBox) -> CaptureResult<()> {
        let resource = self
            .frame
            .take()
            .ok_or_else(|| CaptureError::AcquireFailed("no frame acquired".to_string()))?;
        let desktop: ID3D11Texture2D = resource.cast()?;
        drop(resource);

        let src_box = D3D11_BOX {
            left: source.left,
            top: source.top,
            front: 0,
            right: source.right,
            bottom: source.bottom,
            back: 1,
        };

        unsafe {
            self.context.CopySubresourceRegion(
                &staging.texture,
                0,
                0,
                0,
                0,
                &desktop,
                0,
                Some(&src_box),
            );
        }

        Ok(())
    }

    fn read_staging(
        &mut self,
        staging: &mut DxgiStaging,
        sink: &mut dyn FnMut(MappedRows<'_>),
    ) -> CaptureResult<()> {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context
                .Map(&staging.texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
        }
        .map_err(|e| CaptureError::MapFailed(e.to_string()))?;

        let _unmap = MappedGuard {
            context: &self.context,
            texture: &staging.texture,
        };

        if mapped.pData.is_null() || staging.height == 0 {
            return Err(CaptureError::MapFailed("mapped surface has no data".to_string()));
        }

        let row_pitch = mapped.RowPitch as usize;
        let len = row_pitch * (staging.height as usize - 1) + staging.width as usize * BYTES_PER_PIXEL;

        // SAFETY: the driver guarantees `RowPitch` bytes per row for `height`
        // rows while the texture stays mapped; `_unmap` outlives `data`.
        let data = unsafe { slice::from_raw_parts(mapped.pData as *const u8, len) };
        sink(MappedRows { data, row_pitch });

        Ok(())
    }

    fn release_frame(&mut self) -> CaptureResult<()> {
        self.frame = None;
        unsafe { self.duplication.ReleaseFrame() }.map_err(|e| {
            if e.code() == DXGI_ERROR_ACCESS_LOST {
                CaptureError::AccessLost
            } else {
                CaptureError::AcquireFailed(format!("ReleaseFrame: {e}"))
            }
        })
    }
}

/// CPU-readable copy target, `D3D11_USAGE_STAGING` in BGRA8
pub struct DxgiStaging {
    texture: ID3D11Texture2D,
    width: u32,
    height: u32,
}

// SAFETY: only touched through the owning `DxgiDuplication`'s context
unsafe impl Send for DxgiStaging {}

impl StagingSurface for DxgiStaging {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Unmaps the staging texture when dropped
struct MappedGuard<'a> {
    context: &'a ID3D11DeviceContext,
    texture: &'a ID3D11Texture2D,
}

impl Drop for MappedGuard<'_> {
    fn drop(&mut self) {
        unsafe { self.context.Unmap(self.texture, 0) };
    }
}
