//! D3D11 shared-texture bridge
//!
//! The renderer hands over a shared handle to its output texture. It is
//! opened once on the encoder's device and copied into a pooled texture
//! under the keyed mutex the renderer cycles.

use super::{HandleCache, TextureBridge, TextureInput};
use crate::error::{Error, Result};
use crate::runtime::{Context, ReleaseObserver, Surface};
use std::ffi::c_void;
use windows::core::Interface;
use windows::Win32::Foundation::{HANDLE, HMODULE};
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_UNKNOWN;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D, D3D11_BIND_RENDER_TARGET,
    D3D11_BIND_SHADER_RESOURCE, D3D11_CREATE_DEVICE_FLAG, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC,
};
use windows::Win32::Graphics::Dxgi::{CreateDXGIFactory1, IDXGIAdapter1, IDXGIFactory1, IDXGIKeyedMutex};

pub const AMD_VENDOR_ID: u32 = 0x1002;
const EVICTION_PRIORITY_MAXIMUM: u32 = 0xC800_0000;
const WAIT_INFINITE: u32 = u32::MAX;

fn hresult(reason: &'static str) -> impl FnOnce(windows::core::Error) -> Error {
    move |err| Error::platform(reason, err.code().0)
}

/// Encoder-side D3D11 device on the renderer's adapter
pub struct D3D11Device {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
}

// The immediate context is only used from the encode thread.
unsafe impl Send for D3D11Device {}

impl D3D11Device {
    pub fn as_raw(&self) -> *mut c_void {
        self.device.as_raw()
    }
}

/// Vendor ID of every DXGI adapter, in enumeration order
pub fn adapter_vendors() -> Result<Vec<u32>> {
    unsafe {
        let factory: IDXGIFactory1 = CreateDXGIFactory1().map_err(hresult("CreateDXGIFactory1 failed"))?;
        let mut vendors = Vec::new();
        while let Ok(adapter) = factory.EnumAdapters1(vendors.len() as u32) {
            let desc = adapter.GetDesc1().map_err(hresult("GetDesc1 failed"))?;
            vendors.push(desc.VendorId);
        }
        Ok(vendors)
    }
}

/// Create a device on adapter `adapter_index`, which must be an AMD GPU
pub fn create_device(adapter_index: u32) -> Result<D3D11Device> {
    unsafe {
        let factory: IDXGIFactory1 = CreateDXGIFactory1().map_err(hresult("CreateDXGIFactory1 failed"))?;
        let adapter: IDXGIAdapter1 = factory
            .EnumAdapters1(adapter_index)
            .map_err(hresult("EnumAdapters1 failed"))?;

        let desc = adapter.GetDesc1().map_err(hresult("GetDesc1 failed"))?;
        if desc.VendorId != AMD_VENDOR_ID {
            return Err(Error::Failed(
                "Seems somehow AMF is trying to initialize on a non-AMD adapter",
            ));
        }

        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        D3D11CreateDevice(
            &adapter,
            D3D_DRIVER_TYPE_UNKNOWN,
            HMODULE(std::ptr::null_mut()),
            D3D11_CREATE_DEVICE_FLAG(0),
            None,
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
        .map_err(hresult("D3D11CreateDevice failed"))?;

        match (device, context) {
            (Some(device), Some(context)) => Ok(D3D11Device { device, context }),
            _ => Err(Error::Failed("D3D11CreateDevice failed")),
        }
    }
}

/// Renderer texture opened on the encoder device
pub struct SharedTexture {
    texture: ID3D11Texture2D,
    keyed_mutex: IDXGIKeyedMutex,
}

impl SharedTexture {
    fn open(device: &ID3D11Device, handle: u32) -> Result<Self> {
        unsafe {
            let texture: ID3D11Texture2D = device
                .OpenSharedResource(HANDLE(handle as usize as *mut c_void))
                .map_err(hresult("OpenSharedResource failed"))?;
            let keyed_mutex = texture
                .cast::<IDXGIKeyedMutex>()
                .map_err(hresult("QueryInterface(IDXGIKeyedMutex) failed"))?;
            texture.SetEvictionPriority(EVICTION_PRIORITY_MAXIMUM);
            Ok(SharedTexture { texture, keyed_mutex })
        }
    }

    fn desc(&self) -> D3D11_TEXTURE2D_DESC {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { self.texture.GetDesc(&mut desc) };
        desc
    }
}

/// Pooled texture the encoder reads from
pub struct OutputTexture(ID3D11Texture2D);

// Only touched by the encode thread and by the runtime after submission.
unsafe impl Send for OutputTexture {}

pub struct D3D11Bridge {
    device: D3D11Device,
    amf: Context,
    observer: Box<ReleaseObserver>,
    shared: HandleCache<u32, SharedTexture>,
}

impl D3D11Bridge {
    /// Bind `amf` to `device`; surfaces report releases to `observer`
    pub fn new(device: D3D11Device, amf: Context, observer: Box<ReleaseObserver>) -> Result<Self> {
        amf.init_dx11(device.as_raw())?;
        Ok(D3D11Bridge {
            device,
            amf,
            observer,
            shared: HandleCache::new(),
        })
    }

    pub fn context(&self) -> &Context {
        &self.amf
    }

    fn shared_for(&self, input: &TextureInput<'_>) -> Result<&SharedTexture> {
        match input {
            TextureInput::Shared { handle, .. } => self
                .shared
                .get(*handle)
                .ok_or(Error::Failed("OpenSharedResource failed")),
            TextureInput::Planes(_) => Err(Error::BadFrame("Encode failed: expected a shared texture")),
        }
    }
}

impl TextureBridge for D3D11Bridge {
    type Target = OutputTexture;
    type Surface = Surface;

    fn prepare(&mut self, input: &TextureInput<'_>) -> Result<()> {
        let TextureInput::Shared { handle, .. } = input else {
            return Err(Error::BadFrame("Encode failed: expected a shared texture"));
        };
        let device = &self.device.device;
        self.shared
            .get_or_open(*handle, |h| SharedTexture::open(device, h))?;
        Ok(())
    }

    fn create_target(&mut self, input: &TextureInput<'_>) -> Result<OutputTexture> {
        let mut desc = self.shared_for(input)?.desc();
        desc.BindFlags = (D3D11_BIND_RENDER_TARGET.0 | D3D11_BIND_SHADER_RESOURCE.0) as u32;
        desc.MiscFlags = 0;

        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe {
            self.device
                .device
                .CreateTexture2D(&desc, None, Some(&mut texture))
                .map_err(hresult("Failed to create texture"))?;
        }
        texture
            .map(OutputTexture)
            .ok_or(Error::Failed("Failed to create texture"))
    }

    fn copy(&mut self, input: &mut TextureInput<'_>, target: &mut OutputTexture) -> Result<()> {
        let shared = self.shared_for(input)?;
        let TextureInput::Shared { lock_key, next_key, .. } = input else {
            return Err(Error::BadFrame("Encode failed: expected a shared texture"));
        };

        unsafe {
            shared
                .keyed_mutex
                .AcquireSync(*lock_key, WAIT_INFINITE)
                .map_err(|err| Error::Copy {
                    reason: "AcquireSync failed",
                    code: err.code().0 as i64,
                })?;

            let context = &self.device.context;
            context.CopyResource(&target.0, &shared.texture);
            context.Flush();

            shared
                .keyed_mutex
                .ReleaseSync(**next_key)
                .map_err(|err| Error::Copy {
                    reason: "ReleaseSync failed",
                    code: err.code().0 as i64,
                })
        }
    }

    fn wrap(&mut self, target: &mut OutputTexture) -> Result<Surface> {
        unsafe { self.amf.surface_from_dx11(target.0.as_raw(), &self.observer) }
    }

    fn destroy(&mut self, targets: Vec<OutputTexture>) {
        log::debug!(
            "releasing {} output textures and {} shared textures",
            targets.len(),
            self.shared.len()
        );
        drop(targets);
        self.shared.drain().for_each(drop);
    }
}

impl Drop for D3D11Bridge {
    fn drop(&mut self) {
        self.amf.terminate();
    }
}
