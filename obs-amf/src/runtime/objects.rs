//! Owned wrappers over runtime objects
//!
//! Every wrapper holds one reference and releases it on drop.

use super::observer::ReleaseObserver;
use super::sys::*;
use super::wide::to_wide;
use super::AmfRuntime;
use crate::backend::{EncoderComponent, InputSurface, OutputData, Variant};
use crate::codec::SurfaceFormat;
use crate::error::{AmfResultExt, Error, Result};
use crate::result::AmfResult;
use obs_video::SurfaceKey;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr::{self, NonNull};
use std::sync::Arc;

/// One counted reference to an AMF interface
pub struct Ref<T> {
    ptr: NonNull<T>,
}

// Runtime objects are internally synchronized; each wrapper is used by one
// thread at a time.
unsafe impl<T> Send for Ref<T> {}

impl<T> Ref<T> {
    /// Take ownership of a reference returned by the runtime
    ///
    /// # Safety
    /// `ptr` must be null or a live interface whose vtable starts with
    /// `AMFInterfaceVtbl`.
    pub unsafe fn from_raw(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Ref { ptr })
    }

    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    fn this(&self) -> *mut c_void {
        self.ptr.as_ptr() as *mut c_void
    }

    fn interface_vtbl(&self) -> &AMFInterfaceVtbl {
        unsafe { &**(self.ptr.as_ptr() as *mut *const AMFInterfaceVtbl) }
    }

    /// Typed view of the vtable
    ///
    /// # Safety
    /// `V` must be a prefix of the object's real vtable.
    unsafe fn vtbl<V>(&self) -> &V {
        &**(self.ptr.as_ptr() as *mut *const V)
    }

    fn query<U>(&self, iid: &AMFGuid) -> std::result::Result<Ref<U>, AmfResult> {
        let mut out: *mut c_void = ptr::null_mut();
        let res = AmfResult(unsafe { (self.interface_vtbl().QueryInterface)(self.this(), iid, &mut out) });
        res.ok()?;
        unsafe { Ref::from_raw(out as *mut U) }.ok_or(AmfResult::NO_INTERFACE)
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        unsafe { (self.interface_vtbl().Acquire)(self.this()) };
        Ref { ptr: self.ptr }
    }
}

impl<T> Drop for Ref<T> {
    fn drop(&mut self) {
        unsafe { (self.interface_vtbl().Release)(self.this()) };
    }
}

// ---------------------------------------------------------------------------
// Variants

/// Owns whatever a raw variant borrows while it is passed to the runtime
enum VariantArg {
    Plain(AMFVariantStruct),
    Str(AMFVariantStruct, CString),
}

impl VariantArg {
    fn new(value: &Variant) -> Self {
        let mut raw = AMFVariantStruct::empty();
        match value {
            Variant::Empty => {}
            Variant::Bool(v) => {
                raw.type_ = AMF_VARIANT_BOOL;
                raw.value.boolValue = *v;
            }
            Variant::Int(v) => {
                raw.type_ = AMF_VARIANT_INT64;
                raw.value.int64Value = *v;
            }
            Variant::Double(v) => {
                raw.type_ = AMF_VARIANT_DOUBLE;
                raw.value.doubleValue = *v;
            }
            Variant::Size { width, height } => {
                raw.type_ = AMF_VARIANT_SIZE;
                raw.value.sizeValue = AMFSize {
                    width: *width,
                    height: *height,
                };
            }
            Variant::Rate { num, den } => {
                raw.type_ = AMF_VARIANT_RATE;
                raw.value.rateValue = AMFRate { num: *num, den: *den };
            }
            Variant::Str(s) => {
                let owned = CString::new(s.replace('\0', "")).unwrap_or_default();
                raw.type_ = AMF_VARIANT_STRING;
                raw.value.stringValue = owned.as_ptr() as *mut _;
                return VariantArg::Str(raw, owned);
            }
        }
        VariantArg::Plain(raw)
    }

    fn raw(&self) -> AMFVariantStruct {
        match self {
            VariantArg::Plain(raw) | VariantArg::Str(raw, _) => *raw,
        }
    }
}

/// Convert a variant read back from the runtime
///
/// Interface values are released here; string values are not copied since
/// nothing reads them back.
fn variant_from_raw(raw: &AMFVariantStruct) -> Variant {
    unsafe {
        match raw.type_ {
            AMF_VARIANT_BOOL => Variant::Bool(raw.value.boolValue),
            AMF_VARIANT_INT64 => Variant::Int(raw.value.int64Value),
            AMF_VARIANT_DOUBLE => Variant::Double(raw.value.doubleValue),
            AMF_VARIANT_SIZE => Variant::Size {
                width: raw.value.sizeValue.width,
                height: raw.value.sizeValue.height,
            },
            AMF_VARIANT_RATE => Variant::Rate {
                num: raw.value.rateValue.num,
                den: raw.value.rateValue.den,
            },
            AMF_VARIANT_INTERFACE => {
                drop(Ref::from_raw(raw.value.pInterface));
                Variant::Empty
            }
            _ => Variant::Empty,
        }
    }
}

fn storage_set(
    this: *mut c_void,
    vtbl: &AMFPropertyStorageVtbl,
    name: &str,
    value: &Variant,
) -> std::result::Result<(), AmfResult> {
    let name = to_wide(name);
    let arg = VariantArg::new(value);
    AmfResult(unsafe { (vtbl.SetProperty)(this, name.as_ptr(), arg.raw()) }).ok()
}

fn storage_get_raw(
    this: *mut c_void,
    vtbl: &AMFPropertyStorageVtbl,
    name: &str,
) -> std::result::Result<AMFVariantStruct, AmfResult> {
    let name = to_wide(name);
    let mut raw = AMFVariantStruct::empty();
    AmfResult(unsafe { (vtbl.GetProperty)(this, name.as_ptr(), &mut raw) }).ok()?;
    Ok(raw)
}

fn storage_get(
    this: *mut c_void,
    vtbl: &AMFPropertyStorageVtbl,
    name: &str,
) -> std::result::Result<Variant, AmfResult> {
    storage_get_raw(this, vtbl, name).map(|raw| variant_from_raw(&raw))
}

// ---------------------------------------------------------------------------
// Context

/// Device context (`AMFContext` plus its `AMFContext1` view)
#[derive(Clone)]
pub struct Context {
    context: Ref<AMFContext>,
    context1: Ref<AMFContext1>,
    runtime: Arc<AmfRuntime>,
}

impl Context {
    pub(super) fn new(runtime: Arc<AmfRuntime>, context: Ref<AMFContext>) -> Result<Self> {
        let context1 = context
            .query::<AMFContext1>(&IID_AMFContext1)
            .map_err(|code| Error::amf("CreateContext1 failed", code))?;
        Ok(Context {
            context,
            context1,
            runtime,
        })
    }

    fn vtbl(&self) -> &AMFContextVtbl {
        unsafe { self.context.vtbl() }
    }

    fn vtbl1(&self) -> &AMFContext1Vtbl {
        unsafe { self.context1.vtbl() }
    }

    pub fn runtime(&self) -> &Arc<AmfRuntime> {
        &self.runtime
    }

    pub(crate) fn raw(&self) -> *mut AMFContext {
        self.context.as_ptr()
    }

    /// Bind to a D3D11 device, or let the runtime create one when null
    pub fn init_dx11(&self, device: *mut c_void) -> Result<()> {
        AmfResult(unsafe { (self.vtbl().InitDX11)(self.context.this(), device, AMF_DX11_1) })
            .context("InitDX11 failed")
    }

    /// Bind to an `AMFVulkanDevice`, or let the runtime create one when null
    pub fn init_vulkan(&self, device: *mut c_void) -> Result<()> {
        AmfResult(unsafe { (self.vtbl1().InitVulkan)(self.context1.this(), device) })
            .context("InitVulkan failed")
    }

    /// Device extensions the runtime needs on a Vulkan device it is given
    pub fn vulkan_device_extensions(&self) -> Result<Vec<CString>> {
        let this = self.context1.this();
        let get = self.vtbl1().GetVulkanDeviceExtensions;
        let mut count: amf_size = 0;
        AmfResult(unsafe { get(this, &mut count, ptr::null_mut()) }).context("GetVulkanDeviceExtensions failed")?;
        let mut names: Vec<*const c_char> = vec![ptr::null(); count];
        AmfResult(unsafe { get(this, &mut count, names.as_mut_ptr()) }).context("GetVulkanDeviceExtensions failed")?;
        names.truncate(count);
        Ok(names
            .into_iter()
            .filter(|name| !name.is_null())
            .map(|name| unsafe { CStr::from_ptr(name) }.to_owned())
            .collect())
    }

    /// Wrap a CPU buffer without copying
    ///
    /// # Safety
    /// `data` must stay valid and unmodified until `observer` reports the
    /// surface released, and `observer` must outlive the surface.
    pub unsafe fn surface_from_host(
        &self,
        format: SurfaceFormat,
        width: u32,
        height: u32,
        pitch: u32,
        data: *mut u8,
        observer: &ReleaseObserver,
    ) -> Result<Surface> {
        let mut out = ptr::null_mut();
        AmfResult((self.vtbl().CreateSurfaceFromHostNative)(
            self.context.this(),
            format as i32,
            width as i32,
            height as i32,
            pitch as i32,
            0,
            data as *mut c_void,
            &mut out,
            observer.as_raw(),
        ))
        .context("CreateSurfaceFromHostNative failed")?;
        Surface::from_raw(out).ok_or(Error::amf("CreateSurfaceFromHostNative failed", AmfResult::INVALID_POINTER))
    }

    /// Wrap an `ID3D11Texture2D`
    ///
    /// # Safety
    /// `texture` must be a live texture on the context's device; `observer`
    /// must outlive the surface.
    pub unsafe fn surface_from_dx11(&self, texture: *mut c_void, observer: &ReleaseObserver) -> Result<Surface> {
        let mut out = ptr::null_mut();
        AmfResult((self.vtbl().CreateSurfaceFromDX11Native)(
            self.context.this(),
            texture,
            &mut out,
            observer.as_raw(),
        ))
        .context("CreateSurfaceFromDX11Native failed")?;
        Surface::from_raw(out).ok_or(Error::amf("CreateSurfaceFromDX11Native failed", AmfResult::INVALID_POINTER))
    }

    /// Wrap an `AMFVulkanSurface` description
    ///
    /// # Safety
    /// `surface` must describe a live image on the context's device and stay
    /// valid as long as the returned surface; `observer` must outlive it.
    pub unsafe fn surface_from_vulkan(
        &self,
        surface: *mut AMFVulkanSurface,
        observer: &ReleaseObserver,
    ) -> Result<Surface> {
        let mut out = ptr::null_mut();
        AmfResult((self.vtbl1().CreateSurfaceFromVulkanNative)(
            self.context1.this(),
            surface as *mut c_void,
            &mut out,
            observer.as_raw(),
        ))
        .context("CreateSurfaceFromVulkanNative failed")?;
        Surface::from_raw(out).ok_or(Error::amf("CreateSurfaceFromVulkanNative failed", AmfResult::INVALID_POINTER))
    }

    fn alloc_host_buffer(&self, size: usize) -> std::result::Result<Buffer, AmfResult> {
        let mut out = ptr::null_mut();
        AmfResult(unsafe { (self.vtbl().AllocBuffer)(self.context.this(), AMF_MEMORY_HOST, size, &mut out) }).ok()?;
        unsafe { Ref::from_raw(out) }.map(Buffer).ok_or(AmfResult::OUT_OF_MEMORY)
    }

    pub fn terminate(&self) {
        unsafe { (self.vtbl().Terminate)(self.context.this()) };
    }
}

// ---------------------------------------------------------------------------
// Buffers, surfaces and output data

pub struct Buffer(Ref<AMFBuffer>);

impl Buffer {
    fn vtbl(&self) -> &AMFBufferVtbl {
        unsafe { self.0.vtbl() }
    }

    pub fn bytes(&self) -> &[u8] {
        unsafe {
            let data = (self.vtbl().GetNative)(self.0.this()) as *const u8;
            let size = (self.vtbl().GetSize)(self.0.this());
            if data.is_null() {
                return &[];
            }
            std::slice::from_raw_parts(data, size)
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            let data = (self.vtbl().GetNative)(self.0.this()) as *mut u8;
            let size = (self.vtbl().GetSize)(self.0.this());
            if data.is_null() {
                return &mut [];
            }
            std::slice::from_raw_parts_mut(data, size)
        }
    }
}

/// Input surface
pub struct Surface(Ref<AMFSurface>);

impl Surface {
    unsafe fn from_raw(ptr: *mut AMFSurface) -> Option<Self> {
        Ref::from_raw(ptr).map(Surface)
    }

    fn storage(&self) -> &AMFPropertyStorageVtbl {
        unsafe { &self.0.vtbl::<AMFSurfaceVtbl>().data.storage }
    }
}

impl InputSurface for Surface {
    fn key(&self) -> SurfaceKey {
        SurfaceKey::from_ptr(self.0.as_ptr())
    }

    fn set_pts(&mut self, pts: i64) {
        unsafe { (self.0.vtbl::<AMFSurfaceVtbl>().data.SetPts)(self.0.this(), pts) };
    }

    fn set_property(&mut self, name: &str, value: Variant) -> std::result::Result<(), AmfResult> {
        storage_set(self.0.this(), self.storage(), name, &value)
    }
}

/// Compressed output of one `QueryOutput` call
pub struct Output {
    data: Ref<AMFData>,
    buffer: Option<Buffer>,
}

impl Output {
    fn new(data: Ref<AMFData>) -> Self {
        let buffer = data.query::<AMFBuffer>(&IID_AMFBuffer).ok().map(Buffer);
        Output { data, buffer }
    }
}

impl OutputData for Output {
    fn property(&self, name: &str) -> std::result::Result<Variant, AmfResult> {
        let vtbl = unsafe { &self.data.vtbl::<AMFDataVtbl>().storage };
        storage_get(self.data.this(), vtbl, name)
    }

    fn pts(&self) -> i64 {
        unsafe { (self.data.vtbl::<AMFDataVtbl>().GetPts)(self.data.this()) }
    }

    fn bytes(&self) -> &[u8] {
        self.buffer.as_ref().map(Buffer::bytes).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Component

/// Hardware encoder component
pub struct Component {
    component: Ref<AMFComponent>,
    context: Context,
}

impl Component {
    pub(super) fn new(component: Ref<AMFComponent>, context: Context) -> Self {
        Component { component, context }
    }

    fn vtbl(&self) -> &AMFComponentVtbl {
        unsafe { self.component.vtbl() }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl EncoderComponent for Component {
    type Surface = Surface;
    type Output = Output;

    fn set_property(&mut self, name: &str, value: Variant) -> std::result::Result<(), AmfResult> {
        storage_set(self.component.this(), &self.vtbl().storage, name, &value)
    }

    fn get_property(&self, name: &str) -> std::result::Result<Variant, AmfResult> {
        storage_get(self.component.this(), &self.vtbl().storage, name)
    }

    fn caps_property(&self, name: &str) -> std::result::Result<Variant, AmfResult> {
        let mut caps = ptr::null_mut();
        AmfResult(unsafe { (self.vtbl().GetCaps)(self.component.this(), &mut caps) }).ok()?;
        let caps: Ref<AMFCaps> = unsafe { Ref::from_raw(caps) }.ok_or(AmfResult::NO_INTERFACE)?;
        let vtbl = unsafe { caps.vtbl::<AMFPropertyStorageVtbl>() };
        storage_get(caps.this(), vtbl, name)
    }

    fn set_blob(&mut self, name: &str, bytes: &[u8]) -> std::result::Result<(), AmfResult> {
        let mut buffer = self.context.alloc_host_buffer(bytes.len())?;
        buffer
            .bytes_mut()
            .get_mut(..bytes.len())
            .ok_or(AmfResult::OUT_OF_MEMORY)?
            .copy_from_slice(bytes);

        let mut raw = AMFVariantStruct::empty();
        raw.type_ = AMF_VARIANT_INTERFACE;
        raw.value.pInterface = buffer.0.as_ptr() as *mut AMFInterface;
        let name = to_wide(name);
        AmfResult(unsafe { (self.vtbl().storage.SetProperty)(self.component.this(), name.as_ptr(), raw) }).ok()
    }

    fn get_blob(&self, name: &str) -> std::result::Result<Vec<u8>, AmfResult> {
        let raw = storage_get_raw(self.component.this(), &self.vtbl().storage, name)?;
        if raw.type_ != AMF_VARIANT_INTERFACE {
            return Err(AmfResult::INVALID_DATA_TYPE);
        }
        let holder: Ref<AMFInterface> =
            unsafe { Ref::from_raw(raw.value.pInterface) }.ok_or(AmfResult::INVALID_POINTER)?;
        let buffer = Buffer(holder.query::<AMFBuffer>(&IID_AMFBuffer)?);
        Ok(buffer.bytes().to_vec())
    }

    fn init(&mut self, format: SurfaceFormat, width: u32, height: u32) -> std::result::Result<(), AmfResult> {
        AmfResult(unsafe { (self.vtbl().Init)(self.component.this(), format as i32, width as i32, height as i32) })
            .ok()
    }

    fn reinit(&mut self, width: u32, height: u32) -> std::result::Result<(), AmfResult> {
        AmfResult(unsafe { (self.vtbl().ReInit)(self.component.this(), width as i32, height as i32) }).ok()
    }

    fn submit_input(&mut self, surface: &Surface) -> AmfResult {
        AmfResult(unsafe { (self.vtbl().SubmitInput)(self.component.this(), surface.0.as_ptr() as *mut AMFData) })
    }

    fn query_output(&mut self) -> (AmfResult, Option<Output>) {
        let mut data = ptr::null_mut();
        let res = AmfResult(unsafe { (self.vtbl().QueryOutput)(self.component.this(), &mut data) });
        let output = unsafe { Ref::from_raw(data) }.map(Output::new);
        (res, output)
    }

    fn terminate(&mut self) {
        unsafe { (self.vtbl().Terminate)(self.component.this()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_layout() {
        assert_eq!(std::mem::size_of::<AMFVariantStruct>(), 24);
        assert_eq!(std::mem::align_of::<AMFVariantStruct>(), 8);
    }

    #[test]
    fn test_variant_conversion() {
        let values = [
            Variant::Bool(true),
            Variant::Int(-42),
            Variant::Double(1.5),
            Variant::Size { width: 1920, height: 1080 },
            Variant::Rate { num: 30000, den: 1001 },
        ];
        for value in values {
            let arg = VariantArg::new(&value);
            assert_eq!(variant_from_raw(&arg.raw()), value);
        }
    }

    #[test]
    fn test_string_argument_stays_alive() {
        let arg = VariantArg::new(&Variant::Str("high".into()));
        let raw = arg.raw();
        assert_eq!(raw.type_, AMF_VARIANT_STRING);
        let text = unsafe { std::ffi::CStr::from_ptr(raw.value.stringValue) };
        assert_eq!(text.to_str().unwrap(), "high");
    }
}
