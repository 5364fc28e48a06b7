//! Raw C layout of the AMF runtime interfaces
//!
//! Only the entries this crate calls are typed; the rest are kept as
//! opaque slots so the offsets line up with the runtime's vtables.

#![allow(non_snake_case, non_camel_case_types, dead_code)]

use std::os::raw::{c_char, c_long, c_void};

pub type AMF_RESULT = i32;
pub type amf_bool = bool;
pub type amf_pts = i64;
pub type amf_size = usize;

#[cfg(windows)]
pub type wchar_t = u16;
#[cfg(not(windows))]
pub type wchar_t = u32;

type Slot = *const c_void;

pub const AMF_VERSION_MAJOR: u64 = 1;
pub const AMF_VERSION_MINOR: u64 = 4;
pub const AMF_VERSION_RELEASE: u64 = 29;
pub const AMF_VERSION_BUILD_NUM: u64 = 0;
pub const AMF_FULL_VERSION: u64 = (AMF_VERSION_MAJOR << 48)
    | (AMF_VERSION_MINOR << 32)
    | (AMF_VERSION_RELEASE << 16)
    | AMF_VERSION_BUILD_NUM;

pub const AMF_INIT_FUNCTION_NAME: &[u8] = b"AMFInit\0";
pub const AMF_QUERY_VERSION_FUNCTION_NAME: &[u8] = b"AMFQueryVersion\0";

#[cfg(windows)]
pub const AMF_DLL_NAME: &str = "amfrt64.dll";
#[cfg(not(windows))]
pub const AMF_DLL_NAME: &str = "libamfrt64.so.1";

pub const AMF_TRACE_WRITER_CONSOLE: &str = "Console";
pub const AMF_TRACE_WRITER_DEBUG_OUTPUT: &str = "DebugOutput";

pub type AMFInit_Fn = unsafe extern "C" fn(version: u64, factory: *mut *mut AMFFactory) -> AMF_RESULT;
pub type AMFQueryVersion_Fn = unsafe extern "C" fn(version: *mut u64) -> AMF_RESULT;

// AMF_MEMORY_TYPE
pub const AMF_MEMORY_HOST: i32 = 1;
pub const AMF_MEMORY_DX11: i32 = 3;
pub const AMF_MEMORY_VULKAN: i32 = 10;

// AMF_DX_VERSION
pub const AMF_DX11_0: i32 = 110;
pub const AMF_DX11_1: i32 = 111;

// AMF_VARIANT_TYPE
pub const AMF_VARIANT_EMPTY: i32 = 0;
pub const AMF_VARIANT_BOOL: i32 = 1;
pub const AMF_VARIANT_INT64: i32 = 2;
pub const AMF_VARIANT_DOUBLE: i32 = 3;
pub const AMF_VARIANT_SIZE: i32 = 5;
pub const AMF_VARIANT_RATE: i32 = 7;
pub const AMF_VARIANT_STRING: i32 = 10;
pub const AMF_VARIANT_WSTRING: i32 = 11;
pub const AMF_VARIANT_INTERFACE: i32 = 12;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AMFGuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

pub const IID_AMFContext1: AMFGuid = AMFGuid {
    data1: 0xd9e9_f868,
    data2: 0x6220,
    data3: 0x44c6,
    data4: [0xa2, 0x2f, 0x7c, 0xd6, 0xda, 0xc6, 0x86, 0x46],
};

pub const IID_AMFBuffer: AMFGuid = AMFGuid {
    data1: 0xb04b_7248,
    data2: 0xb6f0,
    data3: 0x4321,
    data4: [0xb6, 0x91, 0xba, 0xa4, 0x74, 0x0f, 0x9f, 0xcb],
};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AMFSize {
    pub width: i32,
    pub height: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AMFRate {
    pub num: u32,
    pub den: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union AMFVariantValue {
    pub boolValue: amf_bool,
    pub int64Value: i64,
    pub doubleValue: f64,
    pub stringValue: *mut c_char,
    pub wstringValue: *mut wchar_t,
    pub pInterface: *mut AMFInterface,
    pub sizeValue: AMFSize,
    pub rateValue: AMFRate,
    pub raw: [u64; 2],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct AMFVariantStruct {
    pub type_: i32,
    pub value: AMFVariantValue,
}

impl AMFVariantStruct {
    pub fn empty() -> Self {
        AMFVariantStruct {
            type_: AMF_VARIANT_EMPTY,
            value: AMFVariantValue { raw: [0; 2] },
        }
    }
}

// ---------------------------------------------------------------------------
// Interfaces

macro_rules! interface {
    ($name:ident, $vtbl:ident) => {
        #[repr(C)]
        pub struct $name {
            pub pVtbl: *const $vtbl,
        }
    };
}

interface!(AMFInterface, AMFInterfaceVtbl);
interface!(AMFPropertyStorage, AMFPropertyStorageVtbl);
interface!(AMFData, AMFDataVtbl);
interface!(AMFBuffer, AMFBufferVtbl);
interface!(AMFSurface, AMFSurfaceVtbl);
interface!(AMFCaps, AMFPropertyStorageVtbl);
interface!(AMFComponent, AMFComponentVtbl);
interface!(AMFContext, AMFContextVtbl);
interface!(AMFContext1, AMFContext1Vtbl);
interface!(AMFTrace, AMFTraceVtbl);
interface!(AMFSurfaceObserver, AMFSurfaceObserverVtbl);

#[repr(C)]
pub struct AMFFactory {
    pub pVtbl: *const AMFFactoryVtbl,
}

#[repr(C)]
pub struct AMFInterfaceVtbl {
    pub Acquire: unsafe extern "system" fn(this: *mut c_void) -> c_long,
    pub Release: unsafe extern "system" fn(this: *mut c_void) -> c_long,
    pub QueryInterface: unsafe extern "system" fn(
        this: *mut c_void,
        iid: *const AMFGuid,
        out: *mut *mut c_void,
    ) -> AMF_RESULT,
}

#[repr(C)]
pub struct AMFPropertyStorageVtbl {
    pub base: AMFInterfaceVtbl,
    pub SetProperty: unsafe extern "system" fn(
        this: *mut c_void,
        name: *const wchar_t,
        value: AMFVariantStruct,
    ) -> AMF_RESULT,
    pub GetProperty: unsafe extern "system" fn(
        this: *mut c_void,
        name: *const wchar_t,
        value: *mut AMFVariantStruct,
    ) -> AMF_RESULT,
    pub HasProperty: Slot,
    pub GetPropertyCount: Slot,
    pub GetPropertyAt: Slot,
    pub Clear: Slot,
    pub AddTo: Slot,
    pub CopyTo: Slot,
    pub AddObserver: Slot,
    pub RemoveObserver: Slot,
}

#[repr(C)]
pub struct AMFDataVtbl {
    pub storage: AMFPropertyStorageVtbl,
    pub GetMemoryType: Slot,
    pub Duplicate: Slot,
    pub Convert: Slot,
    pub Interop: Slot,
    pub GetDataType: Slot,
    pub IsReusable: Slot,
    pub SetPts: unsafe extern "system" fn(this: *mut c_void, pts: amf_pts),
    pub GetPts: unsafe extern "system" fn(this: *mut c_void) -> amf_pts,
    pub SetDuration: Slot,
    pub GetDuration: Slot,
}

#[repr(C)]
pub struct AMFBufferVtbl {
    pub data: AMFDataVtbl,
    pub SetSize: Slot,
    pub GetSize: unsafe extern "system" fn(this: *mut c_void) -> amf_size,
    pub GetNative: unsafe extern "system" fn(this: *mut c_void) -> *mut c_void,
    pub AddObserver_Buffer: Slot,
    pub RemoveObserver_Buffer: Slot,
}

#[repr(C)]
pub struct AMFSurfaceVtbl {
    pub data: AMFDataVtbl,
    pub GetFormat: Slot,
    pub GetPlanesCount: Slot,
    pub GetPlaneAt: Slot,
    pub GetPlane: Slot,
    pub GetFrameType: Slot,
    pub SetFrameType: Slot,
    pub SetCrop: Slot,
    pub CopySurfaceRegion: Slot,
    pub AddObserver_Surface: Slot,
    pub RemoveObserver_Surface: Slot,
}

#[repr(C)]
pub struct AMFComponentVtbl {
    pub storage: AMFPropertyStorageVtbl,
    pub GetPropertiesInfoCount: Slot,
    pub GetPropertyInfoAt: Slot,
    pub GetPropertyInfo: Slot,
    pub ValidateProperty: Slot,
    pub Init: unsafe extern "system" fn(
        this: *mut c_void,
        format: i32,
        width: i32,
        height: i32,
    ) -> AMF_RESULT,
    pub ReInit: unsafe extern "system" fn(this: *mut c_void, width: i32, height: i32) -> AMF_RESULT,
    pub Terminate: unsafe extern "system" fn(this: *mut c_void) -> AMF_RESULT,
    pub Drain: Slot,
    pub Flush: Slot,
    pub SubmitInput: unsafe extern "system" fn(this: *mut c_void, data: *mut AMFData) -> AMF_RESULT,
    pub QueryOutput: unsafe extern "system" fn(this: *mut c_void, data: *mut *mut AMFData) -> AMF_RESULT,
    pub GetContext: Slot,
    pub SetOutputDataAllocatorCB: Slot,
    pub GetCaps: unsafe extern "system" fn(this: *mut c_void, caps: *mut *mut AMFCaps) -> AMF_RESULT,
    pub Optimize: Slot,
}

#[repr(C)]
pub struct AMFContextVtbl {
    pub storage: AMFPropertyStorageVtbl,
    pub Terminate: unsafe extern "system" fn(this: *mut c_void) -> AMF_RESULT,
    pub InitDX9: Slot,
    pub GetDX9Device: Slot,
    pub LockDX9: Slot,
    pub UnlockDX9: Slot,
    pub InitDX11: unsafe extern "system" fn(
        this: *mut c_void,
        device: *mut c_void,
        version: i32,
    ) -> AMF_RESULT,
    pub GetDX11Device: Slot,
    pub LockDX11: Slot,
    pub UnlockDX11: Slot,
    pub InitOpenCL: Slot,
    pub GetOpenCLContext: Slot,
    pub GetOpenCLCommandQueue: Slot,
    pub GetOpenCLDeviceID: Slot,
    pub GetOpenCLComputeFactory: Slot,
    pub InitOpenCLEx: Slot,
    pub LockOpenCL: Slot,
    pub UnlockOpenCL: Slot,
    pub InitOpenGL: Slot,
    pub GetOpenGLContext: Slot,
    pub GetOpenGLDrawable: Slot,
    pub LockOpenGL: Slot,
    pub UnlockOpenGL: Slot,
    pub InitXV: Slot,
    pub GetXVDevice: Slot,
    pub LockXV: Slot,
    pub UnlockXV: Slot,
    pub InitGralloc: Slot,
    pub GetGrallocDevice: Slot,
    pub LockGralloc: Slot,
    pub UnlockGralloc: Slot,
    pub AllocBuffer: unsafe extern "system" fn(
        this: *mut c_void,
        memory: i32,
        size: amf_size,
        out: *mut *mut AMFBuffer,
    ) -> AMF_RESULT,
    pub AllocSurface: Slot,
    pub AllocAudioBuffer: Slot,
    pub CreateBufferFromHostNative: Slot,
    pub CreateSurfaceFromHostNative: unsafe extern "system" fn(
        this: *mut c_void,
        format: i32,
        width: i32,
        height: i32,
        h_pitch: i32,
        v_pitch: i32,
        data: *mut c_void,
        out: *mut *mut AMFSurface,
        observer: *mut AMFSurfaceObserver,
    ) -> AMF_RESULT,
    pub CreateSurfaceFromDX9Native: Slot,
    pub CreateSurfaceFromDX11Native: unsafe extern "system" fn(
        this: *mut c_void,
        texture: *mut c_void,
        out: *mut *mut AMFSurface,
        observer: *mut AMFSurfaceObserver,
    ) -> AMF_RESULT,
    pub CreateSurfaceFromOpenGLNative: Slot,
    pub CreateSurfaceFromGrallocNative: Slot,
    pub CreateSurfaceFromOpenCLNative: Slot,
    pub CreateBufferFromOpenCLNative: Slot,
    pub GetCompute: Slot,
}

#[repr(C)]
pub struct AMFContext1Vtbl {
    pub context: AMFContextVtbl,
    pub CreateBufferFromDX11Native: Slot,
    pub AllocBufferEx: Slot,
    pub AllocSurfaceEx: Slot,
    pub InitVulkan: unsafe extern "system" fn(this: *mut c_void, device: *mut c_void) -> AMF_RESULT,
    pub GetVulkanDevice: Slot,
    pub LockVulkan: Slot,
    pub UnlockVulkan: Slot,
    pub CreateSurfaceFromVulkanNative: unsafe extern "system" fn(
        this: *mut c_void,
        image: *mut c_void,
        out: *mut *mut AMFSurface,
        observer: *mut AMFSurfaceObserver,
    ) -> AMF_RESULT,
    pub CreateBufferFromVulkanNative: Slot,
    pub GetVulkanDeviceExtensions: unsafe extern "system" fn(
        this: *mut c_void,
        count: *mut amf_size,
        names: *mut *const c_char,
    ) -> AMF_RESULT,
}

#[repr(C)]
pub struct AMFFactoryVtbl {
    pub CreateContext: unsafe extern "system" fn(this: *mut AMFFactory, out: *mut *mut AMFContext) -> AMF_RESULT,
    pub CreateComponent: unsafe extern "system" fn(
        this: *mut AMFFactory,
        context: *mut AMFContext,
        id: *const wchar_t,
        out: *mut *mut AMFComponent,
    ) -> AMF_RESULT,
    pub SetCacheFolder: Slot,
    pub GetCacheFolder: Slot,
    pub GetDebug: Slot,
    pub GetTrace: unsafe extern "system" fn(this: *mut AMFFactory, out: *mut *mut AMFTrace) -> AMF_RESULT,
    pub GetPrograms: Slot,
}

#[repr(C)]
pub struct AMFTraceVtbl {
    pub TraceW: Slot,
    pub Trace: Slot,
    pub SetGlobalLevel: Slot,
    pub GetGlobalLevel: Slot,
    pub EnableWriter: unsafe extern "system" fn(
        this: *mut AMFTrace,
        writer: *const wchar_t,
        enable: amf_bool,
    ) -> amf_bool,
    pub WriterEnabled: Slot,
    pub TraceEnableAsync: Slot,
    pub TraceFlush: unsafe extern "system" fn(this: *mut AMFTrace) -> AMF_RESULT,
    pub SetPath: Slot,
    pub GetPath: Slot,
    pub SetWriterLevel: Slot,
    pub GetWriterLevel: Slot,
    pub SetWriterLevelForScope: Slot,
    pub GetWriterLevelForScope: Slot,
    pub GetIndentation: Slot,
    pub Indent: Slot,
    pub RegisterWriter: Slot,
    pub UnregisterWriter: Slot,
    pub GetResultText: unsafe extern "system" fn(this: *mut AMFTrace, res: AMF_RESULT) -> *const wchar_t,
}

#[repr(C)]
pub struct AMFSurfaceObserverVtbl {
    pub OnSurfaceDataRelease: unsafe extern "system" fn(this: *mut AMFSurfaceObserver, surface: *mut AMFSurface),
}

// ---------------------------------------------------------------------------
// Vulkan surface description handed to CreateSurfaceFromVulkanNative

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AMFVulkanSync {
    pub cbSizeof: amf_size,
    pub pNext: *mut c_void,
    pub hSemaphore: u64,
    pub bSubmitted: amf_bool,
    pub hFence: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AMFVulkanSurface {
    pub cbSizeof: amf_size,
    pub pNext: *mut c_void,
    pub hImage: u64,
    pub eUsage: u32,
    pub eAccess: u32,
    pub hMemory: u64,
    pub iSize: i64,
    pub eFormat: u32,
    pub iWidth: i32,
    pub iHeight: i32,
    pub eCurrentLayout: u32,
    pub Sync: AMFVulkanSync,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AMFVulkanDevice {
    pub cbSizeof: amf_size,
    pub pNext: *mut c_void,
    pub hInstance: *mut c_void,
    pub hPhysicalDevice: *mut c_void,
    pub hDevice: *mut c_void,
}

pub const AMF_SURFACE_USAGE_DEFAULT: u32 = 0x8000_0000;
pub const AMF_MEMORY_CPU_LOCAL: u32 = 4;
