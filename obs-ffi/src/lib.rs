//! OBS FFI - C Foreign Function Interface
//!
//! C-compatible API over the AMF encoder for the OBS plugin glue.
//! Boolean results report success; failures are logged through the `log`
//! facade, which the host connects to its own logger.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::Arc;

use obs_amf::{
    AmfEncoder, AmfRuntime, CapsTable, Codec, EncodedPacket, EncoderConfig, EncoderSettings, FrameEncoder,
    FrameInput, GlPlane, GraphicsScope, PlaneFormat, TextureInput,
};
use obs_video::{plane_len, RawFrame, VideoOutputInfo};

/// Opaque handle to the loaded AMF runtime (C-compatible)
pub struct OBSAmfRuntime {
    _private: [u8; 0],
}

/// Opaque handle to a capability table (C-compatible)
pub struct OBSAmfCaps {
    _private: [u8; 0],
}

/// Opaque handle to an encoder (C-compatible)
pub struct OBSAmfEncoder {
    _private: [u8; 0],
}

/// C-compatible encoder creation parameters
#[repr(C)]
pub struct CEncoderConfig {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub format: u32,
    pub colorspace: u32,
    pub range: u32,
    pub adapter: u32,
    pub scaling: bool,
    pub nv12_textures: bool,
    pub p010_textures: bool,
    pub hdr_nominal_peak: u32,
}

/// C-compatible encoder settings; null strings select the defaults
#[repr(C)]
pub struct CEncoderSettings {
    pub bitrate: i64,
    pub cqp: i64,
    pub rate_control: *const c_char,
    pub preset: *const c_char,
    pub profile: *const c_char,
    pub keyint_sec: u32,
    pub bframes: u32,
    pub repeat_headers: bool,
    pub options: *const c_char,
}

/// Renderer graphics context callbacks, used on Linux to make the GL context current
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CGraphicsScope {
    pub enter: Option<unsafe extern "C" fn(*mut c_void)>,
    pub leave: Option<unsafe extern "C" fn(*mut c_void)>,
    pub user_data: *mut c_void,
}

/// C-compatible GL plane description
#[repr(C)]
pub struct CGlPlane {
    pub texture: u32,
    pub width: u32,
    pub height: u32,
    /// 0 = R8, 1 = R16, 2 = RG8, 3 = RG16
    pub format: u32,
}

/// C-compatible encoded packet; `data` stays valid until the next encode call
#[repr(C)]
pub struct CPacket {
    pub data: *const u8,
    pub size: usize,
    pub pts: i64,
    pub dts: i64,
    pub priority: u32,
    pub keyframe: bool,
}

struct HostGraphics(CGraphicsScope);

// The host's enter/leave pair is callable from any thread.
unsafe impl Send for HostGraphics {}
unsafe impl Sync for HostGraphics {}

impl GraphicsScope for HostGraphics {
    fn enter(&self) {
        if let Some(enter) = self.0.enter {
            unsafe { enter(self.0.user_data) };
        }
    }

    fn leave(&self) {
        if let Some(leave) = self.0.leave {
            unsafe { leave(self.0.user_data) };
        }
    }
}

unsafe fn opt_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            log::warn!("ignoring non UTF-8 string argument");
            None
        }
    }
}

fn parse_or_default<T: std::str::FromStr + Default>(value: Option<&str>) -> T
where
    T::Err: std::fmt::Display,
{
    match value.map(str::parse::<T>) {
        Some(Ok(parsed)) => parsed,
        Some(Err(err)) => {
            log::warn!("{}, using the default", err);
            T::default()
        }
        None => T::default(),
    }
}

unsafe fn settings_from_c(settings: &CEncoderSettings) -> EncoderSettings {
    EncoderSettings {
        bitrate: settings.bitrate,
        cqp: settings.cqp,
        rate_control: parse_or_default(opt_str(settings.rate_control)),
        preset: parse_or_default(opt_str(settings.preset)),
        profile: parse_or_default(opt_str(settings.profile)),
        keyint_sec: settings.keyint_sec,
        bframes: settings.bframes,
        repeat_headers: settings.repeat_headers,
        options: opt_str(settings.options).unwrap_or_default().to_owned(),
    }
}

fn config_from_c(codec: Codec, config: &CEncoderConfig, name: &str) -> EncoderConfig {
    let info = VideoOutputInfo {
        width: config.width,
        height: config.height,
        fps_num: config.fps_num,
        fps_den: config.fps_den,
        format: config.format,
        colorspace: config.colorspace,
        range: config.range,
    };
    EncoderConfig {
        adapter: config.adapter as usize,
        scaling: config.scaling,
        nv12_textures: config.nv12_textures,
        p010_textures: config.p010_textures,
        hdr_nominal_peak: config.hdr_nominal_peak,
        ..EncoderConfig::from_output(codec, &info, name)
    }
}

fn plane_from_c(plane: &CGlPlane) -> Option<GlPlane> {
    let format = match plane.format {
        0 => PlaneFormat::R8,
        1 => PlaneFormat::R16,
        2 => PlaneFormat::Rg8,
        3 => PlaneFormat::Rg16,
        _ => return None,
    };
    Some(GlPlane {
        texture: plane.texture,
        width: plane.width,
        height: plane.height,
        format,
    })
}

/// Run one encode and copy the packet, if any, into `packet_out`
unsafe fn encode_into(
    ptr: *mut OBSAmfEncoder,
    input: FrameInput<'_>,
    pts: i64,
    packet_out: *mut CPacket,
    received: *mut bool,
) -> bool {
    let encoder = &mut *(ptr as *mut AmfEncoder);
    *received = false;

    match encoder.encode(input, pts) {
        Ok(Some(EncodedPacket {
            data,
            pts,
            dts,
            priority,
            keyframe,
        })) => {
            *packet_out = CPacket {
                data: data.as_ptr(),
                size: data.len(),
                pts,
                dts,
                priority: priority as u32,
                keyframe,
            };
            *received = true;
            true
        }
        Ok(None) => true,
        Err(err) => {
            log::error!("{}", err);
            false
        }
    }
}

// ============================================================================
// RUNTIME API
// ============================================================================

/// Load the AMF runtime; null when it is not installed
///
/// # Safety
/// Safe to call.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_runtime_load() -> *mut OBSAmfRuntime {
    match AmfRuntime::load() {
        Ok(runtime) => Box::into_raw(Box::new(runtime)) as *mut OBSAmfRuntime,
        Err(err) => {
            log::warn!("AMF runtime unavailable: {}", err);
            ptr::null_mut()
        }
    }
}

/// Release the caller's reference to the runtime
///
/// Encoders created from it keep the runtime loaded until they are destroyed.
///
/// # Safety
/// Caller must ensure ptr is valid and not already freed.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_runtime_destroy(ptr: *mut OBSAmfRuntime) {
    if !ptr.is_null() {
        let _ = Box::from_raw(ptr as *mut Arc<AmfRuntime>);
    }
}

// ============================================================================
// CAPABILITY API
// ============================================================================

/// Parse the probe output
///
/// # Safety
/// text must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_caps_parse(text: *const c_char) -> *mut OBSAmfCaps {
    let Some(text) = opt_str(text) else {
        return ptr::null_mut();
    };
    match CapsTable::parse(text) {
        Ok(caps) => Box::into_raw(Box::new(caps)) as *mut OBSAmfCaps,
        Err(err) => {
            log::warn!("{}", err);
            ptr::null_mut()
        }
    }
}

/// Destroy a capability table
///
/// # Safety
/// Caller must ensure ptr is valid and not already freed.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_caps_destroy(ptr: *mut OBSAmfCaps) {
    if !ptr.is_null() {
        let _ = Box::from_raw(ptr as *mut CapsTable);
    }
}

/// Whether `codec` (0 = AVC, 1 = HEVC, 2 = AV1) can be encoded on adapter `adapter`
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_caps_supports(ptr: *const OBSAmfCaps, adapter: u32, codec: u32) -> bool {
    if ptr.is_null() {
        return false;
    }
    let caps = &*(ptr as *const CapsTable);
    Codec::from_raw(codec).is_some_and(|codec| caps.supports(adapter as usize, codec))
}

// ============================================================================
// ENCODER API
// ============================================================================

/// Create an encoder, on the texture path when possible
///
/// `graphics` may be null; without it Linux encoders use the fallback path.
///
/// # Safety
/// Caller must ensure every non-null pointer is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_encoder_create(
    runtime: *const OBSAmfRuntime,
    caps: *const OBSAmfCaps,
    codec: u32,
    config: *const CEncoderConfig,
    settings: *const CEncoderSettings,
    graphics: *const CGraphicsScope,
    name: *const c_char,
) -> *mut OBSAmfEncoder {
    if runtime.is_null() || caps.is_null() || config.is_null() || settings.is_null() {
        return ptr::null_mut();
    }
    let Some(codec) = Codec::from_raw(codec) else {
        log::error!("unknown codec {}", codec);
        return ptr::null_mut();
    };

    let runtime = &*(runtime as *const Arc<AmfRuntime>);
    let caps = &*(caps as *const CapsTable);
    let config = config_from_c(codec, &*config, opt_str(name).unwrap_or("amf"));
    let settings = settings_from_c(&*settings);

    #[cfg(any(windows, target_os = "linux"))]
    let result = {
        let scope = (!graphics.is_null()).then(|| Arc::new(HostGraphics(*graphics)) as Arc<dyn GraphicsScope>);
        AmfEncoder::create(runtime, &config, &settings, caps, scope)
    };
    #[cfg(not(any(windows, target_os = "linux")))]
    let result = {
        let _ = graphics;
        AmfEncoder::create(runtime, &config, &settings, caps)
    };

    // creation failures are already logged with the encoder label
    match result {
        Ok(encoder) => Box::into_raw(Box::new(encoder)) as *mut OBSAmfEncoder,
        Err(_) => ptr::null_mut(),
    }
}

/// Destroy an encoder, waiting for the device to finish with its surfaces
///
/// # Safety
/// Caller must ensure ptr is valid and not already freed.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_encoder_destroy(ptr: *mut OBSAmfEncoder) {
    if !ptr.is_null() {
        let _ = Box::from_raw(ptr as *mut AmfEncoder);
    }
}

/// Encode a shared texture guarded by a keyed mutex
///
/// `next_key` is read as the key to release the mutex with and may be
/// rewritten.
///
/// # Safety
/// Caller must ensure every pointer is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_encoder_encode_texture(
    ptr: *mut OBSAmfEncoder,
    handle: u32,
    pts: i64,
    lock_key: u64,
    next_key: *mut u64,
    packet_out: *mut CPacket,
    received: *mut bool,
) -> bool {
    if ptr.is_null() || next_key.is_null() || packet_out.is_null() || received.is_null() {
        return false;
    }
    let input = TextureInput::Shared {
        handle,
        lock_key,
        next_key: &mut *next_key,
    };
    encode_into(ptr, FrameInput::Texture(input), pts, packet_out, received)
}

/// Encode a two-plane GL texture frame
///
/// # Safety
/// Caller must ensure every pointer is valid and planes holds two entries.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_encoder_encode_planes(
    ptr: *mut OBSAmfEncoder,
    planes: *const CGlPlane,
    pts: i64,
    packet_out: *mut CPacket,
    received: *mut bool,
) -> bool {
    if ptr.is_null() || planes.is_null() || packet_out.is_null() || received.is_null() {
        return false;
    }
    let planes = std::slice::from_raw_parts(planes, 2);
    let (Some(luma), Some(chroma)) = (plane_from_c(&planes[0]), plane_from_c(&planes[1])) else {
        log::error!("unknown plane format");
        return false;
    };
    encode_into(
        ptr,
        FrameInput::Texture(TextureInput::Planes([luma, chroma])),
        pts,
        packet_out,
        received,
    )
}

/// Encode a CPU frame in the encoder's input format
///
/// # Safety
/// Caller must ensure every pointer is valid and each plane spans its
/// linesize times its rows.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_encoder_encode_frame(
    ptr: *mut OBSAmfEncoder,
    data: *const *const u8,
    linesize: *const u32,
    width: u32,
    height: u32,
    pts: i64,
    packet_out: *mut CPacket,
    received: *mut bool,
) -> bool {
    if ptr.is_null() || data.is_null() || linesize.is_null() || packet_out.is_null() || received.is_null() {
        return false;
    }
    let format = (*(ptr as *const AmfEncoder)).input_format();
    let data = std::slice::from_raw_parts(data, 4);
    let linesize = std::slice::from_raw_parts(linesize, 4);

    let planes: Vec<(&[u8], u32)> = (0..2)
        .map(|plane| {
            let len = plane_len(format, plane, linesize[plane], height);
            if len == 0 || data[plane].is_null() {
                (&[][..], linesize[plane])
            } else {
                (std::slice::from_raw_parts(data[plane], len), linesize[plane])
            }
        })
        .collect();
    let frame = RawFrame::new(width, height, &planes);

    encode_into(ptr, FrameInput::Raw(&frame), pts, packet_out, received)
}

/// Borrow the codec header
///
/// # Safety
/// Caller must ensure every pointer is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_encoder_extra_data(
    ptr: *const OBSAmfEncoder,
    data_out: *mut *const u8,
    size_out: *mut usize,
) -> bool {
    if ptr.is_null() || data_out.is_null() || size_out.is_null() {
        return false;
    }
    let encoder = &*(ptr as *const AmfEncoder);
    match encoder.extra_data() {
        Some(header) => {
            *data_out = header.as_ptr();
            *size_out = header.len();
            true
        }
        None => false,
    }
}

/// Apply new bitrate or quality settings
///
/// # Safety
/// Caller must ensure every pointer is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_encoder_update(ptr: *mut OBSAmfEncoder, settings: *const CEncoderSettings) -> bool {
    if ptr.is_null() || settings.is_null() {
        return false;
    }
    let encoder = &mut *(ptr as *mut AmfEncoder);
    match encoder.update(&settings_from_c(&*settings)) {
        Ok(()) => true,
        Err(err) => {
            log::error!("{}", err);
            false
        }
    }
}

/// Whether the encoder runs on the CPU-buffer path
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_amf_encoder_is_fallback(ptr: *const OBSAmfEncoder) -> bool {
    if ptr.is_null() {
        return false;
    }
    (*(ptr as *const AmfEncoder)).is_fallback()
}

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

/// Get library version string
///
/// # Safety
/// Returns a static string, safe to call.
#[no_mangle]
pub extern "C" fn obs_amf_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_amf::{Preset, RateControl};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn test_caps_ffi() {
        let ini = c"[0]\nis_amd=true\nsupports_avc=true\nsupports_hevc=false\nsupports_av1=true\n";
        unsafe {
            let caps = obs_amf_caps_parse(ini.as_ptr());
            assert!(!caps.is_null());

            assert!(obs_amf_caps_supports(caps, 0, 0));
            assert!(!obs_amf_caps_supports(caps, 0, 1));
            assert!(obs_amf_caps_supports(caps, 0, 2));
            assert!(!obs_amf_caps_supports(caps, 1, 0));
            assert!(!obs_amf_caps_supports(caps, 0, 7));

            obs_amf_caps_destroy(caps);
        }
    }

    #[test]
    fn test_caps_error_section() {
        unsafe {
            let caps = obs_amf_caps_parse(c"[error]\nstring=Failed to load AMF lib\n".as_ptr());
            assert!(caps.is_null());
            assert!(obs_amf_caps_parse(ptr::null()).is_null());
        }
    }

    #[test]
    fn test_settings_conversion() {
        let settings = CEncoderSettings {
            bitrate: 6000,
            cqp: 22,
            rate_control: c"VBR".as_ptr(),
            preset: c"no_such_preset".as_ptr(),
            profile: ptr::null(),
            keyint_sec: 2,
            bframes: 2,
            repeat_headers: true,
            options: c"EnforceHRD=false".as_ptr(),
        };

        let parsed = unsafe { settings_from_c(&settings) };
        assert_eq!(parsed.bitrate, 6000);
        assert_eq!(parsed.rate_control, RateControl::Vbr);
        assert_eq!(parsed.preset, Preset::default());
        assert_eq!(parsed.profile, EncoderSettings::default().profile);
        assert_eq!(parsed.options, "EnforceHRD=false");
    }

    #[test]
    fn test_config_conversion() {
        let config = CEncoderConfig {
            width: 2560,
            height: 1440,
            fps_num: 30000,
            fps_den: 1001,
            format: obs_video::VideoFormat::P010 as u32,
            colorspace: obs_video::ColorSpace::CS2100PQ as u32,
            range: obs_video::ColorRange::Partial as u32,
            adapter: 1,
            scaling: false,
            nv12_textures: true,
            p010_textures: true,
            hdr_nominal_peak: 800,
        };

        let parsed = config_from_c(Codec::Hevc, &config, "stream");
        assert_eq!(parsed.format, obs_video::VideoFormat::P010);
        assert_eq!(parsed.frame_rate, obs_video::FrameRate::new(30000, 1001));
        assert_eq!(parsed.adapter, 1);
        assert_eq!(parsed.hdr_nominal_peak, 800);
        assert_eq!(parsed.label(false), "texture-amf-h265: 'stream'");
    }

    #[test]
    fn test_plane_conversion() {
        let plane = CGlPlane {
            texture: 3,
            width: 1280,
            height: 720,
            format: 1,
        };
        assert_eq!(plane_from_c(&plane).map(|p| p.format), Some(PlaneFormat::R16));
        assert!(plane_from_c(&CGlPlane { format: 9, ..plane }).is_none());
    }

    static DEPTH: AtomicI32 = AtomicI32::new(0);

    unsafe extern "C" fn enter(_: *mut c_void) {
        DEPTH.fetch_add(1, Ordering::SeqCst);
    }

    unsafe extern "C" fn leave(_: *mut c_void) {
        DEPTH.fetch_sub(1, Ordering::SeqCst);
    }

    #[test]
    fn test_host_graphics_callbacks() {
        let graphics = HostGraphics(CGraphicsScope {
            enter: Some(enter),
            leave: Some(leave),
            user_data: ptr::null_mut(),
        });
        graphics.enter();
        assert_eq!(DEPTH.load(Ordering::SeqCst), 1);
        graphics.leave();
        assert_eq!(DEPTH.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_null_handles() {
        unsafe {
            let mut next_key = 0;
            let mut received = true;
            let mut packet = CPacket {
                data: ptr::null(),
                size: 0,
                pts: 0,
                dts: 0,
                priority: 0,
                keyframe: false,
            };
            assert!(!obs_amf_encoder_encode_texture(
                ptr::null_mut(),
                1,
                0,
                0,
                &mut next_key,
                &mut packet,
                &mut received
            ));
            assert!(!obs_amf_encoder_is_fallback(ptr::null()));
            assert!(!obs_amf_caps_supports(ptr::null(), 0, 0));
            obs_amf_encoder_destroy(ptr::null_mut());
            obs_amf_runtime_destroy(ptr::null_mut());
        }
    }

    #[test]
    fn test_version() {
        unsafe {
            let version = obs_amf_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, "0.1.0");
        }
    }
}
