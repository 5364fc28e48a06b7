//! Encoder creation and the common frame interface
//!
//! Creation tries the texture path first. Any refusal or failure there is
//! logged and the encoder is rebuilt on the CPU-buffer path instead; the
//! choice is fixed for the encoder's lifetime.

use crate::backend::EncoderComponent;
use crate::caps::CapsTable;
use crate::codec::{Codec, SurfaceFormat};
use crate::color::ColorTags;
use crate::error::{Error, Result};
use crate::fallback::{check_fallback_support, FallbackEncoder, HostSurfaces, NativeHostSurfaces};
use crate::interop::{TextureBridge, TextureInput};
use crate::packet::EncodedPacket;
use crate::runtime::{AmfRuntime, Component, Context, ReleaseObserver};
use crate::session::{Session, SessionConfig};
use crate::settings::EncoderSettings;
use crate::texture::TextureEncoder;
use obs_video::{ColorRange, ColorSpace, FrameRate, RawFrame, SurfacePool, VideoFormat, VideoOutputInfo};
use std::sync::Arc;

#[cfg(any(windows, target_os = "linux"))]
use crate::interop::GraphicsScope;
#[cfg(windows)]
use crate::interop::d3d11::{self, D3D11Bridge};
#[cfg(target_os = "linux")]
use crate::interop::vulkan::VulkanBridge;

#[cfg(windows)]
type PlatformBridge = D3D11Bridge;
#[cfg(target_os = "linux")]
type PlatformBridge = VulkanBridge;

/// What the host knows about the stream and its renderer at creation
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Format of the host's video output
    pub format: VideoFormat,
    pub space: ColorSpace,
    pub range: ColorRange,
    /// Index of the adapter the renderer runs on
    pub adapter: usize,
    /// The host rescales frames for this encoder
    pub scaling: bool,
    pub nv12_textures: bool,
    pub p010_textures: bool,
    /// Nominal peak luminance of PQ content, in nits
    pub hdr_nominal_peak: u32,
    /// Encoder instance name, used in log prefixes
    pub name: String,
}

impl EncoderConfig {
    pub fn from_output(codec: Codec, info: &VideoOutputInfo, name: impl Into<String>) -> Self {
        EncoderConfig {
            codec,
            width: info.width,
            height: info.height,
            frame_rate: info.frame_rate(),
            format: info.video_format(),
            space: info.color_space(),
            range: info.color_range(),
            adapter: 0,
            scaling: false,
            nv12_textures: false,
            p010_textures: false,
            hdr_nominal_peak: 1000,
            name: name.into(),
        }
    }

    pub fn label(&self, fallback: bool) -> String {
        format!("{}: '{}'", self.codec.label(fallback), self.name)
    }

    fn session_config(&self, format: SurfaceFormat, fallback: bool) -> SessionConfig {
        SessionConfig {
            codec: self.codec,
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            format,
            color: ColorTags::new(self.space, self.range),
            hdr_nominal_peak: self.hdr_nominal_peak,
            label: self.label(fallback),
        }
    }
}

/// Refuse the texture path when the renderer cannot feed it
pub fn check_texture_capability(config: &EncoderConfig, caps: &CapsTable) -> Result<()> {
    if config.scaling {
        return Err(Error::Unsupported("Encoder scaling is active"));
    }

    match config.codec {
        Codec::Hevc | Codec::Av1 if !config.nv12_textures && !config.p010_textures => {
            return Err(Error::Unsupported("NV12/P010 textures aren't active"));
        }
        Codec::Avc if !config.nv12_textures => {
            return Err(Error::Unsupported("NV12 textures aren't active"));
        }
        _ => {}
    }

    if !config.format.is_ten_bit() && config.space.is_hdr() {
        return Err(Error::Unsupported("OBS does not support 8-bit output of Rec. 2100"));
    }

    if !caps.supports(config.adapter, config.codec) {
        return Err(Error::Unsupported("Wrong adapter"));
    }
    Ok(())
}

/// One frame as handed over by the host
#[derive(Debug)]
pub enum FrameInput<'a> {
    Texture(TextureInput<'a>),
    Raw(&'a RawFrame<'a>),
}

/// Common interface of both encode paths
pub trait FrameEncoder {
    /// Submit one frame and return at most one packet
    ///
    /// The packet borrows the encoder until the next call.
    fn encode(&mut self, input: FrameInput<'_>, pts: i64) -> Result<Option<EncodedPacket<'_>>>;

    fn update(&mut self, settings: &EncoderSettings) -> Result<()>;

    /// Codec header, available once the encoder is initialized
    fn extra_data(&self) -> Option<&[u8]>;

    /// Format frames must be in; texture paths report the host format
    fn input_format(&self) -> VideoFormat;

    fn is_fallback(&self) -> bool;
}

impl<C, B> FrameEncoder for TextureEncoder<C, B>
where
    C: EncoderComponent,
    B: TextureBridge<Surface = C::Surface>,
{
    fn encode(&mut self, input: FrameInput<'_>, pts: i64) -> Result<Option<EncodedPacket<'_>>> {
        match input {
            FrameInput::Texture(texture) => TextureEncoder::encode(self, texture, pts),
            FrameInput::Raw(_) => Err(Error::BadFrame("Encode failed: expected a texture")),
        }
    }

    fn update(&mut self, settings: &EncoderSettings) -> Result<()> {
        TextureEncoder::update(self, settings)
    }

    fn extra_data(&self) -> Option<&[u8]> {
        TextureEncoder::extra_data(self)
    }

    fn input_format(&self) -> VideoFormat {
        self.session().config().format.video_format()
    }

    fn is_fallback(&self) -> bool {
        false
    }
}

impl<C, H> FrameEncoder for FallbackEncoder<C, H>
where
    C: EncoderComponent,
    H: HostSurfaces<Surface = C::Surface>,
{
    fn encode(&mut self, input: FrameInput<'_>, pts: i64) -> Result<Option<EncodedPacket<'_>>> {
        match input {
            FrameInput::Raw(frame) => FallbackEncoder::encode(self, frame, pts),
            FrameInput::Texture(TextureInput::Shared { lock_key, next_key, .. }) => {
                *next_key = lock_key;
                Err(Error::BadFrame("Encode failed: expected a CPU frame"))
            }
            FrameInput::Texture(TextureInput::Planes(_)) => {
                Err(Error::BadFrame("Encode failed: expected a CPU frame"))
            }
        }
    }

    fn update(&mut self, settings: &EncoderSettings) -> Result<()> {
        FallbackEncoder::update(self, settings)
    }

    fn extra_data(&self) -> Option<&[u8]> {
        FallbackEncoder::extra_data(self)
    }

    fn input_format(&self) -> VideoFormat {
        self.session().config().format.video_format()
    }

    fn is_fallback(&self) -> bool {
        true
    }
}

/// Encoder on the AMF runtime, on whichever path creation settled on
pub enum AmfEncoder {
    #[cfg(any(windows, target_os = "linux"))]
    Texture(TextureEncoder<Component, PlatformBridge>),
    Fallback(FallbackEncoder<Component, NativeHostSurfaces>),
}

impl AmfEncoder {
    /// Create an encoder, preferring the texture path
    ///
    /// `graphics` gives access to the renderer's GL context; without it the
    /// Linux texture path is unavailable.
    #[cfg_attr(not(any(windows, target_os = "linux")), allow(unused_variables))]
    pub fn create(
        runtime: &Arc<AmfRuntime>,
        config: &EncoderConfig,
        settings: &EncoderSettings,
        caps: &CapsTable,
        #[cfg(any(windows, target_os = "linux"))] graphics: Option<Arc<dyn GraphicsScope>>,
    ) -> Result<Self> {
        if !config.frame_rate.is_valid() {
            return Err(Error::Unsupported("Invalid frame rate"));
        }

        #[cfg(any(windows, target_os = "linux"))]
        match Self::create_texture(runtime, config, settings, caps, graphics) {
            Ok(encoder) => return Ok(encoder),
            Err(err) => log::error!("[{}] {}", config.label(false), describe(runtime, &err)),
        }
        Self::create_fallback(runtime, config, settings)
    }

    #[cfg(any(windows, target_os = "linux"))]
    #[cfg_attr(windows, allow(unused_variables))]
    fn create_texture(
        runtime: &Arc<AmfRuntime>,
        config: &EncoderConfig,
        settings: &EncoderSettings,
        caps: &CapsTable,
        graphics: Option<Arc<dyn GraphicsScope>>,
    ) -> Result<Self> {
        check_texture_capability(config, caps)?;
        let format = match SurfaceFormat::from_video(config.format) {
            Some(format @ (SurfaceFormat::Nv12 | SurfaceFormat::P010)) => format,
            _ => return Err(Error::Unsupported("Unsupported texture format")),
        };

        let pool: Arc<SurfacePool<<PlatformBridge as TextureBridge>::Target>> = Arc::new(SurfacePool::new());
        let observer = ReleaseObserver::new(pool.clone());

        #[cfg(windows)]
        let (context, bridge) = {
            let device = d3d11::create_device(config.adapter as u32)?;
            let context = runtime.create_context()?;
            let bridge = D3D11Bridge::new(device, context.clone(), observer)?;
            (context, bridge)
        };
        #[cfg(target_os = "linux")]
        let (context, bridge) = {
            let graphics = graphics.ok_or(Error::Unsupported("No graphics context for texture sharing"))?;
            let context = runtime.create_context()?;
            let bridge = VulkanBridge::new(context.clone(), observer, graphics, format)?;
            (context, bridge)
        };

        let session = Self::session(runtime, &context, config, settings, format, false)?;
        Ok(AmfEncoder::Texture(TextureEncoder::new(session, bridge, pool)))
    }

    fn create_fallback(runtime: &Arc<AmfRuntime>, config: &EncoderConfig, settings: &EncoderSettings) -> Result<Self> {
        let label = config.label(true);
        let result = (|| {
            check_fallback_support(config.codec, config.format, config.space)?;
            let input = config.codec.fallback_format(config.format);
            let format = SurfaceFormat::from_video(input).ok_or(Error::Unsupported("Unsupported input format"))?;

            let context = runtime.create_context()?;
            init_default_device(&context)?;

            let pool: Arc<SurfacePool<Vec<u8>>> = Arc::new(SurfacePool::new());
            let observer = ReleaseObserver::new(pool.clone());
            let host = NativeHostSurfaces::new(context.clone(), observer);

            let session = Self::session(runtime, &context, config, settings, format, true)?;
            Ok(AmfEncoder::Fallback(FallbackEncoder::new(session, host, pool)))
        })();

        if let Err(err) = &result {
            log::error!("[{}] {}", label, describe(runtime, err));
        }
        result
    }

    fn session(
        runtime: &Arc<AmfRuntime>,
        context: &Context,
        config: &EncoderConfig,
        settings: &EncoderSettings,
        format: SurfaceFormat,
        fallback: bool,
    ) -> Result<Session<Component>> {
        let component = runtime.create_component(context, config.codec)?;
        configured_session(component, config, settings, format, fallback)
    }

    fn inner(&self) -> &dyn FrameEncoder {
        match self {
            #[cfg(any(windows, target_os = "linux"))]
            AmfEncoder::Texture(encoder) => encoder,
            AmfEncoder::Fallback(encoder) => encoder,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FrameEncoder {
        match self {
            #[cfg(any(windows, target_os = "linux"))]
            AmfEncoder::Texture(encoder) => encoder,
            AmfEncoder::Fallback(encoder) => encoder,
        }
    }
}

impl FrameEncoder for AmfEncoder {
    fn encode(&mut self, input: FrameInput<'_>, pts: i64) -> Result<Option<EncodedPacket<'_>>> {
        self.inner_mut().encode(input, pts)
    }

    fn update(&mut self, settings: &EncoderSettings) -> Result<()> {
        self.inner_mut().update(settings)
    }

    fn extra_data(&self) -> Option<&[u8]> {
        self.inner().extra_data()
    }

    fn input_format(&self) -> VideoFormat {
        self.inner().input_format()
    }

    fn is_fallback(&self) -> bool {
        self.inner().is_fallback()
    }
}

/// Error text with AMF statuses spelled out by the runtime
fn describe(runtime: &AmfRuntime, err: &Error) -> String {
    match err {
        Error::Amf { reason, code } => format!("{}: {}", reason, runtime.result_text(*code)),
        other => other.to_string(),
    }
}

/// Let the runtime open its own device for host-memory surfaces
fn init_default_device(context: &Context) -> Result<()> {
    #[cfg(windows)]
    return context.init_dx11(std::ptr::null_mut());
    #[cfg(not(windows))]
    return context.init_vulkan(std::ptr::null_mut());
}

/// Wrap `component` in a session and apply the creation settings
fn configured_session<C: EncoderComponent>(
    component: C,
    config: &EncoderConfig,
    settings: &EncoderSettings,
    format: SurfaceFormat,
    fallback: bool,
) -> Result<Session<C>> {
    let mut session = Session::new(component, config.session_config(format, fallback));
    session.configure(settings)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockComponent, MockSurface};
    use crate::caps::AdapterCaps;

    fn caps(avc: bool, hevc: bool, av1: bool) -> CapsTable {
        CapsTable::new(vec![AdapterCaps {
            is_amd: true,
            supports_avc: avc,
            supports_hevc: hevc,
            supports_av1: av1,
        }])
    }

    fn config(codec: Codec) -> EncoderConfig {
        let info = VideoOutputInfo {
            width: 1920,
            height: 1080,
            fps_num: 60,
            fps_den: 1,
            format: VideoFormat::NV12 as u32,
            colorspace: ColorSpace::CS709 as u32,
            range: ColorRange::Partial as u32,
        };
        EncoderConfig {
            nv12_textures: true,
            ..EncoderConfig::from_output(codec, &info, "simple_video")
        }
    }

    fn refusal(config: &EncoderConfig, caps: &CapsTable) -> &'static str {
        match check_texture_capability(config, caps) {
            Err(Error::Unsupported(reason)) => reason,
            other => panic!("expected a refusal, got {other:?}"),
        }
    }

    #[test]
    fn test_texture_path_accepted() {
        assert!(check_texture_capability(&config(Codec::Avc), &caps(true, false, false)).is_ok());

        let p010 = EncoderConfig {
            nv12_textures: false,
            p010_textures: true,
            format: VideoFormat::P010,
            space: ColorSpace::CS2100PQ,
            ..config(Codec::Hevc)
        };
        assert!(check_texture_capability(&p010, &caps(true, true, false)).is_ok());
    }

    #[test]
    fn test_scaling_refused_first() {
        let scaled = EncoderConfig {
            scaling: true,
            nv12_textures: false,
            ..config(Codec::Avc)
        };
        assert_eq!(refusal(&scaled, &caps(false, false, false)), "Encoder scaling is active");
    }

    #[test]
    fn test_texture_sharing_required() {
        let off = EncoderConfig {
            nv12_textures: false,
            ..config(Codec::Avc)
        };
        assert_eq!(refusal(&off, &caps(true, true, true)), "NV12 textures aren't active");

        let hevc = EncoderConfig {
            codec: Codec::Hevc,
            ..off.clone()
        };
        assert_eq!(refusal(&hevc, &caps(true, true, true)), "NV12/P010 textures aren't active");

        // P010 sharing alone is not enough for AVC
        let avc_p010 = EncoderConfig {
            p010_textures: true,
            ..off
        };
        assert_eq!(refusal(&avc_p010, &caps(true, true, true)), "NV12 textures aren't active");
    }

    #[test]
    fn test_eight_bit_hdr_refused() {
        let hlg = EncoderConfig {
            space: ColorSpace::CS2100HLG,
            ..config(Codec::Hevc)
        };
        assert_eq!(
            refusal(&hlg, &caps(true, true, true)),
            "OBS does not support 8-bit output of Rec. 2100"
        );
    }

    #[test]
    fn test_wrong_adapter() {
        assert_eq!(refusal(&config(Codec::Av1), &caps(true, true, false)), "Wrong adapter");

        let second = EncoderConfig {
            adapter: 1,
            ..config(Codec::Avc)
        };
        assert_eq!(refusal(&second, &caps(true, true, true)), "Wrong adapter");
    }

    #[test]
    fn test_labels() {
        let config = config(Codec::Hevc);
        assert_eq!(config.label(false), "texture-amf-h265: 'simple_video'");
        assert_eq!(config.label(true), "fallback-amf-h265: 'simple_video'");
        assert_eq!(config.session_config(SurfaceFormat::P010, true).format, SurfaceFormat::P010);
    }

    struct Host;

    impl HostSurfaces for Host {
        type Surface = MockSurface;

        unsafe fn create(
            &self,
            _format: SurfaceFormat,
            _width: u32,
            _height: u32,
            _pitch: u32,
            data: *mut u8,
        ) -> Result<MockSurface> {
            Ok(MockSurface::new(data as usize))
        }
    }

    fn fallback() -> FallbackEncoder<MockComponent, Host> {
        let config = EncoderConfig {
            width: 4,
            height: 4,
            ..config(Codec::Avc)
        };
        let mut session = Session::new(
            MockComponent::new(Codec::Avc),
            config.session_config(SurfaceFormat::Nv12, true),
        );
        session.configure(&EncoderSettings::default()).unwrap();
        FallbackEncoder::new(session, Host, Arc::new(SurfacePool::new()))
    }

    #[test]
    fn test_fallback_refuses_textures() {
        let mut encoder = fallback();
        let mut next_key = 0;

        let err = FrameEncoder::encode(
            &mut encoder,
            FrameInput::Texture(TextureInput::Shared {
                handle: 3,
                lock_key: 7,
                next_key: &mut next_key,
            }),
            0,
        )
        .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Frame);
        assert_eq!(next_key, 7);
        assert!(encoder.is_fallback());
        assert_eq!(encoder.input_format(), VideoFormat::NV12);
    }

    #[test]
    fn test_fallback_encodes_raw_frames() {
        let mut encoder = fallback();
        let y = [16u8; 16];
        let uv = [128u8; 8];
        let frame = RawFrame::new(4, 4, &[(&y, 4), (&uv, 4)]);

        let packet = FrameEncoder::encode(&mut encoder, FrameInput::Raw(&frame), 0)
            .unwrap()
            .unwrap();
        assert_eq!(packet.pts, 0);
        assert!(FrameEncoder::extra_data(&encoder).is_some());
    }

    static LOGGED: parking_lot::Mutex<Vec<String>> = parking_lot::const_mutex(Vec::new());

    struct CaptureLog;

    impl log::Log for CaptureLog {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            LOGGED.lock().push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_settings_logged_once_per_session() {
        static LOGGER: CaptureLog = CaptureLog;
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Info);

        let config = EncoderConfig {
            name: "settings_once".into(),
            ..config(Codec::Avc)
        };
        let session = configured_session(
            MockComponent::new(Codec::Avc),
            &config,
            &EncoderSettings::default(),
            SurfaceFormat::Nv12,
            false,
        )
        .unwrap();
        assert_eq!(session.component().init_calls.len(), 1);

        let prefix = format!("[{}] settings:", config.label(false));
        let count = LOGGED.lock().iter().filter(|line| line.starts_with(&prefix)).count();
        assert_eq!(count, 1);
    }
}
