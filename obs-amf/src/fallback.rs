//! CPU-buffer encode path
//!
//! Used when textures cannot be handed to the encoder directly. Each frame
//! is packed into a pooled host buffer, wrapped in a host surface without
//! copying and submitted. The buffer returns to the pool when the encoder
//! releases the surface.

use crate::backend::{EncoderComponent, InputSurface};
use crate::codec::{Codec, SurfaceFormat};
use crate::error::{Error, Result};
use crate::packet::EncodedPacket;
use crate::runtime::{Context, ReleaseObserver, Surface};
use crate::session::Session;
use crate::settings::EncoderSettings;
use obs_video::{pack_planes, upload_buffer_size, ColorSpace, RawFrame, SurfacePool, VideoFormat};
use std::sync::Arc;

/// Creates encoder surfaces over host memory
pub trait HostSurfaces {
    type Surface: InputSurface;

    /// Wrap `data` as a surface
    ///
    /// # Safety
    /// `data` must stay valid and untouched until the surface is released.
    unsafe fn create(
        &self,
        format: SurfaceFormat,
        width: u32,
        height: u32,
        pitch: u32,
        data: *mut u8,
    ) -> Result<Self::Surface>;
}

/// Host surfaces on a real context, reporting releases to a pool
pub struct NativeHostSurfaces {
    context: Context,
    observer: Box<ReleaseObserver>,
}

impl NativeHostSurfaces {
    pub fn new(context: Context, observer: Box<ReleaseObserver>) -> Self {
        NativeHostSurfaces { context, observer }
    }
}

impl Drop for NativeHostSurfaces {
    fn drop(&mut self) {
        self.context.terminate();
    }
}

impl HostSurfaces for NativeHostSurfaces {
    type Surface = Surface;

    unsafe fn create(
        &self,
        format: SurfaceFormat,
        width: u32,
        height: u32,
        pitch: u32,
        data: *mut u8,
    ) -> Result<Surface> {
        self.context
            .surface_from_host(format, width, height, pitch, data, &self.observer)
    }
}

/// Refuse input formats the encoder cannot represent
pub fn check_fallback_support(codec: Codec, format: VideoFormat, space: ColorSpace) -> Result<()> {
    let ten_bit = format.is_ten_bit();
    if codec == Codec::Avc && ten_bit {
        return Err(Error::Unsupported("AMF.10bitUnsupportedAvc"));
    }
    if !ten_bit && space.is_hdr() {
        return Err(Error::Unsupported("AMF.8bitUnsupportedHdr"));
    }
    Ok(())
}

/// Encoder fed from CPU frames
pub struct FallbackEncoder<C: EncoderComponent, H: HostSurfaces<Surface = C::Surface>> {
    session: Session<C>,
    host: H,
    pool: Arc<SurfacePool<Vec<u8>>>,
    format: VideoFormat,
    /// Row stride of every buffer, taken from the first frame
    linesize: Option<u32>,
}

impl<C, H> FallbackEncoder<C, H>
where
    C: EncoderComponent,
    H: HostSurfaces<Surface = C::Surface>,
{
    /// `pool` must be the sink of the observer behind `host`
    pub fn new(session: Session<C>, host: H, pool: Arc<SurfacePool<Vec<u8>>>) -> Self {
        let format = session.config().format.video_format();
        FallbackEncoder {
            session,
            host,
            pool,
            format,
            linesize: None,
        }
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn linesize(&self) -> Option<u32> {
        self.linesize
    }

    pub fn encode(&mut self, frame: &RawFrame<'_>, pts: i64) -> Result<Option<EncodedPacket<'_>>> {
        let linesize = *self.linesize.get_or_insert(frame.linesize[0]);
        let config = self.session.config();
        let (width, height, surface_format) = (config.width, config.height, config.format);
        let size = upload_buffer_size(self.format, linesize, height);

        let mut buffer = self
            .pool
            .acquire_or_create(|| Ok::<_, Error>(vec![0u8; size]))?;
        if buffer.len() < size {
            buffer.resize(size, 0);
        }

        if let Err(err) = pack_planes(self.format, frame, linesize, &mut buffer) {
            self.pool.recycle(buffer);
            return Err(err.into());
        }

        let mut surface = match unsafe {
            self.host
                .create(surface_format, width, height, linesize, buffer.as_mut_ptr())
        } {
            Ok(surface) => surface,
            Err(err) => {
                self.pool.recycle(buffer);
                return Err(err);
            }
        };

        if let Err(err) = self.session.stamp(&mut surface, pts) {
            drop(surface);
            self.pool.recycle(buffer);
            return Err(err);
        }

        self.pool.lend(surface.key(), buffer);
        self.session.encode(&surface)
    }

    pub fn update(&mut self, settings: &EncoderSettings) -> Result<()> {
        self.session.update(settings)
    }

    pub fn extra_data(&self) -> Option<&[u8]> {
        self.session.extra_data()
    }
}

impl<C, H> Drop for FallbackEncoder<C, H>
where
    C: EncoderComponent,
    H: HostSurfaces<Surface = C::Surface>,
{
    fn drop(&mut self) {
        self.pool.begin_teardown();
        self.session.terminate();
        let buffers = self.pool.drain();
        log::debug!("[{}] freed {} upload buffers", self.session.label(), buffers.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockComponent, MockSurface};
    use crate::color::ColorTags;
    use crate::session::SessionConfig;
    use obs_video::{ColorRange, FrameRate, ReleaseSink, SurfaceKey};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MockHost {
        created: Mutex<Vec<(SurfaceFormat, u32, u32, u32)>>,
        fail: bool,
    }

    impl HostSurfaces for MockHost {
        type Surface = MockSurface;

        unsafe fn create(
            &self,
            format: SurfaceFormat,
            width: u32,
            height: u32,
            pitch: u32,
            data: *mut u8,
        ) -> Result<MockSurface> {
            if self.fail {
                return Err(Error::amf(
                    "CreateSurfaceFromHostNative failed",
                    crate::result::AmfResult::OUT_OF_MEMORY,
                ));
            }
            self.created.lock().push((format, width, height, pitch));
            Ok(MockSurface::new(data as usize))
        }
    }

    fn encoder(
        codec: Codec,
        format: SurfaceFormat,
        host: MockHost,
    ) -> (FallbackEncoder<MockComponent, MockHost>, Arc<SurfacePool<Vec<u8>>>) {
        let config = SessionConfig {
            codec,
            width: 4,
            height: 4,
            frame_rate: FrameRate::new(30, 1),
            format,
            color: ColorTags::new(ColorSpace::CS709, ColorRange::Partial),
            hdr_nominal_peak: 1000,
            label: codec.label(true),
        };
        let mut session = Session::new(MockComponent::new(codec), config);
        session.configure(&EncoderSettings::default()).unwrap();
        let pool = Arc::new(SurfacePool::new());
        (FallbackEncoder::new(session, host, pool.clone()), pool)
    }

    fn nv12_frame<'a>(y: &'a [u8], uv: &'a [u8], stride: u32) -> RawFrame<'a> {
        RawFrame::new(4, 4, &[(y, stride), (uv, stride)])
    }

    #[test]
    fn test_refusals() {
        assert!(matches!(
            check_fallback_support(Codec::Avc, VideoFormat::P010, ColorSpace::CS709),
            Err(Error::Unsupported("AMF.10bitUnsupportedAvc"))
        ));
        assert!(matches!(
            check_fallback_support(Codec::Hevc, VideoFormat::NV12, ColorSpace::CS2100PQ),
            Err(Error::Unsupported("AMF.8bitUnsupportedHdr"))
        ));
        assert!(check_fallback_support(Codec::Hevc, VideoFormat::P010, ColorSpace::CS2100HLG).is_ok());
        assert!(check_fallback_support(Codec::Avc, VideoFormat::NV12, ColorSpace::SRGB).is_ok());
    }

    #[test]
    fn test_frame_is_packed_and_lent() {
        let (mut enc, pool) = encoder(Codec::Avc, SurfaceFormat::Nv12, MockHost::default());
        let y = vec![1u8; 32];
        let uv = vec![2u8; 16];

        let packet = enc.encode(&nv12_frame(&y, &uv, 8), 0).unwrap();
        assert!(packet.is_some());

        assert_eq!(enc.linesize(), Some(8));
        assert_eq!(enc.host.created.lock()[0], (SurfaceFormat::Nv12, 4, 4, 8));
        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.active, 1);
    }

    #[test]
    fn test_released_buffer_is_reused() {
        let (mut enc, pool) = encoder(Codec::Avc, SurfaceFormat::Nv12, MockHost::default());
        let y = vec![0u8; 16];
        let uv = vec![0u8; 8];

        enc.encode(&nv12_frame(&y, &uv, 4), 0).unwrap();
        let key = SurfaceKey(enc.session.component().submitted_keys[0]);
        assert!(ReleaseSink::release(pool.as_ref(), key));

        enc.encode(&nv12_frame(&y, &uv, 4), 1).unwrap();
        assert_eq!(pool.stats().allocated, 1);
        let keys = &enc.session.component().submitted_keys;
        assert_eq!(keys[0], keys[1]);
    }

    #[test]
    fn test_linesize_latched() {
        let (mut enc, pool) = encoder(Codec::Hevc, SurfaceFormat::Nv12, MockHost::default());
        let y = vec![0u8; 64];
        let uv = vec![0u8; 32];

        enc.encode(&nv12_frame(&y, &uv, 16), 0).unwrap();
        enc.encode(&nv12_frame(&y, &uv, 8), 1).unwrap();

        assert_eq!(enc.linesize(), Some(16));
        let created = enc.host.created.lock();
        assert!(created.iter().all(|(_, _, _, pitch)| *pitch == 16));
        assert_eq!(pool.stats().allocated, 2);
    }

    #[test]
    fn test_copy_failure_recycles_buffer() {
        let (mut enc, pool) = encoder(Codec::Avc, SurfaceFormat::Nv12, MockHost::default());
        let y = vec![0u8; 4];

        let err = enc.encode(&RawFrame::new(4, 4, &[(&y, 4)]), 0).unwrap_err();
        assert!(matches!(err, Error::PlaneCopy(_)));
        assert_eq!(pool.stats().available, 1);
        assert_eq!(pool.stats().active, 0);
        assert_eq!(enc.session.component().submits, 0);
    }

    #[test]
    fn test_surface_failure_recycles_buffer() {
        let host = MockHost {
            fail: true,
            ..Default::default()
        };
        let (mut enc, pool) = encoder(Codec::Avc, SurfaceFormat::Nv12, host);
        let y = vec![0u8; 16];
        let uv = vec![0u8; 8];

        assert!(enc.encode(&nv12_frame(&y, &uv, 4), 0).is_err());
        assert_eq!(pool.stats().available, 1);
        assert_eq!(enc.session.component().submits, 0);
    }

    #[test]
    fn test_drop_drains_pool() {
        let (mut enc, pool) = encoder(Codec::Av1, SurfaceFormat::Nv12, MockHost::default());
        let y = vec![0u8; 16];
        let uv = vec![0u8; 8];
        enc.encode(&nv12_frame(&y, &uv, 4), 0).unwrap();

        drop(enc);
        assert!(pool.is_tearing_down());
        assert_eq!(pool.stats().active, 0);
        assert_eq!(pool.stats().available, 0);
    }
}
