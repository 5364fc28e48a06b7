//! Zero-copy texture encode path

use crate::backend::{EncoderComponent, InputSurface};
use crate::error::{Error, Result};
use crate::interop::{TextureBridge, TextureInput};
use crate::packet::EncodedPacket;
use crate::session::Session;
use crate::settings::EncoderSettings;
use obs_video::SurfacePool;
use std::sync::Arc;

/// Encoder fed from renderer textures
///
/// Fields drop in declaration order: the session (and its component) goes
/// before the bridge, which owns the release observer and the device.
pub struct TextureEncoder<C, B>
where
    C: EncoderComponent,
    B: TextureBridge<Surface = C::Surface>,
{
    session: Session<C>,
    bridge: B,
    pool: Arc<SurfacePool<B::Target>>,
}

impl<C, B> TextureEncoder<C, B>
where
    C: EncoderComponent,
    B: TextureBridge<Surface = C::Surface>,
{
    /// `pool` must be the sink of the observer the bridge wraps surfaces with
    pub fn new(session: Session<C>, bridge: B, pool: Arc<SurfacePool<B::Target>>) -> Self {
        TextureEncoder { session, bridge, pool }
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn encode(&mut self, mut input: TextureInput<'_>, pts: i64) -> Result<Option<EncodedPacket<'_>>> {
        if !input.is_valid() {
            if let TextureInput::Shared { lock_key, next_key, .. } = &mut input {
                **next_key = *lock_key;
            }
            return Err(Error::BadFrame("Encode failed: bad texture handle"));
        }

        self.bridge.prepare(&input)?;

        let bridge = &mut self.bridge;
        let mut target = self.pool.acquire_or_create(|| bridge.create_target(&input))?;

        if let Err(err) = self.bridge.copy(&mut input, &mut target) {
            self.pool.recycle(target);
            return Err(err);
        }

        let mut surface = match self.bridge.wrap(&mut target) {
            Ok(surface) => surface,
            Err(err) => {
                self.pool.recycle(target);
                return Err(err);
            }
        };

        if let Err(err) = self.session.stamp(&mut surface, pts) {
            drop(surface);
            self.pool.recycle(target);
            return Err(err);
        }

        self.pool.lend(surface.key(), target);
        self.session.encode(&surface)
    }

    pub fn update(&mut self, settings: &EncoderSettings) -> Result<()> {
        self.session.update(settings)
    }

    pub fn extra_data(&self) -> Option<&[u8]> {
        self.session.extra_data()
    }
}

impl<C, B> Drop for TextureEncoder<C, B>
where
    C: EncoderComponent,
    B: TextureBridge<Surface = C::Surface>,
{
    fn drop(&mut self) {
        self.pool.begin_teardown();
        self.bridge.wait_idle();
        let targets = self.pool.drain();
        self.bridge.destroy(targets);
        self.session.terminate();
    }
}
