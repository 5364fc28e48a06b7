//! Moving renderer textures into encoder-owned surfaces
//!
//! On Windows the renderer shares a D3D11 texture by handle and the copy
//! happens on the encoder's own device under the texture's keyed mutex. On
//! Linux the renderer's GL planes are blitted into Vulkan memory exported
//! to GL, then copied into the image the encoder consumes.

#[cfg(windows)]
pub mod d3d11;
#[cfg(target_os = "linux")]
pub mod gl;
#[cfg(target_os = "linux")]
pub mod vulkan;

use crate::backend::InputSurface;
use crate::error::Result;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

/// Renderer handle value that never names a texture
pub const INVALID_HANDLE: u32 = u32::MAX;

/// Pixel format of one renderer plane texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneFormat {
    R8,
    R16,
    Rg8,
    Rg16,
}

impl PlaneFormat {
    /// Sized GL internal format
    pub fn gl_internal_format(self) -> u32 {
        match self {
            PlaneFormat::R8 => 0x8229,
            PlaneFormat::R16 => 0x822A,
            PlaneFormat::Rg8 => 0x822B,
            PlaneFormat::Rg16 => 0x822C,
        }
    }
}

/// One plane of a renderer frame held in a GL texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlPlane {
    /// GL texture name
    pub texture: u32,
    pub width: u32,
    pub height: u32,
    pub format: PlaneFormat,
}

/// A frame as handed over by the renderer
#[derive(Debug)]
pub enum TextureInput<'a> {
    /// Shared texture handle guarded by a keyed mutex
    ///
    /// `next_key` is the key the mutex is released with; it is written back
    /// when the frame is refused so the renderer can keep cycling.
    Shared {
        handle: u32,
        lock_key: u64,
        next_key: &'a mut u64,
    },
    /// Luma and chroma planes as GL textures
    Planes([GlPlane; 2]),
}

impl TextureInput<'_> {
    pub fn is_valid(&self) -> bool {
        match self {
            TextureInput::Shared { handle, .. } => *handle != INVALID_HANDLE,
            TextureInput::Planes(planes) => planes.iter().all(|p| p.texture != 0),
        }
    }
}

/// Per-platform copy from renderer textures into encoder surfaces
///
/// Targets are the pooled encoder-side textures; one is lent per submitted
/// frame and comes back through the release observer.
pub trait TextureBridge {
    type Target: Send + 'static;
    type Surface: InputSurface;

    /// Resolve the renderer side of `input`, opening or importing it on
    /// first use
    fn prepare(&mut self, input: &TextureInput<'_>) -> Result<()>;

    /// Allocate a new target matching `input`
    fn create_target(&mut self, input: &TextureInput<'_>) -> Result<Self::Target>;

    /// Copy the frame into `target` and synchronize with the renderer
    fn copy(&mut self, input: &mut TextureInput<'_>, target: &mut Self::Target) -> Result<()>;

    /// Wrap `target` as an encoder surface reporting to the release observer
    fn wrap(&mut self, target: &mut Self::Target) -> Result<Self::Surface>;

    /// Block until the device has finished all submitted work
    fn wait_idle(&mut self) {}

    /// Free every target and any renderer-side objects
    fn destroy(&mut self, targets: Vec<Self::Target>);
}

/// Objects opened or created once per renderer resource
///
/// Entries live for the whole session; renderer handles are stable across
/// frames.
pub struct HandleCache<K, V> {
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash + Copy, V> HandleCache<K, V> {
    pub fn new() -> Self {
        HandleCache {
            entries: HashMap::new(),
        }
    }

    /// Cached value for `key`, or the result of `open`
    pub fn get_or_open<F>(&mut self, key: K, open: F) -> Result<&mut V>
    where
        F: FnOnce(K) -> Result<V>,
    {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(open(key)?)),
        }
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
        self.entries.drain()
    }
}

impl<K: Eq + Hash + Copy, V> Default for HandleCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Access to the renderer's graphics context
///
/// GL calls are only valid between `enter` and `leave`.
pub trait GraphicsScope: Send + Sync {
    fn enter(&self);
    fn leave(&self);
}

/// Holds the graphics context for its lifetime
pub struct GraphicsGuard<'a> {
    scope: &'a dyn GraphicsScope,
}

impl<'a> GraphicsGuard<'a> {
    pub fn new(scope: &'a dyn GraphicsScope) -> Self {
        scope.enter();
        GraphicsGuard { scope }
    }
}

impl Drop for GraphicsGuard<'_> {
    fn drop(&mut self) {
        self.scope.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn test_cache_opens_once() {
        let mut cache: HandleCache<u32, String> = HandleCache::new();
        let mut opens = 0;

        for _ in 0..3 {
            let value = cache
                .get_or_open(7, |h| {
                    opens += 1;
                    Ok(format!("tex{h}"))
                })
                .unwrap();
            assert_eq!(value, "tex7");
        }

        assert_eq!(opens, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_failed_open_not_stored() {
        let mut cache: HandleCache<u32, u32> = HandleCache::new();

        let err = cache
            .get_or_open(3, |_| Err(Error::platform("OpenSharedResource failed", -1)))
            .unwrap_err();
        assert_eq!(err.native_code(), Some(-1));
        assert!(cache.is_empty());

        assert_eq!(*cache.get_or_open(3, |h| Ok(h * 2)).unwrap(), 6);
    }

    #[test]
    fn test_input_validity() {
        let mut key = 0;
        let shared = TextureInput::Shared {
            handle: INVALID_HANDLE,
            lock_key: 1,
            next_key: &mut key,
        };
        assert!(!shared.is_valid());

        let plane = GlPlane {
            texture: 4,
            width: 64,
            height: 64,
            format: PlaneFormat::R8,
        };
        assert!(TextureInput::Planes([plane, GlPlane { texture: 5, ..plane }]).is_valid());
        assert!(!TextureInput::Planes([plane, GlPlane { texture: 0, ..plane }]).is_valid());
    }

    struct Counter(AtomicI32);

    impl GraphicsScope for Counter {
        fn enter(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_graphics_guard_balances() {
        let scope = Counter(AtomicI32::new(0));
        {
            let _guard = GraphicsGuard::new(&scope);
            assert_eq!(scope.0.load(Ordering::SeqCst), 1);
        }
        assert_eq!(scope.0.load(Ordering::SeqCst), 0);
    }
}
