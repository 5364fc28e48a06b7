//! Recycling pool for encoder input resources
//!
//! Resources are lent to the encoder when a frame is submitted and come back
//! through [`ReleaseSink::release`] once the encoder is done with the surface.
//! The release call arrives on an encoder-owned thread, so both directions
//! serialize on the same mutex.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Identity the encoder uses for a lent surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceKey(pub usize);

impl SurfaceKey {
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        SurfaceKey(ptr as usize)
    }
}

/// Receiver of the encoder's "surface no longer used" notification
pub trait ReleaseSink: Send + Sync {
    /// Returns true when a lent resource went back to the free list.
    fn release(&self, key: SurfaceKey) -> bool;
}

struct PoolInner<R> {
    active: HashMap<SurfaceKey, R>,
    available: Vec<R>,
    allocated: usize,
}

/// Pool of interchangeable encoder input resources
///
/// A resource is either lent (keyed by the surface that wraps it) or
/// available, never both. Resources are created lazily and only dropped when
/// the pool is drained at teardown.
pub struct SurfacePool<R> {
    inner: Mutex<PoolInner<R>>,
    destroying: AtomicBool,
}

impl<R> SurfacePool<R> {
    pub fn new() -> Self {
        SurfacePool {
            inner: Mutex::new(PoolInner {
                active: HashMap::new(),
                available: Vec::new(),
                allocated: 0,
            }),
            destroying: AtomicBool::new(false),
        }
    }

    /// Take the newest free resource, or create one with `create`
    ///
    /// The lock is not held while `create` runs.
    pub fn acquire_or_create<E, F>(&self, create: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
    {
        if let Some(resource) = self.inner.lock().available.pop() {
            return Ok(resource);
        }

        let resource = create()?;
        self.inner.lock().allocated += 1;
        Ok(resource)
    }

    /// Hand a resource to the encoder under `key`
    ///
    /// A stale entry under the same key is moved to the free list.
    pub fn lend(&self, key: SurfaceKey, resource: R) {
        let mut inner = self.inner.lock();
        if let Some(stale) = inner.active.insert(key, resource) {
            log::warn!("surface {:#x} was lent twice", key.0);
            inner.available.push(stale);
        }
    }

    /// Return a resource that was acquired but never lent
    pub fn recycle(&self, resource: R) {
        self.inner.lock().available.push(resource);
    }

    /// Move the resource lent under `key` back to the free list
    ///
    /// No-op if `key` is not lent or the pool is being torn down.
    pub fn release(&self, key: SurfaceKey) -> bool {
        if self.destroying.load(Ordering::Acquire) {
            return false;
        }

        let mut inner = self.inner.lock();
        match inner.active.remove(&key) {
            Some(resource) => {
                inner.available.push(resource);
                true
            }
            None => false,
        }
    }

    /// Stop honoring release notifications
    pub fn begin_teardown(&self) {
        self.destroying.store(true, Ordering::Release);
    }

    pub fn is_tearing_down(&self) -> bool {
        self.destroying.load(Ordering::Acquire)
    }

    /// Remove every resource, lent or not, for destruction
    pub fn drain(&self) -> Vec<R> {
        let mut inner = self.inner.lock();
        let mut all: Vec<R> = inner.active.drain().map(|(_, r)| r).collect();
        all.append(&mut inner.available);
        inner.allocated = 0;
        all
    }

    pub fn is_lent(&self, key: SurfaceKey) -> bool {
        self.inner.lock().active.contains_key(&key)
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            allocated: inner.allocated,
            active: inner.active.len(),
            available: inner.available.len(),
        }
    }
}

impl<R> Default for SurfacePool<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Send> ReleaseSink for SurfacePool<R> {
    fn release(&self, key: SurfaceKey) -> bool {
        SurfacePool::release(self, key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub allocated: usize,
    pub active: usize,
    pub available: usize,
}
