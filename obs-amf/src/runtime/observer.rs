//! Surface release observer handed to the runtime

use super::sys::{AMFSurface, AMFSurfaceObserver, AMFSurfaceObserverVtbl};
use obs_video::{ReleaseSink, SurfaceKey};
use std::sync::Arc;

static OBSERVER_VTBL: AMFSurfaceObserverVtbl = AMFSurfaceObserverVtbl {
    OnSurfaceDataRelease: on_surface_data_release,
};

/// Forwards `OnSurfaceDataRelease` to a pool
///
/// The runtime keeps a raw pointer to this object for as long as any
/// surface created with it is alive, so it is boxed and must outlive the
/// component.
#[repr(C)]
pub struct ReleaseObserver {
    base: AMFSurfaceObserver,
    sink: Arc<dyn ReleaseSink>,
}

// Called from encoder threads; the sink is Send + Sync.
unsafe impl Send for ReleaseObserver {}
unsafe impl Sync for ReleaseObserver {}

impl ReleaseObserver {
    pub fn new(sink: Arc<dyn ReleaseSink>) -> Box<Self> {
        Box::new(ReleaseObserver {
            base: AMFSurfaceObserver {
                pVtbl: &OBSERVER_VTBL,
            },
            sink,
        })
    }

    pub fn as_raw(&self) -> *mut AMFSurfaceObserver {
        &self.base as *const AMFSurfaceObserver as *mut AMFSurfaceObserver
    }
}

unsafe extern "system" fn on_surface_data_release(
    this: *mut AMFSurfaceObserver,
    surface: *mut AMFSurface,
) {
    if this.is_null() {
        return;
    }
    let observer = &*(this as *const ReleaseObserver);
    observer.sink.release(SurfaceKey::from_ptr(surface));
}
