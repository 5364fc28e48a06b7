//! AMF runtime loading and the native object layer
//!
//! The runtime library is loaded once per process and shared by every
//! encoder through an `Arc`. Objects created from it keep it alive.

pub mod objects;
pub mod observer;
pub mod sys;
pub mod wide;

pub use objects::{Component, Context, Output, Surface};
pub use observer::ReleaseObserver;

use crate::codec::Codec;
use crate::error::{AmfResultExt, Error, Result};
use crate::result::AmfResult;
use libloading::Library;
use std::ptr;
use std::sync::Arc;
use sys::*;
use wide::{from_wide, to_wide};

/// Loaded AMF runtime: library handle, factory and trace object
pub struct AmfRuntime {
    factory: *mut AMFFactory,
    trace: *mut AMFTrace,
    version: u64,
    _lib: Library,
}

// The factory and trace objects are process-wide singletons inside the
// runtime and safe to call from any thread.
unsafe impl Send for AmfRuntime {}
unsafe impl Sync for AmfRuntime {}

impl AmfRuntime {
    /// Load the runtime from the system library path
    pub fn load() -> Result<Arc<Self>> {
        let lib = unsafe { Library::new(AMF_DLL_NAME) }.map_err(|source| Error::Library {
            name: AMF_DLL_NAME,
            source,
        })?;

        unsafe {
            let init = *lib
                .get::<AMFInit_Fn>(AMF_INIT_FUNCTION_NAME)
                .map_err(|source| Error::Library {
                    name: "AMFInit",
                    source,
                })?;
            let query_version = *lib
                .get::<AMFQueryVersion_Fn>(AMF_QUERY_VERSION_FUNCTION_NAME)
                .map_err(|source| Error::Library {
                    name: "AMFQueryVersion",
                    source,
                })?;

            let mut factory = ptr::null_mut();
            AmfResult(init(AMF_FULL_VERSION, &mut factory)).context("AMFInit failed")?;
            if factory.is_null() {
                return Err(Error::amf("AMFInit failed", AmfResult::INVALID_POINTER));
            }

            let mut trace = ptr::null_mut();
            AmfResult(((*(*factory).pVtbl).GetTrace)(factory, &mut trace)).context("GetTrace failed")?;

            let mut version = 0u64;
            AmfResult(query_version(&mut version)).context("AMFQueryVersion failed")?;

            let runtime = AmfRuntime {
                factory,
                trace,
                version,
                _lib: lib,
            };
            runtime.silence_trace();
            log::info!("AMF Version {}", runtime.version_string());
            Ok(Arc::new(runtime))
        }
    }

    fn silence_trace(&self) {
        if self.trace.is_null() {
            return;
        }
        for writer in [AMF_TRACE_WRITER_DEBUG_OUTPUT, AMF_TRACE_WRITER_CONSOLE] {
            let name = to_wide(writer);
            unsafe { ((*(*self.trace).pVtbl).EnableWriter)(self.trace, name.as_ptr(), false) };
        }
    }

    /// Runtime version as reported by `AMFQueryVersion`
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn version_string(&self) -> String {
        format_version(self.version)
    }

    /// Text of a result code as the runtime describes it
    pub fn result_text(&self, res: AmfResult) -> String {
        if self.trace.is_null() {
            return res.text().to_owned();
        }
        let text = unsafe { from_wide(((*(*self.trace).pVtbl).GetResultText)(self.trace, res.0)) };
        if text.is_empty() {
            res.text().to_owned()
        } else {
            text
        }
    }

    pub fn create_context(self: &Arc<Self>) -> Result<Context> {
        let mut context = ptr::null_mut();
        unsafe {
            AmfResult(((*(*self.factory).pVtbl).CreateContext)(self.factory, &mut context))
                .context("CreateContext failed")?;
            let context = objects::Ref::from_raw(context)
                .ok_or(Error::amf("CreateContext failed", AmfResult::INVALID_POINTER))?;
            Context::new(self.clone(), context)
        }
    }

    pub fn create_component(&self, context: &Context, codec: Codec) -> Result<Component> {
        let id = to_wide(codec.component_id());
        let mut component = ptr::null_mut();
        unsafe {
            AmfResult(((*(*self.factory).pVtbl).CreateComponent)(
                self.factory,
                context.raw(),
                id.as_ptr(),
                &mut component,
            ))
            .context("CreateComponent failed")?;
            let component = objects::Ref::from_raw(component)
                .ok_or(Error::amf("CreateComponent failed", AmfResult::INVALID_POINTER))?;
            Ok(Component::new(component, context.clone()))
        }
    }
}

impl Drop for AmfRuntime {
    fn drop(&mut self) {
        if !self.trace.is_null() {
            unsafe { ((*(*self.trace).pVtbl).TraceFlush)(self.trace) };
        }
    }
}

/// `major.minor.release.build` from a packed runtime version
pub fn format_version(version: u64) -> String {
    format!(
        "{}.{}.{}.{}",
        version >> 48,
        (version >> 32) & 0xffff,
        (version >> 16) & 0xffff,
        version & 0xffff
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_version() {
        assert_eq!(format_version(AMF_FULL_VERSION), "1.4.29.0");
        assert_eq!(format_version((1 << 48) | (4 << 32) | (33 << 16) | 7), "1.4.33.7");
    }

    #[test]
    fn test_vtable_offsets() {
        use std::mem::size_of;
        let slot = size_of::<usize>();
        assert_eq!(size_of::<AMFInterfaceVtbl>(), 3 * slot);
        assert_eq!(size_of::<AMFPropertyStorageVtbl>(), 13 * slot);
        assert_eq!(size_of::<AMFDataVtbl>(), 23 * slot);
        assert_eq!(size_of::<AMFComponentVtbl>(), 28 * slot);
        assert_eq!(size_of::<AMFFactoryVtbl>(), 7 * slot);
    }
}
