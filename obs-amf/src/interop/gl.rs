//! GL entry points for memory and semaphore import
//!
//! Resolved through `eglGetProcAddress` against the renderer's context.

#![allow(non_snake_case)]

use crate::error::{Error, Result};
use libloading::Library;
use std::os::raw::{c_char, c_void};

pub const GL_NO_ERROR: u32 = 0;
pub const GL_TRUE: i32 = 1;
pub const GL_TEXTURE_2D: u32 = 0x0DE1;
pub const GL_NEAREST: u32 = 0x2600;
pub const GL_COLOR_BUFFER_BIT: u32 = 0x4000;
pub const GL_FRAMEBUFFER: u32 = 0x8D40;
pub const GL_READ_FRAMEBUFFER: u32 = 0x8CA8;
pub const GL_DRAW_FRAMEBUFFER: u32 = 0x8CA9;
pub const GL_COLOR_ATTACHMENT0: u32 = 0x8CE0;
pub const GL_TEXTURE_TILING_EXT: u32 = 0x9580;
pub const GL_DEDICATED_MEMORY_OBJECT_EXT: u32 = 0x9581;
pub const GL_OPTIMAL_TILING_EXT: i32 = 0x9584;
pub const GL_HANDLE_TYPE_OPAQUE_FD_EXT: u32 = 0x9586;
pub const GL_LAYOUT_TRANSFER_SRC_EXT: u32 = 0x9592;

const EGL_LIBRARY: &str = "libEGL.so.1";

type GetProcAddress = unsafe extern "C" fn(name: *const c_char) -> *mut c_void;

macro_rules! gl_functions {
    ($($name:ident: fn($($arg:ty),*) $(-> $ret:ty)?;)*) => {
        /// GL and GL extension functions used by the Vulkan bridge
        pub struct GlFunctions {
            $(pub $name: unsafe extern "system" fn($($arg),*) $(-> $ret)?,)*
            _egl: Library,
        }

        impl GlFunctions {
            /// Resolve every function; a GL context must be current
            pub fn load() -> Result<Self> {
                let egl = unsafe { Library::new(EGL_LIBRARY) }.map_err(|source| Error::Library {
                    name: EGL_LIBRARY,
                    source,
                })?;
                let get_proc: GetProcAddress = unsafe {
                    *egl.get::<GetProcAddress>(b"eglGetProcAddress\0")
                        .map_err(|source| Error::Library {
                            name: "eglGetProcAddress",
                            source,
                        })?
                };

                $(
                    let $name = unsafe {
                        let ptr = get_proc(concat!(stringify!($name), "\0").as_ptr() as *const c_char);
                        if ptr.is_null() {
                            return Err(Error::Failed(concat!("Failed to resolve ", stringify!($name))));
                        }
                        std::mem::transmute::<*mut c_void, unsafe extern "system" fn($($arg),*) $(-> $ret)?>(ptr)
                    };
                )*

                Ok(GlFunctions {
                    $($name,)*
                    _egl: egl,
                })
            }
        }
    };
}

gl_functions! {
    glGetError: fn() -> u32;
    glCreateMemoryObjectsEXT: fn(i32, *mut u32);
    glDeleteMemoryObjectsEXT: fn(i32, *const u32);
    glImportMemoryFdEXT: fn(u32, u64, u32, i32);
    glIsMemoryObjectEXT: fn(u32) -> u8;
    glMemoryObjectParameterivEXT: fn(u32, u32, *const i32);
    glGenTextures: fn(i32, *mut u32);
    glDeleteTextures: fn(i32, *const u32);
    glBindTexture: fn(u32, u32);
    glTexParameteri: fn(u32, u32, i32);
    glTexStorageMem2DEXT: fn(u32, i32, u32, i32, i32, u32, u64);
    glGenSemaphoresEXT: fn(i32, *mut u32);
    glDeleteSemaphoresEXT: fn(i32, *const u32);
    glImportSemaphoreFdEXT: fn(u32, u32, i32);
    glIsSemaphoreEXT: fn(u32) -> u8;
    glWaitSemaphoreEXT: fn(u32, u32, *const u32, u32, *const u32, *const u32);
    glSignalSemaphoreEXT: fn(u32, u32, *const u32, u32, *const u32, *const u32);
    glGenFramebuffers: fn(i32, *mut u32);
    glDeleteFramebuffers: fn(i32, *const u32);
    glBindFramebuffer: fn(u32, u32);
    glFramebufferTexture2D: fn(u32, u32, u32, u32, i32);
    glBlitFramebuffer: fn(i32, i32, i32, i32, i32, i32, i32, i32, u32, u32);
}

impl GlFunctions {
    /// Framebuffer with `texture` as its only color attachment
    ///
    /// # Safety
    /// A GL context must be current.
    pub unsafe fn framebuffer_for(&self, texture: u32) -> u32 {
        let mut fbo = 0;
        (self.glGenFramebuffers)(1, &mut fbo);
        (self.glBindFramebuffer)(GL_FRAMEBUFFER, fbo);
        (self.glFramebufferTexture2D)(GL_FRAMEBUFFER, GL_COLOR_ATTACHMENT0, GL_TEXTURE_2D, texture, 0);
        (self.glBindFramebuffer)(GL_FRAMEBUFFER, 0);
        fbo
    }

    /// # Safety
    /// A GL context must be current.
    pub unsafe fn no_error(&self) -> bool {
        (self.glGetError)() == GL_NO_ERROR
    }
}
