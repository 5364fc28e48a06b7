//! OBS AMF - zero-copy AMD hardware video encoding
//!
//! H.264, HEVC and AV1 through the AMD Advanced Media Framework runtime:
//! - Texture path: renderer textures copied GPU-side into pooled encoder surfaces
//!   (D3D11 keyed-mutex textures on Windows, GL planes via Vulkan on Linux)
//! - Fallback path: CPU frames packed into pooled host buffers
//! - One session state machine driving configuration, submission and packet draining
//! - Capability table from the `obs-amf-test` probe

pub mod backend;
pub mod caps;
pub mod codec;
pub mod color;
pub mod encoder;
pub mod error;
pub mod fallback;
pub mod interop;
pub mod packet;
pub mod props;
pub mod result;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod texture;
pub mod throughput;
pub mod timestamp;

pub use caps::{AdapterCaps, CapsTable};
pub use codec::{Codec, SurfaceFormat};
pub use encoder::{check_texture_capability, AmfEncoder, EncoderConfig, FrameEncoder, FrameInput};
pub use error::{Error, ErrorKind, Result};
pub use interop::{GlPlane, GraphicsScope, PlaneFormat, TextureInput};
pub use packet::{EncodedPacket, Priority};
pub use runtime::AmfRuntime;
pub use settings::{EncoderSettings, Preset, Profile, RateControl};
