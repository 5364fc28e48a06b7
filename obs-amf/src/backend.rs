//! Seams between the session logic and the AMF runtime
//!
//! The session only talks to these traits; the runtime module implements
//! them over the native objects and the tests over in-memory mocks.

use crate::codec::SurfaceFormat;
use crate::result::AmfResult;
use obs_video::SurfaceKey;

/// Property value
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Empty,
    Bool(bool),
    Int(i64),
    Double(f64),
    Size { width: i32, height: i32 },
    Rate { num: u32, den: u32 },
    Str(String),
}

impl Variant {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(v) => Some(*v),
            Variant::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            Variant::Int(v) => Some(*v != 0),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

/// An encoder component (`AMFComponent`)
pub trait EncoderComponent {
    type Surface: InputSurface;
    type Output: OutputData;

    fn set_property(&mut self, name: &str, value: Variant) -> Result<(), AmfResult>;

    fn get_property(&self, name: &str) -> Result<Variant, AmfResult>;

    /// Read a property from a fresh caps object; values depend on the
    /// properties already set
    fn caps_property(&self, name: &str) -> Result<Variant, AmfResult>;

    /// Store `bytes` in a host buffer and attach it as an interface property
    fn set_blob(&mut self, name: &str, bytes: &[u8]) -> Result<(), AmfResult>;

    /// Copy out the contents of a buffer-interface property
    fn get_blob(&self, name: &str) -> Result<Vec<u8>, AmfResult>;

    fn init(&mut self, format: SurfaceFormat, width: u32, height: u32) -> Result<(), AmfResult>;

    fn reinit(&mut self, width: u32, height: u32) -> Result<(), AmfResult>;

    fn submit_input(&mut self, surface: &Self::Surface) -> AmfResult;

    /// One `QueryOutput` call: its status and whatever data came with it
    fn query_output(&mut self) -> (AmfResult, Option<Self::Output>);

    fn terminate(&mut self);
}

/// A surface about to be submitted
pub trait InputSurface {
    /// Identity reported back by the release notification
    fn key(&self) -> SurfaceKey;

    fn set_pts(&mut self, pts: i64);

    fn set_property(&mut self, name: &str, value: Variant) -> Result<(), AmfResult>;
}

/// Data returned by `QueryOutput`
pub trait OutputData {
    fn property(&self, name: &str) -> Result<Variant, AmfResult>;

    fn pts(&self) -> i64;

    fn bytes(&self) -> &[u8];
}
