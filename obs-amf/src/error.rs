//! Error type shared by every encoder path

use crate::result::AmfResult;
use obs_video::PlaneCopyError;
use thiserror::Error;

/// Coarse classification used by callers to decide what to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The environment cannot host this encoder; try another path or give up quietly
    Environment,
    /// The session is unusable
    Fatal,
    /// Only the current frame is lost
    Frame,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Unsupported(&'static str),

    #[error("{reason}: {code}")]
    Amf { reason: &'static str, code: AmfResult },

    #[error("SubmitInput timed out: {}", AmfResult::INPUT_FULL)]
    SubmitTimeout,

    #[error("{reason}: {code:#x}")]
    Platform { reason: &'static str, code: i64 },

    #[error("{0}")]
    Failed(&'static str),

    #[error("{0}")]
    BadFrame(&'static str),

    #[error("{reason}: {code:#x}")]
    Copy { reason: &'static str, code: i64 },

    #[error("frame copy failed: {0}")]
    PlaneCopy(#[from] PlaneCopyError),

    #[error("failed to load {name}: {source}")]
    Library {
        name: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("{0}")]
    Probe(String),
}

impl Error {
    pub fn amf(reason: &'static str, code: AmfResult) -> Self {
        Error::Amf { reason, code }
    }

    pub fn platform(reason: &'static str, code: impl Into<i64>) -> Self {
        Error::Platform {
            reason,
            code: code.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unsupported(_) | Error::Probe(_) => ErrorKind::Environment,
            Error::Amf { .. }
            | Error::SubmitTimeout
            | Error::Platform { .. }
            | Error::Failed(_)
            | Error::Library { .. } => ErrorKind::Fatal,
            Error::BadFrame(_) | Error::Copy { .. } | Error::PlaneCopy(_) => ErrorKind::Frame,
        }
    }

    /// The AMF result or platform status behind this error, if any
    pub fn native_code(&self) -> Option<i64> {
        match self {
            Error::Amf { code, .. } => Some(code.0 as i64),
            Error::SubmitTimeout => Some(AmfResult::INPUT_FULL.0 as i64),
            Error::Platform { code, .. } | Error::Copy { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach a static reason to a failed AMF call
pub(crate) trait AmfResultExt {
    fn context(self, reason: &'static str) -> Result<()>;
}

impl AmfResultExt for AmfResult {
    fn context(self, reason: &'static str) -> Result<()> {
        self.ok().map_err(|code| Error::amf(reason, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::Unsupported("Wrong adapter").kind(), ErrorKind::Environment);
        assert_eq!(Error::SubmitTimeout.kind(), ErrorKind::Fatal);
        assert_eq!(
            Error::BadFrame("Encode failed: bad texture handle").kind(),
            ErrorKind::Frame
        );
        assert_eq!(Error::amf("CreateContext failed", AmfResult::FAIL).kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_native_codes() {
        assert_eq!(Error::SubmitTimeout.native_code(), Some(25));
        assert_eq!(
            Error::amf("QueryOutput failed", AmfResult::INVALID_ARG).native_code(),
            Some(4)
        );
        assert_eq!(
            Error::platform("Failed to create texture", 0x8007_000E_u32 as i32).native_code(),
            Some(0x8007_000E_u32 as i32 as i64)
        );
        assert_eq!(Error::Unsupported("x").native_code(), None);
    }

    #[test]
    fn test_messages() {
        let err = Error::amf("SubmitInput failed", AmfResult::WRONG_STATE);
        assert_eq!(err.to_string(), "SubmitInput failed: AMF_WRONG_STATE (15)");
        assert_eq!(Error::SubmitTimeout.to_string(), "SubmitInput timed out: AMF_INPUT_FULL (25)");
    }

    #[test]
    fn test_result_context() {
        assert!(AmfResult::OK.context("Init").is_ok());
        let err = AmfResult::NO_DEVICE.context("InitDX11 failed").unwrap_err();
        assert_eq!(err.native_code(), Some(17));
    }
}
