//! AMF result codes

use std::fmt;

/// Raw `AMF_RESULT` returned by every runtime call
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AmfResult(pub i32);

impl AmfResult {
    pub const OK: AmfResult = AmfResult(0);
    pub const FAIL: AmfResult = AmfResult(1);
    pub const UNEXPECTED: AmfResult = AmfResult(2);
    pub const ACCESS_DENIED: AmfResult = AmfResult(3);
    pub const INVALID_ARG: AmfResult = AmfResult(4);
    pub const OUT_OF_RANGE: AmfResult = AmfResult(5);
    pub const OUT_OF_MEMORY: AmfResult = AmfResult(6);
    pub const INVALID_POINTER: AmfResult = AmfResult(7);
    pub const NO_INTERFACE: AmfResult = AmfResult(8);
    pub const NOT_IMPLEMENTED: AmfResult = AmfResult(9);
    pub const NOT_SUPPORTED: AmfResult = AmfResult(10);
    pub const NOT_FOUND: AmfResult = AmfResult(11);
    pub const ALREADY_INITIALIZED: AmfResult = AmfResult(12);
    pub const NOT_INITIALIZED: AmfResult = AmfResult(13);
    pub const INVALID_FORMAT: AmfResult = AmfResult(14);
    pub const WRONG_STATE: AmfResult = AmfResult(15);
    pub const FILE_NOT_OPEN: AmfResult = AmfResult(16);
    pub const NO_DEVICE: AmfResult = AmfResult(17);
    pub const DIRECTX_FAILED: AmfResult = AmfResult(18);
    pub const OPENCL_FAILED: AmfResult = AmfResult(19);
    pub const GLX_FAILED: AmfResult = AmfResult(20);
    pub const XV_FAILED: AmfResult = AmfResult(21);
    pub const ALSA_FAILED: AmfResult = AmfResult(22);
    pub const EOF: AmfResult = AmfResult(23);
    pub const REPEAT: AmfResult = AmfResult(24);
    pub const INPUT_FULL: AmfResult = AmfResult(25);
    pub const RESOLUTION_CHANGED: AmfResult = AmfResult(26);
    pub const RESOLUTION_UPDATED: AmfResult = AmfResult(27);
    pub const INVALID_DATA_TYPE: AmfResult = AmfResult(28);
    pub const INVALID_RESOLUTION: AmfResult = AmfResult(29);
    pub const CODEC_NOT_SUPPORTED: AmfResult = AmfResult(30);
    pub const SURFACE_FORMAT_NOT_SUPPORTED: AmfResult = AmfResult(31);
    pub const SURFACE_MUST_BE_SHARED: AmfResult = AmfResult(32);
    pub const DECODER_NOT_PRESENT: AmfResult = AmfResult(33);
    pub const DECODER_SURFACE_ALLOCATION_FAILED: AmfResult = AmfResult(34);
    pub const DECODER_NO_FREE_SURFACES: AmfResult = AmfResult(35);
    pub const ENCODER_NOT_PRESENT: AmfResult = AmfResult(36);
    pub const DEM_ERROR: AmfResult = AmfResult(37);
    pub const DEM_PROPERTY_READONLY: AmfResult = AmfResult(38);
    pub const DEM_REMOTE_DISPLAY_CREATE_FAILED: AmfResult = AmfResult(39);
    pub const DEM_START_ENCODING_FAILED: AmfResult = AmfResult(40);
    pub const DEM_QUERY_OUTPUT_FAILED: AmfResult = AmfResult(41);
    pub const TAN_CLIPPING_WAS_REQUIRED: AmfResult = AmfResult(42);
    pub const TAN_UNSUPPORTED_VERSION: AmfResult = AmfResult(43);
    pub const NEED_MORE_INPUT: AmfResult = AmfResult(44);
    pub const VULKAN_FAILED: AmfResult = AmfResult(45);

    pub fn is_ok(self) -> bool {
        self == AmfResult::OK
    }

    /// Turn a status into `Ok(())` or the raw code
    pub fn ok(self) -> Result<(), AmfResult> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Symbolic name, matching the runtime's own result text
    pub fn text(self) -> &'static str {
        match self.0 {
            0 => "AMF_OK",
            1 => "AMF_FAIL",
            2 => "AMF_UNEXPECTED",
            3 => "AMF_ACCESS_DENIED",
            4 => "AMF_INVALID_ARG",
            5 => "AMF_OUT_OF_RANGE",
            6 => "AMF_OUT_OF_MEMORY",
            7 => "AMF_INVALID_POINTER",
            8 => "AMF_NO_INTERFACE",
            9 => "AMF_NOT_IMPLEMENTED",
            10 => "AMF_NOT_SUPPORTED",
            11 => "AMF_NOT_FOUND",
            12 => "AMF_ALREADY_INITIALIZED",
            13 => "AMF_NOT_INITIALIZED",
            14 => "AMF_INVALID_FORMAT",
            15 => "AMF_WRONG_STATE",
            16 => "AMF_FILE_NOT_OPEN",
            17 => "AMF_NO_DEVICE",
            18 => "AMF_DIRECTX_FAILED",
            19 => "AMF_OPENCL_FAILED",
            20 => "AMF_GLX_FAILED",
            21 => "AMF_XV_FAILED",
            22 => "AMF_ALSA_FAILED",
            23 => "AMF_EOF",
            24 => "AMF_REPEAT",
            25 => "AMF_INPUT_FULL",
            26 => "AMF_RESOLUTION_CHANGED",
            27 => "AMF_RESOLUTION_UPDATED",
            28 => "AMF_INVALID_DATA_TYPE",
            29 => "AMF_INVALID_RESOLUTION",
            30 => "AMF_CODEC_NOT_SUPPORTED",
            31 => "AMF_SURFACE_FORMAT_NOT_SUPPORTED",
            32 => "AMF_SURFACE_MUST_BE_SHARED",
            33 => "AMF_DECODER_NOT_PRESENT",
            34 => "AMF_DECODER_SURFACE_ALLOCATION_FAILED",
            35 => "AMF_DECODER_NO_FREE_SURFACES",
            36 => "AMF_ENCODER_NOT_PRESENT",
            37 => "AMF_DEM_ERROR",
            38 => "AMF_DEM_PROPERTY_READONLY",
            39 => "AMF_DEM_REMOTE_DISPLAY_CREATE_FAILED",
            40 => "AMF_DEM_START_ENCODING_FAILED",
            41 => "AMF_DEM_QUERY_OUTPUT_FAILED",
            42 => "AMF_TAN_CLIPPING_WAS_REQUIRED",
            43 => "AMF_TAN_UNSUPPORTED_VERSION",
            44 => "AMF_NEED_MORE_INPUT",
            45 => "AMF_VULKAN_FAILED",
            _ => "AMF_UNKNOWN",
        }
    }
}

impl fmt::Display for AmfResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.text(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_text() {
        assert_eq!(AmfResult::OK.text(), "AMF_OK");
        assert_eq!(AmfResult::INPUT_FULL.text(), "AMF_INPUT_FULL");
        assert_eq!(AmfResult::VULKAN_FAILED.text(), "AMF_VULKAN_FAILED");
        assert_eq!(AmfResult(1000).text(), "AMF_UNKNOWN");
        assert_eq!(AmfResult::REPEAT.to_string(), "AMF_REPEAT (24)");
    }

    #[test]
    fn test_ok_conversion() {
        assert_eq!(AmfResult::OK.ok(), Ok(()));
        assert_eq!(AmfResult::NOT_FOUND.ok(), Err(AmfResult::NOT_FOUND));
    }
}
