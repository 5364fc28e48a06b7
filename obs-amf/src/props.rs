//! Property names of the three AMF encoder components
//!
//! Every codec exposes the same concepts under its own names. Entries a
//! codec does not have are `None`.

/// Name of the input surface property carrying the caller's timestamp
pub const CALLER_PTS: &str = "PTS";

#[derive(Debug)]
pub struct CodecProps {
    pub frame_size: &'static str,
    pub frame_rate: &'static str,
    pub usage: &'static str,
    pub profile: &'static str,
    pub quality_preset: &'static str,
    pub low_latency: Option<&'static str>,
    pub color_profile: &'static str,
    pub transfer_characteristic: &'static str,
    pub color_primaries: &'static str,
    pub full_range: Option<&'static str>,
    pub color_bit_depth: Option<&'static str>,
    pub hdr_metadata: Option<&'static str>,
    pub cabac: Option<&'static str>,
    pub preencode: Option<&'static str>,
    pub alignment_mode: Option<&'static str>,
    pub latency_mode: Option<&'static str>,
    pub rate_control: &'static str,
    pub enable_vbaq: Option<&'static str>,
    pub target_bitrate: &'static str,
    pub peak_bitrate: &'static str,
    pub vbv_buffer_size: &'static str,
    pub filler_data: &'static str,
    pub qp_i: Option<&'static str>,
    pub qp_p: Option<&'static str>,
    pub qp_b: Option<&'static str>,
    pub q_index_intra: Option<&'static str>,
    pub q_index_inter: Option<&'static str>,
    pub qvbr_level: &'static str,
    pub enforce_hrd: &'static str,
    pub high_motion_boost: Option<&'static str>,
    /// IDR period for AVC, GOP size otherwise
    pub gop: &'static str,
    pub header_spacing: Option<&'static str>,
    pub deblocking: Option<&'static str>,
    pub b_pattern: Option<&'static str>,
    pub max_consecutive_b: Option<&'static str>,
    pub extra_data: &'static str,
    pub output_type: &'static str,
    pub cap_bframes: Option<&'static str>,
    pub cap_max_throughput: &'static str,
}

pub static AVC: CodecProps = CodecProps {
    frame_size: "FrameSize",
    frame_rate: "FrameRate",
    usage: "Usage",
    profile: "Profile",
    quality_preset: "QualityPreset",
    low_latency: Some("LowLatencyInternal"),
    color_profile: "OutColorProfile",
    transfer_characteristic: "OutColorTransferChar",
    color_primaries: "OutColorPrimaries",
    full_range: Some("FullRangeColor"),
    color_bit_depth: None,
    hdr_metadata: None,
    cabac: Some("CABACEnable"),
    preencode: Some("RateControlPreanalysisEnable"),
    alignment_mode: None,
    latency_mode: None,
    rate_control: "RateControlMethod",
    enable_vbaq: Some("EnableVBAQ"),
    target_bitrate: "TargetBitrate",
    peak_bitrate: "PeakBitrate",
    vbv_buffer_size: "VBVBufferSize",
    filler_data: "FillerDataEnable",
    qp_i: Some("QPI"),
    qp_p: Some("QPP"),
    qp_b: Some("QPB"),
    q_index_intra: None,
    q_index_inter: None,
    qvbr_level: "QvbrQualityLevel",
    enforce_hrd: "EnforceHRD",
    high_motion_boost: Some("HighMotionQualityBoostEnable"),
    gop: "IDRPeriod",
    header_spacing: Some("HeaderInsertionSpacing"),
    deblocking: Some("DeBlockingFilter"),
    b_pattern: Some("BPicturesPattern"),
    max_consecutive_b: Some("MaxConsecutiveBPictures"),
    extra_data: "ExtraData",
    output_type: "OutputDataType",
    cap_bframes: Some("BFrames"),
    cap_max_throughput: "MaxThroughput",
};

pub static HEVC: CodecProps = CodecProps {
    frame_size: "HevcFrameSize",
    frame_rate: "HevcFrameRate",
    usage: "HevcUsage",
    profile: "HevcProfile",
    quality_preset: "HevcQualityPreset",
    low_latency: Some("LowLatencyInternal"),
    color_profile: "HevcOutColorProfile",
    transfer_characteristic: "HevcOutColorTransferChar",
    color_primaries: "HevcOutColorPrimaries",
    full_range: Some("HevcNominalRange"),
    color_bit_depth: Some("HevcColorBitDepth"),
    hdr_metadata: Some("HevcInHDRMetadata"),
    cabac: None,
    preencode: None,
    alignment_mode: None,
    latency_mode: None,
    rate_control: "HevcRateControlMethod",
    enable_vbaq: Some("HevcEnableVBAQ"),
    target_bitrate: "HevcTargetBitrate",
    peak_bitrate: "HevcPeakBitrate",
    vbv_buffer_size: "HevcVBVBufferSize",
    filler_data: "HevcFillerDataEnable",
    qp_i: Some("HevcQP_I"),
    qp_p: Some("HevcQP_P"),
    qp_b: None,
    q_index_intra: None,
    q_index_inter: None,
    qvbr_level: "HevcQvbrQualityLevel",
    enforce_hrd: "HevcEnforceHRD",
    high_motion_boost: Some("HevcHighMotionQualityBoostEnable"),
    gop: "HevcGOPSize",
    header_spacing: None,
    deblocking: None,
    b_pattern: None,
    max_consecutive_b: None,
    extra_data: "HevcExtraData",
    output_type: "HevcOutputDataType",
    cap_bframes: None,
    cap_max_throughput: "HevcMaxThroughput",
};

pub static AV1: CodecProps = CodecProps {
    frame_size: "Av1FrameSize",
    frame_rate: "Av1FrameRate",
    usage: "Av1Usage",
    profile: "Av1Profile",
    quality_preset: "Av1QualityPreset",
    low_latency: None,
    color_profile: "Av1OutputColorProfile",
    transfer_characteristic: "Av1OutputTransferCharacteristic",
    color_primaries: "Av1OutputColorPrimaries",
    full_range: None,
    color_bit_depth: Some("Av1ColorBitDepth"),
    hdr_metadata: None,
    cabac: None,
    preencode: None,
    alignment_mode: Some("Av1AlignmentMode"),
    latency_mode: Some("Av1EncodingLatencyMode"),
    rate_control: "Av1RateControlMethod",
    enable_vbaq: None,
    target_bitrate: "Av1TargetBitrate",
    peak_bitrate: "Av1PeakBitrate",
    vbv_buffer_size: "Av1VBVBufferSize",
    filler_data: "Av1FillerData",
    qp_i: None,
    qp_p: None,
    qp_b: None,
    q_index_intra: Some("Av1QIndexIntra"),
    q_index_inter: Some("Av1QIndexInter"),
    qvbr_level: "Av1QvbrQualityLevel",
    enforce_hrd: "Av1EnforceHRD",
    high_motion_boost: None,
    gop: "Av1GOPSize",
    header_spacing: None,
    deblocking: None,
    b_pattern: None,
    max_consecutive_b: None,
    extra_data: "Av1ExtraData",
    output_type: "Av1OutputFrameType",
    cap_bframes: None,
    cap_max_throughput: "Av1CapMaxThroughput",
};
