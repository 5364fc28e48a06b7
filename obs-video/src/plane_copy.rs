//! Packing of CPU frames into contiguous encoder upload buffers

use crate::types::{RawFrame, VideoFormat};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaneCopyError {
    #[error("plane {plane} holds {len} bytes, {needed} needed")]
    ShortPlane { plane: usize, len: usize, needed: usize },
    #[error("upload buffer holds {len} bytes, {needed} needed")]
    ShortBuffer { len: usize, needed: usize },
    #[error("no packing rule for {0:?}")]
    Unsupported(VideoFormat),
}

/// Size of an upload buffer for `format` at the given stride and height
///
/// Semi-planar 8-bit gets two strides' worth of rows, packed RGBA and
/// 16-bit semi-planar get four.
pub fn upload_buffer_size(format: VideoFormat, linesize: u32, height: u32) -> usize {
    let rows = linesize as usize * height as usize;
    match format {
        VideoFormat::NV12 => rows * 2,
        VideoFormat::RGBA | VideoFormat::P010 => rows * 4,
        _ => 0,
    }
}

/// Bytes `pack_planes` reads from plane `plane` of a frame
pub fn plane_len(format: VideoFormat, plane: usize, linesize: u32, height: u32) -> usize {
    let rows = linesize as usize * height as usize;
    match (format, plane) {
        (VideoFormat::NV12 | VideoFormat::P010 | VideoFormat::RGBA, 0) => rows,
        (VideoFormat::NV12 | VideoFormat::P010, 1) => rows / 2,
        _ => 0,
    }
}

/// Copy `frame` into `dst` as one contiguous block and return the bytes written
///
/// Luma (or the packed plane) comes first, followed by the interleaved chroma
/// plane at half height for the semi-planar formats.
pub fn pack_planes(
    format: VideoFormat,
    frame: &RawFrame<'_>,
    linesize: u32,
    dst: &mut [u8],
) -> Result<usize, PlaneCopyError> {
    let luma = linesize as usize * frame.height as usize;
    let chroma = match format {
        VideoFormat::NV12 | VideoFormat::P010 => luma / 2,
        VideoFormat::RGBA => 0,
        other => return Err(PlaneCopyError::Unsupported(other)),
    };

    let needed = luma + chroma;
    if dst.len() < needed {
        return Err(PlaneCopyError::ShortBuffer { len: dst.len(), needed });
    }

    copy_plane(frame, 0, &mut dst[..luma])?;
    if chroma > 0 {
        copy_plane(frame, 1, &mut dst[luma..needed])?;
    }

    Ok(needed)
}

fn copy_plane(frame: &RawFrame<'_>, plane: usize, dst: &mut [u8]) -> Result<(), PlaneCopyError> {
    let src = frame.planes[plane];
    let src = src.get(..dst.len()).ok_or(PlaneCopyError::ShortPlane {
        plane,
        len: src.len(),
        needed: dst.len(),
    })?;
    dst.copy_from_slice(src);
    Ok(())
}
