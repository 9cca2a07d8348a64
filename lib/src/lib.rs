pub mod assemble;
pub mod format;
pub mod material;
pub mod util;

use thiserror::Error;

/// Errors produced while decoding studio model assets.
///
/// Granularity matters here: `MalformedHeader` aborts the whole asset,
/// `MalformedSkeleton` aborts only the skeleton, and everything else is
/// caught at per-mesh or per-image scope so a single corrupt sub-resource
/// degrades that piece only.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A read would run past the end of the input buffer.
    #[error("read out of bounds at offset {offset:#x} (buffer size {size:#x})")]
    OutOfBounds { offset: u64, size: u64 },

    /// Bad magic, version, or checksum. No asset can be produced.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// A bone references a parent at or after its own index.
    #[error("bone {bone} references parent {parent} out of order")]
    MalformedSkeleton { bone: usize, parent: i32 },

    /// Pixel format this decoder does not handle. Callers substitute a
    /// neutral default image rather than failing.
    #[error("unsupported pixel format {0}")]
    UnsupportedPixelFormat(i32),

    /// A record failed to parse for a reason other than buffer overrun.
    #[error("malformed record: {0}")]
    Read(binrw::Error),
}

pub type Result<T, E = DecodeError> = std::result::Result<T, E>;
