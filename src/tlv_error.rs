//! TlvError: Unified error type for tlv-field public APIs
//!
//! This error type is used throughout the tlv-field library to provide
//! robust, non-panicking error handling for all public APIs.

use crate::format::TypeTag;
use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for tlv-field operations.
#[derive(Debug, Error)]
pub enum TlvError {
    /// Underlying file I/O failed (open, seek, read, write).
    #[error("container I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The header carried a type tag in the reserved region (6 or 7).
    #[error("invalid type tag {0} in header (valid tags are 0..=5)")]
    InvalidTypeTag(u8),
    /// A label outside the 4-bit payload range was supplied.
    #[error("label {0} does not fit the 4-bit header field (valid labels are 0..=15)")]
    InvalidLabel(u8),
    /// The caller's element type disagrees with the type tag recorded on disk.
    #[error("stored type mismatch: file records {found:?}, caller expected {expected:?}")]
    TypeMismatch { expected: TypeTag, found: TypeTag },
    /// A range read asked for elements past the recorded global count.
    #[error("range end {end} exceeds recorded global count {global_count}")]
    BoundsViolation { end: u64, global_count: u64 },
    /// A range whose start exceeds its end, typically from corrupt CSR
    /// offsets in a companion file.
    #[error("inverted range [{start}, {end})")]
    InvertedRange { start: u64, end: u64 },
    /// The file ended before a complete header + count could be read.
    #[error("truncated header in `{0}`")]
    TruncatedHeader(PathBuf),
    /// The recorded global count is negative.
    #[error("negative global count {count} in `{path}`")]
    NegativeCount { path: PathBuf, count: i64 },
    /// Ranks disagreed at a collective protocol step; the whole group fails.
    #[error("collective desync: {0}")]
    CollectiveDesync(String),
    /// A point-to-point exchange under a collective failed or returned short.
    #[error("communication failure with rank {peer}: {detail}")]
    CommFailure { peer: usize, detail: String },
    /// The field adapter rejected the scatter of read values.
    #[error("field scatter failed: {0}")]
    ScatterFailed(String),
    /// A metadata operation was requested on a container built without a
    /// metadata prefix.
    #[error("no metadata prefix configured for this container")]
    NoMetadataPrefix,
}
