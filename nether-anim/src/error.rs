//! Error types for clip construction, compression and decoding

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AnimError>;

/// Errors raised by the skeleton/clip model, the compression pipeline and the decoder.
///
/// Every variant is local to the call that produced it. A failed compression
/// never yields a partial buffer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnimError {
    /// Malformed skeleton (forward/self parent reference, dangling parent, empty skeleton)
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Bone, sample or output index outside its container
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// Format combination the quantizer does not certify
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// No precision up to the maximum keeps a bone within the error threshold
    #[error(
        "bone {bone} ('{name}') error {error} exceeds threshold {threshold} at maximum precision"
    )]
    ToleranceUnsatisfiable {
        bone: usize,
        name: String,
        error: f32,
        threshold: f32,
    },

    /// Structurally invalid encoded buffer
    #[error("corrupt buffer: {0}")]
    CorruptBuffer(String),

    /// Clip data that breaks the track/sample invariants
    #[error("invalid clip: {0}")]
    InvalidClip(String),

    /// Settings that cannot drive the pipeline
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl AnimError {
    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { what, index, len }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptBuffer(msg.into())
    }
}
