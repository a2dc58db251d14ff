use thiserror::Error;

/// Errors raised by the audio runtime core.
///
/// Maps onto the ALC/AL error codes the API layer reports. Transient
/// conditions (see [`AudioError::is_transient`]) are expected during normal
/// streaming and should be retried rather than surfaced as failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("could not allocate sample storage")]
    Allocation,

    #[error("requested frames are not in the ring buffer")]
    InsufficientData,

    #[error("insufficient frames: requested {requested}, available {available}")]
    InsufficientFrames { requested: usize, available: usize },

    #[error("device is not capturing")]
    NotCapturing,

    #[error("format mismatch: requested {requested} Hz, hardware runs at {native} Hz")]
    FormatMismatch { requested: u32, native: u32 },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("invalid name: {0}")]
    InvalidName(u32),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("buffer {0} is still referenced by a source")]
    BufferInUse(u32),

    #[error("platform error: {0}")]
    Platform(i32),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl AudioError {
    /// Whether the caller should simply retry later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData | Self::InsufficientFrames { .. } | Self::NotCapturing
        )
    }
}
