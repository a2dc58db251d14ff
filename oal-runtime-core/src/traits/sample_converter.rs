use crate::models::error::AudioError;
use crate::models::format::StreamFormat;

/// Sample-format conversion collaborator.
///
/// Converts raw interleaved PCM into the interleaved 16-bit layout a buffer
/// stores, changing channel count and sample rate as needed. The default
/// implementation is [`LinearConverter`](crate::processing::convert::LinearConverter).
pub trait SampleConverter: Send + Sync {
    /// Convert `data` (laid out as `from`) to `to`, appending the result to `out`.
    ///
    /// Returns the number of converted frames. Fails with
    /// [`AudioError::OutOfMemory`] if scratch space cannot be reserved.
    fn convert(
        &self,
        data: &[u8],
        from: StreamFormat,
        to: StreamFormat,
        out: &mut Vec<i16>,
    ) -> Result<usize, AudioError>;

    /// Number of frames `convert` produces for `frames` input frames.
    fn predict_frames(&self, frames: usize, from_rate: u32, to_rate: u32) -> usize;
}
