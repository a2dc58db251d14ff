use crate::models::error::AudioError;
use crate::models::format::{DeviceInfo, StreamFormat};

/// Source of captured frames handed to an [`InputCallback`].
///
/// The backend implements this for the duration of one callback; calling
/// `render_into` pulls the frames the hardware just delivered.
pub trait InputRender {
    /// Fill `buffer` with `frame_count` frames in the negotiated layout.
    fn render_into(&mut self, buffer: &mut [u8], frame_count: usize) -> Result<(), AudioError>;
}

/// Invoked on the backend's realtime thread whenever `frame_count` frames
/// are ready. Must not block or allocate.
pub type InputCallback =
    Box<dyn FnMut(&mut dyn InputRender, usize) -> Result<(), AudioError> + Send + 'static>;

/// Platform capture path consumed by
/// [`CaptureDevice`](crate::session::capture::CaptureDevice).
///
/// Implemented by:
/// - `NullInput` (software generator, `oal-runtime-null`)
pub trait HardwareInput: Send {
    /// Agree on a stream format. Returns the hardware's native format.
    ///
    /// Only the sample rate must match `requested`; the input converts
    /// channel count and sample width itself, so [`InputRender`] always
    /// delivers frames in the requested layout.
    fn negotiate(&mut self, requested: &StreamFormat) -> Result<StreamFormat, AudioError>;

    /// Install the callback that receives captured frames.
    fn set_input_callback(&mut self, callback: InputCallback) -> Result<(), AudioError>;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    /// Release the hardware handle. Idempotent.
    fn close(&mut self);

    /// Largest frame count a single callback can deliver.
    fn max_frames_per_callback(&self) -> usize;

    fn device_info(&self) -> DeviceInfo;
}
