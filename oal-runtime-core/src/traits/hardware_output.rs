use crate::models::error::AudioError;
use crate::models::format::{DeviceInfo, StreamFormat};

/// Fills one period of output bytes. Runs on the backend's realtime thread.
pub type OutputCallback = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

/// Platform playback path driven by a mixing context.
///
/// Implemented by:
/// - `NullOutput` (timed software sink, `oal-runtime-null`)
pub trait HardwareOutput: Send {
    /// Agree on a stream format; returns what the hardware will consume.
    fn negotiate(&mut self, requested: &StreamFormat) -> Result<StreamFormat, AudioError>;

    /// Start pulling periods from `callback`.
    fn start(&mut self, callback: OutputCallback) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    fn device_info(&self) -> DeviceInfo;
}
