//! Software capture input.
//!
//! Frames come from a [`FrameGenerator`]. An unpaced input is pumped by its
//! owner through [`NullInput::deliver`]; a paced input delivers one period
//! per period duration from a dedicated thread, like a hardware callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use oal_runtime_core::{
    AudioError, DeviceInfo, HardwareInput, InputCallback, InputRender, StreamFormat,
};

use crate::devices::capture_device;
use crate::period_duration;

/// Fills the slice with `frame_count` frames in the negotiated layout.
pub type FrameGenerator = Box<dyn FnMut(&mut [u8], usize) + Send + 'static>;

const DEFAULT_PERIOD_FRAMES: usize = 256;

/// State shared between the owner and the pacing thread.
struct Pump {
    callback: Option<InputCallback>,
    generator: FrameGenerator,
    bytes_per_frame: usize,
    frames_delivered: u64,
}

impl Pump {
    fn deliver(&mut self, frame_count: usize) -> Result<(), AudioError> {
        let Pump {
            callback,
            generator,
            bytes_per_frame,
            frames_delivered,
        } = self;
        let callback = callback
            .as_mut()
            .ok_or_else(|| AudioError::InvalidOperation("no input callback installed".into()))?;
        let mut render = GeneratorRender {
            generator,
            bytes_per_frame: *bytes_per_frame,
        };
        callback(&mut render as &mut dyn InputRender, frame_count)?;
        *frames_delivered += frame_count as u64;
        Ok(())
    }
}

struct GeneratorRender<'a> {
    generator: &'a mut FrameGenerator,
    bytes_per_frame: usize,
}

impl InputRender for GeneratorRender<'_> {
    fn render_into(&mut self, buffer: &mut [u8], frame_count: usize) -> Result<(), AudioError> {
        let needed = frame_count * self.bytes_per_frame;
        let available = buffer.len();
        let dest = buffer.get_mut(..needed).ok_or_else(|| {
            AudioError::InvalidValue(format!(
                "render buffer holds {} bytes, {} needed",
                available, needed
            ))
        })?;
        (self.generator)(dest, frame_count);
        Ok(())
    }
}

/// Software capture input.
///
/// Accepts whatever format is requested, except that a fixed native rate
/// (see [`NullInput::with_native_rate`]) is reported back unchanged so
/// rate negotiation failures can be exercised.
pub struct NullInput {
    name: String,
    native_rate: Option<u32>,
    period_frames: usize,
    paced: bool,
    format: Option<StreamFormat>,
    pump: Arc<Mutex<Pump>>,
    running: Arc<AtomicBool>,
    closed: bool,
    capture_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl NullInput {
    /// Create an unpaced input fed by `generator`.
    pub fn new(generator: FrameGenerator) -> Self {
        Self {
            name: "Null Capture".into(),
            native_rate: None,
            period_frames: DEFAULT_PERIOD_FRAMES,
            paced: false,
            format: None,
            pump: Arc::new(Mutex::new(Pump {
                callback: None,
                generator,
                bytes_per_frame: 0,
                frames_delivered: 0,
            })),
            running: Arc::new(AtomicBool::new(false)),
            closed: false,
            capture_handle: Mutex::new(None),
        }
    }

    /// An input that captures silence.
    pub fn silent() -> Self {
        Self::new(Box::new(|bytes: &mut [u8], _| bytes.fill(0)))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Report `rate` from negotiation regardless of what is requested.
    pub fn with_native_rate(mut self, rate: u32) -> Self {
        self.native_rate = Some(rate);
        self
    }

    /// Frames per delivery; also the largest manual delivery accepted.
    pub fn with_period_frames(mut self, frames: usize) -> Self {
        self.period_frames = frames.max(1);
        self
    }

    /// Deliver periods from a dedicated thread once started.
    pub fn paced(mut self) -> Self {
        self.paced = true;
        self
    }

    /// Push `frame_count` generated frames through the installed callback.
    ///
    /// Only valid for an unpaced input that has been started.
    pub fn deliver(&self, frame_count: usize) -> Result<(), AudioError> {
        if self.paced {
            return Err(AudioError::InvalidOperation(
                "paced input delivers from its own thread".into(),
            ));
        }
        if !self.running.load(Ordering::SeqCst) {
            return Err(AudioError::NotCapturing);
        }
        if frame_count > self.period_frames {
            return Err(AudioError::InvalidValue(format!(
                "delivery of {} frames exceeds the {}-frame period",
                frame_count, self.period_frames
            )));
        }
        self.pump.lock().deliver(frame_count)
    }

    /// Total frames handed to the callback so far.
    pub fn frames_delivered(&self) -> u64 {
        self.pump.lock().frames_delivered
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), AudioError> {
        if self.closed {
            return Err(AudioError::InvalidOperation("input is closed".into()));
        }
        Ok(())
    }
}

impl HardwareInput for NullInput {
    fn negotiate(&mut self, requested: &StreamFormat) -> Result<StreamFormat, AudioError> {
        self.ensure_open()?;
        let native = StreamFormat {
            sample_rate: self.native_rate.unwrap_or(requested.sample_rate),
            ..*requested
        };
        let layout = requested.frame_layout()?;
        self.pump.lock().bytes_per_frame = layout.bytes_per_frame;
        self.format = Some(native);
        Ok(native)
    }

    fn set_input_callback(&mut self, callback: InputCallback) -> Result<(), AudioError> {
        self.ensure_open()?;
        self.pump.lock().callback = Some(callback);
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.ensure_open()?;
        let format = self.format.ok_or_else(|| {
            AudioError::InvalidOperation("input started before format negotiation".into())
        })?;
        if self.running.load(Ordering::SeqCst) {
            return Err(AudioError::InvalidOperation("null capture already running".into()));
        }

        self.running.store(true, Ordering::SeqCst);
        if !self.paced {
            return Ok(());
        }

        let running = Arc::clone(&self.running);
        let pump = Arc::clone(&self.pump);
        let frames = self.period_frames;
        let period = period_duration(frames, format.sample_rate);

        let handle = thread::Builder::new()
            .name("null-capture".into())
            .spawn(move || {
                if let Err(e) = capture_loop(running.clone(), pump, frames, period) {
                    log::error!("Null capture error: {}", e);
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                AudioError::ConfigurationFailed(format!("failed to spawn capture thread: {}", e))
            })?;

        *self.capture_handle.lock() = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.lock().take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.stop();
        self.pump.lock().callback = None;
        self.closed = true;
        log::debug!("{} closed", self.name);
    }

    fn max_frames_per_callback(&self) -> usize {
        self.period_frames
    }

    fn device_info(&self) -> DeviceInfo {
        capture_device(&self.name)
    }
}

impl Drop for NullInput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Delivers one period per `period`, catching up without bursting when a
/// delivery overruns its slot.
fn capture_loop(
    running: Arc<AtomicBool>,
    pump: Arc<Mutex<Pump>>,
    frames: usize,
    period: Duration,
) -> Result<(), AudioError> {
    let mut deadline = Instant::now();
    while running.load(Ordering::SeqCst) {
        pump.lock().deliver(frames)?;
        deadline += period;
        let now = Instant::now();
        match deadline.checked_duration_since(now) {
            Some(wait) => thread::sleep(wait),
            None => deadline = now,
        }
    }
    Ok(())
}
