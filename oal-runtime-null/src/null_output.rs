//! Software playback output.
//!
//! Pulls one period from the render callback per period duration on a
//! dedicated thread and hands the bytes to an optional [`OutputSink`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use oal_runtime_core::{AudioError, DeviceInfo, HardwareOutput, OutputCallback, StreamFormat};

use crate::devices::playback_device;
use crate::period_duration;

/// Receives each rendered period.
pub type OutputSink = Box<dyn FnMut(&[u8]) + Send + 'static>;

const DEFAULT_PERIOD_FRAMES: usize = 1024;

/// Software playback output. Rendered audio goes to the sink, or nowhere.
pub struct NullOutput {
    name: String,
    native_rate: Option<u32>,
    period_frames: usize,
    format: Option<StreamFormat>,
    sink: Arc<Mutex<Option<OutputSink>>>,
    periods_rendered: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    render_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl NullOutput {
    pub fn new() -> Self {
        Self {
            name: "Null Output".into(),
            native_rate: None,
            period_frames: DEFAULT_PERIOD_FRAMES,
            format: None,
            sink: Arc::new(Mutex::new(None)),
            periods_rendered: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            render_handle: Mutex::new(None),
        }
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

    pub fn with_period_frames(mut self, frames: usize) -> Self {
        self.period_frames = frames.max(1);
        self
    }

    pub fn with_sink(self, sink: OutputSink) -> Self {
        self.set_sink(Some(sink));
        self
    }

    /// Replace the sink; takes effect from the next period.
    pub fn set_sink(&self, sink: Option<OutputSink>) {
        *self.sink.lock() = sink;
    }

    pub fn periods_rendered(&self) -> u64 {
        self.periods_rendered.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn negotiated_format(&self) -> Option<StreamFormat> {
        self.format
    }
}

impl Default for NullOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareOutput for NullOutput {
    fn negotiate(&mut self, requested: &StreamFormat) -> Result<StreamFormat, AudioError> {
        let native = StreamFormat {
            sample_rate: self.native_rate.unwrap_or(requested.sample_rate),
            ..*requested
        };
        native.frame_layout()?;
        self.format = Some(native);
        Ok(native)
    }

    fn start(&mut self, callback: OutputCallback) -> Result<(), AudioError> {
        let format = self.format.ok_or_else(|| {
            AudioError::InvalidOperation("output started before format negotiation".into())
        })?;
        if self.running.load(Ordering::SeqCst) {
            return Err(AudioError::InvalidOperation("null output already running".into()));
        }

        let byte_count = self.period_frames * format.frame_layout()?.bytes_per_frame;
        let mut period_buffer = Vec::new();
        period_buffer
            .try_reserve_exact(byte_count)
            .map_err(|_| AudioError::OutOfMemory)?;
        period_buffer.resize(byte_count, 0u8);

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let sink = Arc::clone(&self.sink);
        let periods = Arc::clone(&self.periods_rendered);
        let period = period_duration(self.period_frames, format.sample_rate);

        let handle = thread::Builder::new()
            .name("null-output-render".into())
            .spawn(move || {
                render_loop(&running, callback, period_buffer, &sink, &periods, period);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                AudioError::ConfigurationFailed(format!("failed to spawn render thread: {}", e))
            })?;

        *self.render_handle.lock() = Some(handle);
        log::debug!("{} rendering {}-frame periods", self.name, self.period_frames);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.render_handle.lock().take() {
            if handle.join().is_err() {
                log::error!("{} render thread panicked", self.name);
                return Err(AudioError::Platform(-1));
            }
        }
        Ok(())
    }

    fn device_info(&self) -> DeviceInfo {
        playback_device(&self.name)
    }
}

impl Drop for NullOutput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn render_loop(
    running: &AtomicBool,
    mut callback: OutputCallback,
    mut period_buffer: Vec<u8>,
    sink: &Mutex<Option<OutputSink>>,
    periods: &AtomicU64,
    period: Duration,
) {
    let mut deadline = Instant::now();
    while running.load(Ordering::SeqCst) {
        callback(&mut period_buffer[..]);
        if let Some(sink) = sink.lock().as_mut() {
            sink(&period_buffer);
        }
        periods.fetch_add(1, Ordering::Release);

        deadline += period;
        let now = Instant::now();
        match deadline.checked_duration_since(now) {
            Some(wait) => thread::sleep(wait),
            None => deadline = now,
        }
    }
}
