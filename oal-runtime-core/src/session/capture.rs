use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::models::config::CaptureConfiguration;
use crate::models::error::AudioError;
use crate::models::format::{DeviceInfo, FrameLayout, StreamFormat};
use crate::processing::ring_buffer::{RingBuffer, TimeBounds};
use crate::traits::hardware_input::{HardwareInput, InputCallback, InputRender};

/// Capture device: hardware input feeding a ring buffer the application
/// drains at its own pace.
///
/// ```text
/// [HardwareInput] ─(realtime callback)→ scratch → RingBuffer.store
///                                                     │
/// application ← get_frames / available_frames ←───────┘
/// ```
///
/// The callback owns everything it touches (ring handle, scratch space,
/// store clock), so it never locks or allocates. A reader that falls more
/// than one ring's worth behind silently skips forward to the oldest frame
/// still held.
pub struct CaptureDevice<H: HardwareInput> {
    input: H,
    layout: FrameLayout,
    native: StreamFormat,
    ring: Arc<RingBuffer>,
    store_time: Arc<AtomicU64>,
    fetch_time: u64,
    capturing: bool,
    last_error: Option<AudioError>,
}

impl<H: HardwareInput> CaptureDevice<H> {
    /// Open `input` for capture with `config`.
    ///
    /// On failure the input is closed before the error is returned.
    pub fn open(mut input: H, config: CaptureConfiguration) -> Result<Self, AudioError> {
        match prepare(&mut input, &config) {
            Ok((layout, native, ring, store_time)) => {
                log::debug!(
                    "capture opened on {}: {} Hz {}, {} frame ring",
                    input.device_info().name,
                    layout.sample_rate,
                    layout.format,
                    ring.capacity_frames()
                );
                Ok(Self {
                    input,
                    layout,
                    native,
                    ring,
                    store_time,
                    fetch_time: 0,
                    capturing: false,
                    last_error: None,
                })
            }
            Err(e) => {
                log::warn!("capture open failed: {}", e);
                input.close();
                Err(e)
            }
        }
    }

    pub fn start_capture(&mut self) -> Result<(), AudioError> {
        if self.capturing {
            return Ok(());
        }
        let result = self.input.start();
        self.record(result)?;
        self.capturing = true;
        Ok(())
    }

    pub fn stop_capture(&mut self) -> Result<(), AudioError> {
        if !self.capturing {
            return Ok(());
        }
        let result = self.input.stop();
        self.record(result)?;
        self.capturing = false;
        Ok(())
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Copy exactly `frame_count` frames into `out` and advance the reader.
    ///
    /// Never blocks. Fails with [`AudioError::InsufficientFrames`] without
    /// advancing if fewer frames are buffered.
    pub fn get_frames(&mut self, frame_count: usize, out: &mut [u8]) -> Result<(), AudioError> {
        let result = self.fetch_frames(frame_count, out);
        self.record(result)
    }

    fn fetch_frames(&mut self, frame_count: usize, out: &mut [u8]) -> Result<(), AudioError> {
        if !self.capturing {
            return Err(AudioError::NotCapturing);
        }
        let bounds = self.catch_up();
        let available = bounds.end - self.fetch_time;
        if available < frame_count as u64 {
            return Err(AudioError::InsufficientFrames {
                requested: frame_count,
                available: available as usize,
            });
        }
        self.ring.fetch(out, frame_count, self.fetch_time)?;
        self.fetch_time += frame_count as u64;
        Ok(())
    }

    /// Frames ready to fetch, capped at the ring capacity.
    pub fn available_frames(&mut self) -> usize {
        let bounds = self.catch_up();
        (bounds.end - self.fetch_time).min(self.ring.capacity_frames() as u64) as usize
    }

    /// Snap the reader forward if the writer has overwritten its position.
    fn catch_up(&mut self) -> TimeBounds {
        let bounds = self.ring.time_bounds();
        if self.fetch_time < bounds.start {
            log::debug!(
                "capture reader fell behind, skipping {} frames",
                bounds.start - self.fetch_time
            );
            self.fetch_time = bounds.start;
        }
        bounds
    }

    /// Return and clear the first error recorded since the last call.
    pub fn take_error(&mut self) -> Option<AudioError> {
        self.last_error.take()
    }

    fn record<T>(&mut self, result: Result<T, AudioError>) -> Result<T, AudioError> {
        if let Err(e) = &result {
            if self.last_error.is_none() {
                self.last_error = Some(e.clone());
            }
        }
        result
    }

    /// Frames delivered by the hardware since open.
    pub fn samples_captured(&self) -> u64 {
        self.store_time.load(Ordering::Acquire)
    }

    /// Absolute frame time of the next frame `get_frames` returns.
    pub fn fetch_sample_time(&self) -> u64 {
        self.fetch_time
    }

    pub fn time_bounds(&self) -> TimeBounds {
        self.ring.time_bounds()
    }

    /// Requested (and delivered) frame layout.
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn native_format(&self) -> StreamFormat {
        self.native
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.input.device_info()
    }

    pub fn input(&self) -> &H {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut H {
        &mut self.input
    }

    /// Stop capture and release the input.
    pub fn close(self) {}
}

impl<H: HardwareInput> Drop for CaptureDevice<H> {
    fn drop(&mut self) {
        if self.capturing {
            if let Err(e) = self.input.stop() {
                log::error!("failed to stop capture on close: {}", e);
            }
        }
        self.input.close();
        log::debug!("capture closed after {} frames", self.samples_captured());
    }
}

type Prepared = (FrameLayout, StreamFormat, Arc<RingBuffer>, Arc<AtomicU64>);

fn prepare<H: HardwareInput>(
    input: &mut H,
    config: &CaptureConfiguration,
) -> Result<Prepared, AudioError> {
    config.validate().map_err(AudioError::ConfigurationFailed)?;
    let requested = config.stream_format();
    let layout = requested.frame_layout()?;

    let native = input.negotiate(&requested)?;
    if native.sample_rate != requested.sample_rate {
        return Err(AudioError::FormatMismatch {
            requested: requested.sample_rate,
            native: native.sample_rate,
        });
    }
    if native.channels != requested.channels
        || native.bits_per_sample != requested.bits_per_sample
    {
        log::debug!(
            "hardware runs {} channel(s) at {} bits; input converts to {}",
            native.channels,
            native.bits_per_sample,
            layout.format
        );
    }

    let ring = Arc::new(RingBuffer::allocate(
        layout.channels(),
        layout.bytes_per_frame,
        config.buffer_frames,
    )?);
    let store_time = Arc::new(AtomicU64::new(0));
    let callback = input_callback(
        Arc::clone(&ring),
        Arc::clone(&store_time),
        input.max_frames_per_callback(),
    )?;
    input.set_input_callback(callback)?;
    Ok((layout, native, ring, store_time))
}

fn input_callback(
    ring: Arc<RingBuffer>,
    store_time: Arc<AtomicU64>,
    max_frames: usize,
) -> Result<InputCallback, AudioError> {
    let bytes_per_frame = ring.bytes_per_frame();
    let mut scratch = Vec::new();
    scratch
        .try_reserve_exact(max_frames * bytes_per_frame)
        .map_err(|_| AudioError::Allocation)?;
    scratch.resize(max_frames * bytes_per_frame, 0u8);

    Ok(Box::new(
        move |render: &mut dyn InputRender, frame_count: usize| -> Result<(), AudioError> {
            let frames = frame_count.min(max_frames);
            let bytes = &mut scratch[..frames * bytes_per_frame];
            render.render_into(bytes, frames)?;

            let start = store_time.load(Ordering::Relaxed);
            ring.store(bytes, frames, start);
            store_time.store(start + frames as u64, Ordering::Release);
            Ok(())
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::{DeviceKind, SampleFormat};
    use std::sync::atomic::AtomicBool;

    /// Writes an incrementing mono16 ramp.
    struct Ramp<'a> {
        next: &'a mut i16,
    }

    impl InputRender for Ramp<'_> {
        fn render_into(&mut self, buffer: &mut [u8], frame_count: usize) -> Result<(), AudioError> {
            for chunk in buffer.chunks_exact_mut(2).take(frame_count) {
                chunk.copy_from_slice(&self.next.to_le_bytes());
                *self.next = self.next.wrapping_add(1);
            }
            Ok(())
        }
    }

    struct Loopback {
        native_rate: u32,
        native_layout: Option<(u16, u16)>,
        callback: Option<InputCallback>,
        next: i16,
        fail_start: bool,
        closed: Arc<AtomicBool>,
    }

    impl Loopback {
        fn new(native_rate: u32) -> Self {
            Self {
                native_rate,
                native_layout: None,
                callback: None,
                next: 0,
                fail_start: false,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }

        fn deliver(&mut self, frames: usize) {
            let mut render = Ramp { next: &mut self.next };
            if let Some(callback) = self.callback.as_mut() {
                callback(&mut render as &mut dyn InputRender, frames).unwrap();
            }
        }
    }

    impl HardwareInput for Loopback {
        fn negotiate(&mut self, requested: &StreamFormat) -> Result<StreamFormat, AudioError> {
            let (channels, bits_per_sample) = self
                .native_layout
                .unwrap_or((requested.channels, requested.bits_per_sample));
            Ok(StreamFormat {
                sample_rate: self.native_rate,
                channels,
                bits_per_sample,
            })
        }

        fn set_input_callback(&mut self, callback: InputCallback) -> Result<(), AudioError> {
            self.callback = Some(callback);
            Ok(())
        }

        fn start(&mut self) -> Result<(), AudioError> {
            if self.fail_start {
                Err(AudioError::Platform(-50))
            } else {
                Ok(())
            }
        }

        fn stop(&mut self) -> Result<(), AudioError> {
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn max_frames_per_callback(&self) -> usize {
            512
        }

        fn device_info(&self) -> DeviceInfo {
            DeviceInfo {
                id: "loopback".into(),
                name: "Loopback".into(),
                kind: DeviceKind::Capture,
                is_default: true,
            }
        }
    }

    fn open() -> CaptureDevice<Loopback> {
        CaptureDevice::open(Loopback::new(22050), CaptureConfiguration::default()).unwrap()
    }

    fn ramp(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn not_capturing_until_started() {
        let mut device = open();
        let mut out = [0u8; 8];
        assert_eq!(device.get_frames(4, &mut out), Err(AudioError::NotCapturing));
        assert_eq!(device.take_error(), Some(AudioError::NotCapturing));
        assert_eq!(device.take_error(), None);
    }

    #[test]
    fn fallen_behind_reader_snaps_to_window_start() {
        let mut device = open();
        device.start_capture().unwrap();
        for _ in 0..5 {
            device.input_mut().deliver(256);
        }
        assert_eq!(device.samples_captured(), 1280);

        let mut out = vec![0u8; 200];
        device.get_frames(100, &mut out).unwrap();
        let expected: Vec<i16> = (256..356).collect();
        assert_eq!(ramp(&out), expected);
        assert_eq!(device.fetch_sample_time(), 356);
    }

    #[test]
    fn insufficient_frames_does_not_advance() {
        let mut device = open();
        device.start_capture().unwrap();
        device.input_mut().deliver(50);

        let mut out = vec![0u8; 200];
        assert_eq!(
            device.get_frames(100, &mut out),
            Err(AudioError::InsufficientFrames {
                requested: 100,
                available: 50
            })
        );
        assert_eq!(device.fetch_sample_time(), 0);
        device.get_frames(50, &mut out).unwrap();
        assert_eq!(device.fetch_sample_time(), 50);
    }

    #[test]
    fn available_frames_is_capped_and_corrects_reader() {
        let mut device = open();
        device.start_capture().unwrap();
        for _ in 0..3 {
            device.input_mut().deliver(512);
        }
        assert_eq!(device.available_frames(), 1024);
        assert_eq!(device.fetch_sample_time(), 512);
    }

    #[test]
    fn rate_mismatch_closes_input() {
        let input = Loopback::new(44100);
        let closed = Arc::clone(&input.closed);
        let result = CaptureDevice::open(input, CaptureConfiguration::default());
        assert!(matches!(
            result,
            Err(AudioError::FormatMismatch {
                requested: 22050,
                native: 44100
            })
        ));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = CaptureConfiguration {
            buffer_frames: 0,
            ..CaptureConfiguration::default()
        };
        let result = CaptureDevice::open(Loopback::new(22050), config);
        assert!(matches!(result, Err(AudioError::ConfigurationFailed(_))));
    }

    #[test]
    fn start_failure_is_recorded() {
        let mut input = Loopback::new(22050);
        input.fail_start = true;
        let mut device = CaptureDevice::open(input, CaptureConfiguration::default()).unwrap();
        assert_eq!(device.start_capture(), Err(AudioError::Platform(-50)));
        assert!(!device.is_capturing());
        assert_eq!(device.take_error(), Some(AudioError::Platform(-50)));
    }

    #[test]
    fn stereo_layout_round_trips() {
        let config = CaptureConfiguration {
            format: SampleFormat::Stereo16,
            ..CaptureConfiguration::default()
        };
        let device = CaptureDevice::open(Loopback::new(22050), config).unwrap();
        assert_eq!(device.layout().bytes_per_frame, 4);
        assert_eq!(device.native_format().channels, 2);
    }

    #[test]
    fn differing_hardware_layout_still_opens() {
        let mut input = Loopback::new(22050);
        input.native_layout = Some((2, 8));
        let mut device = CaptureDevice::open(input, CaptureConfiguration::default()).unwrap();
        assert_eq!(device.native_format().channels, 2);
        assert_eq!(device.native_format().bits_per_sample, 8);
        assert_eq!(device.layout().format, SampleFormat::Mono16);

        device.start_capture().unwrap();
        device.input_mut().deliver(4);
        let mut out = [0u8; 8];
        device.get_frames(4, &mut out).unwrap();
        assert_eq!(ramp(&out), vec![0, 1, 2, 3]);
    }

    #[test]
    fn drop_closes_input() {
        let device = open();
        let closed = Arc::clone(&device.input().closed);
        device.close();
        assert!(closed.load(Ordering::SeqCst));
    }
}
