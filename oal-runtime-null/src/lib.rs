//! # oal-runtime-null
//!
//! Software ("null") device backend for oal-runtime.
//!
//! Provides:
//! - `NullInput`: capture input fed by a frame generator, pumped manually
//!   or from its own paced thread
//! - `NullOutput`: playback output that renders a context on a paced
//!   thread and hands each period to an optional sink
//! - `devices`: device listing for the software endpoints
//!
//! Neither touches real hardware, so both run on every platform and are
//! what the integration tests drive.
//!
//! ## Usage
//! ```ignore
//! use oal_runtime_core::{AudioContext, CaptureConfiguration, CaptureDevice, ContextConfiguration};
//! use oal_runtime_null::{NullInput, NullOutput};
//!
//! let input = NullInput::silent().paced();
//! let mut capture = CaptureDevice::open(input, CaptureConfiguration::default())?;
//! capture.start_capture()?;
//!
//! let context = AudioContext::new(ContextConfiguration::default())?;
//! let mut output = NullOutput::new();
//! context.attach_output(&mut output)?;
//! ```

pub mod devices;
pub mod null_input;
pub mod null_output;

pub use devices::{list_capture_devices, list_render_devices};
pub use null_input::{FrameGenerator, NullInput};
pub use null_output::{NullOutput, OutputSink};

use std::time::Duration;

/// Wall-clock length of `frames` frames at `sample_rate`.
pub(crate) fn period_duration(frames: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(frames as f64 / f64::from(sample_rate.max(1)))
}
