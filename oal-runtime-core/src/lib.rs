//! # oal-runtime-core
//!
//! Platform-agnostic core of a 3D audio runtime.
//!
//! Provides the capture ring buffer, streaming (append-while-playing)
//! buffers, per-source spatialization and the fixed-point mixer. Platform
//! backends implement the `HardwareInput`/`HardwareOutput` traits and plug
//! into `CaptureDevice` and `AudioContext`.
//!
//! ## Architecture
//!
//! ```text
//! oal-runtime-core (this crate)
//! ├── traits/       ← HardwareInput, HardwareOutput, SampleConverter
//! ├── models/       ← AudioError, SampleFormat, Source, Listener, configuration
//! ├── processing/   ← RingBuffer, spatializer, Mixer, PCM conversion
//! ├── session/      ← CaptureDevice, AudioContext
//! └── storage/      ← Buffer, streaming append, settings files
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::{CaptureConfiguration, ContextConfiguration, StreamingThresholds};
pub use models::error::AudioError;
pub use models::format::{DeviceInfo, DeviceKind, FrameLayout, SampleFormat, StreamFormat};
pub use models::listener::{DistanceModel, Listener, ListenerParam, Orientation};
pub use models::source::{Source, SourceId, SourceParam, SourceParamKind, SourceProperties};
pub use models::state::{QueueEntryState, SourceState};
pub use processing::convert::LinearConverter;
pub use processing::mixer::Mixer;
pub use processing::ring_buffer::{RingBuffer, TimeBounds};
pub use processing::spatializer::{resolve, ResolvedParameters};
pub use session::capture::CaptureDevice;
pub use session::context::{AudioContext, SuspendedContext};
pub use storage::buffer::{Buffer, BufferHandle, BufferId, StreamCursors};
pub use storage::settings::{read_settings, write_settings, RuntimeSettings};
pub use storage::streaming::{append_with_backoff, AppendStrategy, BackoffPolicy};
pub use traits::hardware_input::{HardwareInput, InputCallback, InputRender};
pub use traits::hardware_output::{HardwareOutput, OutputCallback};
pub use traits::sample_converter::SampleConverter;

pub use glam::Vec3;
