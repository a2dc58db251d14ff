use serde::{Deserialize, Serialize};

use super::format::{SampleFormat, StreamFormat};
use super::listener::DistanceModel;

/// Configuration for opening a capture device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Requested sample rate in Hz (default: 22050). Must match the hardware.
    pub sample_rate: u32,

    /// Requested output sample format (default: mono16).
    pub format: SampleFormat,

    /// Ring buffer capacity in frames (default: 1024).
    pub buffer_frames: usize,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.buffer_frames == 0 {
            return Err("capture buffer must hold at least one frame".into());
        }
        Ok(())
    }

    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat::new(self.sample_rate, self.format)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            format: SampleFormat::Mono16,
            buffer_frames: 1024,
        }
    }
}

/// Decision thresholds for the streaming append state machine.
///
/// Both values are in samples per channel, the unit of a streaming
/// buffer's `size`, `appendpos` and `streampos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingThresholds {
    /// Free space that is always worth filling, even partially.
    pub min_chunk: usize,

    /// Buffers below this size grow instead of wrapping.
    pub expand_threshold: usize,
}

impl Default for StreamingThresholds {
    fn default() -> Self {
        Self {
            min_chunk: 32768,
            expand_threshold: 262144,
        }
    }
}

/// Configuration for a mixing context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfiguration {
    /// Output sample rate in Hz (default: 44100).
    pub output_rate: u32,

    /// Output sample format (default: stereo16).
    pub output_format: SampleFormat,

    /// Frames accumulated per mixing pass (default: 1024).
    pub block_frames: usize,

    pub doppler_factor: f32,

    pub doppler_velocity: f32,

    /// Metres per second (default: 343.3).
    pub speed_of_sound: f32,

    pub distance_model: DistanceModel,

    pub streaming: StreamingThresholds,
}

impl ContextConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.output_rate == 0 {
            return Err("output rate must be positive".into());
        }
        if self.block_frames == 0 {
            return Err("block size must be at least one frame".into());
        }
        if !(self.doppler_factor >= 0.0) {
            return Err(format!("doppler factor must be >= 0, got {}", self.doppler_factor));
        }
        if !(self.doppler_velocity > 0.0) {
            return Err(format!(
                "doppler velocity must be positive, got {}",
                self.doppler_velocity
            ));
        }
        if !(self.speed_of_sound > 0.0) {
            return Err(format!(
                "speed of sound must be positive, got {}",
                self.speed_of_sound
            ));
        }
        if self.streaming.min_chunk == 0 {
            return Err("streaming min chunk must be positive".into());
        }
        Ok(())
    }
}

impl Default for ContextConfiguration {
    fn default() -> Self {
        Self {
            output_rate: 44100,
            output_format: SampleFormat::Stereo16,
            block_frames: 1024,
            doppler_factor: 1.0,
            doppler_velocity: 1.0,
            speed_of_sound: 343.3,
            distance_model: DistanceModel::InverseClamped,
            streaming: StreamingThresholds::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(CaptureConfiguration::default().validate().is_ok());
        assert!(ContextConfiguration::default().validate().is_ok());
    }

    #[test]
    fn capture_rejects_empty_ring() {
        let config = CaptureConfiguration {
            buffer_frames: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn context_rejects_bad_doppler() {
        let config = ContextConfiguration {
            doppler_velocity: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ContextConfiguration {
            doppler_factor: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ContextConfiguration =
            serde_json::from_str(r#"{ "output_rate": 22050, "distance_model": "none" }"#).unwrap();
        assert_eq!(config.output_rate, 22050);
        assert_eq!(config.distance_model, DistanceModel::None);
        assert_eq!(config.block_frames, 1024);
        assert_eq!(config.streaming, StreamingThresholds::default());
    }
}
