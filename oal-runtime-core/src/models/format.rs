use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::AudioError;

/// PCM sample layouts understood by buffers, capture devices and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
}

impl SampleFormat {
    pub fn channels(self) -> u16 {
        match self {
            Self::Mono8 | Self::Mono16 => 1,
            Self::Stereo8 | Self::Stereo16 => 2,
        }
    }

    pub fn bits_per_sample(self) -> u16 {
        match self {
            Self::Mono8 | Self::Stereo8 => 8,
            Self::Mono16 | Self::Stereo16 => 16,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        self.bits_per_sample() as usize / 8
    }

    pub fn bytes_per_frame(self) -> usize {
        self.bytes_per_sample() * self.channels() as usize
    }

    /// Looks up the format for a channel count and sample width.
    pub fn from_layout(channels: u16, bits_per_sample: u16) -> Result<Self, AudioError> {
        match (channels, bits_per_sample) {
            (1, 8) => Ok(Self::Mono8),
            (1, 16) => Ok(Self::Mono16),
            (2, 8) => Ok(Self::Stereo8),
            (2, 16) => Ok(Self::Stereo16),
            _ => Err(AudioError::UnsupportedFormat(format!(
                "{} channel(s) at {} bits",
                channels, bits_per_sample
            ))),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mono8 => "mono8",
            Self::Mono16 => "mono16",
            Self::Stereo8 => "stereo8",
            Self::Stereo16 => "stereo16",
        };
        f.write_str(name)
    }
}

/// A requested or negotiated stream description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels: format.channels(),
            bits_per_sample: format.bits_per_sample(),
        }
    }

    /// Resolves the byte layout of one frame.
    ///
    /// Only interleaved linear PCM is supported, so a packet is one frame.
    pub fn frame_layout(&self) -> Result<FrameLayout, AudioError> {
        if self.sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat("sample rate of 0 Hz".into()));
        }
        let format = SampleFormat::from_layout(self.channels, self.bits_per_sample)?;
        Ok(FrameLayout {
            format,
            sample_rate: self.sample_rate,
            bytes_per_frame: format.bytes_per_frame(),
            bytes_per_packet: format.bytes_per_frame(),
        })
    }
}

/// Concrete frame layout produced by format negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub bytes_per_frame: usize,
    pub bytes_per_packet: usize,
}

impl FrameLayout {
    pub fn channels(&self) -> u16 {
        self.format.channels()
    }
}

/// Direction of a hardware device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Capture,
    Playback,
}

/// A hardware (or software) device backing an input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub is_default: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_sizes() {
        assert_eq!(SampleFormat::Mono8.bytes_per_frame(), 1);
        assert_eq!(SampleFormat::Mono16.bytes_per_frame(), 2);
        assert_eq!(SampleFormat::Stereo8.bytes_per_frame(), 2);
        assert_eq!(SampleFormat::Stereo16.bytes_per_frame(), 4);
    }

    #[test]
    fn layout_from_stream_format() {
        let layout = StreamFormat::new(22050, SampleFormat::Stereo16).frame_layout().unwrap();
        assert_eq!(layout.bytes_per_frame, 4);
        assert_eq!(layout.bytes_per_packet, 4);
        assert_eq!(layout.channels(), 2);
    }

    #[test]
    fn unsupported_layouts_are_rejected() {
        let six_channels = StreamFormat {
            sample_rate: 48000,
            channels: 6,
            bits_per_sample: 16,
        };
        assert!(matches!(
            six_channels.frame_layout(),
            Err(AudioError::UnsupportedFormat(_))
        ));

        let no_rate = StreamFormat {
            sample_rate: 0,
            channels: 1,
            bits_per_sample: 16,
        };
        assert!(no_rate.frame_layout().is_err());
    }

    #[test]
    fn serde_names_are_lowercase() {
        let json = serde_json::to_string(&SampleFormat::Stereo16).unwrap();
        assert_eq!(json, "\"stereo16\"");
    }
}
