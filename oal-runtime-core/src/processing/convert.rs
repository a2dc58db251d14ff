//! PCM conversion helpers: decoding, channel mapping, resampling,
//! de-interleaving and saturating output encoding.

use crate::models::error::AudioError;
use crate::models::format::{SampleFormat, StreamFormat};
use crate::traits::sample_converter::SampleConverter;

/// Default converter: 8/16-bit decode, mono/stereo mapping and
/// linear-interpolation resampling.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearConverter;

impl SampleConverter for LinearConverter {
    fn convert(
        &self,
        data: &[u8],
        from: StreamFormat,
        to: StreamFormat,
        out: &mut Vec<i16>,
    ) -> Result<usize, AudioError> {
        let source = from.frame_layout()?.format;
        let target = to.frame_layout()?.format;
        if target.bits_per_sample() != 16 {
            return Err(AudioError::UnsupportedFormat(format!(
                "conversion target must be 16-bit, got {}",
                target
            )));
        }

        let decoded = decode_pcm(data, source)?;
        let mapped = map_channels(&decoded, source.channels(), target.channels())?;
        let channels = target.channels() as usize;
        let in_frames = mapped.len() / channels;
        let out_frames = self.predict_frames(in_frames, from.sample_rate, to.sample_rate);

        out.try_reserve(out_frames * channels)
            .map_err(|_| AudioError::OutOfMemory)?;
        resample_into(&mapped, channels, out_frames, out);
        Ok(out_frames)
    }

    fn predict_frames(&self, frames: usize, from_rate: u32, to_rate: u32) -> usize {
        if from_rate == to_rate || from_rate == 0 {
            return frames;
        }
        (frames as u64 * to_rate as u64 / from_rate as u64) as usize
    }
}

/// Decode interleaved PCM bytes into signed 16-bit samples.
///
/// Trailing bytes that do not form a whole frame are ignored.
pub fn decode_pcm(data: &[u8], format: SampleFormat) -> Result<Vec<i16>, AudioError> {
    let frame = format.bytes_per_frame();
    let usable = data.len() - data.len() % frame;
    let samples = usable / format.bytes_per_sample();

    let mut decoded = Vec::new();
    decoded.try_reserve_exact(samples).map_err(|_| AudioError::OutOfMemory)?;
    match format.bits_per_sample() {
        8 => decoded.extend(data[..usable].iter().map(|&b| u8_to_i16(b))),
        _ => decoded.extend(
            data[..usable]
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        ),
    }
    Ok(decoded)
}

fn map_channels(samples: &[i16], from: u16, to: u16) -> Result<Vec<i16>, AudioError> {
    if from == to {
        return Ok(samples.to_vec());
    }
    let mut mapped = Vec::new();
    match (from, to) {
        (1, 2) => {
            mapped
                .try_reserve_exact(samples.len() * 2)
                .map_err(|_| AudioError::OutOfMemory)?;
            for &s in samples {
                mapped.push(s);
                mapped.push(s);
            }
        }
        (2, 1) => {
            mapped
                .try_reserve_exact(samples.len() / 2)
                .map_err(|_| AudioError::OutOfMemory)?;
            mapped.extend(
                samples
                    .chunks_exact(2)
                    .map(|f| ((f[0] as i32 + f[1] as i32) / 2) as i16),
            );
        }
        _ => {
            return Err(AudioError::UnsupportedFormat(format!(
                "cannot map {} channel(s) to {}",
                from, to
            )))
        }
    }
    Ok(mapped)
}

/// Linear interpolation resampling of interleaved frames.
///
/// Produces exactly `out_frames` frames; the final source frame is held
/// when the read position runs past the end.
fn resample_into(samples: &[i16], channels: usize, out_frames: usize, out: &mut Vec<i16>) {
    let in_frames = samples.len() / channels;
    if in_frames == out_frames {
        out.extend_from_slice(&samples[..out_frames * channels]);
        return;
    }
    if in_frames == 0 {
        out.resize(out.len() + out_frames * channels, 0);
        return;
    }

    let ratio = in_frames as f64 / out_frames as f64;
    for i in 0..out_frames {
        let source_index = i as f64 * ratio;
        let index = (source_index as usize).min(in_frames - 1);
        let next = (index + 1).min(in_frames - 1);
        let fraction = (source_index - index as f64) as f32;
        for ch in 0..channels {
            let a = samples[index * channels + ch] as f32;
            let b = samples[next * channels + ch] as f32;
            out.push(saturate_i16(a + (b - a) * fraction));
        }
    }
}

/// Split interleaved samples into per-channel arrays starting at `offset`.
///
/// Frames that would land past the end of a channel array are dropped.
pub fn monoify_into(channels: &mut [Vec<i16>], offset: usize, interleaved: &[i16]) {
    let count = channels.len();
    if count == 0 {
        return;
    }
    for (frame_index, frame) in interleaved.chunks_exact(count).enumerate() {
        let position = offset + frame_index;
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            if let Some(slot) = channel.get_mut(position) {
                *slot = sample;
            }
        }
    }
}

/// Round and clamp an accumulated value to the 16-bit range.
#[inline]
pub fn saturate_i16(value: f32) -> i16 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[inline]
pub fn u8_to_i16(sample: u8) -> i16 {
    ((sample as i16) - 128) << 8
}

#[inline]
pub fn i16_to_u8(sample: i16) -> u8 {
    ((sample >> 8) + 128) as u8
}

/// Encode one 16-bit sample into `out` using the output sample width.
#[inline]
pub fn encode_sample(sample: i16, format: SampleFormat, out: &mut [u8]) {
    match format.bits_per_sample() {
        8 => out[0] = i16_to_u8(sample),
        _ => out[..2].copy_from_slice(&sample.to_le_bytes()),
    }
}
