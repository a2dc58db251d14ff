//! Fixed-point software mixer.
//!
//! Every `Playing` source is resampled with a Q16.16 read cursor, scaled by
//! its resolved dry/wet sends and accumulated into per-frame float buffers.
//! The accumulation is then saturated into the output sample format.
//!
//! Accumulation storage is allocated once when the mixer is created, so
//! [`Mixer::mix_block`] never allocates.

use crate::models::config::ContextConfiguration;
use crate::models::error::AudioError;
use crate::models::format::SampleFormat;
use crate::models::listener::Listener;
use crate::models::source::Source;
use crate::processing::convert::{encode_sample, saturate_i16};
use crate::processing::spatializer::{resolve, ResolvedParameters};
use crate::storage::buffer::Buffer;

pub const FRACTION_BITS: u32 = 16;
const FRACTION_ONE: u64 = 1 << FRACTION_BITS;
const FRACTION_MASK: u64 = FRACTION_ONE - 1;

/// Per-sample read increment in Q16.16 for `pitch` playing a buffer at
/// `buffer_rate` into `output_rate`. Never zero, so mixing always advances.
pub fn pitch_increment(pitch: f32, buffer_rate: u32, output_rate: u32) -> u64 {
    if buffer_rate == 0 || output_rate == 0 {
        return FRACTION_ONE;
    }
    let step = pitch as f64 * buffer_rate as f64 / output_rate as f64 * FRACTION_ONE as f64;
    if step.is_finite() {
        step.clamp(1.0, u32::MAX as f64) as u64
    } else {
        FRACTION_ONE
    }
}

/// Mixes playing sources into blocks of output PCM.
#[derive(Debug)]
pub struct Mixer {
    output_rate: u32,
    output_format: SampleFormat,
    block_frames: usize,
    dry: Vec<[f32; 2]>,
    wet: Vec<[f32; 2]>,
}

impl Mixer {
    pub fn new(
        output_rate: u32,
        output_format: SampleFormat,
        block_frames: usize,
    ) -> Result<Self, AudioError> {
        if output_rate == 0 || block_frames == 0 {
            return Err(AudioError::InvalidValue(
                "mixer needs a positive output rate and block size".into(),
            ));
        }
        let mut dry = Vec::new();
        let mut wet = Vec::new();
        dry.try_reserve_exact(block_frames)
            .map_err(|_| AudioError::OutOfMemory)?;
        wet.try_reserve_exact(block_frames)
            .map_err(|_| AudioError::OutOfMemory)?;
        dry.resize(block_frames, [0.0; 2]);
        wet.resize(block_frames, [0.0; 2]);
        Ok(Self {
            output_rate,
            output_format,
            block_frames,
            dry,
            wet,
        })
    }

    pub fn from_config(config: &ContextConfiguration) -> Result<Self, AudioError> {
        Self::new(config.output_rate, config.output_format, config.block_frames)
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn output_format(&self) -> SampleFormat {
        self.output_format
    }

    pub fn output_channels(&self) -> usize {
        self.output_format.channels() as usize
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Bytes [`Mixer::mix_block`] writes for a full block.
    pub fn block_bytes(&self) -> usize {
        self.block_frames * self.output_format.bytes_per_frame()
    }

    /// Mix one block into `out`.
    ///
    /// Renders `min(block_frames, out.len() / bytes_per_frame)` frames and
    /// returns that count. Sources that are not playing are skipped.
    pub fn mix_block<'a, I>(&mut self, sources: I, listener: &Listener, out: &mut [u8]) -> usize
    where
        I: IntoIterator<Item = &'a mut Source>,
    {
        let bytes_per_frame = self.output_format.bytes_per_frame();
        let frames = (out.len() / bytes_per_frame).min(self.block_frames);
        for frame in self.dry[..frames].iter_mut() {
            *frame = [0.0; 2];
        }
        for frame in self.wet[..frames].iter_mut() {
            *frame = [0.0; 2];
        }

        for source in sources {
            if source.state().is_playing() {
                self.mix_source(source, listener, frames);
            }
        }

        self.write_output(frames, &mut out[..frames * bytes_per_frame]);
        frames
    }

    fn mix_source(&mut self, source: &mut Source, listener: &Listener, frames: usize) {
        let output_channels = self.output_channels();
        let mut written = 0;
        let mut written_at_restart = None;

        while written < frames && source.state().is_playing() {
            let Some(handle) = source.current_buffer().cloned() else {
                source.finish();
                break;
            };
            let mut buffer = handle.lock();
            let params = resolve(
                source.properties(),
                listener,
                buffer.channel_count(),
                output_channels,
            );
            let increment = pitch_increment(params.pitch, buffer.frequency(), self.output_rate);
            let dry = &mut self.dry[written..frames];
            let wet = &mut self.wet[written..frames];

            if let Some(cursors) = buffer.stream_cursors() {
                let end = buffer.readable_end();
                if cursors.streampos >= end {
                    if buffer.set_stream_position(cursors.streampos) {
                        continue;
                    }
                    // Caught up with the writer: underrun, stay playing.
                    log::debug!("buffer {}: stream underrun", handle.id());
                    break;
                }
                let span = render_span(
                    &buffer,
                    cursors.streampos,
                    source.read_fraction,
                    end,
                    increment,
                    &params,
                    output_channels,
                    dry,
                    wet,
                );
                written += span.frames;
                source.read_fraction = span.fraction;
                buffer.set_stream_position(span.position);
                continue;
            }

            let end = buffer.size();
            if source.read_position < end {
                let span = render_span(
                    &buffer,
                    source.read_position,
                    source.read_fraction,
                    end,
                    increment,
                    &params,
                    output_channels,
                    dry,
                    wet,
                );
                written += span.frames;
                source.read_position = span.position;
                source.read_fraction = span.fraction;
                if span.position < end {
                    continue;
                }
            }
            drop(buffer);

            if source.advance_queue() {
                continue;
            }
            if source.properties().looping {
                if written_at_restart == Some(written) {
                    // A whole pass of the queue produced nothing.
                    source.finish();
                    break;
                }
                written_at_restart = Some(written);
                source.restart_loop();
            } else {
                source.finish();
            }
        }
    }

    fn write_output(&mut self, frames: usize, out: &mut [u8]) {
        let format = self.output_format;
        let channels = self.output_channels();
        let width = format.bytes_per_sample();
        for (i, frame) in out.chunks_exact_mut(format.bytes_per_frame()).enumerate().take(frames) {
            let dry = self.dry[i];
            let wet = self.wet[i];
            for c in 0..channels {
                let sample = saturate_i16(dry[c] + wet[c]);
                encode_sample(sample, format, &mut frame[c * width..]);
            }
        }
    }
}

struct Span {
    frames: usize,
    position: usize,
    fraction: u32,
}

/// Interpolate `buffer` from `position + fraction` toward `end`, filling
/// at most `dry.len()` frames. The neighbour of the last readable sample
/// is the sample itself.
#[allow(clippy::too_many_arguments)]
fn render_span(
    buffer: &Buffer,
    position: usize,
    fraction: u32,
    end: usize,
    increment: u64,
    params: &ResolvedParameters,
    output_channels: usize,
    dry: &mut [[f32; 2]],
    wet: &mut [[f32; 2]],
) -> Span {
    let start = ((position as u64) << FRACTION_BITS) | (fraction as u64 & FRACTION_MASK);
    let limit = (end as u64) << FRACTION_BITS;
    let remaining = limit.saturating_sub(start);
    let available = remaining.div_ceil(increment) as usize;
    let count = available.min(dry.len());

    let channels = &buffer.channels;
    let last = end - 1;
    let mut cursor = start;
    for i in 0..count {
        let k = (cursor >> FRACTION_BITS) as usize;
        let t = (cursor & FRACTION_MASK) as f32 / FRACTION_ONE as f32;
        let next = (k + 1).min(last);
        let sample = |c: usize| {
            let a = channels[c][k] as f32;
            let b = channels[c][next] as f32;
            a + (b - a) * t
        };

        match (channels.len(), output_channels) {
            (1, 1) => {
                let s = sample(0);
                dry[i][0] += s * params.dry[0];
                wet[i][0] += s * params.wet[0];
            }
            (1, _) => {
                let s = sample(0);
                for c in 0..2 {
                    dry[i][c] += s * params.dry[c];
                    wet[i][c] += s * params.wet[c];
                }
            }
            (_, 1) => {
                let s = (sample(0) + sample(1)) * 0.5;
                dry[i][0] += s * params.dry[0];
                wet[i][0] += s * params.wet[0];
            }
            _ => {
                for c in 0..2 {
                    let s = sample(c);
                    dry[i][c] += s * params.dry[c];
                    wet[i][c] += s * params.wet[c];
                }
            }
        }
        cursor += increment;
    }

    Span {
        frames: count,
        position: (cursor >> FRACTION_BITS) as usize,
        fraction: (cursor & FRACTION_MASK) as u32,
    }
}
