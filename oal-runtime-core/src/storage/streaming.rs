//! Append-while-playing support for streaming buffers.
//!
//! The application appends converted PCM at `appendpos` while the mixer
//! consumes from `streampos`. Each append picks exactly one strategy:
//!
//! ```text
//! size == 0                                   → first fill (allocate exactly)
//! free ≥ min_chunk  or  converted ≤ free      → fill toward the reader / end
//! size > expand, streampos > min_chunk,
//!     appendpos > streampos                   → wrap to the front
//! size < expand, streampos < appendpos
//!     (or the reader has drained the buffer)  → grow storage
//! otherwise                                   → reject (0 accepted)
//! ```
//!
//! A rejected append is backpressure, not an error: callers retry later,
//! see [`append_with_backoff`].

use std::thread;
use std::time::Duration;

use crate::models::config::StreamingThresholds;
use crate::models::error::AudioError;
use crate::models::format::{SampleFormat, StreamFormat};
use crate::processing::convert::monoify_into;
use crate::traits::sample_converter::SampleConverter;

use super::buffer::{Buffer, BufferHandle};

/// Strategy chosen for one append call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendStrategy {
    FirstFill,
    FillToEnd,
    WrapToFront,
    Grow,
    Reject,
}

/// Decision for one append, computed against the buffer's cursors before
/// any conversion work so that a failed conversion leaves the buffer as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendPlan {
    pub strategy: AppendStrategy,
    /// Per-channel offset the converted data lands at.
    pub copy_offset: usize,
    /// Per-channel samples reserved for the converted data.
    pub copy_frames: usize,
    /// Input frames to convert.
    pub input_frames: usize,
    /// Input samples reported back as consumed.
    pub accepted_samples: usize,
}

impl AppendPlan {
    fn reject() -> Self {
        Self {
            strategy: AppendStrategy::Reject,
            copy_offset: 0,
            copy_frames: 0,
            input_frames: 0,
            accepted_samples: 0,
        }
    }
}

impl Buffer {
    /// Choose the append strategy for `samples` interleaved input samples.
    ///
    /// Resets both cursors first if the reader has run past the end of
    /// storage (an underflow) or has consumed everything appended so far.
    pub fn plan_append(
        &mut self,
        format: SampleFormat,
        samples: usize,
        frequency: u32,
        converter: &dyn SampleConverter,
        thresholds: &StreamingThresholds,
    ) -> Result<AppendPlan, AudioError> {
        let id = self.id();
        let size = self.size;
        let frames_per_second = self.frequency();
        let Some(cursors) = self.stream.as_mut() else {
            return Err(AudioError::InvalidOperation(format!(
                "buffer {} was not created as a streaming buffer",
                id
            )));
        };

        let channels = format.channels() as usize;
        let whole_samples = samples - samples % channels;
        let in_frames = whole_samples / channels;
        if in_frames == 0 {
            return Ok(AppendPlan::reject());
        }

        let converted = converter.predict_frames(in_frames, frequency, frames_per_second);
        if converted == 0 {
            // Too short to produce a single output frame; swallow it.
            return Ok(AppendPlan {
                strategy: AppendStrategy::FillToEnd,
                copy_offset: cursors.appendpos,
                copy_frames: 0,
                input_frames: 0,
                accepted_samples: samples,
            });
        }

        if size == 0 {
            return Ok(AppendPlan {
                strategy: AppendStrategy::FirstFill,
                copy_offset: 0,
                copy_frames: converted,
                input_frames: in_frames,
                accepted_samples: samples,
            });
        }

        let drained = cursors.appendpos == cursors.streampos && !cursors.wrapped;
        let remaining = if cursors.streampos > size {
            log::debug!(
                "buffer {}: underflow, streampos {} past size {}",
                id,
                cursors.streampos,
                size
            );
            cursors.streampos = 0;
            cursors.appendpos = 0;
            size
        } else if drained {
            // The reader consumed everything that was appended.
            cursors.streampos = 0;
            cursors.appendpos = 0;
            size
        } else if cursors.appendpos > cursors.streampos {
            size - cursors.appendpos
        } else {
            cursors.streampos - cursors.appendpos
        };

        // Input consumed for `copy` of `converted` output frames, whole frames only.
        let scaled = |copy: usize| {
            if copy == converted {
                return (in_frames, samples);
            }
            let frames = in_frames * copy / converted;
            (frames, frames * channels)
        };

        let plan = if remaining >= thresholds.min_chunk || converted <= remaining {
            let copy = remaining.min(converted);
            let (input_frames, accepted_samples) = scaled(copy);
            log::debug!(
                "buffer {}: fill to end, free {} sp {} ap {}",
                id,
                remaining,
                cursors.streampos,
                cursors.appendpos
            );
            AppendPlan {
                strategy: AppendStrategy::FillToEnd,
                copy_offset: cursors.appendpos,
                copy_frames: copy,
                input_frames,
                accepted_samples,
            }
        } else if size > thresholds.expand_threshold
            && cursors.streampos > thresholds.min_chunk
            && cursors.appendpos > cursors.streampos
        {
            let copy = cursors.streampos.min(converted);
            let (input_frames, accepted_samples) = scaled(copy);
            log::debug!(
                "buffer {}: wrap to front, size {} sp {} ap {}",
                id,
                size,
                cursors.streampos,
                cursors.appendpos
            );
            AppendPlan {
                strategy: AppendStrategy::WrapToFront,
                copy_offset: 0,
                copy_frames: copy,
                input_frames,
                accepted_samples,
            }
        } else if size < thresholds.expand_threshold
            && (cursors.streampos < cursors.appendpos || drained)
        {
            log::debug!(
                "buffer {}: grow from {} to {}",
                id,
                size,
                cursors.appendpos + converted
            );
            AppendPlan {
                strategy: AppendStrategy::Grow,
                copy_offset: cursors.appendpos,
                copy_frames: converted,
                input_frames: in_frames,
                accepted_samples: samples,
            }
        } else {
            log::debug!(
                "buffer {}: not ready, size {} sp {} ap {} free {}",
                id,
                size,
                cursors.streampos,
                cursors.appendpos,
                remaining
            );
            AppendPlan::reject()
        };
        Ok(plan)
    }

    /// Store already converted, interleaved samples according to `plan`.
    ///
    /// Storage is reserved before anything is modified, so an allocation
    /// failure leaves the buffer unchanged. The append cursor advances by
    /// the frames actually stored, which a resampling converter may leave
    /// short of the planned copy.
    pub fn commit_append(
        &mut self,
        plan: &AppendPlan,
        converted: &[i16],
    ) -> Result<(), AudioError> {
        let channel_count = self.channels.len();
        let frames = (converted.len() / channel_count).min(plan.copy_frames);
        let data = &converted[..frames * channel_count];

        match plan.strategy {
            AppendStrategy::Reject => return Ok(()),
            AppendStrategy::FirstFill => {
                let mut channels = Vec::with_capacity(channel_count);
                for _ in 0..channel_count {
                    let mut channel = Vec::new();
                    channel
                        .try_reserve_exact(frames)
                        .map_err(|_| AudioError::OutOfMemory)?;
                    channel.resize(frames, 0);
                    channels.push(channel);
                }
                monoify_into(&mut channels, 0, data);
                self.channels = channels;
                self.size = frames;
                if let Some(cursors) = self.stream.as_mut() {
                    cursors.appendpos = frames;
                }
            }
            AppendStrategy::FillToEnd => {
                monoify_into(&mut self.channels, plan.copy_offset, data);
                if let Some(cursors) = self.stream.as_mut() {
                    cursors.appendpos = plan.copy_offset + frames;
                }
            }
            AppendStrategy::WrapToFront => {
                monoify_into(&mut self.channels, 0, data);
                if let Some(cursors) = self.stream.as_mut() {
                    cursors.appendpos = frames;
                    cursors.wrapped = true;
                }
            }
            AppendStrategy::Grow => {
                let end = plan.copy_offset + frames;
                let new_size = end.max(self.size);
                for channel in self.channels.iter_mut() {
                    channel
                        .try_reserve_exact(new_size.saturating_sub(channel.len()))
                        .map_err(|_| AudioError::OutOfMemory)?;
                }
                for channel in self.channels.iter_mut() {
                    channel.resize(new_size, 0);
                }
                monoify_into(&mut self.channels, plan.copy_offset, data);
                self.size = new_size;
                if let Some(cursors) = self.stream.as_mut() {
                    cursors.appendpos = end;
                }
            }
        }
        Ok(())
    }

    /// Plan, convert and store in one step. Returns input samples accepted.
    pub fn append_streaming_data(
        &mut self,
        format: SampleFormat,
        data: &[u8],
        frequency: u32,
        converter: &dyn SampleConverter,
        thresholds: &StreamingThresholds,
    ) -> Result<usize, AudioError> {
        let samples = data.len() / format.bytes_per_sample();
        let plan = self.plan_append(format, samples, frequency, converter, thresholds)?;
        let target = self.storage_format();
        let converted = convert_planned(&plan, format, data, frequency, target, converter)?;
        self.commit_append(&plan, &converted)?;
        Ok(plan.accepted_samples)
    }
}

fn convert_planned(
    plan: &AppendPlan,
    format: SampleFormat,
    data: &[u8],
    frequency: u32,
    target: StreamFormat,
    converter: &dyn SampleConverter,
) -> Result<Vec<i16>, AudioError> {
    let mut converted = Vec::new();
    if plan.input_frames == 0 {
        return Ok(converted);
    }
    let bytes = plan.input_frames * format.bytes_per_frame();
    converter.convert(
        &data[..bytes],
        StreamFormat::new(frequency, format),
        target,
        &mut converted,
    )?;
    Ok(converted)
}

impl BufferHandle {
    /// Append to a streaming buffer, converting outside the buffer lock.
    ///
    /// Returns the number of input samples accepted; 0 means the buffer is
    /// not ready and the caller should retry later.
    pub fn append_streaming_data(
        &self,
        format: SampleFormat,
        data: &[u8],
        frequency: u32,
        converter: &dyn SampleConverter,
        thresholds: &StreamingThresholds,
    ) -> Result<usize, AudioError> {
        let samples = data.len() / format.bytes_per_sample();
        let (plan, target) = {
            let mut buffer = self.lock();
            let plan = buffer.plan_append(format, samples, frequency, converter, thresholds)?;
            (plan, buffer.storage_format())
        };
        if plan.strategy == AppendStrategy::Reject {
            return Ok(0);
        }

        let converted = convert_planned(&plan, format, data, frequency, target, converter)?;
        self.lock().commit_append(&plan, &converted)?;
        Ok(plan.accepted_samples)
    }
}

/// Sleep schedule for [`append_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive rejected attempts tolerated before giving up.
    pub max_rejections: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(100),
            max_rejections: 64,
        }
    }
}

/// Keep appending until all of `data` is accepted.
///
/// Doubles the sleep after each rejected append and halves it after each
/// accepted one. Returns the total input samples accepted, which is short
/// of the full input only if the buffer kept rejecting.
pub fn append_with_backoff(
    handle: &BufferHandle,
    format: SampleFormat,
    data: &[u8],
    frequency: u32,
    converter: &dyn SampleConverter,
    thresholds: &StreamingThresholds,
    policy: &BackoffPolicy,
) -> Result<usize, AudioError> {
    let bytes_per_sample = format.bytes_per_sample();
    let total = data.len() / bytes_per_sample;
    let mut offset = 0;
    let mut delay = policy.initial_delay;
    let mut rejections = 0;

    while offset < total {
        let accepted = handle.append_streaming_data(
            format,
            &data[offset * bytes_per_sample..],
            frequency,
            converter,
            thresholds,
        )?;
        if accepted == 0 {
            rejections += 1;
            if rejections > policy.max_rejections {
                log::warn!(
                    "buffer {}: giving up after {} rejected appends",
                    handle.id(),
                    rejections - 1
                );
                break;
            }
            thread::sleep(delay);
            delay = (delay * 2).min(policy.max_delay);
        } else {
            rejections = 0;
            offset += accepted;
            delay = (delay / 2).max(policy.initial_delay);
        }
    }
    Ok(offset.min(total))
}
