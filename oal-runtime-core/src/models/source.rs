use std::collections::VecDeque;
use std::fmt;

use glam::Vec3;

use super::error::AudioError;
use super::listener::{finite, non_negative};
use super::state::{QueueEntryState, SourceState};
use crate::storage::buffer::BufferHandle;

/// Name of a source within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single source property, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceParam {
    Pitch(f32),
    Gain(f32),
    MinGain(f32),
    MaxGain(f32),
    ReferenceDistance(f32),
    MaxDistance(f32),
    RolloffFactor(f32),
    /// Degrees.
    ConeInnerAngle(f32),
    /// Degrees.
    ConeOuterAngle(f32),
    ConeOuterGain(f32),
    Position(Vec3),
    Velocity(Vec3),
    Direction(Vec3),
    /// Position and velocity are relative to the listener.
    Relative(bool),
    Looping(bool),
}

/// Property selector for [`Source::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceParamKind {
    Pitch,
    Gain,
    MinGain,
    MaxGain,
    ReferenceDistance,
    MaxDistance,
    RolloffFactor,
    ConeInnerAngle,
    ConeOuterAngle,
    ConeOuterGain,
    Position,
    Velocity,
    Direction,
    Relative,
    Looping,
}

impl SourceParam {
    pub fn kind(&self) -> SourceParamKind {
        match self {
            Self::Pitch(_) => SourceParamKind::Pitch,
            Self::Gain(_) => SourceParamKind::Gain,
            Self::MinGain(_) => SourceParamKind::MinGain,
            Self::MaxGain(_) => SourceParamKind::MaxGain,
            Self::ReferenceDistance(_) => SourceParamKind::ReferenceDistance,
            Self::MaxDistance(_) => SourceParamKind::MaxDistance,
            Self::RolloffFactor(_) => SourceParamKind::RolloffFactor,
            Self::ConeInnerAngle(_) => SourceParamKind::ConeInnerAngle,
            Self::ConeOuterAngle(_) => SourceParamKind::ConeOuterAngle,
            Self::ConeOuterGain(_) => SourceParamKind::ConeOuterGain,
            Self::Position(_) => SourceParamKind::Position,
            Self::Velocity(_) => SourceParamKind::Velocity,
            Self::Direction(_) => SourceParamKind::Direction,
            Self::Relative(_) => SourceParamKind::Relative,
            Self::Looping(_) => SourceParamKind::Looping,
        }
    }
}

/// Spatial and gain properties consumed by the parameter resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceProperties {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Zero means omnidirectional.
    pub direction: Vec3,
    pub gain: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    pub reference_distance: f32,
    pub max_distance: f32,
    pub rolloff_factor: f32,
    pub cone_inner_angle: f32,
    pub cone_outer_angle: f32,
    pub cone_outer_gain: f32,
    pub pitch: f32,
    pub relative: bool,
    pub looping: bool,
}

impl Default for SourceProperties {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            direction: Vec3::ZERO,
            gain: 1.0,
            min_gain: 0.0,
            max_gain: 1.0,
            reference_distance: 1.0,
            max_distance: f32::MAX,
            rolloff_factor: 1.0,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
            pitch: 1.0,
            relative: false,
            looping: false,
        }
    }
}

/// One queued buffer and whether the mixer has finished with it.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub buffer: BufferHandle,
    pub state: QueueEntryState,
}

impl QueueEntry {
    fn pending(buffer: BufferHandle) -> Self {
        Self {
            buffer,
            state: QueueEntryState::Pending,
        }
    }
}

/// A positioned sound emitter with a FIFO queue of buffers.
#[derive(Debug)]
pub struct Source {
    id: SourceId,
    properties: SourceProperties,
    state: SourceState,
    queue: VecDeque<QueueEntry>,
    /// Index of the queue entry being mixed.
    pub(crate) current: usize,
    /// Integer read position within the current static buffer.
    pub(crate) read_position: usize,
    /// Sub-sample read position, Q16.16 fraction bits.
    pub(crate) read_fraction: u32,
}

impl Source {
    pub fn new(id: SourceId) -> Self {
        Self {
            id,
            properties: SourceProperties::default(),
            state: SourceState::Initial,
            queue: VecDeque::new(),
            current: 0,
            read_position: 0,
            read_fraction: 0,
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn properties(&self) -> &SourceProperties {
        &self.properties
    }

    pub fn set(&mut self, param: SourceParam) -> Result<(), AudioError> {
        let p = &mut self.properties;
        match param {
            SourceParam::Pitch(pitch) => {
                if !(pitch > 0.0 && pitch.is_finite()) {
                    return Err(AudioError::InvalidValue(format!(
                        "pitch must be positive, got {}",
                        pitch
                    )));
                }
                p.pitch = pitch;
            }
            SourceParam::Gain(gain) => p.gain = non_negative("gain", gain)?,
            SourceParam::MinGain(gain) => p.min_gain = unit_range("min gain", gain)?,
            SourceParam::MaxGain(gain) => p.max_gain = unit_range("max gain", gain)?,
            SourceParam::ReferenceDistance(d) => {
                p.reference_distance = non_negative("reference distance", d)?;
            }
            SourceParam::MaxDistance(d) => p.max_distance = non_negative("max distance", d)?,
            SourceParam::RolloffFactor(r) => p.rolloff_factor = non_negative("rolloff factor", r)?,
            SourceParam::ConeInnerAngle(a) => {
                p.cone_inner_angle = cone_angle("cone inner angle", a)?;
            }
            SourceParam::ConeOuterAngle(a) => {
                p.cone_outer_angle = cone_angle("cone outer angle", a)?;
            }
            SourceParam::ConeOuterGain(g) => p.cone_outer_gain = unit_range("cone outer gain", g)?,
            SourceParam::Position(v) => p.position = finite("position", v)?,
            SourceParam::Velocity(v) => p.velocity = finite("velocity", v)?,
            SourceParam::Direction(v) => p.direction = finite("direction", v)?,
            SourceParam::Relative(relative) => p.relative = relative,
            SourceParam::Looping(looping) => p.looping = looping,
        }
        Ok(())
    }

    pub fn get(&self, kind: SourceParamKind) -> SourceParam {
        let p = &self.properties;
        match kind {
            SourceParamKind::Pitch => SourceParam::Pitch(p.pitch),
            SourceParamKind::Gain => SourceParam::Gain(p.gain),
            SourceParamKind::MinGain => SourceParam::MinGain(p.min_gain),
            SourceParamKind::MaxGain => SourceParam::MaxGain(p.max_gain),
            SourceParamKind::ReferenceDistance => {
                SourceParam::ReferenceDistance(p.reference_distance)
            }
            SourceParamKind::MaxDistance => SourceParam::MaxDistance(p.max_distance),
            SourceParamKind::RolloffFactor => SourceParam::RolloffFactor(p.rolloff_factor),
            SourceParamKind::ConeInnerAngle => SourceParam::ConeInnerAngle(p.cone_inner_angle),
            SourceParamKind::ConeOuterAngle => SourceParam::ConeOuterAngle(p.cone_outer_angle),
            SourceParamKind::ConeOuterGain => SourceParam::ConeOuterGain(p.cone_outer_gain),
            SourceParamKind::Position => SourceParam::Position(p.position),
            SourceParamKind::Velocity => SourceParam::Velocity(p.velocity),
            SourceParamKind::Direction => SourceParam::Direction(p.direction),
            SourceParamKind::Relative => SourceParam::Relative(p.relative),
            SourceParamKind::Looping => SourceParam::Looping(p.looping),
        }
    }

    // ---- transport ----

    /// Start playback. Initial, stopped and playing sources restart from
    /// the first queued buffer; paused sources resume where they were.
    pub fn play(&mut self) {
        if self.queue.is_empty() {
            self.state = SourceState::Stopped;
            return;
        }
        if !self.state.is_paused() {
            self.reset_queue();
        }
        self.state = SourceState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state.is_playing() {
            self.state = SourceState::Paused;
        }
    }

    /// Stop playback and mark every queued buffer processed.
    pub fn stop(&mut self) {
        for entry in self.queue.iter_mut() {
            entry.state = QueueEntryState::Processed;
        }
        self.current = self.queue.len();
        self.read_position = 0;
        self.read_fraction = 0;
        self.state = SourceState::Stopped;
    }

    /// Return to the initial state at the start of the queue.
    pub fn rewind(&mut self) {
        self.reset_queue();
        self.state = SourceState::Initial;
    }

    fn reset_queue(&mut self) {
        for entry in self.queue.iter_mut() {
            entry.state = QueueEntryState::Pending;
        }
        self.current = 0;
        self.read_position = 0;
        self.read_fraction = 0;
    }

    // ---- queue ----

    /// Replace the queue with a single buffer, or empty it.
    ///
    /// Only legal while the source is initial or stopped.
    pub fn set_buffer(&mut self, buffer: Option<BufferHandle>) -> Result<(), AudioError> {
        if !self.state.restarts_on_play() {
            return Err(AudioError::InvalidOperation(format!(
                "source {} must be stopped to change its buffer",
                self.id
            )));
        }
        self.queue.clear();
        if let Some(buffer) = buffer {
            self.queue.push_back(QueueEntry::pending(buffer));
        }
        self.reset_queue();
        Ok(())
    }

    /// Append buffers to the end of the queue.
    ///
    /// All queued buffers must share one channel layout; nothing is queued
    /// if any buffer does not match.
    pub fn queue_buffers(&mut self, buffers: &[BufferHandle]) -> Result<(), AudioError> {
        let expected = self
            .queue
            .front()
            .map(|entry| entry.buffer.lock().channel_count())
            .or_else(|| buffers.first().map(|b| b.lock().channel_count()));
        if let Some(expected) = expected {
            if let Some(bad) = buffers.iter().find(|b| b.lock().channel_count() != expected) {
                return Err(AudioError::InvalidOperation(format!(
                    "buffer {} does not match the queue's channel layout",
                    bad.id()
                )));
            }
        }
        self.queue
            .extend(buffers.iter().cloned().map(QueueEntry::pending));
        Ok(())
    }

    /// Remove `count` processed buffers from the front of the queue.
    pub fn unqueue_buffers(&mut self, count: usize) -> Result<Vec<BufferHandle>, AudioError> {
        let processed = self.buffers_processed();
        if count > processed {
            return Err(AudioError::InvalidValue(format!(
                "cannot unqueue {} buffers, only {} processed",
                count, processed
            )));
        }
        let removed: Vec<BufferHandle> = self.queue.drain(..count).map(|e| e.buffer).collect();
        self.current = self.current.saturating_sub(count);
        Ok(removed)
    }

    pub fn buffers_queued(&self) -> usize {
        self.queue.len()
    }

    pub fn buffers_processed(&self) -> usize {
        self.queue
            .iter()
            .take_while(|entry| entry.state.is_processed())
            .count()
    }

    /// Whether any queued entry refers to `buffer`.
    pub fn holds(&self, buffer: &BufferHandle) -> bool {
        self.queue.iter().any(|e| e.buffer.same_buffer(buffer))
    }

    // ---- mixer hooks ----

    pub(crate) fn current_buffer(&self) -> Option<&BufferHandle> {
        self.queue.get(self.current).map(|e| &e.buffer)
    }

    /// Finish the current entry and move to the next one.
    ///
    /// Returns `false` when the queue is exhausted. Looping sources leave
    /// entries pending since they will be played again.
    pub(crate) fn advance_queue(&mut self) -> bool {
        if !self.properties.looping {
            if let Some(entry) = self.queue.get_mut(self.current) {
                entry.state = QueueEntryState::Processed;
            }
        }
        self.current += 1;
        self.read_position = 0;
        self.read_fraction = 0;
        self.current < self.queue.len()
    }

    /// Rewind to the first entry and keep playing.
    pub(crate) fn restart_loop(&mut self) {
        self.reset_queue();
        self.state = SourceState::Playing;
    }

    /// Stop after the queue ran out during mixing.
    pub(crate) fn finish(&mut self) {
        self.stop();
    }
}

fn unit_range(name: &str, value: f32) -> Result<f32, AudioError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(AudioError::InvalidValue(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

fn cone_angle(name: &str, value: f32) -> Result<f32, AudioError> {
    if (0.0..=360.0).contains(&value) {
        Ok(value)
    } else {
        Err(AudioError::InvalidValue(format!(
            "{} must be within [0, 360], got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::SampleFormat;
    use crate::storage::buffer::{Buffer, BufferId};

    fn handle(id: u32) -> BufferHandle {
        BufferHandle::new(Buffer::new(BufferId(id)))
    }

    fn stereo_handle(id: u32) -> BufferHandle {
        BufferHandle::new(Buffer::streaming(BufferId(id), SampleFormat::Stereo16, 22050))
    }

    #[test]
    fn defaults_match_openal() {
        let source = Source::new(SourceId(1));
        let p = source.properties();
        assert_eq!(p.pitch, 1.0);
        assert_eq!(p.cone_inner_angle, 360.0);
        assert_eq!(p.cone_outer_angle, 360.0);
        assert_eq!(p.max_distance, f32::MAX);
        assert_eq!(source.state(), SourceState::Initial);
    }

    #[test]
    fn set_then_get() {
        let mut source = Source::new(SourceId(1));
        source.set(SourceParam::Position(Vec3::new(1.0, 2.0, 3.0))).unwrap();
        source.set(SourceParam::ConeOuterGain(0.25)).unwrap();
        assert_eq!(
            source.get(SourceParamKind::Position),
            SourceParam::Position(Vec3::new(1.0, 2.0, 3.0))
        );
        assert_eq!(source.get(SourceParamKind::ConeOuterGain), SourceParam::ConeOuterGain(0.25));
        assert_eq!(SourceParam::Looping(true).kind(), SourceParamKind::Looping);
    }

    #[test]
    fn out_of_range_values_rejected() {
        let mut source = Source::new(SourceId(1));
        for param in [
            SourceParam::Pitch(0.0),
            SourceParam::Gain(-1.0),
            SourceParam::ConeOuterGain(1.5),
            SourceParam::ConeInnerAngle(400.0),
            SourceParam::ReferenceDistance(-0.1),
            SourceParam::Velocity(Vec3::new(f32::NAN, 0.0, 0.0)),
        ] {
            assert!(
                matches!(source.set(param), Err(AudioError::InvalidValue(_))),
                "{:?} accepted",
                param
            );
        }
        assert_eq!(*source.properties(), SourceProperties::default());
    }

    #[test]
    fn play_without_buffers_stops() {
        let mut source = Source::new(SourceId(1));
        source.play();
        assert_eq!(source.state(), SourceState::Stopped);
    }

    #[test]
    fn pause_and_resume_keep_position() {
        let mut source = Source::new(SourceId(1));
        source.set_buffer(Some(handle(1))).unwrap();
        source.play();
        source.read_position = 40;
        source.pause();
        assert_eq!(source.state(), SourceState::Paused);
        source.play();
        assert_eq!(source.state(), SourceState::Playing);
        assert_eq!(source.read_position, 40);
    }

    #[test]
    fn stop_marks_everything_processed() {
        let mut source = Source::new(SourceId(1));
        source.queue_buffers(&[handle(1), handle(2)]).unwrap();
        source.play();
        source.stop();
        assert_eq!(source.buffers_processed(), 2);

        let removed = source.unqueue_buffers(2).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(source.buffers_queued(), 0);
    }

    #[test]
    fn unqueue_refuses_pending_buffers() {
        let mut source = Source::new(SourceId(1));
        source.queue_buffers(&[handle(1), handle(2)]).unwrap();
        source.play();
        assert!(source.advance_queue());
        assert_eq!(source.buffers_processed(), 1);

        assert!(matches!(source.unqueue_buffers(2), Err(AudioError::InvalidValue(_))));
        let removed = source.unqueue_buffers(1).unwrap();
        assert_eq!(removed[0].id(), BufferId(1));
        assert_eq!(source.current, 0);
        assert_eq!(source.current_buffer().unwrap().id(), BufferId(2));
    }

    #[test]
    fn set_buffer_requires_stopped_source() {
        let mut source = Source::new(SourceId(1));
        source.set_buffer(Some(handle(1))).unwrap();
        source.play();
        assert!(matches!(
            source.set_buffer(None),
            Err(AudioError::InvalidOperation(_))
        ));
        source.stop();
        source.set_buffer(None).unwrap();
        assert_eq!(source.buffers_queued(), 0);
    }

    #[test]
    fn queue_rejects_mixed_layouts() {
        let mut source = Source::new(SourceId(1));
        source.queue_buffers(&[handle(1)]).unwrap();
        assert!(matches!(
            source.queue_buffers(&[handle(2), stereo_handle(3)]),
            Err(AudioError::InvalidOperation(_))
        ));
        assert_eq!(source.buffers_queued(), 1);
    }

    #[test]
    fn looping_keeps_entries_pending() {
        let mut source = Source::new(SourceId(1));
        source.set(SourceParam::Looping(true)).unwrap();
        source.queue_buffers(&[handle(1)]).unwrap();
        source.play();
        assert!(!source.advance_queue());
        assert_eq!(source.buffers_processed(), 0);
        source.restart_loop();
        assert_eq!(source.current, 0);
        assert!(source.state().is_playing());
    }

    #[test]
    fn queued_handles_count_as_references() {
        let buffer = handle(5);
        let mut source = Source::new(SourceId(1));
        source.queue_buffers(&[buffer.clone()]).unwrap();
        assert_eq!(buffer.reference_count(), 2);
        assert!(source.holds(&buffer));
        drop(source);
        assert_eq!(buffer.reference_count(), 1);
    }
}
