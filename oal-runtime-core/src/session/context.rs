use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::models::config::ContextConfiguration;
use crate::models::error::AudioError;
use crate::models::format::{SampleFormat, StreamFormat};
use crate::models::listener::{Listener, ListenerParam};
use crate::models::source::{Source, SourceId, SourceParam, SourceParamKind};
use crate::models::state::SourceState;
use crate::processing::convert::LinearConverter;
use crate::processing::mixer::Mixer;
use crate::storage::buffer::{Buffer, BufferHandle, BufferId};
use crate::storage::streaming::{append_with_backoff, BackoffPolicy};
use crate::traits::hardware_output::{HardwareOutput, OutputCallback};
use crate::traits::sample_converter::SampleConverter;

/// Everything the mixer reads, guarded as one unit.
struct ContextState {
    listener: Listener,
    sources: BTreeMap<SourceId, Source>,
    buffers: BTreeMap<BufferId, BufferHandle>,
    next_source: u32,
    next_buffer: u32,
    mixer: Mixer,
}

impl ContextState {
    fn source(&self, id: SourceId) -> Result<&Source, AudioError> {
        self.sources.get(&id).ok_or(AudioError::InvalidName(id.0))
    }

    fn source_mut(&mut self, id: SourceId) -> Result<&mut Source, AudioError> {
        self.sources.get_mut(&id).ok_or(AudioError::InvalidName(id.0))
    }

    fn buffer(&self, id: BufferId) -> Result<&BufferHandle, AudioError> {
        self.buffers.get(&id).ok_or(AudioError::InvalidName(id.0))
    }

    fn check_sources(&self, ids: &[SourceId]) -> Result<(), AudioError> {
        for id in ids {
            self.source(*id)?;
        }
        Ok(())
    }

    fn insert_buffer(&mut self, make: impl FnOnce(BufferId) -> Buffer) -> BufferId {
        self.next_buffer += 1;
        let id = BufferId(self.next_buffer);
        self.buffers.insert(id, BufferHandle::new(make(id)));
        id
    }

    fn mix(&mut self, out: &mut [u8]) -> usize {
        let block_bytes = self.mixer.block_bytes();
        let bytes_per_frame = self.mixer.output_format().bytes_per_frame();
        let mut frames = 0;
        let whole = out.len() - out.len() % bytes_per_frame;
        let (body, tail) = out.split_at_mut(whole);
        for chunk in body.chunks_mut(block_bytes) {
            frames += self
                .mixer
                .mix_block(self.sources.values_mut(), &self.listener, chunk);
        }
        tail.fill(0);
        frames
    }
}

/// A mixing context: listener, sources and buffers plus the mixer that
/// renders them.
///
/// All state sits behind one mutex. Each method holds it for the duration
/// of one API call; [`AudioContext::suspend`] holds it across several so
/// the mixer never observes a half-applied batch of changes.
pub struct AudioContext {
    config: ContextConfiguration,
    converter: Box<dyn SampleConverter>,
    state: Arc<Mutex<ContextState>>,
}

impl AudioContext {
    pub fn new(config: ContextConfiguration) -> Result<Self, AudioError> {
        Self::with_converter(config, Box::new(LinearConverter))
    }

    pub fn with_converter(
        config: ContextConfiguration,
        converter: Box<dyn SampleConverter>,
    ) -> Result<Self, AudioError> {
        config.validate().map_err(AudioError::ConfigurationFailed)?;
        let mixer = Mixer::from_config(&config)?;
        let state = ContextState {
            listener: Listener::from_config(&config),
            sources: BTreeMap::new(),
            buffers: BTreeMap::new(),
            next_source: 0,
            next_buffer: 0,
            mixer,
        };
        log::debug!(
            "context created: {} Hz {}, {} frame blocks",
            config.output_rate,
            config.output_format,
            config.block_frames
        );
        Ok(Self {
            config,
            converter,
            state: Arc::new(Mutex::new(state)),
        })
    }

    pub fn config(&self) -> &ContextConfiguration {
        &self.config
    }

    /// Hold the context lock across several updates.
    pub fn suspend(&self) -> SuspendedContext<'_> {
        SuspendedContext {
            state: self.state.lock(),
        }
    }

    // ---- listener ----

    pub fn set_listener(&self, param: ListenerParam) -> Result<(), AudioError> {
        self.state.lock().listener.set(param)
    }

    pub fn listener(&self) -> Listener {
        self.state.lock().listener.clone()
    }

    // ---- sources ----

    pub fn gen_sources(&self, count: usize) -> Vec<SourceId> {
        let mut state = self.state.lock();
        (0..count)
            .map(|_| {
                state.next_source += 1;
                let id = SourceId(state.next_source);
                state.sources.insert(id, Source::new(id));
                id
            })
            .collect()
    }

    /// Delete sources, releasing their buffer references. Nothing is
    /// deleted if any name is invalid.
    pub fn delete_sources(&self, ids: &[SourceId]) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        state.check_sources(ids)?;
        for id in ids {
            state.sources.remove(id);
        }
        Ok(())
    }

    pub fn is_source(&self, id: SourceId) -> bool {
        self.state.lock().sources.contains_key(&id)
    }

    pub fn set_source(&self, id: SourceId, param: SourceParam) -> Result<(), AudioError> {
        self.state.lock().source_mut(id)?.set(param)
    }

    pub fn get_source(
        &self,
        id: SourceId,
        kind: SourceParamKind,
    ) -> Result<SourceParam, AudioError> {
        Ok(self.state.lock().source(id)?.get(kind))
    }

    pub fn source_state(&self, id: SourceId) -> Result<SourceState, AudioError> {
        Ok(self.state.lock().source(id)?.state())
    }

    pub fn play(&self, ids: &[SourceId]) -> Result<(), AudioError> {
        self.transport(ids, Source::play)
    }

    pub fn pause(&self, ids: &[SourceId]) -> Result<(), AudioError> {
        self.transport(ids, Source::pause)
    }

    pub fn stop(&self, ids: &[SourceId]) -> Result<(), AudioError> {
        self.transport(ids, Source::stop)
    }

    pub fn rewind(&self, ids: &[SourceId]) -> Result<(), AudioError> {
        self.transport(ids, Source::rewind)
    }

    fn transport(&self, ids: &[SourceId], action: fn(&mut Source)) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        state.check_sources(ids)?;
        for id in ids {
            action(state.source_mut(*id)?);
        }
        Ok(())
    }

    /// Attach a single buffer to a source, or detach with `None`.
    pub fn set_source_buffer(
        &self,
        id: SourceId,
        buffer: Option<BufferId>,
    ) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        let handle = buffer.map(|b| state.buffer(b).cloned()).transpose()?;
        state.source_mut(id)?.set_buffer(handle)
    }

    pub fn queue_buffers(&self, id: SourceId, buffers: &[BufferId]) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        let handles = buffers
            .iter()
            .map(|b| state.buffer(*b).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        state.source_mut(id)?.queue_buffers(&handles)
    }

    pub fn unqueue_buffers(&self, id: SourceId, count: usize) -> Result<Vec<BufferId>, AudioError> {
        let mut state = self.state.lock();
        let removed = state.source_mut(id)?.unqueue_buffers(count)?;
        Ok(removed.iter().map(BufferHandle::id).collect())
    }

    pub fn buffers_queued(&self, id: SourceId) -> Result<usize, AudioError> {
        Ok(self.state.lock().source(id)?.buffers_queued())
    }

    pub fn buffers_processed(&self, id: SourceId) -> Result<usize, AudioError> {
        Ok(self.state.lock().source(id)?.buffers_processed())
    }

    // ---- buffers ----

    pub fn gen_buffers(&self, count: usize) -> Vec<BufferId> {
        let mut state = self.state.lock();
        (0..count).map(|_| state.insert_buffer(Buffer::new)).collect()
    }

    /// Create buffers that accept [`AudioContext::append_streaming_data`].
    pub fn gen_streaming_buffers(
        &self,
        count: usize,
        format: SampleFormat,
        frequency: u32,
    ) -> Result<Vec<BufferId>, AudioError> {
        if frequency == 0 {
            return Err(AudioError::InvalidValue(
                "streaming buffer frequency must be positive".into(),
            ));
        }
        let mut state = self.state.lock();
        Ok((0..count)
            .map(|_| state.insert_buffer(|id| Buffer::streaming(id, format, frequency)))
            .collect())
    }

    /// Delete buffers. Refused with [`AudioError::BufferInUse`] while any
    /// source still holds one of them; nothing is deleted on failure.
    pub fn delete_buffers(&self, ids: &[BufferId]) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        for id in ids {
            let handle = state.buffer(*id)?;
            if handle.reference_count() > 1 {
                return Err(AudioError::BufferInUse(id.0));
            }
        }
        for id in ids {
            state.buffers.remove(id);
        }
        Ok(())
    }

    pub fn is_buffer(&self, id: BufferId) -> bool {
        self.state.lock().buffers.contains_key(&id)
    }

    /// Fill a static buffer, converting `data` to the buffer's 16-bit storage.
    ///
    /// The context stays locked throughout, so no source can attach the
    /// buffer between the check and the fill.
    pub fn buffer_data(
        &self,
        id: BufferId,
        format: SampleFormat,
        data: &[u8],
        frequency: u32,
    ) -> Result<(), AudioError> {
        let state = self.state.lock();
        let handle = state.buffer(id)?;
        if state.sources.values().any(|source| source.holds(handle)) {
            return Err(AudioError::InvalidOperation(format!(
                "buffer {} is attached to a source",
                id
            )));
        }
        let result = handle
            .lock()
            .set_data(format, data, frequency, self.converter.as_ref());
        result
    }

    /// Append to a streaming buffer; returns input samples accepted.
    ///
    /// Only the buffer is locked, and not while converting, so this may run
    /// concurrently with mixing.
    pub fn append_streaming_data(
        &self,
        id: BufferId,
        format: SampleFormat,
        data: &[u8],
        frequency: u32,
    ) -> Result<usize, AudioError> {
        let handle = self.detached_handle(id)?;
        handle.append_streaming_data(
            format,
            data,
            frequency,
            self.converter.as_ref(),
            &self.config.streaming,
        )
    }

    /// Append all of `data`, sleeping while the buffer pushes back.
    pub fn append_with_backoff(
        &self,
        id: BufferId,
        format: SampleFormat,
        data: &[u8],
        frequency: u32,
        policy: &BackoffPolicy,
    ) -> Result<usize, AudioError> {
        let handle = self.detached_handle(id)?;
        append_with_backoff(
            &handle,
            format,
            data,
            frequency,
            self.converter.as_ref(),
            &self.config.streaming,
            policy,
        )
    }

    /// Read a buffer without taking a long-lived reference to it.
    pub fn inspect_buffer<R>(
        &self,
        id: BufferId,
        f: impl FnOnce(&Buffer) -> R,
    ) -> Result<R, AudioError> {
        let handle = self.detached_handle(id)?;
        let buffer = handle.lock();
        Ok(f(&buffer))
    }

    fn detached_handle(&self, id: BufferId) -> Result<BufferHandle, AudioError> {
        self.state.lock().buffer(id).cloned()
    }

    // ---- output ----

    /// Render as many whole frames as fit in `out`; returns frames written.
    pub fn mix(&self, out: &mut [u8]) -> usize {
        self.state.lock().mix(out)
    }

    /// Callback rendering this context, for a [`HardwareOutput`].
    pub fn render_callback(&self) -> OutputCallback {
        let state = Arc::clone(&self.state);
        Box::new(move |out: &mut [u8]| {
            state.lock().mix(out);
        })
    }

    /// Negotiate the output format with `output` and start it rendering
    /// this context.
    pub fn attach_output<O: HardwareOutput>(&self, output: &mut O) -> Result<(), AudioError> {
        let requested = StreamFormat::new(self.config.output_rate, self.config.output_format);
        let native = output.negotiate(&requested)?;
        if native.sample_rate != requested.sample_rate {
            return Err(AudioError::FormatMismatch {
                requested: requested.sample_rate,
                native: native.sample_rate,
            });
        }
        if native != requested {
            return Err(AudioError::UnsupportedFormat(format!(
                "output delivers {} channel(s) at {} bits, {} requested",
                native.channels, native.bits_per_sample, self.config.output_format
            )));
        }
        output.start(self.render_callback())?;
        log::debug!("context attached to {}", output.device_info().name);
        Ok(())
    }
}

/// Exclusive access to a context for a batch of updates.
///
/// The mixer is held off until this guard is dropped.
pub struct SuspendedContext<'a> {
    state: MutexGuard<'a, ContextState>,
}

impl SuspendedContext<'_> {
    pub fn set_listener(&mut self, param: ListenerParam) -> Result<(), AudioError> {
        self.state.listener.set(param)
    }

    pub fn source_mut(&mut self, id: SourceId) -> Result<&mut Source, AudioError> {
        self.state.source_mut(id)
    }

    pub fn source(&self, id: SourceId) -> Result<&Source, AudioError> {
        self.state.source(id)
    }
}
