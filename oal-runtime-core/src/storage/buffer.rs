use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::models::error::AudioError;
use crate::models::format::{SampleFormat, StreamFormat};
use crate::processing::convert::monoify_into;
use crate::traits::sample_converter::SampleConverter;

/// Name of a buffer within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append/read cursors of a streaming buffer, in samples per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamCursors {
    pub appendpos: usize,
    pub streampos: usize,
    /// The append cursor looped to the front; cleared when the reader follows.
    pub wrapped: bool,
}

/// Decoded sample storage, de-interleaved into one 16-bit array per channel.
pub struct Buffer {
    id: BufferId,
    format: SampleFormat,
    frequency: u32,
    pub(crate) channels: Vec<Vec<i16>>,
    pub(crate) size: usize,
    pub(crate) stream: Option<StreamCursors>,
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("frequency", &self.frequency)
            .field("size", &self.size)
            .field("stream", &self.stream)
            .finish()
    }
}

impl Buffer {
    /// An empty static buffer. Its layout is set by [`Buffer::set_data`].
    pub fn new(id: BufferId) -> Self {
        Self {
            id,
            format: SampleFormat::Mono16,
            frequency: 0,
            channels: vec![Vec::new()],
            size: 0,
            stream: None,
        }
    }

    /// An empty streaming buffer storing `format`'s channels at `frequency`.
    ///
    /// Storage is allocated by the first append.
    pub fn streaming(id: BufferId, format: SampleFormat, frequency: u32) -> Self {
        Self {
            id,
            format: stored_format(format),
            frequency,
            channels: vec![Vec::new(); format.channels() as usize],
            size: 0,
            stream: Some(StreamCursors::default()),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Stored layout; always 16-bit.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn channel(&self, index: usize) -> &[i16] {
        &self.channels[index][..self.size]
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream_cursors(&self) -> Option<StreamCursors> {
        self.stream
    }

    /// Target layout handed to the sample converter.
    pub fn storage_format(&self) -> StreamFormat {
        StreamFormat::new(self.frequency, self.format)
    }

    /// Replace the contents of a static buffer with converted `data`.
    pub fn set_data(
        &mut self,
        format: SampleFormat,
        data: &[u8],
        frequency: u32,
        converter: &dyn SampleConverter,
    ) -> Result<(), AudioError> {
        if self.is_streaming() {
            return Err(AudioError::InvalidOperation(format!(
                "buffer {} is a streaming buffer",
                self.id
            )));
        }
        if frequency == 0 {
            return Err(AudioError::InvalidValue("buffer frequency must be positive".into()));
        }

        let from = StreamFormat::new(frequency, format);
        let to = StreamFormat::new(frequency, stored_format(format));
        let mut interleaved = Vec::new();
        let frames = converter.convert(data, from, to, &mut interleaved)?;

        let mut channels = Vec::with_capacity(format.channels() as usize);
        for _ in 0..format.channels() {
            let mut channel = Vec::new();
            channel
                .try_reserve_exact(frames)
                .map_err(|_| AudioError::OutOfMemory)?;
            channel.resize(frames, 0);
            channels.push(channel);
        }
        monoify_into(&mut channels, 0, &interleaved);

        self.format = to.frame_layout()?.format;
        self.frequency = frequency;
        self.channels = channels;
        self.size = frames;
        Ok(())
    }

    /// Last readable sample position for the mixer.
    ///
    /// Static buffers are readable to their end. A streaming buffer is
    /// readable up to the append cursor, or to the end of storage while the
    /// append cursor has wrapped behind the reader.
    pub fn readable_end(&self) -> usize {
        match self.stream {
            None => self.size,
            Some(cursors) if cursors.wrapped => self.size,
            Some(cursors) => cursors.appendpos.min(self.size),
        }
    }

    /// Move the streaming read cursor after the mixer consumed samples.
    ///
    /// Reaching the end of storage with the wrap flag raised rewinds the
    /// reader to the front and clears the flag. Returns whether it wrapped.
    pub fn set_stream_position(&mut self, position: usize) -> bool {
        let size = self.size;
        let Some(cursors) = self.stream.as_mut() else {
            return false;
        };
        cursors.streampos = position;
        if cursors.streampos >= size && cursors.wrapped {
            log::debug!("buffer {}: stream wrapping to front", self.id);
            cursors.streampos = 0;
            cursors.wrapped = false;
            return true;
        }
        false
    }
}

/// Buffers store 16-bit samples regardless of the uploaded width.
fn stored_format(format: SampleFormat) -> SampleFormat {
    match format.channels() {
        1 => SampleFormat::Mono16,
        _ => SampleFormat::Stereo16,
    }
}

/// Shared-ownership handle to a buffer.
///
/// The owning context keeps one handle; every source attachment or queue
/// entry holds another. A buffer can only be deleted while the context's
/// handle is the sole reference, and a source can never observe freed
/// sample data because it owns its handle.
#[derive(Clone)]
pub struct BufferHandle {
    id: BufferId,
    inner: Arc<Mutex<Buffer>>,
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferHandle")
            .field("id", &self.id)
            .field("references", &self.reference_count())
            .finish()
    }
}

impl BufferHandle {
    pub fn new(buffer: Buffer) -> Self {
        Self {
            id: buffer.id(),
            inner: Arc::new(Mutex::new(buffer)),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.inner.lock()
    }

    /// Live handles to this buffer, the owner's included.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn same_buffer(&self, other: &BufferHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::convert::LinearConverter;

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn set_data_monoifies_stereo() {
        let mut buffer = Buffer::new(BufferId(1));
        buffer
            .set_data(
                SampleFormat::Stereo16,
                &pcm16(&[1, -1, 2, -2, 3, -3]),
                22050,
                &LinearConverter,
            )
            .unwrap();

        assert_eq!(buffer.size(), 3);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.channel(0), &[1, 2, 3]);
        assert_eq!(buffer.channel(1), &[-1, -2, -3]);
        assert_eq!(buffer.frequency(), 22050);
        assert_eq!(buffer.readable_end(), 3);
    }

    #[test]
    fn set_data_widens_eight_bit() {
        let mut buffer = Buffer::new(BufferId(1));
        buffer
            .set_data(SampleFormat::Mono8, &[128, 255], 8000, &LinearConverter)
            .unwrap();
        assert_eq!(buffer.format(), SampleFormat::Mono16);
        assert_eq!(buffer.channel(0), &[0, 32512]);
    }

    #[test]
    fn set_data_refused_on_streaming_buffer() {
        let mut buffer = Buffer::streaming(BufferId(2), SampleFormat::Mono16, 22050);
        assert!(matches!(
            buffer.set_data(SampleFormat::Mono16, &pcm16(&[1]), 22050, &LinearConverter),
            Err(AudioError::InvalidOperation(_))
        ));
    }

    #[test]
    fn stream_position_wraps_only_with_flag() {
        let mut buffer = Buffer::streaming(BufferId(3), SampleFormat::Mono16, 22050);
        buffer.channels = vec![vec![0; 10]];
        buffer.size = 10;
        buffer.stream = Some(StreamCursors {
            appendpos: 4,
            streampos: 8,
            wrapped: true,
        });

        assert_eq!(buffer.readable_end(), 10);
        assert!(buffer.set_stream_position(10));
        let cursors = buffer.stream_cursors().unwrap();
        assert_eq!(cursors.streampos, 0);
        assert!(!cursors.wrapped);
        assert_eq!(buffer.readable_end(), 4);

        assert!(!buffer.set_stream_position(4));
        assert_eq!(buffer.stream_cursors().unwrap().streampos, 4);
    }

    #[test]
    fn handle_counts_references() {
        let handle = BufferHandle::new(Buffer::new(BufferId(7)));
        assert_eq!(handle.reference_count(), 1);
        let attached = handle.clone();
        assert_eq!(handle.reference_count(), 2);
        assert!(attached.same_buffer(&handle));
        drop(attached);
        assert_eq!(handle.reference_count(), 1);
    }
}
