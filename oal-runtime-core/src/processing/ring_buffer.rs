use std::sync::atomic::{fence, AtomicU64, AtomicU8, Ordering};

use crate::models::error::AudioError;

/// Valid readable window of a [`RingBuffer`], in absolute frame times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBounds {
    pub start: u64,
    pub end: u64,
}

impl TimeBounds {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn contains(&self, start: u64, frames: u64) -> bool {
        start >= self.start && start + frames <= self.end
    }
}

/// Fixed-capacity circular frame store indexed by a monotonic frame time.
///
/// One writer (the realtime input callback) and one reader (the application
/// thread) share it without a lock. Writes never block: once more than
/// `capacity_frames` have been stored, the oldest frames are overwritten.
///
/// Frame bytes live in relaxed atomics, so concurrent access is sound. The
/// writer raises `reserve_cursor` before copying and publishes
/// `store_cursor` with release ordering after copying; the reader validates
/// against `store_cursor` before copying and re-checks `reserve_cursor`
/// afterwards, rejecting any range the writer may have overwritten while it
/// was being read.
#[derive(Debug)]
pub struct RingBuffer {
    storage: Box<[AtomicU8]>,
    channels: u16,
    bytes_per_frame: usize,
    capacity_frames: usize,
    reserve_cursor: AtomicU64,
    store_cursor: AtomicU64,
    fetch_cursor: AtomicU64,
}

impl RingBuffer {
    /// Reserve zeroed storage for `capacity_frames` frames.
    pub fn allocate(
        channels: u16,
        bytes_per_frame: usize,
        capacity_frames: usize,
    ) -> Result<Self, AudioError> {
        if channels == 0 || bytes_per_frame == 0 || capacity_frames == 0 {
            return Err(AudioError::InvalidValue(format!(
                "ring buffer needs a non-empty layout: {} channel(s), {} bytes/frame, {} frames",
                channels, bytes_per_frame, capacity_frames
            )));
        }
        let bytes = bytes_per_frame
            .checked_mul(capacity_frames)
            .ok_or(AudioError::Allocation)?;

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(bytes)
            .map_err(|_| AudioError::Allocation)?;
        storage.extend((0..bytes).map(|_| AtomicU8::new(0)));

        Ok(Self {
            storage: storage.into_boxed_slice(),
            channels,
            bytes_per_frame,
            capacity_frames,
            reserve_cursor: AtomicU64::new(0),
            store_cursor: AtomicU64::new(0),
            fetch_cursor: AtomicU64::new(0),
        })
    }

    /// Copy `frame_count` frames from `source` into the ring at `start_frame_time`.
    ///
    /// Realtime safe: no allocation, no locking. If `frame_count` exceeds the
    /// capacity only the newest `capacity_frames` frames are kept.
    pub fn store(&self, source: &[u8], frame_count: usize, start_frame_time: u64) {
        let frame_count = frame_count.min(source.len() / self.bytes_per_frame);
        let end = start_frame_time + frame_count as u64;

        let skipped = frame_count.saturating_sub(self.capacity_frames);
        let kept = frame_count - skipped;
        let first_time = start_frame_time + skipped as u64;
        let bytes = &source[skipped * self.bytes_per_frame..frame_count * self.bytes_per_frame];

        self.reserve_cursor.store(end, Ordering::Relaxed);
        fence(Ordering::Release);

        self.copy_in(bytes, kept, first_time);

        self.store_cursor.store(end, Ordering::Release);
    }

    /// Current readable window: `[max(0, end - capacity), end)`.
    pub fn time_bounds(&self) -> TimeBounds {
        let end = self.store_cursor.load(Ordering::Acquire);
        TimeBounds {
            start: end.saturating_sub(self.capacity_frames as u64),
            end,
        }
    }

    /// Copy `frame_count` frames starting at `start_frame_time` into `dest`.
    ///
    /// Fails with [`AudioError::InsufficientData`] if the range has not been
    /// written yet, has already been overwritten, or was overwritten while
    /// being copied.
    pub fn fetch(
        &self,
        dest: &mut [u8],
        frame_count: usize,
        start_frame_time: u64,
    ) -> Result<(), AudioError> {
        let byte_count = frame_count * self.bytes_per_frame;
        if dest.len() < byte_count {
            return Err(AudioError::InvalidValue(format!(
                "destination holds {} bytes, {} needed",
                dest.len(),
                byte_count
            )));
        }

        if !self.time_bounds().contains(start_frame_time, frame_count as u64) {
            return Err(AudioError::InsufficientData);
        }

        self.copy_out(&mut dest[..byte_count], frame_count, start_frame_time);

        fence(Ordering::Acquire);
        let reserved = self.reserve_cursor.load(Ordering::Relaxed);
        if reserved.saturating_sub(self.capacity_frames as u64) > start_frame_time {
            return Err(AudioError::InsufficientData);
        }

        self.fetch_cursor
            .store(start_frame_time + frame_count as u64, Ordering::Release);
        Ok(())
    }

    /// Frame time just past the last successful fetch.
    pub fn fetch_cursor(&self) -> u64 {
        self.fetch_cursor.load(Ordering::Acquire)
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Bytes of a `frames`-long range that fit before the end of storage.
    fn head_bytes(&self, first_time: u64, frames: usize) -> usize {
        let until_end = self.capacity_frames - self.frame_index(first_time);
        until_end.min(frames) * self.bytes_per_frame
    }

    fn copy_in(&self, bytes: &[u8], frames: usize, first_time: u64) {
        let offset = self.byte_offset(first_time);
        let head = self.head_bytes(first_time, frames);
        let (front, wrapped) = bytes.split_at(head);
        for (slot, &byte) in self.storage[offset..offset + head].iter().zip(front) {
            slot.store(byte, Ordering::Relaxed);
        }
        for (slot, &byte) in self.storage.iter().zip(wrapped) {
            slot.store(byte, Ordering::Relaxed);
        }
    }

    fn copy_out(&self, dest: &mut [u8], frames: usize, first_time: u64) {
        let offset = self.byte_offset(first_time);
        let head = self.head_bytes(first_time, frames);
        let (front, wrapped) = dest.split_at_mut(head);
        for (byte, slot) in front.iter_mut().zip(&self.storage[offset..offset + head]) {
            *byte = slot.load(Ordering::Relaxed);
        }
        for (byte, slot) in wrapped.iter_mut().zip(self.storage.iter()) {
            *byte = slot.load(Ordering::Relaxed);
        }
    }

    fn frame_index(&self, time: u64) -> usize {
        (time % self.capacity_frames as u64) as usize
    }

    fn byte_offset(&self, time: u64) -> usize {
        self.frame_index(time) * self.bytes_per_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(range: std::ops::Range<u16>) -> Vec<u8> {
        range.flat_map(|f| f.to_le_bytes()).collect()
    }

    #[test]
    fn allocate_zeroes_and_resets_cursors() {
        let ring = RingBuffer::allocate(1, 2, 8).unwrap();
        assert_eq!(ring.time_bounds(), TimeBounds { start: 0, end: 0 });
        assert_eq!(ring.fetch_cursor(), 0);
        assert_eq!(ring.capacity_frames(), 8);
    }

    #[test]
    fn allocate_rejects_empty_layout() {
        assert!(RingBuffer::allocate(1, 2, 0).is_err());
        assert!(RingBuffer::allocate(0, 2, 8).is_err());
    }

    #[test]
    fn allocate_reports_overflowing_sizes() {
        assert_eq!(
            RingBuffer::allocate(2, usize::MAX / 2, 4).unwrap_err(),
            AudioError::Allocation
        );
    }

    #[test]
    fn store_then_fetch_round_trips() {
        let ring = RingBuffer::allocate(1, 2, 16).unwrap();
        let source = frames(0..10);
        ring.store(&source, 10, 0);

        let mut dest = vec![0u8; source.len()];
        ring.fetch(&mut dest, 10, 0).unwrap();
        assert_eq!(dest, source);
        assert_eq!(ring.fetch_cursor(), 10);
    }

    #[test]
    fn end_tracks_latest_store() {
        let ring = RingBuffer::allocate(1, 2, 16).unwrap();
        let mut last_end = 0;
        for (i, count) in [3usize, 5, 1, 7].into_iter().enumerate() {
            let start = ring.time_bounds().end;
            ring.store(&frames(0..count as u16), count, start);
            let bounds = ring.time_bounds();
            assert_eq!(bounds.end, start + count as u64, "store {}", i);
            assert!(bounds.end >= last_end);
            last_end = bounds.end;
        }
    }

    #[test]
    fn fetch_past_end_is_insufficient() {
        let ring = RingBuffer::allocate(1, 2, 16).unwrap();
        ring.store(&frames(0..4), 4, 0);
        let mut dest = vec![0u8; 10];
        assert_eq!(ring.fetch(&mut dest, 5, 0), Err(AudioError::InsufficientData));
        assert_eq!(ring.fetch_cursor(), 0);
    }

    #[test]
    fn overflow_makes_stale_frames_unfetchable() {
        let ring = RingBuffer::allocate(1, 2, 8).unwrap();
        ring.store(&frames(0..6), 6, 0);
        ring.store(&frames(6..12), 6, 6);

        let bounds = ring.time_bounds();
        assert_eq!(bounds, TimeBounds { start: 4, end: 12 });

        let mut dest = vec![0u8; 4];
        assert_eq!(ring.fetch(&mut dest, 2, 0), Err(AudioError::InsufficientData));
        assert_eq!(ring.fetch(&mut dest, 2, 3), Err(AudioError::InsufficientData));

        ring.fetch(&mut dest, 2, 4).unwrap();
        assert_eq!(dest, frames(4..6));
    }

    #[test]
    fn wraparound_preserves_order() {
        let ring = RingBuffer::allocate(2, 4, 4).unwrap();
        let stereo: Vec<u8> = (0u8..24).collect();
        ring.store(&stereo[..12], 3, 0);
        ring.store(&stereo[12..], 3, 3);

        let mut dest = vec![0u8; 16];
        ring.fetch(&mut dest, 4, 2).unwrap();
        assert_eq!(dest, stereo[8..24].to_vec());
    }

    #[test]
    fn oversized_store_keeps_newest_frames() {
        let ring = RingBuffer::allocate(1, 2, 4).unwrap();
        ring.store(&frames(0..10), 10, 0);
        assert_eq!(ring.time_bounds(), TimeBounds { start: 6, end: 10 });

        let mut dest = vec![0u8; 8];
        ring.fetch(&mut dest, 4, 6).unwrap();
        assert_eq!(dest, frames(6..10));
    }

    #[test]
    fn fetch_checks_destination_size() {
        let ring = RingBuffer::allocate(1, 2, 4).unwrap();
        ring.store(&frames(0..4), 4, 0);
        let mut dest = vec![0u8; 3];
        assert!(matches!(
            ring.fetch(&mut dest, 2, 0),
            Err(AudioError::InvalidValue(_))
        ));
    }

    #[test]
    fn concurrent_writer_and_reader_never_see_torn_frames() {
        use std::sync::Arc;
        use std::thread;

        // Every frame carries its own time, so any successfully fetched
        // frame must equal its frame time.
        let ring = Arc::new(RingBuffer::allocate(1, 4, 64).unwrap());
        let writer_ring = Arc::clone(&ring);
        let writer = thread::spawn(move || {
            let mut time = 0u64;
            while time < 20_000 {
                let chunk: Vec<u8> = (time..time + 16)
                    .flat_map(|t| (t as u32).to_le_bytes())
                    .collect();
                writer_ring.store(&chunk, 16, time);
                time += 16;
            }
        });

        let mut dest = vec![0u8; 8 * 4];
        let mut verified = 0;
        while verified < 200 && !writer.is_finished() {
            let bounds = ring.time_bounds();
            if bounds.len() < 8 {
                continue;
            }
            let start = bounds.end - 8;
            if ring.fetch(&mut dest, 8, start).is_ok() {
                for (i, frame) in dest.chunks_exact(4).enumerate() {
                    let value = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
                    assert_eq!(value as u64, start + i as u64);
                }
                verified += 1;
            }
        }
        writer.join().unwrap();
    }
}
