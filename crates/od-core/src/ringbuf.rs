//! Lock-free SPSC sample transport
//!
//! Carries interleaved samples from the real-time audio thread (producer) to
//! the disk-writer thread (consumer). This is the only synchronization
//! primitive between the two threads.
//!
//! CRITICAL: the audio thread must never block. All operations here are
//! wait-free and allocation-free.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::Sample;

/// Single-producer single-consumer ring buffer of interleaved samples
///
/// Indices advance modulo the capacity; one slot is always kept free so a
/// full buffer and an empty buffer are distinguishable. A transport created
/// with capacity C therefore holds at most C-1 samples at once.
///
/// Correct with exactly one writer thread and one reader thread at a time.
/// The producer publishes its index with release ordering after all payload
/// writes; the consumer observes it with acquire ordering before touching
/// payload, which orders payload visibility across the two threads without
/// a mutex.
#[repr(align(64))]
pub struct RingTransport {
    /// Buffer storage
    buffer: Box<[Sample]>,
    /// Buffer capacity in samples
    capacity: usize,
    /// Write position (only advanced by the producer)
    write_pos: AtomicUsize,
    /// Read position (only advanced by the consumer)
    read_pos: AtomicUsize,
}

impl RingTransport {
    /// Create a new transport holding up to `capacity - 1` samples
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "RingTransport capacity must be at least 2");
        Self {
            buffer: vec![0.0; capacity].into_boxed_slice(),
            capacity,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples the producer can write without wrapping onto
    /// unconsumed data
    #[inline]
    pub fn free_space(&self) -> usize {
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);
        (read + self.capacity - write - 1) % self.capacity
    }

    /// Number of samples available for the consumer to read
    #[inline]
    pub fn available_to_read(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Relaxed);
        (write + self.capacity - read) % self.capacity
    }

    /// Write samples (producer side - audio thread)
    ///
    /// Copies `min(data.len(), free_space())` samples and returns the count.
    /// Returns 0 immediately when the transport is full; never blocks.
    #[inline]
    pub fn write(&self, data: &[Sample]) -> usize {
        let mut write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);

        let free = (read + self.capacity - write - 1) % self.capacity;
        let to_write = data.len().min(free);
        if to_write == 0 {
            return 0;
        }

        for &sample in &data[..to_write] {
            // SAFETY: we are the only producer, `write` is always in bounds,
            // and the consumer never reads slots past the published write
            // index.
            unsafe {
                let ptr = self.buffer.as_ptr() as *mut Sample;
                ptr.add(write).write(sample);
            }
            write = (write + 1) % self.capacity;
        }

        // Publish the payload with release semantics
        self.write_pos.store(write, Ordering::Release);
        to_write
    }

    /// Read samples (consumer side - disk thread)
    ///
    /// Copies `min(out.len(), available_to_read())` samples and returns the
    /// count. Returns 0 immediately when the transport is empty; never blocks.
    #[inline]
    pub fn read(&self, out: &mut [Sample]) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let mut read = self.read_pos.load(Ordering::Relaxed);

        let available = (write + self.capacity - read) % self.capacity;
        let to_read = out.len().min(available);
        if to_read == 0 {
            return 0;
        }

        for slot in &mut out[..to_read] {
            *slot = self.buffer[read];
            read = (read + 1) % self.capacity;
        }

        self.read_pos.store(read, Ordering::Release);
        to_read
    }

    /// Reset both cursors to the empty state
    ///
    /// Only safe to call while no other thread is concurrently reading or
    /// writing (session start/stop, under an external stop barrier).
    pub fn clear(&self) {
        self.write_pos.store(0, Ordering::Release);
        self.read_pos.store(0, Ordering::Release);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.available_to_read() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_space() == 0
    }
}

// SAFETY: payload slots are only written by the single producer before the
// release store of write_pos, and only read by the single consumer after the
// acquire load of write_pos.
unsafe impl Send for RingTransport {}
unsafe impl Sync for RingTransport {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_basic_write_read() {
        let ring = RingTransport::new(16);
        assert!(ring.is_empty());
        assert_eq!(ring.free_space(), 15); // one slot reserved

        let samples = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(ring.write(&samples), 4);
        assert_eq!(ring.available_to_read(), 4);
        assert_eq!(ring.free_space(), 11);

        let mut out = [0.0; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out, samples);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_full_buffer_rejects_writes() {
        let ring = RingTransport::new(8);
        let data = [0.5; 16];

        // Only capacity - 1 samples fit
        assert_eq!(ring.write(&data), 7);
        assert!(ring.is_full());
        assert_eq!(ring.write(&data), 0);

        let mut out = [0.0; 3];
        assert_eq!(ring.read(&mut out), 3);
        assert_eq!(ring.free_space(), 3);
        assert_eq!(ring.write(&data), 3);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let ring = RingTransport::new(8);

        let first: Vec<Sample> = (0..6).map(|i| i as Sample).collect();
        assert_eq!(ring.write(&first), 6);

        let mut out = [0.0; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0]);

        // Wraps past the end of storage
        let second = [10.0, 11.0, 12.0, 13.0];
        assert_eq!(ring.write(&second), 4);

        let mut rest = [0.0; 6];
        assert_eq!(ring.read(&mut rest), 6);
        assert_eq!(rest, [4.0, 5.0, 10.0, 11.0, 12.0, 13.0]);
    }

    #[test]
    fn test_clear_empties() {
        let ring = RingTransport::new(16);
        ring.write(&[1.0; 10]);
        ring.clear();
        assert_eq!(ring.available_to_read(), 0);
        assert_eq!(ring.free_space(), 15);
    }

    #[test]
    fn test_read_and_write_never_exceed_accounting() {
        let ring = RingTransport::new(5);
        let data = [1.0; 10];
        let written = ring.write(&data);
        assert!(written <= 4);

        let mut out = [0.0; 10];
        let available = ring.available_to_read();
        let read = ring.read(&mut out);
        assert_eq!(read, available);
    }

    #[test]
    fn test_spsc_fifo_ordering_across_threads() {
        const TOTAL: usize = 100_000;
        let ring = Arc::new(RingTransport::new(1024));

        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let mut next = 0usize;
                while next < TOTAL {
                    let chunk_len = (TOTAL - next).min(128);
                    let chunk: Vec<Sample> =
                        (next..next + chunk_len).map(|i| i as Sample).collect();
                    let written = ring.write(&chunk);
                    next += written;
                    if written == 0 {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut received = Vec::with_capacity(TOTAL);
        let mut out = [0.0; 256];
        while received.len() < TOTAL {
            let n = ring.read(&mut out);
            if n == 0 {
                std::thread::yield_now();
                continue;
            }
            received.extend_from_slice(&out[..n]);
        }
        producer.join().unwrap();

        // Exact FIFO order, no loss, no duplication
        for (i, &v) in received.iter().enumerate() {
            assert_eq!(v, i as Sample);
        }
    }
}
