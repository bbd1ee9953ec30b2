//! Background disk recording
//!
//! The audio thread interleaves each processed block into a lock-free ring;
//! a dedicated drain thread pulls fixed-size chunks out of the ring and
//! serializes them to a WAV file. The audio thread never touches the file
//! and never blocks: when the ring is full, whole frames are dropped and
//! counted, so channel interleaving can never skew.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use od_core::{AudioBuffer, RingTransport, Sample};

use crate::audio_file::{write_sample, BitDepth};

/// Samples pulled from the ring per drain iteration
const DISK_WRITE_CHUNK: usize = 1024;
/// Upper bound on recorded channels (stack interleave buffer size)
pub const MAX_RECORD_CHANNELS: usize = 32;
/// Drain thread wakeup period when no data arrives
const DRAIN_WAIT: Duration = Duration::from_millis(10);

/// State shared between the producer, the control thread and the drain thread.
struct DiskShared {
    ring: RingTransport,
    should_exit: AtomicBool,
    wakeup_lock: Mutex<()>,
    wakeup: Condvar,
}

/// Streams interleaved audio to a WAV file on a background thread.
///
/// One active session at a time; `start_recording` implicitly stops any
/// previous session. All control-path methods take `&self`, so the writer
/// can sit behind an `Arc` next to the audio callback.
pub struct DiskWriter {
    shared: Arc<DiskShared>,
    is_recording: AtomicBool,
    num_channels: AtomicUsize,
    frames_written: Arc<AtomicU64>,
    overrun_frames: AtomicU64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DiskWriter {
    /// `ring_capacity` is in interleaved samples; it bounds how far the disk
    /// can fall behind the audio thread before frames are dropped.
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            shared: Arc::new(DiskShared {
                ring: RingTransport::new(ring_capacity),
                should_exit: AtomicBool::new(false),
                wakeup_lock: Mutex::new(()),
                wakeup: Condvar::new(),
            }),
            is_recording: AtomicBool::new(false),
            num_channels: AtomicUsize::new(0),
            frames_written: Arc::new(AtomicU64::new(0)),
            overrun_frames: AtomicU64::new(0),
            thread: Mutex::new(None),
        }
    }

    /// Open `path` and start streaming to it. Returns false (with the
    /// recording flag left clear) if the file cannot be opened; the caller
    /// keeps running without recording.
    pub fn start_recording<P: AsRef<Path>>(
        &self,
        path: P,
        sample_rate: u32,
        num_channels: usize,
        bit_depth: BitDepth,
    ) -> bool {
        let path = path.as_ref();
        self.stop_recording();

        if num_channels == 0 || num_channels > MAX_RECORD_CHANNELS {
            log::error!(
                "disk writer: unsupported channel count {} for {}",
                num_channels,
                path.display()
            );
            return false;
        }

        // Quiescent here: the previous session is joined and the recording
        // flag is clear, so nobody else touches the ring.
        self.shared.ring.clear();
        self.shared.should_exit.store(false, Ordering::Relaxed);
        self.frames_written.store(0, Ordering::Relaxed);
        self.overrun_frames.store(0, Ordering::Relaxed);
        self.num_channels.store(num_channels, Ordering::Relaxed);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    log::error!(
                        "disk writer: cannot create {}: {}",
                        parent.display(),
                        err
                    );
                    return false;
                }
            }
        }

        let spec = bit_depth.wav_spec(sample_rate, num_channels as u16);
        let writer = match hound::WavWriter::create(path, spec) {
            Ok(writer) => writer,
            Err(err) => {
                log::error!("disk writer: cannot open {}: {}", path.display(), err);
                return false;
            }
        };

        let shared = Arc::clone(&self.shared);
        let frames_written = Arc::clone(&self.frames_written);
        let handle = std::thread::spawn(move || {
            drain_loop(shared, writer, num_channels, bit_depth, frames_written);
        });
        *self.thread.lock() = Some(handle);

        self.is_recording.store(true, Ordering::Release);
        log::info!(
            "disk writer: recording {} ({} Hz, {} ch, {}-bit)",
            path.display(),
            sample_rate,
            num_channels,
            bit_depth.bits()
        );
        true
    }

    /// Stop the session, drain the tail and finalize the file. Safe to call
    /// when nothing is recording.
    pub fn stop_recording(&self) {
        self.is_recording.store(false, Ordering::Release);
        self.shared.should_exit.store(true, Ordering::Release);
        self.shared.wakeup.notify_one();

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("disk writer: drain thread panicked");
            } else {
                log::info!(
                    "disk writer: stopped after {} frames ({} dropped)",
                    self.frames_written.load(Ordering::Relaxed),
                    self.overrun_frames.load(Ordering::Relaxed)
                );
            }
        }
    }

    /// Real-time producer. Interleaves the block into the ring, dropping
    /// whole frames when the ring is full. Lock-free and allocation-free.
    pub fn push_next_block(&self, buffer: &AudioBuffer) {
        if !self.is_recording.load(Ordering::Acquire) {
            return;
        }

        let channels = self
            .num_channels
            .load(Ordering::Relaxed)
            .min(buffer.num_channels());
        if channels == 0 {
            return;
        }
        let frames = buffer.frames();

        // Single producer, so free space can only grow under us.
        let writable_frames = frames.min(self.shared.ring.free_space() / channels);

        let mut frame_buf = [0.0 as Sample; MAX_RECORD_CHANNELS];
        for frame in 0..writable_frames {
            for ch in 0..channels {
                frame_buf[ch] = buffer.channel(ch)[frame];
            }
            self.shared.ring.write(&frame_buf[..channels]);
        }

        let dropped = frames - writable_frames;
        if dropped > 0 {
            self.overrun_frames
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
        if writable_frames > 0 {
            self.shared.wakeup.notify_one();
        }
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::Acquire)
    }

    /// Frames flushed to the file so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    /// Frames dropped because the ring was full.
    pub fn overrun_count(&self) -> u64 {
        self.overrun_frames.load(Ordering::Relaxed)
    }
}

impl Drop for DiskWriter {
    fn drop(&mut self) {
        self.stop_recording();
    }
}

fn drain_loop(
    shared: Arc<DiskShared>,
    mut writer: hound::WavWriter<BufWriter<File>>,
    num_channels: usize,
    bit_depth: BitDepth,
    frames_written: Arc<AtomicU64>,
) {
    log::debug!("disk writer: drain thread started");

    // Chunk reads stay frame-aligned so partial frames never hit the file.
    let chunk_samples = (DISK_WRITE_CHUNK / num_channels).max(1) * num_channels;
    let mut chunk = vec![0.0 as Sample; chunk_samples];

    loop {
        let samples_read = shared.ring.read(&mut chunk);

        if samples_read > 0 {
            let mut failed = false;
            for &sample in &chunk[..samples_read] {
                if let Err(err) = write_sample(&mut writer, sample, bit_depth) {
                    log::error!("disk writer: write failed: {}", err);
                    failed = true;
                    break;
                }
            }
            if failed {
                break;
            }
            frames_written.fetch_add((samples_read / num_channels) as u64, Ordering::Relaxed);
        } else {
            if shared.should_exit.load(Ordering::Acquire)
                && shared.ring.available_to_read() == 0
            {
                break;
            }
            // Timed wait: a missed notify costs at most one period, so the
            // join in stop_recording is bounded.
            let mut guard = shared.wakeup_lock.lock();
            let _ = shared.wakeup.wait_for(&mut guard, DRAIN_WAIT);
        }
    }

    if let Err(err) = writer.finalize() {
        log::error!("disk writer: finalize failed: {}", err);
    }
    log::debug!("disk writer: drain thread exiting");
}
