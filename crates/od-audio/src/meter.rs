//! Atomic level metering
//!
//! The audio thread publishes per-channel peak and block RMS through atomics;
//! the UI thread polls them. Peaks hold the maximum seen since the last
//! `get_and_reset_peak`, so a slow poller never misses a transient.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use od_core::AudioBuffer;

/// Preallocated channel slots; the active count grows lazily up to this.
pub const MAX_METER_CHANNELS: usize = 32;

/// Lock-free peak/RMS meter.
///
/// All storage is preallocated, so `update` is safe to call from the audio
/// thread. Values are stored as f32 bit patterns in `AtomicU32`.
pub struct Meter {
    peaks: [AtomicU32; MAX_METER_CHANNELS],
    rms: [AtomicU32; MAX_METER_CHANNELS],
    /// Highest channel count observed so far; grows, never shrinks.
    num_channels: AtomicUsize,
}

impl Meter {
    pub fn new() -> Self {
        const ZERO: AtomicU32 = AtomicU32::new(0);
        Self {
            peaks: [ZERO; MAX_METER_CHANNELS],
            rms: [ZERO; MAX_METER_CHANNELS],
            num_channels: AtomicUsize::new(0),
        }
    }

    /// Fold a processed block into the meter. Called from the audio thread.
    pub fn update(&self, buffer: &AudioBuffer) {
        let channels = buffer.num_channels().min(MAX_METER_CHANNELS);
        self.num_channels.fetch_max(channels, Ordering::Relaxed);

        let frames = buffer.frames();
        for ch in 0..channels {
            let data = buffer.channel(ch);
            let mut block_peak = 0.0f32;
            let mut sum_squares = 0.0f32;
            for &sample in data {
                let abs = sample.abs();
                if abs > block_peak {
                    block_peak = abs;
                }
                sum_squares += sample * sample;
            }

            // Monotonic peak hold: only raise, let the poller reset.
            let mut held = self.peaks[ch].load(Ordering::Relaxed);
            while block_peak > f32::from_bits(held) {
                match self.peaks[ch].compare_exchange_weak(
                    held,
                    block_peak.to_bits(),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(actual) => held = actual,
                }
            }

            let block_rms = if frames > 0 {
                (sum_squares / frames as f32).sqrt().clamp(0.0, 1.0)
            } else {
                0.0
            };
            self.rms[ch].store(block_rms.to_bits(), Ordering::Relaxed);
        }
    }

    /// Peak since the last call, atomically cleared.
    pub fn get_and_reset_peak(&self, channel: usize) -> f32 {
        if channel >= self.num_channels.load(Ordering::Relaxed) {
            return 0.0;
        }
        f32::from_bits(self.peaks[channel].swap(0, Ordering::Relaxed))
    }

    /// RMS of the most recent block, in [0, 1].
    pub fn rms(&self, channel: usize) -> f32 {
        if channel >= self.num_channels.load(Ordering::Relaxed) {
            return 0.0;
        }
        f32::from_bits(self.rms[channel].load(Ordering::Relaxed))
    }

    /// Channels observed so far.
    pub fn num_channels(&self) -> usize {
        self.num_channels.load(Ordering::Relaxed)
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_holds_until_reset() {
        let meter = Meter::new();
        let mut block = AudioBuffer::new(2, 64);
        block.channel_mut(0)[10] = 0.8;
        block.channel_mut(1)[20] = -0.6;
        meter.update(&block);

        // A quieter block must not lower the held peak
        let quiet = AudioBuffer::new(2, 64);
        meter.update(&quiet);

        assert_eq!(meter.get_and_reset_peak(0), 0.8);
        assert_eq!(meter.get_and_reset_peak(1), 0.6);

        // Reset cleared them
        assert_eq!(meter.get_and_reset_peak(0), 0.0);
        assert_eq!(meter.get_and_reset_peak(1), 0.0);
    }

    #[test]
    fn test_rms_full_scale() {
        let meter = Meter::new();
        let mut block = AudioBuffer::new(1, 128);
        block.channel_mut(0).fill(1.0);
        meter.update(&block);

        assert!((meter.rms(0) - 1.0).abs() < 1e-6);
        assert_eq!(meter.get_and_reset_peak(0), 1.0);
    }

    #[test]
    fn test_unseen_channel_reads_zero() {
        let meter = Meter::new();
        let block = AudioBuffer::new(2, 32);
        meter.update(&block);

        assert_eq!(meter.num_channels(), 2);
        assert_eq!(meter.rms(5), 0.0);
        assert_eq!(meter.get_and_reset_peak(5), 0.0);
    }

    #[test]
    fn test_channel_count_grows_monotonically() {
        let meter = Meter::new();
        meter.update(&AudioBuffer::new(4, 32));
        meter.update(&AudioBuffer::new(2, 32));
        assert_eq!(meter.num_channels(), 4);
    }
}
