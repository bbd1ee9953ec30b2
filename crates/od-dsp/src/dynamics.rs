//! Dynamics processing: envelope follower and compressor
//!
//! The compressor is a stereo-linked feed-forward design: one envelope is
//! tracked from the loudest channel per frame and the resulting gain is
//! applied to every channel, so the stereo image never shifts under
//! compression.

use od_core::{db_to_gain, gain_to_db, AudioBuffer, Sample};

use crate::{Processor, ProcessorConfig};

/// Envelope follower for dynamics processing
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    attack_coeff: f64,
    release_coeff: f64,
    envelope: f64,
    sample_rate: f64,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f64) -> Self {
        let mut follower = Self {
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            sample_rate,
        };
        follower.set_times(10.0, 100.0);
        follower
    }

    /// Set attack and release times in milliseconds
    pub fn set_times(&mut self, attack_ms: f64, release_ms: f64) {
        self.attack_coeff = (-1.0 / (attack_ms.max(0.01) * 0.001 * self.sample_rate)).exp();
        self.release_coeff = (-1.0 / (release_ms.max(0.01) * 0.001 * self.sample_rate)).exp();
    }

    #[inline(always)]
    pub fn process(&mut self, input: f64) -> f64 {
        let abs_input = input.abs();
        let coeff = if abs_input > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = abs_input + coeff * (self.envelope - abs_input);
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    pub fn current(&self) -> f64 {
        self.envelope
    }
}

impl ProcessorConfig for EnvelopeFollower {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }
}

/// Stereo-linked feed-forward compressor
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f64,
    ratio: f64,
    attack_ms: f64,
    release_ms: f64,

    envelope: EnvelopeFollower,
    sample_rate: f64,
}

impl Compressor {
    pub fn new(sample_rate: f64) -> Self {
        let mut comp = Self {
            threshold_db: -12.0,
            ratio: 4.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            envelope: EnvelopeFollower::new(sample_rate),
            sample_rate,
        };
        comp.envelope.set_times(comp.attack_ms, comp.release_ms);
        comp
    }

    pub fn threshold_db(&self) -> f64 {
        self.threshold_db
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn attack_ms(&self) -> f64 {
        self.attack_ms
    }

    pub fn release_ms(&self) -> f64 {
        self.release_ms
    }

    pub fn set_threshold_db(&mut self, threshold_db: f64) {
        self.threshold_db = threshold_db.clamp(-60.0, 0.0);
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio.clamp(1.0, 100.0);
    }

    pub fn set_attack_ms(&mut self, attack_ms: f64) {
        self.attack_ms = attack_ms.clamp(0.01, 1000.0);
        self.envelope.set_times(self.attack_ms, self.release_ms);
    }

    pub fn set_release_ms(&mut self, release_ms: f64) {
        self.release_ms = release_ms.clamp(1.0, 5000.0);
        self.envelope.set_times(self.attack_ms, self.release_ms);
    }

    /// Gain (linear) to apply for the given detector level (linear)
    #[inline]
    fn compute_gain(&self, level: f64) -> f64 {
        let level_db = gain_to_db(level);
        let over_db = level_db - self.threshold_db;
        if over_db <= 0.0 {
            return 1.0;
        }
        // Hard knee: output level = threshold + over / ratio
        let reduction_db = over_db * (1.0 / self.ratio - 1.0);
        db_to_gain(reduction_db)
    }

    /// Process a block, all channels linked to one detector
    pub fn process_block(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.num_channels();
        let frames = buffer.frames();
        if channels == 0 {
            return;
        }

        for frame in 0..frames {
            let mut level = 0.0f64;
            for ch in 0..channels {
                level = level.max(buffer.channel(ch)[frame].abs() as f64);
            }
            let env = self.envelope.process(level);
            let gain = self.compute_gain(env) as Sample;
            if gain != 1.0 {
                for ch in 0..channels {
                    buffer.channel_mut(ch)[frame] *= gain;
                }
            }
        }
    }
}

impl Processor for Compressor {
    fn reset(&mut self) {
        self.envelope.reset();
    }
}

impl ProcessorConfig for Compressor {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.envelope.set_sample_rate(sample_rate);
        self.envelope.set_times(self.attack_ms, self.release_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_tracks_level() {
        let mut env = EnvelopeFollower::new(48000.0);
        env.set_times(1.0, 50.0);

        for _ in 0..4800 {
            env.process(1.0);
        }
        assert!(env.current() > 0.99);

        for _ in 0..48000 {
            env.process(0.0);
        }
        assert!(env.current() < 0.01);
    }

    #[test]
    fn test_compressor_attenuates_above_threshold() {
        let mut comp = Compressor::new(48000.0);
        comp.set_threshold_db(-12.0);
        comp.set_ratio(4.0);
        comp.set_attack_ms(1.0);
        comp.set_release_ms(50.0);

        // Full-scale DC for half a second, in blocks
        let mut last_gainful = 0.0f32;
        for _ in 0..100 {
            let mut block = AudioBuffer::new(2, 256);
            for ch in 0..2 {
                block.channel_mut(ch).fill(1.0);
            }
            comp.process_block(&mut block);
            last_gainful = block.channel(0)[255];
        }

        // Settled output: -12 dB threshold + 12 dB over / ratio 4 = -9 dBFS
        let expected = db_to_gain(-9.0) as f32;
        assert!((last_gainful - expected).abs() < 0.02);
    }

    #[test]
    fn test_compressor_passes_below_threshold() {
        let mut comp = Compressor::new(48000.0);
        comp.set_threshold_db(-12.0);
        comp.set_ratio(4.0);

        let mut block = AudioBuffer::new(1, 512);
        block.channel_mut(0).fill(0.1); // -20 dBFS, well below threshold
        comp.process_block(&mut block);
        assert!((block.channel(0)[511] - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_stereo_link_uses_loudest_channel() {
        let mut comp = Compressor::new(48000.0);
        comp.set_threshold_db(-12.0);
        comp.set_ratio(100.0);
        comp.set_attack_ms(0.01);

        let mut block = AudioBuffer::new(2, 4800);
        block.channel_mut(0).fill(1.0);
        block.channel_mut(1).fill(0.01); // quiet channel still attenuated
        comp.process_block(&mut block);

        let loud_gain = block.channel(0)[4799] / 1.0;
        let quiet_gain = block.channel(1)[4799] / 0.01;
        assert!((loud_gain - quiet_gain).abs() < 0.01);
    }
}
