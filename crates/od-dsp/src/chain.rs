//! Per-track insert chain
//!
//! Fixed processing order: three-band EQ, compressor, chorus, reverb, then
//! the feedback delay. Every stage has an enable flag and all stages start
//! disabled, so a fresh chain is transparent.

use od_core::AudioBuffer;

use crate::biquad::BiquadTDF2;
use crate::delay::{Chorus, FeedbackDelay};
use crate::dynamics::Compressor;
use crate::reverb::Reverb;
use crate::{MonoProcessor, Processor};

const LOW_SHELF_FREQ: f64 = 200.0;
const MID_PEAK_FREQ: f64 = 1000.0;
const HIGH_SHELF_FREQ: f64 = 5000.0;
const EQ_Q: f64 = 0.7;

/// One EQ band per channel, retuned together when a gain changes.
struct EqBand {
    filters: Vec<BiquadTDF2>,
    gain_db: f64,
}

impl EqBand {
    fn new(sample_rate: f64, num_channels: usize) -> Self {
        Self {
            filters: (0..num_channels).map(|_| BiquadTDF2::new(sample_rate)).collect(),
            gain_db: 0.0,
        }
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.num_channels().min(self.filters.len());
        for ch in 0..channels {
            let filter = &mut self.filters[ch];
            for sample in buffer.channel_mut(ch).iter_mut() {
                *sample = filter.process_sample(*sample);
            }
        }
    }

    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}

/// The full insert chain for one track.
pub struct EffectsChain {
    sample_rate: f64,
    num_channels: usize,

    low_shelf: EqBand,
    mid_peak: EqBand,
    high_shelf: EqBand,
    compressor: Compressor,
    chorus: Chorus,
    reverb: Reverb,
    delay: FeedbackDelay,

    eq_enabled: bool,
    compressor_enabled: bool,
    chorus_enabled: bool,
    reverb_enabled: bool,
    delay_enabled: bool,
}

impl EffectsChain {
    pub fn new(sample_rate: f64, num_channels: usize) -> Self {
        let mut chain = Self {
            sample_rate,
            num_channels,
            low_shelf: EqBand::new(sample_rate, num_channels),
            mid_peak: EqBand::new(sample_rate, num_channels),
            high_shelf: EqBand::new(sample_rate, num_channels),
            compressor: Compressor::new(sample_rate),
            chorus: Chorus::new(sample_rate, num_channels),
            reverb: Reverb::new(sample_rate, num_channels),
            delay: FeedbackDelay::new(sample_rate, num_channels),
            eq_enabled: false,
            compressor_enabled: false,
            chorus_enabled: false,
            reverb_enabled: false,
            delay_enabled: false,
        };
        chain.retune_eq();
        chain
    }

    /// Rebuild every stage for a new sample rate or channel count. Parameter
    /// values survive; filter state does not.
    pub fn prepare(&mut self, sample_rate: f64, num_channels: usize) {
        if sample_rate == self.sample_rate && num_channels == self.num_channels {
            self.reset();
            return;
        }
        let low_gain = self.low_shelf.gain_db;
        let mid_gain = self.mid_peak.gain_db;
        let high_gain = self.high_shelf.gain_db;

        self.sample_rate = sample_rate;
        self.num_channels = num_channels;
        self.low_shelf = EqBand::new(sample_rate, num_channels);
        self.mid_peak = EqBand::new(sample_rate, num_channels);
        self.high_shelf = EqBand::new(sample_rate, num_channels);
        self.low_shelf.gain_db = low_gain;
        self.mid_peak.gain_db = mid_gain;
        self.high_shelf.gain_db = high_gain;
        self.retune_eq();

        let mut compressor = Compressor::new(sample_rate);
        compressor.set_threshold_db(self.compressor.threshold_db());
        compressor.set_ratio(self.compressor.ratio());
        compressor.set_attack_ms(self.compressor.attack_ms());
        compressor.set_release_ms(self.compressor.release_ms());
        self.compressor = compressor;

        let mut chorus = Chorus::new(sample_rate, num_channels);
        chorus.set_rate_hz(self.chorus.rate_hz());
        chorus.set_depth(self.chorus.depth());
        chorus.set_mix(self.chorus.mix());
        self.chorus = chorus;

        let mut reverb = Reverb::new(sample_rate, num_channels);
        reverb.set_room_size(self.reverb.room_size());
        reverb.set_damping(self.reverb.damping());
        reverb.set_wet_level(self.reverb.wet_level());
        reverb.set_dry_level(self.reverb.dry_level());
        self.reverb = reverb;

        let mut delay = FeedbackDelay::new(sample_rate, num_channels);
        delay.set_time_ms(self.delay.time_ms());
        delay.set_feedback(self.delay.feedback());
        delay.set_mix(self.delay.mix());
        self.delay = delay;
    }

    fn retune_eq(&mut self) {
        for filter in &mut self.low_shelf.filters {
            filter.set_low_shelf(LOW_SHELF_FREQ, EQ_Q, self.low_shelf.gain_db);
        }
        for filter in &mut self.mid_peak.filters {
            filter.set_peaking(MID_PEAK_FREQ, EQ_Q, self.mid_peak.gain_db);
        }
        for filter in &mut self.high_shelf.filters {
            filter.set_high_shelf(HIGH_SHELF_FREQ, EQ_Q, self.high_shelf.gain_db);
        }
    }

    pub fn process_block(&mut self, buffer: &mut AudioBuffer) {
        if self.eq_enabled {
            self.low_shelf.process(buffer);
            self.mid_peak.process(buffer);
            self.high_shelf.process(buffer);
        }
        if self.compressor_enabled {
            self.compressor.process_block(buffer);
        }
        if self.chorus_enabled {
            self.chorus.process_block(buffer);
        }
        if self.reverb_enabled {
            self.reverb.process_block(buffer);
        }
        if self.delay_enabled {
            self.delay.process_block(buffer);
        }
    }

    // EQ

    pub fn set_eq_enabled(&mut self, enabled: bool) {
        if enabled && !self.eq_enabled {
            self.low_shelf.reset();
            self.mid_peak.reset();
            self.high_shelf.reset();
        }
        self.eq_enabled = enabled;
    }

    pub fn set_low_gain_db(&mut self, gain_db: f64) {
        self.low_shelf.gain_db = gain_db.clamp(-24.0, 24.0);
        for filter in &mut self.low_shelf.filters {
            filter.set_low_shelf(LOW_SHELF_FREQ, EQ_Q, self.low_shelf.gain_db);
        }
    }

    pub fn set_mid_gain_db(&mut self, gain_db: f64) {
        self.mid_peak.gain_db = gain_db.clamp(-24.0, 24.0);
        for filter in &mut self.mid_peak.filters {
            filter.set_peaking(MID_PEAK_FREQ, EQ_Q, self.mid_peak.gain_db);
        }
    }

    pub fn set_high_gain_db(&mut self, gain_db: f64) {
        self.high_shelf.gain_db = gain_db.clamp(-24.0, 24.0);
        for filter in &mut self.high_shelf.filters {
            filter.set_high_shelf(HIGH_SHELF_FREQ, EQ_Q, self.high_shelf.gain_db);
        }
    }

    // Compressor

    pub fn set_compressor_enabled(&mut self, enabled: bool) {
        if enabled && !self.compressor_enabled {
            self.compressor.reset();
        }
        self.compressor_enabled = enabled;
    }

    pub fn set_compressor_threshold_db(&mut self, threshold_db: f64) {
        self.compressor.set_threshold_db(threshold_db);
    }

    pub fn set_compressor_ratio(&mut self, ratio: f64) {
        self.compressor.set_ratio(ratio);
    }

    pub fn set_compressor_attack_ms(&mut self, attack_ms: f64) {
        self.compressor.set_attack_ms(attack_ms);
    }

    pub fn set_compressor_release_ms(&mut self, release_ms: f64) {
        self.compressor.set_release_ms(release_ms);
    }

    // Chorus

    pub fn set_chorus_enabled(&mut self, enabled: bool) {
        if enabled && !self.chorus_enabled {
            self.chorus.reset();
        }
        self.chorus_enabled = enabled;
    }

    pub fn set_chorus_rate_hz(&mut self, hz: f64) {
        self.chorus.set_rate_hz(hz);
    }

    pub fn set_chorus_depth(&mut self, depth: f64) {
        self.chorus.set_depth(depth);
    }

    pub fn set_chorus_mix(&mut self, mix: f64) {
        self.chorus.set_mix(mix);
    }

    // Reverb

    pub fn set_reverb_enabled(&mut self, enabled: bool) {
        if enabled && !self.reverb_enabled {
            self.reverb.reset();
        }
        self.reverb_enabled = enabled;
    }

    pub fn set_reverb_room_size(&mut self, size: f64) {
        self.reverb.set_room_size(size);
    }

    pub fn set_reverb_damping(&mut self, damping: f64) {
        self.reverb.set_damping(damping);
    }

    pub fn set_reverb_wet_level(&mut self, wet: f64) {
        self.reverb.set_wet_level(wet);
    }

    pub fn set_reverb_dry_level(&mut self, dry: f64) {
        self.reverb.set_dry_level(dry);
    }

    // Delay

    pub fn set_delay_enabled(&mut self, enabled: bool) {
        if enabled && !self.delay_enabled {
            self.delay.reset();
        }
        self.delay_enabled = enabled;
    }

    pub fn set_delay_time_ms(&mut self, ms: f64) {
        self.delay.set_time_ms(ms);
    }

    pub fn set_delay_feedback(&mut self, feedback: f64) {
        self.delay.set_feedback(feedback);
    }

    pub fn set_delay_mix(&mut self, mix: f64) {
        self.delay.set_mix(mix);
    }
}

impl Processor for EffectsChain {
    fn reset(&mut self) {
        self.low_shelf.reset();
        self.mid_peak.reset();
        self.high_shelf.reset();
        self.compressor.reset();
        self.chorus.reset();
        self.reverb.reset();
        self.delay.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_block(channels: usize, frames: usize) -> AudioBuffer {
        let mut block = AudioBuffer::new(channels, frames);
        for ch in 0..channels {
            for (i, s) in block.channel_mut(ch).iter_mut().enumerate() {
                *s = ((i as f32 * 0.013).sin()) * 0.25;
            }
        }
        block
    }

    #[test]
    fn test_all_disabled_is_identity() {
        let mut chain = EffectsChain::new(48000.0, 2);
        let mut block = ramp_block(2, 512);
        let reference = block.clone();

        chain.process_block(&mut block);

        for ch in 0..2 {
            for i in 0..512 {
                assert_eq!(block.channel(ch)[i], reference.channel(ch)[i]);
            }
        }
    }

    #[test]
    fn test_eq_boost_changes_signal() {
        let mut chain = EffectsChain::new(48000.0, 1);
        chain.set_eq_enabled(true);
        chain.set_low_gain_db(12.0);

        // Low-frequency content gets louder through a boosted low shelf
        let mut block = AudioBuffer::new(1, 4800);
        for (i, s) in block.channel_mut(0).iter_mut().enumerate() {
            *s = (2.0 * std::f32::consts::PI * 50.0 * i as f32 / 48000.0).sin() * 0.25;
        }
        let input_peak = block.peak(0);
        chain.process_block(&mut block);
        let output_peak = block.peak(0);

        assert!(output_peak > input_peak * 2.0);
    }

    #[test]
    fn test_delay_after_chain() {
        let mut chain = EffectsChain::new(48000.0, 1);
        chain.set_delay_enabled(true);
        chain.set_delay_time_ms(100.0);
        chain.set_delay_mix(1.0);
        chain.set_delay_feedback(0.0);

        let mut block = AudioBuffer::new(1, 9600);
        block.channel_mut(0)[0] = 1.0;
        chain.process_block(&mut block);

        // Echo arrives 100 ms = 4800 samples later
        assert!((block.channel(0)[4800] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_changes_channel_count() {
        let mut chain = EffectsChain::new(48000.0, 1);
        chain.set_eq_enabled(true);
        chain.set_low_gain_db(6.0);
        chain.prepare(48000.0, 2);

        let mut block = ramp_block(2, 256);
        chain.process_block(&mut block);
        // Both channels filtered without panicking
        assert!(block.peak(1) > 0.0);
    }

    #[test]
    fn test_prepare_preserves_delay_time() {
        let mut chain = EffectsChain::new(48000.0, 2);
        chain.set_delay_enabled(true);
        chain.set_delay_time_ms(100.0);
        chain.set_delay_mix(1.0);
        chain.set_delay_feedback(0.0);

        // Channel-count change rebuilds the stage; the delay time must ride along
        chain.prepare(48000.0, 1);

        let mut block = AudioBuffer::new(1, 9600);
        block.channel_mut(0)[0] = 1.0;
        chain.process_block(&mut block);

        assert!((block.channel(0)[4800] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_preserves_compressor_attack() {
        let mut chain = EffectsChain::new(48000.0, 2);
        chain.set_compressor_enabled(true);
        chain.set_compressor_threshold_db(-12.0);
        chain.set_compressor_ratio(4.0);
        chain.set_compressor_attack_ms(2000.0);

        chain.prepare(48000.0, 1);

        // 100 ms of full scale: a 2 s attack barely moves the envelope, so the
        // burst passes untouched. The 10 ms default would squash it hard.
        let mut block = AudioBuffer::new(1, 4800);
        block.channel_mut(0).fill(1.0);
        chain.process_block(&mut block);

        assert!(block.channel(0)[4799] > 0.9);
    }

    #[test]
    fn test_prepare_preserves_reverb_mix() {
        let mut chain = EffectsChain::new(48000.0, 2);
        chain.set_reverb_enabled(true);
        chain.set_reverb_wet_level(0.0);
        chain.set_reverb_dry_level(1.0);

        chain.prepare(48000.0, 1);

        // Dry-only reverb is transparent; the default 0.3/0.7 mix would not be
        let mut block = ramp_block(1, 512);
        let reference = block.clone();
        chain.process_block(&mut block);

        for i in 0..512 {
            assert!((block.channel(0)[i] - reference.channel(0)[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_enable_resets_stage_state() {
        let mut chain = EffectsChain::new(48000.0, 1);
        chain.set_delay_enabled(true);
        chain.set_delay_mix(1.0);

        let mut block = AudioBuffer::new(1, 48000);
        block.channel_mut(0)[0] = 1.0;
        chain.process_block(&mut block);

        // Toggling off and on flushes the delay line
        chain.set_delay_enabled(false);
        chain.set_delay_enabled(true);

        let mut silent = AudioBuffer::new(1, 48000);
        chain.process_block(&mut silent);
        assert_eq!(silent.peak(0), 0.0);
    }
}
