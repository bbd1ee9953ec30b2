//! Algorithmic reverb
//!
//! Classic Schroeder/Moorer topology: eight damped comb filters in parallel
//! feeding four series allpasses, per channel. Channels past the first use
//! offset line lengths so the tail stays decorrelated.

use od_core::{AudioBuffer, Sample};

use crate::Processor;

/// Comb filter tunings in samples at 44.1 kHz
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
/// Allpass tunings in samples at 44.1 kHz
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
/// Per-channel line offset to decorrelate the tail
const CHANNEL_SPREAD: usize = 23;

/// Fixed input attenuation into the comb bank
const INPUT_GAIN: f64 = 0.015;
/// Output scaling for the wet signal
const WET_SCALE: f64 = 3.0;

#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<Sample>,
    pos: usize,
    filter_store: f64,
    feedback: f64,
    damp: f64,
}

impl CombFilter {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
            filter_store: 0.0,
            feedback: 0.84,
            damp: 0.2,
        }
    }

    #[inline(always)]
    fn process(&mut self, input: f64) -> f64 {
        let output = self.buffer[self.pos] as f64;
        self.filter_store = output * (1.0 - self.damp) + self.filter_store * self.damp;
        self.buffer[self.pos] = (input + self.filter_store * self.feedback) as Sample;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_store = 0.0;
        self.pos = 0;
    }
}

#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<Sample>,
    pos: usize,
}

impl AllpassFilter {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    #[inline(always)]
    fn process(&mut self, input: f64) -> f64 {
        let buffered = self.buffer[self.pos] as f64;
        let output = buffered - input;
        self.buffer[self.pos] = (input + buffered * 0.5) as Sample;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

#[derive(Debug, Clone)]
struct ReverbChannel {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl ReverbChannel {
    fn new(sample_rate: f64, spread: usize) -> Self {
        let scale = sample_rate / 44100.0;
        let combs = COMB_TUNINGS
            .iter()
            .map(|&len| CombFilter::new(((len + spread) as f64 * scale) as usize))
            .collect();
        let allpasses = ALLPASS_TUNINGS
            .iter()
            .map(|&len| AllpassFilter::new(((len + spread) as f64 * scale) as usize))
            .collect();
        Self { combs, allpasses }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let comb_input = input * INPUT_GAIN;
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(comb_input);
        }
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }
}

/// Multi-channel algorithmic reverb
#[derive(Debug, Clone)]
pub struct Reverb {
    channels: Vec<ReverbChannel>,
    room_size: f64,
    damping: f64,
    wet_level: f64,
    dry_level: f64,
}

impl Reverb {
    pub fn new(sample_rate: f64, num_channels: usize) -> Self {
        let channels = (0..num_channels)
            .map(|ch| ReverbChannel::new(sample_rate, ch * CHANNEL_SPREAD))
            .collect();
        let mut reverb = Self {
            channels,
            room_size: 0.5,
            damping: 0.5,
            wet_level: 0.3,
            dry_level: 0.7,
        };
        reverb.update_internals();
        reverb
    }

    fn update_internals(&mut self) {
        let feedback = self.room_size * 0.28 + 0.7;
        let damp = self.damping * 0.4;
        for channel in &mut self.channels {
            for comb in &mut channel.combs {
                comb.feedback = feedback;
                comb.damp = damp;
            }
        }
    }

    pub fn set_room_size(&mut self, size: f64) {
        self.room_size = size.clamp(0.0, 1.0);
        self.update_internals();
    }

    pub fn set_damping(&mut self, damping: f64) {
        self.damping = damping.clamp(0.0, 1.0);
        self.update_internals();
    }

    pub fn set_wet_level(&mut self, wet: f64) {
        self.wet_level = wet.clamp(0.0, 1.0);
    }

    pub fn set_dry_level(&mut self, dry: f64) {
        self.dry_level = dry.clamp(0.0, 1.0);
    }

    pub fn room_size(&self) -> f64 {
        self.room_size
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    pub fn wet_level(&self) -> f64 {
        self.wet_level
    }

    pub fn dry_level(&self) -> f64 {
        self.dry_level
    }

    pub fn process_block(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.num_channels().min(self.channels.len());
        let wet = self.wet_level * WET_SCALE;
        let dry = self.dry_level;

        for ch in 0..channels {
            let reverb_ch = &mut self.channels[ch];
            for sample in buffer.channel_mut(ch).iter_mut() {
                let input = *sample as f64;
                let wet_sample = reverb_ch.process(input);
                *sample = (input * dry + wet_sample * wet) as Sample;
            }
        }
    }
}

impl Processor for Reverb {
    fn reset(&mut self) {
        for channel in &mut self.channels {
            for comb in &mut channel.combs {
                comb.clear();
            }
            for allpass in &mut channel.allpasses {
                allpass.clear();
            }
        }
    }
}
