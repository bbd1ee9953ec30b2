//! Delay processors
//!
//! - `FeedbackDelay`: the per-track echo stage. It runs outside the main
//!   effect chain because its feedback path needs explicit
//!   read-then-write-with-feedback sequencing per sample, not a stateless
//!   block transform.
//! - `Chorus`: modulated delay with a per-channel LFO phase offset.

use od_core::{AudioBuffer, Sample};
use std::f64::consts::PI;

use crate::Processor;

/// Maximum delay time the echo stage can be set to
const MAX_DELAY_SECONDS: f64 = 2.0;

/// Multi-channel delay line with per-sample feedback
///
/// For each sample: `output = input + delayed * mix`, and the line is fed
/// `input + delayed * feedback`.
#[derive(Debug, Clone)]
pub struct FeedbackDelay {
    buffers: Vec<Vec<Sample>>,
    write_pos: usize,
    delay_samples: usize,
    max_delay_samples: usize,
    time_ms: f64,
    feedback: f64,
    mix: f64,
    sample_rate: f64,
}

impl FeedbackDelay {
    pub fn new(sample_rate: f64, num_channels: usize) -> Self {
        let max_delay_samples = (MAX_DELAY_SECONDS * sample_rate) as usize;
        let mut delay = Self {
            buffers: vec![vec![0.0; max_delay_samples]; num_channels],
            write_pos: 0,
            delay_samples: 0,
            max_delay_samples,
            time_ms: 250.0,
            feedback: 0.3,
            mix: 0.3,
            sample_rate,
        };
        delay.set_time_ms(250.0);
        delay
    }

    pub fn set_time_ms(&mut self, ms: f64) {
        self.time_ms = ms.max(0.0);
        let samples = (self.time_ms * 0.001 * self.sample_rate) as usize;
        self.delay_samples = samples.min(self.max_delay_samples - 1);
    }

    pub fn time_ms(&self) -> f64 {
        self.time_ms
    }

    pub fn feedback(&self) -> f64 {
        self.feedback
    }

    pub fn mix(&self) -> f64 {
        self.mix
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(0.0, 0.95);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn process_block(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.num_channels().min(self.buffers.len());
        let frames = buffer.frames();
        let mix = self.mix as Sample;
        let feedback = self.feedback as Sample;

        for frame in 0..frames {
            let read_pos = (self.write_pos + self.max_delay_samples - self.delay_samples)
                % self.max_delay_samples;
            for ch in 0..channels {
                let input = buffer.channel(ch)[frame];
                let delayed = self.buffers[ch][read_pos];
                let output = input + delayed * mix;
                self.buffers[ch][self.write_pos] = input + delayed * feedback;
                buffer.channel_mut(ch)[frame] = output;
            }
            self.write_pos = (self.write_pos + 1) % self.max_delay_samples;
        }
    }
}

impl Processor for FeedbackDelay {
    fn reset(&mut self) {
        for buf in &mut self.buffers {
            buf.fill(0.0);
        }
        self.write_pos = 0;
    }
}

/// Modulated delay (chorus)
///
/// One LFO drives every channel; each channel reads the shared phase with a
/// 90 degree offset per channel index so the voices decorrelate.
#[derive(Debug, Clone)]
pub struct Chorus {
    buffers: Vec<Vec<Sample>>,
    write_pos: usize,
    max_delay_samples: usize,

    centre_delay_samples: f64,
    depth: f64,
    rate_hz: f64,
    feedback: f64,
    mix: f64,
    lfo_phase: f64,

    sample_rate: f64,
}

impl Chorus {
    /// Maximum modulation excursion in milliseconds at depth 1.0
    const MAX_MOD_MS: f64 = 5.0;

    pub fn new(sample_rate: f64, num_channels: usize) -> Self {
        // 50 ms of line is enough for any centre delay + excursion we allow
        let max_delay_samples = (0.05 * sample_rate) as usize;
        Self {
            buffers: vec![vec![0.0; max_delay_samples]; num_channels],
            write_pos: 0,
            max_delay_samples,
            centre_delay_samples: 7.0 * 0.001 * sample_rate,
            depth: 0.25,
            rate_hz: 1.0,
            feedback: 0.0,
            mix: 0.5,
            lfo_phase: 0.0,
            sample_rate,
        }
    }

    pub fn set_rate_hz(&mut self, hz: f64) {
        self.rate_hz = hz.clamp(0.01, 20.0);
    }

    pub fn set_depth(&mut self, depth: f64) {
        self.depth = depth.clamp(0.0, 1.0);
    }

    pub fn set_centre_delay_ms(&mut self, ms: f64) {
        let samples = ms.clamp(1.0, 40.0) * 0.001 * self.sample_rate;
        self.centre_delay_samples = samples.min(self.max_delay_samples as f64 - 2.0);
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(-0.95, 0.95);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    pub fn mix(&self) -> f64 {
        self.mix
    }

    /// Linear-interpolated read from one channel's line
    fn read_interpolated(buffer: &[Sample], pos: f64, max_samples: usize) -> Sample {
        let pos = pos.rem_euclid(max_samples as f64);
        let index = pos as usize;
        let frac = (pos - index as f64) as Sample;

        let s0 = buffer[index % max_samples];
        let s1 = buffer[(index + 1) % max_samples];
        s0 + (s1 - s0) * frac
    }

    pub fn process_block(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.num_channels().min(self.buffers.len());
        let frames = buffer.frames();
        let mod_depth = self.depth * Self::MAX_MOD_MS * 0.001 * self.sample_rate;
        let phase_inc = 2.0 * PI * self.rate_hz / self.sample_rate;
        let mix = self.mix as Sample;
        let feedback = self.feedback as Sample;

        for frame in 0..frames {
            for ch in 0..channels {
                let phase = self.lfo_phase + ch as f64 * (PI * 0.5);
                let delay = (self.centre_delay_samples + mod_depth * phase.sin())
                    .clamp(1.0, self.max_delay_samples as f64 - 2.0);

                let read_pos = self.write_pos as f64 + self.max_delay_samples as f64 - delay;
                let delayed =
                    Self::read_interpolated(&self.buffers[ch], read_pos, self.max_delay_samples);

                let input = buffer.channel(ch)[frame];
                self.buffers[ch][self.write_pos] = input + delayed * feedback;
                buffer.channel_mut(ch)[frame] = input * (1.0 - mix) + delayed * mix;
            }

            self.write_pos = (self.write_pos + 1) % self.max_delay_samples;
            self.lfo_phase += phase_inc;
            if self.lfo_phase > 2.0 * PI {
                self.lfo_phase -= 2.0 * PI;
            }
        }
    }
}

impl Processor for Chorus {
    fn reset(&mut self) {
        for buf in &mut self.buffers {
            buf.fill(0.0);
        }
        self.write_pos = 0;
        self.lfo_phase = 0.0;
    }
}
