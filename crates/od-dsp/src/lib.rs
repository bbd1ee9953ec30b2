//! od-dsp: Per-track DSP stages for the Overdub engine
//!
//! ## Modules
//! - `biquad` - TDF-II biquad filters (shelving, peaking)
//! - `dynamics` - Envelope follower and compressor
//! - `delay` - Feedback delay and modulated delay (chorus)
//! - `reverb` - Comb/allpass algorithmic reverb
//! - `chain` - The fixed per-track effects chain

pub mod biquad;
pub mod dynamics;
pub mod delay;
pub mod reverb;
pub mod chain;

pub use chain::EffectsChain;

use od_core::Sample;

/// Trait for all DSP processors
pub trait Processor: Send {
    /// Reset processor state (clears delay lines and filter memory)
    fn reset(&mut self);
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples in place
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

/// Processor configuration for sample rate changes
pub trait ProcessorConfig {
    fn set_sample_rate(&mut self, sample_rate: f64);
}
