//! A single mixer track
//!
//! Pull order per block: source, built-in effects chain, optional external
//! insert, gain stage. Mute short-circuits the whole pull.

use od_core::{AudioBuffer, MidiEvent, Sample};
use od_dsp::EffectsChain;
use od_file::AudioData;

use crate::{AudioSource, FileSource, InsertProcessor, SilenceSource};

pub struct Track {
    name: String,
    gain: Sample,
    muted: bool,
    solo: bool,
    chain: EffectsChain,
    source: Box<dyn AudioSource>,
    insert: Option<Box<dyn InsertProcessor>>,

    sample_rate: f64,
    max_frames: usize,
}

impl Track {
    pub fn new(name: impl Into<String>, sample_rate: f64, num_channels: usize) -> Self {
        Self {
            name: name.into(),
            gain: 1.0,
            muted: false,
            solo: false,
            chain: EffectsChain::new(sample_rate, num_channels),
            source: Box::new(SilenceSource),
            insert: None,
            sample_rate,
            max_frames: 0,
        }
    }

    pub fn prepare(&mut self, sample_rate: f64, max_frames: usize, num_channels: usize) {
        self.sample_rate = sample_rate;
        self.max_frames = max_frames;
        self.chain.prepare(sample_rate, num_channels);
        self.source.prepare(sample_rate, max_frames);
        if let Some(insert) = self.insert.as_mut() {
            insert.prepare(sample_rate, max_frames);
        }
    }

    pub fn release(&mut self) {
        self.source.release();
        if let Some(insert) = self.insert.as_mut() {
            insert.release();
        }
    }

    /// Fill one block. Audio thread; the mixer guarantees exclusive access.
    pub fn get_next_block(&mut self, buffer: &mut AudioBuffer, midi: &[MidiEvent]) {
        if self.muted {
            buffer.clear();
            return;
        }

        self.source.get_next_block(buffer);
        self.chain.process_block(buffer);
        if let Some(insert) = self.insert.as_mut() {
            insert.process_block(buffer, midi);
        }
        if self.gain != 1.0 {
            buffer.apply_gain(self.gain);
        }
    }

    /// Swap in a file-backed source. Only safe while the transport is
    /// stopped; the engine enforces that.
    pub fn load_audio_data(&mut self, data: AudioData) {
        let mut source = FileSource::new(data);
        if self.max_frames > 0 {
            source.prepare(self.sample_rate, self.max_frames);
        }
        self.source = Box::new(source);
    }

    /// Replace the source outright (live input, generators). Same stopped-
    /// transport rule as `load_audio_data`.
    pub fn set_source(&mut self, mut source: Box<dyn AudioSource>) {
        if self.max_frames > 0 {
            source.prepare(self.sample_rate, self.max_frames);
        }
        self.source = source;
    }

    pub fn set_insert(&mut self, mut insert: Box<dyn InsertProcessor>) {
        if self.max_frames > 0 {
            insert.prepare(self.sample_rate, self.max_frames);
        }
        self.insert = Some(insert);
    }

    pub fn clear_insert(&mut self) {
        if let Some(mut insert) = self.insert.take() {
            insert.release();
        }
    }

    pub fn set_position(&mut self, seconds: f64) {
        self.source.set_position(seconds);
    }

    pub fn length_seconds(&self) -> f64 {
        self.source.length_seconds()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_gain(&mut self, gain: Sample) {
        self.gain = gain.clamp(0.0, 2.0);
    }

    pub fn gain(&self) -> Sample {
        self.gain
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_solo(&mut self, solo: bool) {
        self.solo = solo;
    }

    pub fn is_solo(&self) -> bool {
        self.solo
    }

    pub fn chain(&self) -> &EffectsChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut EffectsChain {
        &mut self.chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use od_file::BitDepth;

    fn constant_data(value: f32, frames: usize) -> AudioData {
        AudioData {
            channels: vec![vec![value; frames]; 2],
            sample_rate: 48000,
            bit_depth: BitDepth::Float32,
        }
    }

    #[test]
    fn test_muted_track_outputs_silence() {
        let mut track = Track::new("vox", 48000.0, 2);
        track.load_audio_data(constant_data(0.5, 256));
        track.set_muted(true);

        let mut block = AudioBuffer::new(2, 64);
        block.channel_mut(0).fill(1.0);
        track.get_next_block(&mut block, &[]);
        assert_eq!(block.peak(0), 0.0);
        assert_eq!(block.peak(1), 0.0);
    }

    #[test]
    fn test_gain_boundaries() {
        let mut track = Track::new("gtr", 48000.0, 2);
        track.load_audio_data(constant_data(0.25, 256));

        let mut block = AudioBuffer::new(2, 64);
        track.set_gain(2.0);
        track.get_next_block(&mut block, &[]);
        assert!((block.channel(0)[0] - 0.5).abs() < 1e-6);

        track.set_position(0.0);
        track.set_gain(0.0);
        track.get_next_block(&mut block, &[]);
        assert_eq!(block.peak(0), 0.0);
    }

    #[test]
    fn test_gain_clamped_to_range() {
        let mut track = Track::new("t", 48000.0, 2);
        track.set_gain(5.0);
        assert_eq!(track.gain(), 2.0);
        track.set_gain(-1.0);
        assert_eq!(track.gain(), 0.0);
    }

    #[test]
    fn test_insert_runs_after_chain() {
        struct Inverter;
        impl InsertProcessor for Inverter {
            fn prepare(&mut self, _: f64, _: usize) {}
            fn process_block(&mut self, buffer: &mut AudioBuffer, _midi: &[MidiEvent]) {
                for ch in buffer.channels_mut() {
                    for s in ch.iter_mut() {
                        *s = -*s;
                    }
                }
            }
            fn release(&mut self) {}
        }

        let mut track = Track::new("t", 48000.0, 2);
        track.load_audio_data(constant_data(0.5, 64));
        track.set_insert(Box::new(Inverter));

        let mut block = AudioBuffer::new(2, 64);
        track.get_next_block(&mut block, &[]);
        assert!((block.channel(0)[0] + 0.5).abs() < 1e-6);
    }
}
