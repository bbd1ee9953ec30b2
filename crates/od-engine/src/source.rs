//! Audio sources and the insert-processor seam
//!
//! A track pulls its raw audio from an `AudioSource`: file-backed playback,
//! silence, or the live device input. Third-party effect insertion goes
//! through `InsertProcessor`; hosting mechanics live outside this crate.

use std::sync::Arc;

use od_core::{AudioBuffer, MidiEvent, RingTransport, Sample};
use od_file::AudioData;

/// Block-pull source abstraction. All methods run on the audio thread except
/// `prepare`/`release`/`set_position`, which the mixer only calls while the
/// transport is quiescent.
pub trait AudioSource: Send {
    fn prepare(&mut self, sample_rate: f64, max_frames: usize);

    /// Fill the block. Implementations overwrite the whole active region.
    fn get_next_block(&mut self, buffer: &mut AudioBuffer);

    fn release(&mut self);

    /// Seek to an absolute position. Position-less sources ignore this.
    fn set_position(&mut self, _seconds: f64) {}

    /// Total length, or 0.0 for unbounded sources.
    fn length_seconds(&self) -> f64 {
        0.0
    }
}

/// External effect insertion point (plugin seam). Receives the block after
/// the built-in chain, together with this block's MIDI events.
pub trait InsertProcessor: Send {
    fn prepare(&mut self, sample_rate: f64, max_frames: usize);
    fn process_block(&mut self, buffer: &mut AudioBuffer, midi: &[MidiEvent]);
    fn release(&mut self);
}

/// Always silent. The default source of a freshly added track.
pub struct SilenceSource;

impl AudioSource for SilenceSource {
    fn prepare(&mut self, _sample_rate: f64, _max_frames: usize) {}

    fn get_next_block(&mut self, buffer: &mut AudioBuffer) {
        buffer.clear();
    }

    fn release(&mut self) {}
}

/// Plays back loaded audio data from a position cursor. Past the end of the
/// data the source produces silence; it does not loop.
pub struct FileSource {
    data: AudioData,
    position_frames: usize,
    /// Engine rate; playback does not resample, so data at another rate
    /// plays detuned. Kept for position conversion.
    sample_rate: f64,
}

impl FileSource {
    pub fn new(data: AudioData) -> Self {
        let sample_rate = data.sample_rate as f64;
        Self {
            data,
            position_frames: 0,
            sample_rate,
        }
    }

    pub fn position_seconds(&self) -> f64 {
        self.position_frames as f64 / self.sample_rate
    }
}

impl AudioSource for FileSource {
    fn prepare(&mut self, sample_rate: f64, _max_frames: usize) {
        if self.data.sample_rate as f64 != sample_rate {
            log::warn!(
                "file source at {} Hz playing on a {} Hz stream",
                self.data.sample_rate,
                sample_rate
            );
        }
    }

    fn get_next_block(&mut self, buffer: &mut AudioBuffer) {
        let frames = buffer.frames();
        let total = self.data.num_frames();
        let start = self.position_frames.min(total);
        let copyable = (total - start).min(frames);

        for ch in 0..buffer.num_channels() {
            // Mono files feed every output channel; extra file channels are
            // dropped.
            let src_ch = ch.min(self.data.num_channels().saturating_sub(1));
            let out = buffer.channel_mut(ch);
            if self.data.num_channels() == 0 {
                out.fill(0.0);
                continue;
            }
            let src = &self.data.channels[src_ch][start..start + copyable];
            out[..copyable].copy_from_slice(src);
            out[copyable..].fill(0.0);
        }

        self.position_frames = start + copyable;
    }

    fn release(&mut self) {}

    fn set_position(&mut self, seconds: f64) {
        let frames = (seconds.max(0.0) * self.sample_rate) as usize;
        self.position_frames = frames.min(self.data.num_frames());
    }

    fn length_seconds(&self) -> f64 {
        self.data.duration()
    }
}

/// Pulls the device input captured for the current block. The engine calls
/// `push_input` with each callback's input before any track runs, so the
/// handoff ring is drained within the same callback.
pub struct LiveInputSource {
    tap: Arc<InputTap>,
    scratch: Vec<Sample>,
}

/// Shared hand-off point between the engine glue and live-input tracks.
pub struct InputTap {
    ring: RingTransport,
    num_channels: usize,
}

/// Interleave scratch bound for `InputTap::push_input`
const MAX_TAP_CHANNELS: usize = 64;

impl InputTap {
    pub fn new(num_channels: usize, max_frames: usize) -> Self {
        let channels = num_channels.clamp(1, MAX_TAP_CHANNELS);
        Self {
            ring: RingTransport::new((channels * max_frames * 2).max(2)),
            num_channels: channels,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Interleave this block's input into the tap. Audio thread only.
    pub fn push_input(&self, input: &AudioBuffer) {
        let channels = self.num_channels.min(input.num_channels().max(1));
        let mut frame = [0.0 as Sample; 64];
        let frame = &mut frame[..self.num_channels];
        for i in 0..input.frames() {
            for (ch, slot) in frame.iter_mut().enumerate() {
                *slot = if ch < channels && ch < input.num_channels() {
                    input.channel(ch)[i]
                } else {
                    0.0
                };
            }
            if self.ring.free_space() < frame.len() {
                break;
            }
            self.ring.write(frame);
        }
    }
}

impl LiveInputSource {
    pub fn new(tap: Arc<InputTap>) -> Self {
        Self {
            tap,
            scratch: Vec::new(),
        }
    }
}

impl AudioSource for LiveInputSource {
    fn prepare(&mut self, _sample_rate: f64, max_frames: usize) {
        self.scratch = vec![0.0; max_frames * self.tap.num_channels()];
    }

    fn get_next_block(&mut self, buffer: &mut AudioBuffer) {
        buffer.clear();
        let channels = self.tap.num_channels();
        let wanted = (buffer.frames() * channels).min(self.scratch.len());
        let got = self.tap.ring.read(&mut self.scratch[..wanted]);

        for (i, chunk) in self.scratch[..got].chunks_exact(channels).enumerate() {
            for (ch, &sample) in chunk.iter().enumerate() {
                if ch < buffer.num_channels() {
                    buffer.channel_mut(ch)[i] = sample;
                }
            }
        }
    }

    fn release(&mut self) {
        self.scratch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use od_file::BitDepth;

    fn data_with_ramp(channels: usize, frames: usize) -> AudioData {
        let mut channels_data = vec![vec![0.0; frames]; channels];
        for (ch, data) in channels_data.iter_mut().enumerate() {
            for (i, s) in data.iter_mut().enumerate() {
                *s = (i + 1) as f32 * 0.001 * (ch + 1) as f32;
            }
        }
        AudioData {
            channels: channels_data,
            sample_rate: 48000,
            bit_depth: BitDepth::Float32,
        }
    }

    #[test]
    fn test_file_source_plays_through_and_goes_silent() {
        let mut source = FileSource::new(data_with_ramp(1, 100));
        source.prepare(48000.0, 64);

        let mut block = AudioBuffer::new(1, 64);
        source.get_next_block(&mut block);
        assert_eq!(block.channel(0)[0], 0.001);
        assert_eq!(block.channel(0)[63], 0.064);

        // Second block crosses the end of the data
        source.get_next_block(&mut block);
        assert!((block.channel(0)[35] - 0.1).abs() < 1e-6);
        assert_eq!(block.channel(0)[36], 0.0);

        // Fully past the end: silence
        source.get_next_block(&mut block);
        assert_eq!(block.peak(0), 0.0);
    }

    #[test]
    fn test_file_source_seek() {
        let mut source = FileSource::new(data_with_ramp(1, 48000));
        source.set_position(0.5);

        let mut block = AudioBuffer::new(1, 4);
        source.get_next_block(&mut block);
        assert!((block.channel(0)[0] - 24001.0 * 0.001).abs() < 1e-3);
        assert!((source.length_seconds() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mono_file_feeds_both_channels() {
        let mut source = FileSource::new(data_with_ramp(1, 16));
        let mut block = AudioBuffer::new(2, 16);
        source.get_next_block(&mut block);
        assert_eq!(block.channel(0), block.channel(1));
    }

    #[test]
    fn test_live_input_round_trip() {
        let tap = Arc::new(InputTap::new(2, 64));
        let mut source = LiveInputSource::new(Arc::clone(&tap));
        source.prepare(48000.0, 64);

        let mut input = AudioBuffer::new(2, 32);
        input.channel_mut(0).fill(0.5);
        input.channel_mut(1).fill(-0.5);
        tap.push_input(&input);

        let mut block = AudioBuffer::new(2, 32);
        source.get_next_block(&mut block);
        assert_eq!(block.channel(0)[31], 0.5);
        assert_eq!(block.channel(1)[31], -0.5);

        // Nothing new pushed: silence
        source.get_next_block(&mut block);
        assert_eq!(block.peak(0), 0.0);
    }

    #[test]
    fn test_silence_source_clears() {
        let mut source = SilenceSource;
        let mut block = AudioBuffer::new(1, 8);
        block.channel_mut(0).fill(1.0);
        source.get_next_block(&mut block);
        assert_eq!(block.peak(0), 0.0);
    }
}
