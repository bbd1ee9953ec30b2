//! Multi-track mixer and transport
//!
//! Sums the tracks into the output block with solo-wins resolution: if any
//! track is soloed, only soloed tracks sound. Seek propagates one position
//! to every track before the next block so all tracks stay sample-aligned.

use od_core::{AudioBuffer, MidiEvent};

use crate::Track;

pub struct Mixer {
    tracks: Vec<Track>,
    playing: bool,
    scratch: AudioBuffer,
    sample_rate: f64,
    max_frames: usize,
    num_channels: usize,
}

impl Mixer {
    pub fn new(sample_rate: f64, num_channels: usize) -> Self {
        Self {
            tracks: Vec::new(),
            playing: false,
            scratch: AudioBuffer::new(num_channels, 0),
            sample_rate,
            max_frames: 0,
            num_channels,
        }
    }

    /// Reallocate the scratch buffer and prepare every track. Control thread,
    /// stream stopped.
    pub fn prepare(&mut self, sample_rate: f64, max_frames: usize, num_channels: usize) {
        self.sample_rate = sample_rate;
        self.max_frames = max_frames;
        self.num_channels = num_channels;
        self.scratch.resize(num_channels, max_frames);
        for track in &mut self.tracks {
            track.prepare(sample_rate, max_frames, num_channels);
        }
    }

    pub fn release(&mut self) {
        for track in &mut self.tracks {
            track.release();
        }
    }

    /// Mix one block into `output`. Audio thread.
    pub fn get_next_block(&mut self, output: &mut AudioBuffer, midi: &[MidiEvent]) {
        output.clear();

        if !self.playing || self.tracks.is_empty() {
            return;
        }
        if output.frames() > self.scratch.capacity_frames() {
            // Not prepared for this block size; stay silent rather than
            // allocate on the audio thread.
            return;
        }

        let any_solo = self.tracks.iter().any(|t| t.is_solo());

        for track in &mut self.tracks {
            if track.is_muted() || (any_solo && !track.is_solo()) {
                continue;
            }
            self.scratch.set_frames(output.frames());
            track.get_next_block(&mut self.scratch, midi);
            output.add_from(&self.scratch);
        }
    }

    /// Append a track; returns its index. Indices are stable only until the
    /// next `remove_track`.
    pub fn add_track(&mut self, name: impl Into<String>) -> usize {
        let mut track = Track::new(name, self.sample_rate, self.num_channels);
        if self.max_frames > 0 {
            track.prepare(self.sample_rate, self.max_frames, self.num_channels);
        }
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    pub fn remove_track(&mut self, index: usize) {
        if index < self.tracks.len() {
            let mut track = self.tracks.remove(index);
            track.release();
        }
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Seek all tracks to the same position.
    pub fn set_position(&mut self, seconds: f64) {
        for track in &mut self.tracks {
            track.set_position(seconds);
        }
    }

    /// Longest track length, for transport display.
    pub fn length_seconds(&self) -> f64 {
        self.tracks
            .iter()
            .map(|t| t.length_seconds())
            .fold(0.0, f64::max)
    }
}
