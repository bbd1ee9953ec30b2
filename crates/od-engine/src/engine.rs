//! Engine facade and device-callback glue
//!
//! `EngineProcessor` runs inside the device callback: it taps the input for
//! live tracks, mixes, meters and feeds the recorder. `AudioEngine` is the
//! control-plane handle the application talks to.
//!
//! The mixer sits behind a mutex. The callback only ever `try_lock`s it and
//! plays silence for the rare block where the control thread is mutating;
//! it never blocks. Structural mutation (add/remove/load) additionally stops
//! the transport first, so a source swap can never race an active pull.

use std::sync::Arc;

use parking_lot::Mutex;

use od_audio::{
    get_default_input_device, get_default_output_device, AudioConfig, AudioProcessor,
    AudioResult, AudioStream, Meter,
};
use od_core::AudioBuffer;
use od_file::{read_wav, BitDepth, DiskWriter};

use crate::{InputTap, LiveInputSource, Mixer, Track};

/// Recorder ring headroom, in seconds of interleaved audio.
const RECORD_RING_SECONDS: usize = 2;

/// The real-time side of the engine. Driven by `AudioStream`.
pub struct EngineProcessor {
    mixer: Arc<Mutex<Mixer>>,
    meter: Arc<Meter>,
    recorder: Arc<DiskWriter>,
    input_tap: Arc<InputTap>,
}

impl EngineProcessor {
    pub fn new(
        mixer: Arc<Mutex<Mixer>>,
        meter: Arc<Meter>,
        recorder: Arc<DiskWriter>,
        input_tap: Arc<InputTap>,
    ) -> Self {
        Self {
            mixer,
            meter,
            recorder,
            input_tap,
        }
    }
}

impl AudioProcessor for EngineProcessor {
    fn prepare(&mut self, sample_rate: f64, max_frames: usize) {
        let mut mixer = self.mixer.lock();
        let channels = mixer.num_channels();
        mixer.prepare(sample_rate, max_frames, channels);
    }

    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer) {
        // Input first, so live tracks can pick it up in this same block.
        self.input_tap.push_input(input);

        match self.mixer.try_lock() {
            Some(mut mixer) => mixer.get_next_block(output, &[]),
            // Control thread is mutating; one silent block instead of a
            // blocked callback.
            None => output.clear(),
        }

        self.meter.update(output);
        self.recorder.push_next_block(output);
    }

    fn release(&mut self) {
        self.mixer.lock().release();
    }
}

/// Control-plane handle: track CRUD, transport, recording, metering.
pub struct AudioEngine {
    config: AudioConfig,
    mixer: Arc<Mutex<Mixer>>,
    meter: Arc<Meter>,
    recorder: Arc<DiskWriter>,
    input_tap: Arc<InputTap>,
    stream: Option<AudioStream>,
}

impl AudioEngine {
    pub fn new(config: AudioConfig) -> Self {
        let sample_rate = config.sample_rate.as_f64();
        let output_channels = config.output_channels as usize;
        let input_channels = config.input_channels as usize;
        let max_frames = config.buffer_size.as_usize() * 4;

        let ring_capacity =
            config.sample_rate.as_u32() as usize * output_channels * RECORD_RING_SECONDS;

        let mut mixer = Mixer::new(sample_rate, output_channels);
        mixer.prepare(sample_rate, max_frames, output_channels);

        Self {
            config,
            mixer: Arc::new(Mutex::new(mixer)),
            meter: Arc::new(Meter::new()),
            recorder: Arc::new(DiskWriter::new(ring_capacity)),
            input_tap: Arc::new(InputTap::new(input_channels, max_frames)),
            stream: None,
        }
    }

    /// Open the default devices and start streaming. An unavailable input
    /// device degrades to output-only with a warning.
    pub fn start(&mut self) -> AudioResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let output_device = get_default_output_device()?;
        let input_device = if self.config.input_channels > 0 {
            match get_default_input_device() {
                Ok(device) => Some(device),
                Err(err) => {
                    log::warn!("no input device, running output-only: {}", err);
                    None
                }
            }
        } else {
            None
        };

        let processor = EngineProcessor::new(
            Arc::clone(&self.mixer),
            Arc::clone(&self.meter),
            Arc::clone(&self.recorder),
            Arc::clone(&self.input_tap),
        );

        let stream = AudioStream::new(
            &output_device,
            input_device.as_ref(),
            self.config.clone(),
            Box::new(processor),
        )?;
        stream.start()?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Stop streaming and any active recording.
    pub fn shutdown(&mut self) -> AudioResult<()> {
        self.recorder.stop_recording();
        if let Some(stream) = self.stream.take() {
            stream.stop()?;
        }
        Ok(())
    }

    // Transport

    pub fn play(&self) {
        self.mixer.lock().play();
    }

    pub fn stop(&self) {
        self.mixer.lock().stop();
    }

    pub fn is_playing(&self) -> bool {
        self.mixer.lock().is_playing()
    }

    pub fn set_position(&self, seconds: f64) {
        self.mixer.lock().set_position(seconds);
    }

    pub fn length_seconds(&self) -> f64 {
        self.mixer.lock().length_seconds()
    }

    // Track CRUD. Structural mutation stops the transport; the caller
    // resumes playback explicitly when ready.

    pub fn add_track(&self, name: impl Into<String>) -> usize {
        let mut mixer = self.mixer.lock();
        mixer.stop();
        mixer.add_track(name)
    }

    /// Add a track wired to the live device input.
    pub fn add_live_track(&self, name: impl Into<String>) -> usize {
        let mut mixer = self.mixer.lock();
        mixer.stop();
        let index = mixer.add_track(name);
        if let Some(track) = mixer.track_mut(index) {
            track.set_source(Box::new(LiveInputSource::new(Arc::clone(&self.input_tap))));
        }
        index
    }

    pub fn remove_track(&self, index: usize) {
        let mut mixer = self.mixer.lock();
        mixer.stop();
        mixer.remove_track(index);
    }

    pub fn num_tracks(&self) -> usize {
        self.mixer.lock().num_tracks()
    }

    /// Load a WAV file into the track's source. Stops the transport. Returns
    /// false (and leaves the old source in place) when the file cannot be
    /// read.
    pub fn load_track_file(&self, index: usize, path: &std::path::Path) -> bool {
        let data = match read_wav(path) {
            Ok(data) => data,
            Err(err) => {
                log::error!("cannot load {}: {}", path.display(), err);
                return false;
            }
        };

        let mut mixer = self.mixer.lock();
        mixer.stop();
        match mixer.track_mut(index) {
            Some(track) => {
                track.load_audio_data(data);
                true
            }
            None => {
                log::error!("no track at index {}", index);
                false
            }
        }
    }

    /// Run `f` against one track under the mixer lock. Parameter setters go
    /// through here; keep `f` short, the callback skips blocks while the
    /// lock is held.
    pub fn with_track_mut<R>(&self, index: usize, f: impl FnOnce(&mut Track) -> R) -> Option<R> {
        let mut mixer = self.mixer.lock();
        mixer.track_mut(index).map(f)
    }

    pub fn set_track_gain(&self, index: usize, gain: f32) {
        self.with_track_mut(index, |t| t.set_gain(gain));
    }

    pub fn set_track_muted(&self, index: usize, muted: bool) {
        self.with_track_mut(index, |t| t.set_muted(muted));
    }

    pub fn set_track_solo(&self, index: usize, solo: bool) {
        self.with_track_mut(index, |t| t.set_solo(solo));
    }

    // Recording

    pub fn start_recording(&self, path: &std::path::Path, bit_depth: BitDepth) -> bool {
        self.recorder.start_recording(
            path,
            self.config.sample_rate.as_u32(),
            self.config.output_channels as usize,
            bit_depth,
        )
    }

    pub fn stop_recording(&self) {
        self.recorder.stop_recording();
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn recording_frames_written(&self) -> u64 {
        self.recorder.frames_written()
    }

    pub fn recording_overruns(&self) -> u64 {
        self.recorder.overrun_count()
    }

    // Metering

    pub fn get_and_reset_peak(&self, channel: usize) -> f32 {
        self.meter.get_and_reset_peak(channel)
    }

    pub fn rms(&self, channel: usize) -> f32 {
        self.meter.rms(channel)
    }

    pub fn meter(&self) -> Arc<Meter> {
        Arc::clone(&self.meter)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("engine shutdown: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use od_file::AudioData;

    fn constant_data(value: f32, frames: usize) -> AudioData {
        AudioData {
            channels: vec![vec![value; frames]; 2],
            sample_rate: 48000,
            bit_depth: BitDepth::Float32,
        }
    }

    fn processor_for(engine: &AudioEngine) -> EngineProcessor {
        EngineProcessor::new(
            Arc::clone(&engine.mixer),
            engine.meter(),
            Arc::clone(&engine.recorder),
            Arc::clone(&engine.input_tap),
        )
    }

    #[test]
    fn test_callback_pipeline_mixes_meters_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixdown.wav");

        let engine = AudioEngine::new(AudioConfig::default());
        let idx = engine.add_track("tone");
        engine.with_track_mut(idx, |t| t.load_audio_data(constant_data(0.25, 48000)));
        engine.play();

        let mut processor = processor_for(&engine);
        processor.prepare(48000.0, 1024);

        assert!(engine.start_recording(&path, BitDepth::Float32));

        let input = AudioBuffer::new(2, 256);
        let mut output = AudioBuffer::new(2, 256);
        for _ in 0..4 {
            processor.process(&input, &mut output);
            assert!((output.channel(0)[0] - 0.25).abs() < 1e-6);
            assert!((output.channel(1)[255] - 0.25).abs() < 1e-6);
        }

        assert!((engine.rms(0) - 0.25).abs() < 1e-6);
        assert_eq!(engine.get_and_reset_peak(0), 0.25);
        assert_eq!(engine.get_and_reset_peak(0), 0.0);

        engine.stop_recording();
        assert_eq!(engine.recording_frames_written(), 1024);
        assert_eq!(engine.recording_overruns(), 0);

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.num_frames(), 1024);
        assert!((loaded.channels[0][500] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_contended_mixer_degrades_to_silence() {
        let engine = AudioEngine::new(AudioConfig::default());
        let idx = engine.add_track("tone");
        engine.with_track_mut(idx, |t| t.load_audio_data(constant_data(0.5, 48000)));
        engine.play();

        let mut processor = processor_for(&engine);
        processor.prepare(48000.0, 1024);

        let input = AudioBuffer::new(2, 256);
        let mut output = AudioBuffer::new(2, 256);
        output.channel_mut(0).fill(0.9);

        // Control thread holds the mixer; the callback must not block.
        let guard = engine.mixer.lock();
        processor.process(&input, &mut output);
        drop(guard);

        assert_eq!(output.peak(0), 0.0);
        assert_eq!(output.peak(1), 0.0);
    }

    #[test]
    fn test_live_track_monitors_input() {
        let engine = AudioEngine::new(AudioConfig::default());
        let idx = engine.add_live_track("mic");
        engine.play();

        let mut processor = processor_for(&engine);
        processor.prepare(48000.0, 1024);

        let mut input = AudioBuffer::new(2, 256);
        input.channel_mut(0).fill(0.3);
        input.channel_mut(1).fill(-0.3);
        let mut output = AudioBuffer::new(2, 256);
        processor.process(&input, &mut output);

        assert!((output.channel(0)[0] - 0.3).abs() < 1e-6);
        assert!((output.channel(1)[255] + 0.3).abs() < 1e-6);
        assert_eq!(engine.num_tracks(), 1);
        let _ = idx;
    }

    #[test]
    fn test_structural_mutation_stops_transport() {
        let engine = AudioEngine::new(AudioConfig::default());
        engine.add_track("a");
        engine.play();
        assert!(engine.is_playing());

        engine.add_track("b");
        assert!(!engine.is_playing());

        engine.play();
        engine.remove_track(0);
        assert!(!engine.is_playing());
        assert_eq!(engine.num_tracks(), 1);
    }
}
