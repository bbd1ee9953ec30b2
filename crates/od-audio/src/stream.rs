//! Audio stream management
//!
//! Wraps a pair of cpal streams (output mandatory, input optional) around an
//! `AudioProcessor`. Device input arrives interleaved on the input stream's
//! thread and crosses to the output callback through a lock-free ring; the
//! output callback deinterleaves it, runs the processor on planar buffers
//! and interleaves the result back out with a final clip to [-1, 1].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, Device, SampleFormat, Stream, StreamConfig,
    SupportedStreamConfig,
};
use parking_lot::Mutex;

use od_core::{AudioBuffer, RingTransport, Sample};

use crate::{AudioConfig, AudioError, AudioResult};

/// Block-based audio callback. `process` runs on the device thread, so
/// implementations must not block or allocate there.
pub trait AudioProcessor: Send {
    /// Called before the stream starts delivering blocks.
    fn prepare(&mut self, sample_rate: f64, max_frames: usize);

    /// Produce one block. `input` holds captured device input (silent when
    /// no input device is open); `output` arrives cleared.
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer);

    /// Called after the stream has stopped.
    fn release(&mut self);
}

/// Headroom factor: the device may deliver blocks larger than requested.
const FRAME_HEADROOM: usize = 4;

struct StreamShared {
    processor: Mutex<Box<dyn AudioProcessor>>,
    running: AtomicBool,
}

/// A running pair of cpal streams driving an `AudioProcessor`.
pub struct AudioStream {
    output_stream: Stream,
    input_stream: Option<Stream>,
    shared: Arc<StreamShared>,
    config: AudioConfig,
    sample_rate: f64,
    max_frames: usize,
}

impl AudioStream {
    pub fn new(
        output_device: &Device,
        input_device: Option<&Device>,
        config: AudioConfig,
        processor: Box<dyn AudioProcessor>,
    ) -> AudioResult<Self> {
        let shared = Arc::new(StreamShared {
            processor: Mutex::new(processor),
            running: AtomicBool::new(false),
        });

        let max_frames = config.buffer_size.as_usize() * FRAME_HEADROOM;
        let input_channels = config.input_channels as usize;
        let input_ring = Arc::new(RingTransport::new(
            (max_frames * input_channels.max(1) * 2).max(2),
        ));

        let output_config = get_output_stream_config(output_device, &config)?;
        let sample_rate = output_config.sample_rate().0 as f64;

        let output_stream = build_output_stream(
            output_device,
            &output_config,
            &config,
            max_frames,
            Arc::clone(&shared),
            Arc::clone(&input_ring),
        )?;

        let input_stream = match input_device {
            Some(device) => {
                let input_config = get_input_stream_config(device, &config)?;
                Some(build_input_stream(
                    device,
                    &input_config,
                    &config,
                    input_channels,
                    Arc::clone(&input_ring),
                )?)
            }
            None => None,
        };

        Ok(Self {
            output_stream,
            input_stream,
            shared,
            config,
            sample_rate,
            max_frames,
        })
    }

    /// Prepare the processor and start delivering blocks.
    pub fn start(&self) -> AudioResult<()> {
        self.shared
            .processor
            .lock()
            .prepare(self.sample_rate, self.max_frames);

        self.output_stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        if let Some(ref stream) = self.input_stream {
            stream
                .play()
                .map_err(|e| AudioError::StreamError(e.to_string()))?;
        }

        self.shared.running.store(true, Ordering::Release);
        log::info!("audio stream started at {} Hz", self.sample_rate);
        Ok(())
    }

    /// Stop the streams and release the processor.
    pub fn stop(&self) -> AudioResult<()> {
        self.output_stream
            .pause()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        if let Some(ref stream) = self.input_stream {
            stream
                .pause()
                .map_err(|e| AudioError::StreamError(e.to_string()))?;
        }

        self.shared.running.store(false, Ordering::Release);
        self.shared.processor.lock().release();
        log::info!("audio stream stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Actual device sample rate
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

fn get_output_stream_config(
    device: &Device,
    config: &AudioConfig,
) -> AudioResult<SupportedStreamConfig> {
    let sample_rate = cpal::SampleRate(config.sample_rate.as_u32());
    let channels = config.output_channels;

    let configs = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    for supported in configs {
        if supported.channels() >= channels
            && supported.min_sample_rate() <= sample_rate
            && supported.max_sample_rate() >= sample_rate
            && supported.sample_format() == SampleFormat::F32
        {
            return Ok(supported.with_sample_rate(sample_rate));
        }
    }

    Err(AudioError::ConfigError(format!(
        "no matching output config for {} channels @ {} Hz",
        channels,
        config.sample_rate.as_u32()
    )))
}

fn get_input_stream_config(
    device: &Device,
    config: &AudioConfig,
) -> AudioResult<SupportedStreamConfig> {
    let sample_rate = cpal::SampleRate(config.sample_rate.as_u32());
    let channels = config.input_channels;

    let configs = device
        .supported_input_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    for supported in configs {
        if supported.channels() >= channels
            && supported.min_sample_rate() <= sample_rate
            && supported.max_sample_rate() >= sample_rate
            && supported.sample_format() == SampleFormat::F32
        {
            return Ok(supported.with_sample_rate(sample_rate));
        }
    }

    Err(AudioError::ConfigError(format!(
        "no matching input config for {} channels @ {} Hz",
        channels,
        config.sample_rate.as_u32()
    )))
}

fn build_output_stream(
    device: &Device,
    supported_config: &SupportedStreamConfig,
    config: &AudioConfig,
    max_frames: usize,
    shared: Arc<StreamShared>,
    input_ring: Arc<RingTransport>,
) -> AudioResult<Stream> {
    let device_channels = supported_config.channels() as usize;
    let input_channels = config.input_channels as usize;
    let output_channels = config.output_channels as usize;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(config.buffer_size.as_usize() as u32),
    };

    // All callback storage is preallocated here.
    let mut input_buffer = AudioBuffer::new(input_channels.max(1), max_frames);
    let mut output_buffer = AudioBuffer::new(output_channels, max_frames);
    let mut input_scratch = vec![0.0 as Sample; max_frames * input_channels.max(1)];

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = (data.len() / device_channels).min(max_frames);

                // Pull whatever input has arrived; missing samples stay silent.
                input_buffer.set_frames(frames);
                input_buffer.clear();
                if input_channels > 0 {
                    let wanted = frames * input_channels;
                    let got = input_ring.read(&mut input_scratch[..wanted]);
                    deinterleave(
                        &input_scratch[..got - got % input_channels],
                        &mut input_buffer,
                        input_channels,
                    );
                }

                output_buffer.set_frames(frames);
                output_buffer.clear();
                {
                    let mut processor = shared.processor.lock();
                    processor.process(&input_buffer, &mut output_buffer);
                }

                interleave_clipped(&output_buffer, data, device_channels);
            },
            move |err| {
                log::error!("audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}

fn build_input_stream(
    device: &Device,
    supported_config: &SupportedStreamConfig,
    config: &AudioConfig,
    input_channels: usize,
    input_ring: Arc<RingTransport>,
) -> AudioResult<Stream> {
    let device_channels = supported_config.channels() as usize;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(config.buffer_size.as_usize() as u32),
    };

    let mut frame = vec![0.0 as Sample; input_channels.max(1)];

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Repack device frames to the configured channel count. A
                // full ring drops frames; the consumer treats gaps as
                // silence.
                for device_frame in data.chunks(device_channels) {
                    for (ch, slot) in frame.iter_mut().enumerate() {
                        *slot = device_frame.get(ch).copied().unwrap_or(0.0);
                    }
                    push_frame(&input_ring, &frame);
                }
            },
            move |err| {
                log::error!("audio input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}

#[inline]
fn push_frame(ring: &RingTransport, frame: &[Sample]) {
    if ring.free_space() >= frame.len() {
        ring.write(frame);
    }
}

/// Spread interleaved samples into planar channels. Input length must be a
/// multiple of `channels`.
fn deinterleave(interleaved: &[Sample], planar: &mut AudioBuffer, channels: usize) {
    for (i, chunk) in interleaved.chunks_exact(channels).enumerate() {
        for (ch, &sample) in chunk.iter().enumerate() {
            planar.channel_mut(ch)[i] = sample;
        }
    }
}

/// Interleave planar channels into the device buffer, clipping to [-1, 1].
/// Device channels beyond the planar count are zeroed; a mono device gets a
/// downmix of the first two planar channels.
fn interleave_clipped(planar: &AudioBuffer, data: &mut [f32], device_channels: usize) {
    let planar_channels = planar.num_channels();
    let frames = planar.frames();

    if device_channels == 1 && planar_channels >= 2 {
        for (i, sample) in data.iter_mut().enumerate() {
            if i >= frames {
                *sample = 0.0;
                continue;
            }
            let mono = (planar.channel(0)[i] + planar.channel(1)[i]) * 0.5;
            *sample = mono.clamp(-1.0, 1.0);
        }
        return;
    }

    for (i, device_frame) in data.chunks_mut(device_channels).enumerate() {
        for (ch, sample) in device_frame.iter_mut().enumerate() {
            *sample = if i < frames && ch < planar_channels {
                planar.channel(ch)[i].clamp(-1.0, 1.0)
            } else {
                0.0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave_stereo() {
        let interleaved = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        let mut planar = AudioBuffer::new(2, 3);
        deinterleave(&interleaved, &mut planar, 2);

        assert_eq!(planar.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(planar.channel(1), &[-1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_interleave_clips_output() {
        let mut planar = AudioBuffer::new(2, 2);
        planar.channel_mut(0).copy_from_slice(&[1.5, -2.0]);
        planar.channel_mut(1).copy_from_slice(&[0.25, 0.5]);

        let mut data = [0.0f32; 4];
        interleave_clipped(&planar, &mut data, 2);
        assert_eq!(data, [1.0, 0.25, -1.0, 0.5]);
    }

    #[test]
    fn test_interleave_mono_downmix() {
        let mut planar = AudioBuffer::new(2, 2);
        planar.channel_mut(0).copy_from_slice(&[1.0, 0.0]);
        planar.channel_mut(1).copy_from_slice(&[0.0, 0.5]);

        let mut data = [0.0f32; 2];
        interleave_clipped(&planar, &mut data, 1);
        assert_eq!(data, [0.5, 0.25]);
    }

    #[test]
    fn test_interleave_zeroes_extra_device_channels() {
        let mut planar = AudioBuffer::new(1, 2);
        planar.channel_mut(0).copy_from_slice(&[0.5, -0.5]);

        let mut data = [9.0f32; 6];
        interleave_clipped(&planar, &mut data, 3);
        assert_eq!(data, [0.5, 0.0, 0.0, -0.5, 0.0, 0.0]);
    }
}
