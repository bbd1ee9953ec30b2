//! WAV reading and writing
//!
//! Supports 16/24/32-bit integer and 32-bit float WAV. Loaded audio is held
//! deinterleaved, one Vec per channel, ready for the playback sources.

use std::path::Path;

use od_core::Sample;

use crate::{FileError, FileResult};

/// Bit depth for file storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Int16,
    Int24,
    Float32,
}

impl BitDepth {
    pub fn bits(&self) -> u16 {
        match self {
            Self::Int16 => 16,
            Self::Int24 => 24,
            Self::Float32 => 32,
        }
    }

    pub fn sample_format(&self) -> hound::SampleFormat {
        match self {
            Self::Float32 => hound::SampleFormat::Float,
            _ => hound::SampleFormat::Int,
        }
    }

    pub(crate) fn wav_spec(&self, sample_rate: u32, channels: u16) -> hound::WavSpec {
        hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: self.bits(),
            sample_format: self.sample_format(),
        }
    }
}

/// Loaded audio data, deinterleaved
#[derive(Debug, Clone)]
pub struct AudioData {
    /// One Vec of samples per channel
    pub channels: Vec<Vec<Sample>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bit depth of the source file
    pub bit_depth: BitDepth,
}

impl AudioData {
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn duration(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate as f64
    }
}

/// Read a WAV file into deinterleaved sample data
pub fn read_wav<P: AsRef<Path>>(path: P) -> FileResult<AudioData> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(FileError::NotFound(path.display().to_string()));
    }

    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let num_channels = spec.channels as usize;
    if num_channels == 0 {
        return Err(FileError::InvalidFile(format!(
            "{}: zero channels",
            path.display()
        )));
    }
    let sample_rate = spec.sample_rate;
    let bit_depth = match (spec.bits_per_sample, spec.sample_format) {
        (16, hound::SampleFormat::Int) => BitDepth::Int16,
        (24, hound::SampleFormat::Int) => BitDepth::Int24,
        (32, hound::SampleFormat::Float) => BitDepth::Float32,
        (bits, _) => {
            return Err(FileError::UnsupportedFormat(format!(
                "{}-bit WAV",
                bits
            )));
        }
    };

    let samples: Vec<Sample> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.unwrap_or(0.0))
            .collect(),
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.unwrap_or(0) as f32 / max_value)
                .collect()
        }
    };

    // Deinterleave
    let num_frames = samples.len() / num_channels;
    let mut channels = vec![vec![0.0; num_frames]; num_channels];
    for (i, chunk) in samples.chunks_exact(num_channels).enumerate() {
        for (ch, &sample) in chunk.iter().enumerate() {
            channels[ch][i] = sample;
        }
    }

    Ok(AudioData {
        channels,
        sample_rate,
        bit_depth,
    })
}

/// Write deinterleaved sample data to a WAV file
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    data: &AudioData,
    bit_depth: BitDepth,
) -> FileResult<()> {
    let spec = bit_depth.wav_spec(data.sample_rate, data.num_channels() as u16);
    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;

    let num_frames = data.num_frames();
    let num_channels = data.num_channels();

    for i in 0..num_frames {
        for ch in 0..num_channels {
            let sample = data.channels[ch][i];
            write_sample(&mut writer, sample, bit_depth)?;
        }
    }

    writer.finalize()?;
    Ok(())
}

pub(crate) fn write_sample<W: std::io::Write + std::io::Seek>(
    writer: &mut hound::WavWriter<W>,
    sample: Sample,
    bit_depth: BitDepth,
) -> FileResult<()> {
    match bit_depth {
        BitDepth::Float32 => writer.write_sample(sample)?,
        BitDepth::Int16 => {
            writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?
        }
        BitDepth::Int24 => {
            writer.write_sample((sample.clamp(-1.0, 1.0) * 8_388_607.0) as i32)?
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_data(channels: usize, frames: usize, sample_rate: u32) -> AudioData {
        let mut data = AudioData {
            channels: vec![vec![0.0; frames]; channels],
            sample_rate,
            bit_depth: BitDepth::Float32,
        };
        for ch in 0..channels {
            for i in 0..frames {
                data.channels[ch][i] =
                    (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin()
                        * 0.5;
            }
        }
        data
    }

    #[test]
    fn test_wav_float_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wav");

        let data = sine_data(2, 4800, 48000);
        write_wav(&path, &data, BitDepth::Float32).unwrap();

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.num_channels(), 2);
        assert_eq!(loaded.num_frames(), 4800);
        assert_eq!(loaded.sample_rate, 48000);
        for i in 0..4800 {
            assert!((loaded.channels[0][i] - data.channels[0][i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_wav_int16_quantization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test16.wav");

        let data = sine_data(1, 1000, 44100);
        write_wav(&path, &data, BitDepth::Int16).unwrap();

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.bit_depth, BitDepth::Int16);
        for i in 0..1000 {
            // 16-bit quantization error bound
            assert!((loaded.channels[0][i] - data.channels[0][i]).abs() < 1.0 / 32000.0);
        }
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = read_wav("/nonexistent/path/missing.wav").unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));
    }
}
