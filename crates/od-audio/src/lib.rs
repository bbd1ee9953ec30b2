//! od-audio: Audio device I/O using cpal
//!
//! The device boundary of the engine: host/device selection, the
//! `AudioProcessor` callback trait, the cpal stream wrapper that converts
//! between the device's interleaved frames and planar buffers, and the
//! atomic level meter shared with the UI thread.

mod device;
mod error;
mod meter;
mod stream;

pub use device::*;
pub use error::*;
pub use meter::*;
pub use stream::*;

use od_core::{BufferSize, SampleRate};

/// Audio engine configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: SampleRate,
    pub buffer_size: BufferSize,
    pub input_channels: u16,
    pub output_channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            buffer_size: BufferSize::Samples256,
            input_channels: 2,
            output_channels: 2,
        }
    }
}
