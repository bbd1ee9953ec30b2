//! od-file: Audio File I/O
//!
//! WAV import/export (via hound) and the background disk writer used while
//! recording. The disk writer drains a lock-free ring fed by the audio
//! thread, so file I/O never happens on the real-time path.

mod audio_file;
mod disk_writer;
mod error;

pub use audio_file::*;
pub use disk_writer::*;
pub use error::*;
