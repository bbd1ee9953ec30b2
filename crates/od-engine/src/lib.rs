//! od-engine: Multi-track mixing engine
//!
//! Ties the pipeline together: audio sources feed tracks, tracks run their
//! insert chains and gain stage, the mixer resolves mute/solo and sums into
//! the output block, and the engine glue drives it all from the device
//! callback while feeding the meter and the disk recorder.

mod engine;
mod mixer;
mod source;
mod track;

pub use engine::*;
pub use mixer::*;
pub use source::*;
pub use track::*;
