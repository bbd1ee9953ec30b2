//! Minimal MIDI event type for insert processors
//!
//! Plugin hosting mechanics live outside this engine; inserts only receive
//! the per-block event list alongside the audio.

/// A raw MIDI event with a sample-accurate offset into the current block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    /// Frame offset within the block
    pub frame: u32,
    /// Status byte (message type + channel)
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiEvent {
    pub const fn new(frame: u32, status: u8, data1: u8, data2: u8) -> Self {
        Self {
            frame,
            status,
            data1,
            data2,
        }
    }

    /// Note-on with velocity > 0
    #[inline]
    pub fn is_note_on(&self) -> bool {
        (self.status & 0xF0) == 0x90 && self.data2 > 0
    }

    #[inline]
    pub fn is_note_off(&self) -> bool {
        (self.status & 0xF0) == 0x80 || ((self.status & 0xF0) == 0x90 && self.data2 == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_classification() {
        assert!(MidiEvent::new(0, 0x90, 60, 100).is_note_on());
        assert!(MidiEvent::new(0, 0x90, 60, 0).is_note_off());
        assert!(MidiEvent::new(0, 0x80, 60, 64).is_note_off());
    }
}
