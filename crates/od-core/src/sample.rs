//! Sample type and planar audio buffer

/// Type alias for audio samples (f32 end to end; the device boundary,
/// file formats, and DSP all share this precision)
pub type Sample = f32;

/// Owned planar audio buffer
///
/// Channels are stored as separate contiguous slices. The buffer is allocated
/// once to a maximum frame capacity; `set_frames` trims the active region
/// without reallocating, so it is safe to call from the audio thread when the
/// device delivers a short block.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    data: Vec<Vec<Sample>>,
    capacity_frames: usize,
    frames: usize,
}

impl AudioBuffer {
    /// Create a buffer of `num_channels` x `frames`, zero-filled
    pub fn new(num_channels: usize, frames: usize) -> Self {
        Self {
            data: vec![vec![0.0; frames]; num_channels],
            capacity_frames: frames,
            frames,
        }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Trim the active region to `frames` (must not exceed capacity).
    /// Does not allocate.
    #[inline]
    pub fn set_frames(&mut self, frames: usize) {
        debug_assert!(frames <= self.capacity_frames);
        self.frames = frames.min(self.capacity_frames);
    }

    /// Reallocate for a new channel count / capacity. Control thread only.
    pub fn resize(&mut self, num_channels: usize, frames: usize) {
        self.data = vec![vec![0.0; frames]; num_channels];
        self.capacity_frames = frames;
        self.frames = frames;
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[Sample] {
        &self.data[ch][..self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [Sample] {
        &mut self.data[ch][..self.frames]
    }

    /// Iterate mutably over the active region of every channel
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [Sample]> {
        let frames = self.frames;
        self.data.iter_mut().map(move |ch| &mut ch[..frames])
    }

    /// Zero the active region of all channels
    pub fn clear(&mut self) {
        for ch in self.data.iter_mut() {
            ch[..self.frames].fill(0.0);
        }
    }

    /// Multiply every sample in the active region by `gain`
    pub fn apply_gain(&mut self, gain: Sample) {
        for ch in self.data.iter_mut() {
            for s in &mut ch[..self.frames] {
                *s *= gain;
            }
        }
    }

    /// Accumulate `other` into this buffer, limited to the common channel
    /// count and the common frame count
    pub fn add_from(&mut self, other: &AudioBuffer) {
        let channels = self.num_channels().min(other.num_channels());
        let frames = self.frames.min(other.frames);
        for ch in 0..channels {
            let src = &other.data[ch][..frames];
            let dst = &mut self.data[ch][..frames];
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d += *s;
            }
        }
    }

    /// Copy `other` into this buffer, limited to the common channel count
    /// and frame count; remaining channels are zeroed
    pub fn copy_from(&mut self, other: &AudioBuffer) {
        let channels = self.num_channels().min(other.num_channels());
        let frames = self.frames.min(other.frames);
        for ch in 0..channels {
            self.data[ch][..frames].copy_from_slice(&other.data[ch][..frames]);
        }
        for ch in channels..self.num_channels() {
            self.data[ch][..self.frames].fill(0.0);
        }
    }

    /// Maximum absolute sample over the active region of one channel
    pub fn peak(&self, ch: usize) -> Sample {
        self.channel(ch)
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_basic() {
        let mut buf = AudioBuffer::new(2, 64);
        assert_eq!(buf.num_channels(), 2);
        assert_eq!(buf.frames(), 64);

        buf.channel_mut(0)[0] = 0.5;
        buf.channel_mut(1)[63] = -0.25;
        assert_eq!(buf.peak(0), 0.5);
        assert_eq!(buf.peak(1), 0.25);

        buf.clear();
        assert_eq!(buf.peak(0), 0.0);
        assert_eq!(buf.peak(1), 0.0);
    }

    #[test]
    fn test_set_frames_trims_without_touching_capacity() {
        let mut buf = AudioBuffer::new(1, 128);
        buf.set_frames(32);
        assert_eq!(buf.frames(), 32);
        assert_eq!(buf.capacity_frames(), 128);
        assert_eq!(buf.channel(0).len(), 32);
    }

    #[test]
    fn test_apply_gain_and_add_from() {
        let mut a = AudioBuffer::new(2, 4);
        let mut b = AudioBuffer::new(2, 4);
        for ch in 0..2 {
            a.channel_mut(ch).fill(0.5);
            b.channel_mut(ch).fill(0.25);
        }
        a.apply_gain(2.0);
        a.add_from(&b);
        assert_eq!(a.channel(0)[0], 1.25);
        assert_eq!(a.channel(1)[3], 1.25);
    }

    #[test]
    fn test_add_from_channel_limited() {
        let mut out = AudioBuffer::new(2, 4);
        let mut src = AudioBuffer::new(1, 4);
        src.channel_mut(0).fill(1.0);
        out.add_from(&src);
        assert_eq!(out.channel(0)[0], 1.0);
        assert_eq!(out.channel(1)[0], 0.0);
    }
}
