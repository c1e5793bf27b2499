//! Multichannel audio buffers.
//!
//! [`AudioBuffer`] keeps one `Vec<f32>` per channel, allocated up front to a
//! fixed capacity. The active frame count can shrink and grow within that
//! capacity without touching the allocator, which is what the render path
//! relies on: node buffers are sized at prepare time on the control thread and
//! only re-sliced per block afterwards.

/// A pre-sized multichannel sample buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    capacity: usize,
    frames: usize,
}

impl AudioBuffer {
    /// Creates a zeroed buffer with `num_channels` channels of `capacity` frames.
    ///
    /// The active frame count starts at `capacity`.
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        Self {
            channels: vec![vec![0.0; capacity]; num_channels],
            capacity,
            frames: capacity,
        }
    }

    /// Builds a buffer that takes ownership of per-channel sample vectors.
    ///
    /// Channels shorter than the longest one are zero-padded.
    pub fn from_channels(mut channels: Vec<Vec<f32>>) -> Self {
        let capacity = channels.iter().map(Vec::len).max().unwrap_or(0);
        for ch in &mut channels {
            ch.resize(capacity, 0.0);
        }
        Self {
            channels,
            capacity,
            frames: capacity,
        }
    }

    /// Consumes the buffer and returns the active region of each channel.
    pub fn into_channels(mut self) -> Vec<Vec<f32>> {
        for ch in &mut self.channels {
            ch.truncate(self.frames);
        }
        self.channels
    }

    /// Returns the number of channels.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Returns the number of active frames.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Returns the allocated frame capacity per channel.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if there are no active frames or no channels.
    pub fn is_empty(&self) -> bool {
        self.frames == 0 || self.channels.is_empty()
    }

    /// Sets the active frame count, clamped to capacity. Never allocates.
    ///
    /// Returns the frame count actually applied.
    #[inline]
    pub fn set_frames(&mut self, frames: usize) -> usize {
        self.frames = frames.min(self.capacity);
        self.frames
    }

    /// Reallocates to a new shape. Existing samples are kept where they fit.
    ///
    /// Not real-time safe.
    pub fn resize(&mut self, num_channels: usize, capacity: usize) {
        self.channels.resize_with(num_channels, Vec::new);
        for ch in &mut self.channels {
            ch.resize(capacity, 0.0);
        }
        self.capacity = capacity;
        self.frames = self.frames.min(capacity);
    }

    /// Extends the buffer to at least `frames` frames, keeping content.
    ///
    /// Not real-time safe. Used by recording writers that grow their take.
    pub fn grow_to(&mut self, frames: usize) {
        if frames > self.capacity {
            for ch in &mut self.channels {
                ch.resize(frames, 0.0);
            }
            self.capacity = frames;
        }
        self.frames = self.frames.max(frames);
    }

    /// Returns the active region of a channel.
    ///
    /// # Panics
    ///
    /// Panics if `channel >= num_channels()`.
    #[inline]
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.channels[channel][..self.frames]
    }

    /// Returns the active region of a channel mutably.
    ///
    /// # Panics
    ///
    /// Panics if `channel >= num_channels()`.
    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.channels[channel][..self.frames]
    }

    /// Returns the active region of a channel, or `None` if out of range.
    #[inline]
    pub fn get(&self, channel: usize) -> Option<&[f32]> {
        self.channels.get(channel).map(|c| &c[..self.frames])
    }

    /// Returns the active region of a channel mutably, or `None` if out of range.
    #[inline]
    pub fn get_mut(&mut self, channel: usize) -> Option<&mut [f32]> {
        let frames = self.frames;
        self.channels.get_mut(channel).map(|c| &mut c[..frames])
    }

    /// Fills the active region of every channel with zeros.
    pub fn clear(&mut self) {
        let frames = self.frames;
        for ch in &mut self.channels {
            ch[..frames].fill(0.0);
        }
    }

    /// Zeros `len` frames starting at `start` on every channel (clamped).
    pub fn clear_range(&mut self, start: usize, len: usize) {
        let start = start.min(self.frames);
        let end = start.saturating_add(len).min(self.frames);
        for ch in &mut self.channels {
            ch[start..end].fill(0.0);
        }
    }

    /// Copies `src` into the start of a channel. Extra samples on either side
    /// are ignored. Out-of-range channels are a no-op.
    #[inline]
    pub fn copy_from(&mut self, channel: usize, src: &[f32]) {
        if let Some(dst) = self.get_mut(channel) {
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
        }
    }

    /// Adds `src` into the start of a channel (mix/accumulate).
    #[inline]
    pub fn add_from(&mut self, channel: usize, src: &[f32]) {
        if let Some(dst) = self.get_mut(channel) {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d += *s;
            }
        }
    }

    /// Multiplies every active sample by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        let frames = self.frames;
        for ch in &mut self.channels {
            for s in &mut ch[..frames] {
                *s *= gain;
            }
        }
    }

    /// Multiplies one channel by `gain`. Out-of-range channels are a no-op.
    pub fn apply_channel_gain(&mut self, channel: usize, gain: f32) {
        if let Some(ch) = self.get_mut(channel) {
            for s in ch {
                *s *= gain;
            }
        }
    }

    /// Returns the peak absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c[..self.frames].iter())
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Writes the active region interleaved into `out` with `out_channels`
    /// channels per frame. Missing source channels write silence.
    ///
    /// Returns the number of frames written.
    pub fn write_interleaved(&self, out: &mut [f32], out_channels: usize) -> usize {
        if out_channels == 0 {
            return 0;
        }
        let frames = (out.len() / out_channels).min(self.frames);
        for (frame, chunk) in out.chunks_mut(out_channels).take(frames).enumerate() {
            for (ch, sample) in chunk.iter_mut().enumerate() {
                *sample = self.channels.get(ch).map_or(0.0, |c| c[frame]);
            }
        }
        frames
    }

    /// Reads interleaved samples into the start of the buffer.
    ///
    /// Returns the number of frames read.
    pub fn read_interleaved(&mut self, input: &[f32], in_channels: usize) -> usize {
        if in_channels == 0 {
            return 0;
        }
        let frames = (input.len() / in_channels).min(self.frames);
        for (frame, chunk) in input.chunks(in_channels).take(frames).enumerate() {
            for (ch, sample) in chunk.iter().enumerate() {
                if let Some(c) = self.channels.get_mut(ch) {
                    c[frame] = *sample;
                }
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let buf = AudioBuffer::new(2, 64);
        assert_eq!(buf.num_channels(), 2);
        assert_eq!(buf.frames(), 64);
        assert!(buf.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_set_frames_clamps_to_capacity() {
        let mut buf = AudioBuffer::new(1, 32);
        assert_eq!(buf.set_frames(100), 32);
        assert_eq!(buf.set_frames(8), 8);
        assert_eq!(buf.channel(0).len(), 8);
    }

    #[test]
    fn test_add_from_accumulates() {
        let mut buf = AudioBuffer::new(1, 4);
        buf.copy_from(0, &[1.0, 1.0, 1.0, 1.0]);
        buf.add_from(0, &[0.5, 0.5]);
        assert_eq!(buf.channel(0), &[1.5, 1.5, 1.0, 1.0]);
    }

    #[test]
    fn test_out_of_range_channel_is_noop() {
        let mut buf = AudioBuffer::new(1, 4);
        buf.copy_from(3, &[1.0; 4]);
        buf.add_from(3, &[1.0; 4]);
        assert!(buf.get(3).is_none());
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn test_grow_keeps_content() {
        let mut buf = AudioBuffer::from_channels(vec![vec![1.0, 2.0]]);
        buf.grow_to(4);
        assert_eq!(buf.channel(0), &[1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_interleave_roundtrip_pads_missing_channels() {
        let buf = AudioBuffer::from_channels(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let mut out = vec![9.0; 6];
        assert_eq!(buf.write_interleaved(&mut out, 3), 2);
        assert_eq!(out, vec![1.0, 3.0, 0.0, 2.0, 4.0, 0.0]);

        let mut back = AudioBuffer::new(2, 2);
        back.read_interleaved(&out, 3);
        assert_eq!(back.channel(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_clear_range() {
        let mut buf = AudioBuffer::from_channels(vec![vec![1.0; 6]]);
        buf.clear_range(2, 2);
        assert_eq!(buf.channel(0), &[1.0, 1.0, 0.0, 0.0, 1.0, 1.0]);
        buf.clear_range(5, 100);
        assert_eq!(buf.channel(0)[5], 0.0);
    }
}
