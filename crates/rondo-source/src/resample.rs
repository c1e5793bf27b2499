//! Linear-interpolating resampler between a source's native rate and the
//! session rate.

use rondo_core::AudioBuffer;

/// Maps session-rate output frames onto source-rate content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resampler {
    ratio: f64,
}

impl Resampler {
    /// Creates a resampler reading `source_rate` content at `target_rate`.
    pub fn new(source_rate: f64, target_rate: f64) -> Self {
        let mut r = Self { ratio: 1.0 };
        r.set_rates(source_rate, target_rate);
        r
    }

    /// Recomputes the ratio. Non-positive rates fall back to 1:1.
    pub fn set_rates(&mut self, source_rate: f64, target_rate: f64) {
        self.ratio = if source_rate > 0.0 && target_rate > 0.0 {
            source_rate / target_rate
        } else {
            1.0
        };
    }

    /// Source frames consumed per output frame.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Renders `count` output frames into `dest` starting at `dest_start`,
    /// reading `source` from frame position `source_pos`.
    ///
    /// Positions past the end of the content produce silence. A mono source
    /// feeds every destination channel; otherwise destination channels with
    /// no matching source channel are silenced.
    pub fn render(
        &self,
        source: &[Vec<f32>],
        source_pos: f64,
        dest: &mut AudioBuffer,
        dest_start: usize,
        count: usize,
    ) {
        let end = (dest_start + count).min(dest.frames());
        if dest_start >= end {
            return;
        }
        for ch in 0..dest.num_channels() {
            let src = match source.len() {
                0 => None,
                1 => source.first(),
                _ => source.get(ch),
            };
            let Some(out) = dest.get_mut(ch) else {
                continue;
            };
            let out = &mut out[dest_start..end];
            match src {
                Some(src) => self.render_channel(src, source_pos, out),
                None => out.fill(0.0),
            }
        }
    }

    fn render_channel(&self, src: &[f32], source_pos: f64, out: &mut [f32]) {
        let len = src.len();
        if self.ratio == 1.0 && source_pos.fract() == 0.0 && source_pos >= 0.0 {
            let start = (source_pos as usize).min(len);
            let n = out.len().min(len - start);
            out[..n].copy_from_slice(&src[start..start + n]);
            out[n..].fill(0.0);
            return;
        }
        for (i, sample) in out.iter_mut().enumerate() {
            let pos = source_pos + i as f64 * self.ratio;
            if pos < 0.0 {
                *sample = 0.0;
                continue;
            }
            let idx = pos.floor() as usize;
            if idx >= len {
                *sample = 0.0;
                continue;
            }
            let frac = (pos - idx as f64) as f32;
            let a = src[idx];
            let b = src.get(idx + 1).copied().unwrap_or(a);
            *sample = a + (b - a) * frac;
        }
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self { ratio: 1.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_ratio_copies() {
        let r = Resampler::new(48000.0, 48000.0);
        let src = vec![vec![1.0, 2.0, 3.0, 4.0]];
        let mut dest = AudioBuffer::new(1, 4);
        r.render(&src, 1.0, &mut dest, 0, 4);
        assert_eq!(dest.channel(0), &[2.0, 3.0, 4.0, 0.0]);
    }

    #[test]
    fn test_half_ratio_interpolates() {
        let r = Resampler::new(24000.0, 48000.0);
        assert_eq!(r.ratio(), 0.5);
        let src = vec![vec![0.0, 1.0, 2.0]];
        let mut dest = AudioBuffer::new(1, 4);
        r.render(&src, 0.0, &mut dest, 0, 4);
        assert_eq!(dest.channel(0), &[0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_mono_feeds_all_channels() {
        let r = Resampler::default();
        let src = vec![vec![0.25; 8]];
        let mut dest = AudioBuffer::new(2, 8);
        r.render(&src, 0.0, &mut dest, 2, 4);
        assert_eq!(dest.channel(1), &[0.0, 0.0, 0.25, 0.25, 0.25, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn test_count_clamped_to_dest() {
        let r = Resampler::default();
        let src = vec![vec![1.0; 16]];
        let mut dest = AudioBuffer::new(1, 4);
        r.render(&src, 0.0, &mut dest, 2, 100);
        assert_eq!(dest.channel(0), &[0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_invalid_rates_fall_back_to_unity() {
        assert_eq!(Resampler::new(0.0, 48000.0).ratio(), 1.0);
    }
}
