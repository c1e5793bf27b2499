//! Codec collaborator: decoding and encoding audio files.
//!
//! Sources never touch file formats directly. They ask a [`FormatRegistry`]
//! for the codec matching a path's extension. [`WavCodec`] is registered by
//! default; other formats plug in through [`AudioCodec`].

use std::collections::BTreeMap;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavWriter};

use crate::error::{Result, SourceError};

/// Audio file metadata read without loading sample data.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    /// Number of channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample.
    pub bits_per_sample: u16,
    /// Whether samples are IEEE floats.
    pub float: bool,
    /// Sample frames per channel.
    pub num_frames: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
}

/// Decoded PCM content.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// One vector per channel, all the same length.
    pub channels: Vec<Vec<f32>>,
}

/// Encoder settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    /// Bits per sample. 32 writes IEEE float, smaller depths write PCM.
    pub bit_depth: u16,
    /// Free-form tags. Codecs without a metadata chunk ignore them.
    pub metadata: BTreeMap<String, String>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            bit_depth: 24,
            metadata: BTreeMap::new(),
        }
    }
}

/// A file format the engine can read and write.
pub trait AudioCodec: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Lowercase file extensions handled, without the dot.
    fn extensions(&self) -> &[&str];

    /// Reads header information.
    fn info(&self, path: &Path) -> Result<AudioInfo>;

    /// Decodes the whole file.
    fn decode(&self, path: &Path) -> Result<DecodedAudio>;

    /// Encodes `channels` (equal-length, one vector per channel) to `path`.
    fn encode(
        &self,
        path: &Path,
        sample_rate: f64,
        channels: &[Vec<f32>],
        options: &EncodeOptions,
    ) -> Result<()>;
}

/// WAV through `hound`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavCodec;

impl AudioCodec for WavCodec {
    fn name(&self) -> &str {
        "WAV"
    }

    fn extensions(&self) -> &[&str] {
        &["wav", "wave"]
    }

    fn info(&self, path: &Path) -> Result<AudioInfo> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let num_frames = u64::from(reader.duration());
        Ok(AudioInfo {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            float: spec.sample_format == SampleFormat::Float,
            num_frames,
            duration_secs: num_frames as f64 / f64::from(spec.sample_rate),
        })
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let num_channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        let frames = interleaved.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(frames); num_channels];
        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                channels[ch].push(sample);
            }
        }

        tracing::debug!(
            "wav_decode: {} ch, {} frames @ {} Hz from {}",
            num_channels,
            frames,
            spec.sample_rate,
            path.display()
        );

        Ok(DecodedAudio {
            sample_rate: f64::from(spec.sample_rate),
            channels,
        })
    }

    fn encode(
        &self,
        path: &Path,
        sample_rate: f64,
        channels: &[Vec<f32>],
        options: &EncodeOptions,
    ) -> Result<()> {
        let sample_format = match options.bit_depth {
            32 => SampleFormat::Float,
            8 | 16 | 24 => SampleFormat::Int,
            other => return Err(SourceError::UnsupportedBitDepth(other)),
        };
        let spec = hound::WavSpec {
            channels: channels.len().max(1) as u16,
            sample_rate: sample_rate.round() as u32,
            bits_per_sample: options.bit_depth,
            sample_format,
        };
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        let mut writer = WavWriter::create(path, spec)?;

        if sample_format == SampleFormat::Float {
            for i in 0..frames {
                for ch in channels {
                    writer.write_sample(ch[i])?;
                }
            }
        } else {
            let max_val = (1i64 << (options.bit_depth - 1)) as f32;
            for i in 0..frames {
                for ch in channels {
                    let int_sample = (ch[i] * max_val).clamp(-max_val, max_val - 1.0) as i32;
                    writer.write_sample(int_sample)?;
                }
            }
        }

        // An empty channel list still yields a valid (silent, zero-length) file.
        writer.finalize()?;
        Ok(())
    }
}

/// Codec lookup by file extension.
pub struct FormatRegistry {
    codecs: Vec<Box<dyn AudioCodec>>,
}

impl FormatRegistry {
    /// Creates a registry with no codecs.
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Creates a registry with the built-in codecs.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(WavCodec));
        registry
    }

    /// Adds a codec. Later registrations win for shared extensions.
    pub fn register(&mut self, codec: Box<dyn AudioCodec>) {
        self.codecs.insert(0, codec);
    }

    /// Returns the codec for `path`'s extension.
    pub fn codec_for(&self, path: &Path) -> Option<&dyn AudioCodec> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.codecs
            .iter()
            .find(|c| c.extensions().contains(&ext.as_str()))
            .map(|c| c.as_ref())
    }

    /// Every extension some codec handles.
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self
            .codecs
            .iter()
            .flat_map(|c| c.extensions().iter().map(|e| (*e).to_string()))
            .collect();
        exts.sort();
        exts.dedup();
        exts
    }

    /// Reads header information.
    pub fn info(&self, path: &Path) -> Result<AudioInfo> {
        self.require(path)?.info(path)
    }

    /// Decodes a file.
    pub fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        self.require(path)?.decode(path)
    }

    /// Encodes to a file.
    pub fn encode(
        &self,
        path: &Path,
        sample_rate: f64,
        channels: &[Vec<f32>],
        options: &EncodeOptions,
    ) -> Result<()> {
        self.require(path)?
            .encode(path, sample_rate, channels, options)
    }

    fn require(&self, path: &Path) -> Result<&dyn AudioCodec> {
        self.codec_for(path)
            .ok_or_else(|| SourceError::UnknownFormat(path.to_path_buf()))
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("extensions", &self.extensions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sine(len: usize, scale: f32) -> Vec<f32> {
        (0..len).map(|i| (i as f32 / 50.0).sin() * scale).collect()
    }

    #[test]
    fn test_roundtrip_f32_stereo() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("take.wav");
        let channels = vec![sine(1000, 1.0), sine(1000, -0.5)];
        let options = EncodeOptions {
            bit_depth: 32,
            ..EncodeOptions::default()
        };

        let registry = FormatRegistry::new();
        registry.encode(&path, 48000.0, &channels, &options).unwrap();
        let decoded = registry.decode(&path).unwrap();

        assert_eq!(decoded.sample_rate, 48000.0);
        assert_eq!(decoded.channels.len(), 2);
        for (a, b) in channels[1].iter().zip(decoded.channels[1].iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_roundtrip_i16() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("take.WAV");
        let channels = vec![sine(500, 0.9)];
        let options = EncodeOptions {
            bit_depth: 16,
            ..EncodeOptions::default()
        };

        let registry = FormatRegistry::new();
        registry.encode(&path, 44100.0, &channels, &options).unwrap();
        let info = registry.info(&path).unwrap();
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.num_frames, 500);
        assert!(!info.float);

        let decoded = registry.decode(&path).unwrap();
        for (a, b) in channels[0].iter().zip(decoded.channels[0].iter()) {
            assert!((a - b).abs() < 0.001);
        }
    }

    #[test]
    fn test_unknown_extension() {
        let registry = FormatRegistry::new();
        let err = registry.decode(Path::new("take.xyz")).unwrap_err();
        assert!(matches!(err, SourceError::UnknownFormat(_)));
        assert!(registry.codec_for(Path::new("noext")).is_none());
        assert!(FormatRegistry::empty().codec_for(Path::new("a.wav")).is_none());
    }

    #[test]
    fn test_unsupported_bit_depth() {
        let dir = TempDir::new().unwrap();
        let options = EncodeOptions {
            bit_depth: 12,
            ..EncodeOptions::default()
        };
        let err = WavCodec
            .encode(&dir.path().join("x.wav"), 48000.0, &[vec![0.0]], &options)
            .unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedBitDepth(12)));
    }
}
