//! The decoded-PCM boundary.
//!
//! The orchestrator pulls blocks of interleaved float samples from an
//! [`AudioProvider`] on demand. Providers are owned and driven by the
//! foreground thread only; the analysis worker never touches them.

use crate::error::{Error, Result};

/// Description of a decoded audio source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SourceInfo {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: usize,
    /// Number of samples per channel.
    pub samples: usize,
}

impl SourceInfo {
    /// Duration of the source in seconds.
    pub fn duration(&self) -> f32 {
        self.samples as f32 / self.sample_rate as f32
    }
}

/// A source of decoded PCM sample blocks.
///
/// `read` fills `out` with interleaved samples starting at the given
/// per-channel position; positions past the end of the source are filled
/// with zeros. Implementations are not assumed to be thread-safe and are
/// only ever called from the thread that owns them.
pub trait AudioProvider {
    /// Description of the source.
    fn info(&self) -> SourceInfo;

    /// Fill `out` with interleaved samples starting at `start_sample`
    /// (a per-channel position), zero-padding past the end.
    fn read(&mut self, start_sample: usize, out: &mut [f32]) -> Result<()>;
}

/// An in-memory clip of decoded PCM audio.
#[derive(Debug, Clone)]
pub struct PcmClip {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl PcmClip {
    /// Create a clip from interleaved samples.
    ///
    /// # Panics
    /// Panics if `channels` is zero or the sample count is not a
    /// multiple of the channel count.
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        assert!(channels > 0, "clip needs at least one channel");
        assert_eq!(
            samples.len() % channels,
            0,
            "interleaved sample count {} is not a multiple of {} channels",
            samples.len(),
            channels
        );

        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Create a mono clip.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    /// Load a clip from a WAV file, converting integer formats to float.
    #[cfg(feature = "wav")]
    pub fn from_wav_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 * scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        Ok(Self::new(
            samples,
            spec.channels as usize,
            spec.sample_rate,
        ))
    }

    /// The interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl AudioProvider for PcmClip {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: self.samples.len() / self.channels,
        }
    }

    fn read(&mut self, start_sample: usize, out: &mut [f32]) -> Result<()> {
        if out.len() % self.channels != 0 {
            return Err(Error::InvalidSource(format!(
                "block length {} is not a multiple of {} channels",
                out.len(),
                self.channels
            )));
        }

        let start = start_sample * self.channels;
        let available = self.samples.len().saturating_sub(start);
        let copy = available.min(out.len());

        out[..copy].copy_from_slice(&self.samples[start..start + copy]);
        out[copy..].fill(0.0);

        Ok(())
    }
}
