//! Audio buffers, decoding and format conversion.

mod decode;
mod remix;
mod resample;

pub use decode::decode_audio_file;
pub use remix::{conform, remix};
pub use resample::resample;

use crate::error::FetchError;

/// Errors raised while building or converting audio buffers.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// A buffer needs at least one channel.
    #[error("audio must have at least one channel")]
    NoChannels,

    /// Channels of a planar buffer differ in length.
    #[error("channel {channel} has {len} frames, expected {expected}")]
    ChannelLength {
        /// Offending channel index.
        channel: usize,
        /// Its length.
        len: usize,
        /// Length of channel 0.
        expected: usize,
    },

    /// Failed to resample audio.
    #[error("failed to resample audio: {reason}")]
    Resample {
        /// Description of the resampling failure.
        reason: String,
    },
}

impl From<AudioError> for FetchError {
    fn from(e: AudioError) -> Self {
        Self::Local {
            reason: e.to_string(),
        }
    }
}

/// Planar multichannel audio.
///
/// Every channel holds the same number of frames; the buffer is never
/// modified after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build a buffer from per-channel sample vectors.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, AudioError> {
        let expected = channels.first().ok_or(AudioError::NoChannels)?.len();
        if let Some((channel, samples)) = channels
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != expected)
        {
            return Err(AudioError::ChannelLength {
                channel,
                len: samples.len(),
                expected,
            });
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Build a buffer from interleaved samples.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, AudioError> {
        if channel_count == 0 {
            return Err(AudioError::NoChannels);
        }
        let frames = samples.len() / channel_count;
        let channels = (0..channel_count)
            .map(|ch| {
                samples
                    .iter()
                    .skip(ch)
                    .step_by(channel_count)
                    .take(frames)
                    .copied()
                    .collect()
            })
            .collect();
        Self::new(channels, sample_rate)
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Whether the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Duration in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// All channels.
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Consume the buffer, returning its channels.
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Samples interleaved frame by frame.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frames() * self.channel_count());
        for i in 0..self.frames() {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }

    /// Position `(channel, frame)` of the first NaN or infinite sample.
    pub fn first_non_finite(&self) -> Option<(usize, usize)> {
        self.channels.iter().enumerate().find_map(|(ch, samples)| {
            samples
                .iter()
                .position(|s| !s.is_finite())
                .map(|frame| (ch, frame))
        })
    }
}
