//! Channel layout conversion.

use super::{AudioBuffer, AudioError, resample};
use tracing::debug;

/// Convert `audio` to `target_channels` channels.
///
/// Mono is duplicated across outputs, surplus channels are dropped when
/// narrowing to stereo, and anything folded to mono is averaged.
pub fn remix(audio: AudioBuffer, target_channels: usize) -> Result<AudioBuffer, AudioError> {
    let source_channels = audio.channel_count();
    if source_channels == target_channels {
        return Ok(audio);
    }
    if target_channels == 0 {
        return Err(AudioError::NoChannels);
    }

    let sample_rate = audio.sample_rate();
    let channels = audio.into_channels();

    let remixed = if target_channels == 1 {
        vec![downmix(&channels)]
    } else if source_channels > target_channels {
        channels.into_iter().take(target_channels).collect()
    } else {
        (0..target_channels)
            .map(|ch| channels[ch % source_channels].clone())
            .collect()
    };

    AudioBuffer::new(remixed, sample_rate)
}

#[allow(clippy::cast_precision_loss)]
fn downmix(channels: &[Vec<f32>]) -> Vec<f32> {
    let count = channels.len() as f32;
    let frames = channels.first().map_or(0, Vec::len);
    (0..frames)
        .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() / count)
        .collect()
}

/// Bring `audio` to the rate and channel count a model expects.
pub fn conform(
    audio: AudioBuffer,
    sample_rate: u32,
    channels: usize,
) -> Result<AudioBuffer, AudioError> {
    if audio.sample_rate() != sample_rate || audio.channel_count() != channels {
        debug!(
            "Converting {} ch @ {} Hz to {} ch @ {} Hz",
            audio.channel_count(),
            audio.sample_rate(),
            channels,
            sample_rate
        );
    }
    resample(remix(audio, channels)?, sample_rate)
}
