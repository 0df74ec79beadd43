//! Audio resampling using rubato.

use super::{AudioBuffer, AudioError};
use audioadapter_buffers::direct::SequentialSlice;
use rubato::{Fft, FixedSync, Resampler};

const CHUNK_SIZE: usize = 1024;

/// Resample every channel of `audio` to `to_rate`.
///
/// Returns the input unchanged if already at the target rate.
pub fn resample(audio: AudioBuffer, to_rate: u32) -> Result<AudioBuffer, AudioError> {
    let from_rate = audio.sample_rate();
    if from_rate == to_rate {
        return Ok(audio);
    }

    let channels = audio
        .into_channels()
        .into_iter()
        .map(|samples| resample_channel(&samples, from_rate, to_rate))
        .collect::<Result<Vec<_>, _>>()?;

    AudioBuffer::new(channels, to_rate)
}

fn resample_channel(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    // FFT-based synchronous resampler with fixed input/output sizes
    let mut resampler = Fft::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        1,
        1,
        FixedSync::Both,
    )
    .map_err(|e| resample_error(&e))?;

    let input_frames_needed = resampler.input_frames_next();
    let mut output = Vec::with_capacity(estimate_output_len(samples.len(), from_rate, to_rate));

    let mut pos = 0;
    while pos + input_frames_needed <= samples.len() {
        let chunk = &samples[pos..pos + input_frames_needed];
        output.extend_from_slice(&process_chunk(&mut resampler, chunk)?);
        pos += input_frames_needed;
    }

    // Pad the tail and keep only its proportional share of output
    if pos < samples.len() {
        let remaining = samples.len() - pos;
        let mut padded = samples[pos..].to_vec();
        padded.resize(input_frames_needed, 0.0);

        let output_data = process_chunk(&mut resampler, &padded)?;
        let take_count = scaled_len(remaining, from_rate, to_rate).min(output_data.len());
        output.extend_from_slice(&output_data[..take_count]);
    }

    // Every channel must come out the same length
    output.resize(scaled_len(samples.len(), from_rate, to_rate), 0.0);
    Ok(output)
}

fn process_chunk(resampler: &mut Fft<f32>, chunk: &[f32]) -> Result<Vec<f32>, AudioError> {
    let input_adapter =
        SequentialSlice::new(chunk, 1, chunk.len()).map_err(|e| AudioError::Resample {
            reason: format!("failed to create input adapter: {e}"),
        })?;

    let resampled = resampler
        .process(&input_adapter, 0, None)
        .map_err(|e| resample_error(&e))?;

    Ok(resampled.take_data())
}

fn resample_error(e: &impl std::fmt::Display) -> AudioError {
    AudioError::Resample {
        reason: e.to_string(),
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn scaled_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    (input_len as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil() as usize
}

fn estimate_output_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    scaled_len(input_len, from_rate, to_rate) + CHUNK_SIZE
}
