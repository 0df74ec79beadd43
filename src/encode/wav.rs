//! 16-bit PCM WAV encoding.

use super::{StemEncoder, to_i16};
use crate::audio::AudioBuffer;
use crate::config::OutputFormat;
use crate::error::EncodeError;
use std::io::Cursor;

/// Uncompressed 16-bit WAV encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavEncoder;

impl StemEncoder for WavEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Wav
    }

    fn encode_bytes(&self, stem: &str, audio: &AudioBuffer) -> Result<Vec<u8>, EncodeError> {
        let codec = |e: hound::Error| EncodeError::Codec {
            stem: stem.to_string(),
            reason: e.to_string(),
        };

        let channels = u16::try_from(audio.channel_count()).map_err(|_| EncodeError::Codec {
            stem: stem.to_string(),
            reason: format!("too many channels: {}", audio.channel_count()),
        })?;
        let spec = hound::WavSpec {
            channels,
            sample_rate: audio.sample_rate(),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut output = Vec::new();
        let mut writer = hound::WavWriter::new(Cursor::new(&mut output), spec).map_err(codec)?;
        for sample in audio.interleaved() {
            writer.write_sample(to_i16(sample)).map_err(codec)?;
        }
        writer.finalize().map_err(codec)?;

        Ok(output)
    }
}
