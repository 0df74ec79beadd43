//! Stem encoding to compressed or PCM containers.

mod mp3;
mod wav;

pub use mp3::Mp3Encoder;
pub use wav::WavEncoder;

use crate::audio::AudioBuffer;
use crate::config::{EncoderConfig, OutputFormat};
use crate::error::EncodeError;
use crate::separation::Stem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// An encoded stem on local disk, owned by the job workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedStem {
    /// Stem name.
    pub stem: String,
    /// Encoded file.
    pub path: PathBuf,
    /// MIME type of the file.
    pub content_type: &'static str,
    /// File extension without the dot.
    pub extension: &'static str,
}

/// Converts one stem to a container file.
///
/// Output is deterministic for identical input and configuration.
pub trait StemEncoder: Send + Sync {
    /// Container produced.
    fn format(&self) -> OutputFormat;

    /// Encode already validated audio to bytes.
    fn encode_bytes(&self, stem: &str, audio: &AudioBuffer) -> Result<Vec<u8>, EncodeError>;

    /// Validate, encode and write `stem` to `<dir>/<name>.<ext>`.
    fn encode(&self, stem: &Stem, dir: &Path) -> Result<EncodedStem, EncodeError> {
        validate_samples(&stem.name, &stem.audio)?;

        let format = self.format();
        let bytes = self.encode_bytes(&stem.name, &stem.audio)?;
        let path = dir.join(format!("{}.{}", stem.name, format.extension()));
        std::fs::write(&path, &bytes).map_err(|e| EncodeError::Write {
            path: path.clone(),
            source: e,
        })?;
        debug!("Encoded stem '{}' to {} ({} bytes)", stem.name, path.display(), bytes.len());

        Ok(EncodedStem {
            stem: stem.name.clone(),
            path,
            content_type: format.content_type(),
            extension: format.extension(),
        })
    }
}

/// Encoder for the configured output format.
pub fn build_encoder(config: &EncoderConfig) -> Arc<dyn StemEncoder> {
    match config.format {
        OutputFormat::Mp3 => Arc::new(Mp3Encoder::new(config.bitrate_kbps)),
        OutputFormat::Wav => Arc::new(WavEncoder),
    }
}

/// Reject buffers the codec must never see.
pub fn validate_samples(stem: &str, audio: &AudioBuffer) -> Result<(), EncodeError> {
    if audio.is_empty() {
        return Err(EncodeError::InvalidSamples {
            stem: stem.to_string(),
            reason: "buffer is empty".to_string(),
        });
    }
    if let Some((channel, frame)) = audio.first_non_finite() {
        return Err(EncodeError::InvalidSamples {
            stem: stem.to_string(),
            reason: format!("non-finite sample at channel {channel}, frame {frame}"),
        });
    }
    Ok(())
}

/// Convert a float sample to 16-bit PCM.
#[allow(clippy::cast_possible_truncation)]
fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}
