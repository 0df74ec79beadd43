//! MP3 encoding via LAME.

use super::{StemEncoder, to_i16};
use crate::audio::AudioBuffer;
use crate::config::OutputFormat;
use crate::constants::encoder::MP3_FLUSH_RESERVE;
use crate::error::EncodeError;
use mp3lame_encoder::{Bitrate, Builder, DualPcm, FlushNoGap, MonoPcm, Quality};

/// Constant-bitrate MP3 encoder.
#[derive(Debug, Clone, Copy)]
pub struct Mp3Encoder {
    bitrate_kbps: u32,
}

impl Mp3Encoder {
    /// Encoder at `bitrate_kbps`, rounded down to a bitrate LAME supports.
    pub fn new(bitrate_kbps: u32) -> Self {
        Self { bitrate_kbps }
    }

    fn bitrate(&self) -> Bitrate {
        match self.bitrate_kbps {
            0..=111 => Bitrate::Kbps96,
            112..=127 => Bitrate::Kbps112,
            128..=159 => Bitrate::Kbps128,
            160..=191 => Bitrate::Kbps160,
            192..=223 => Bitrate::Kbps192,
            224..=255 => Bitrate::Kbps224,
            256..=319 => Bitrate::Kbps256,
            _ => Bitrate::Kbps320,
        }
    }
}

impl StemEncoder for Mp3Encoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Mp3
    }

    fn encode_bytes(&self, stem: &str, audio: &AudioBuffer) -> Result<Vec<u8>, EncodeError> {
        let codec = |step: &str, e: &dyn std::fmt::Debug| EncodeError::Codec {
            stem: stem.to_string(),
            reason: format!("{step}: {e:?}"),
        };

        let channels = u8::try_from(audio.channel_count())
            .ok()
            .filter(|c| (1..=2).contains(c))
            .ok_or_else(|| EncodeError::Codec {
                stem: stem.to_string(),
                reason: format!("mp3 supports 1 or 2 channels, got {}", audio.channel_count()),
            })?;

        let mut builder = Builder::new().ok_or_else(|| EncodeError::Codec {
            stem: stem.to_string(),
            reason: "LAME encoder init failed".to_string(),
        })?;
        builder
            .set_num_channels(channels)
            .map_err(|e| codec("set channels", &e))?;
        builder
            .set_sample_rate(audio.sample_rate())
            .map_err(|e| codec("set sample rate", &e))?;
        builder
            .set_brate(self.bitrate())
            .map_err(|e| codec("set bitrate", &e))?;
        builder
            .set_quality(Quality::Best)
            .map_err(|e| codec("set quality", &e))?;
        let mut encoder = builder.build().map_err(|e| codec("build", &e))?;

        let pcm: Vec<Vec<i16>> = audio
            .channels()
            .iter()
            .map(|c| c.iter().copied().map(to_i16).collect())
            .collect();

        let mut output = Vec::new();
        output.reserve(mp3lame_encoder::max_required_buffer_size(audio.frames()));
        let encoded = match pcm.as_slice() {
            [mono] => encoder.encode_to_vec(MonoPcm(mono.as_slice()), &mut output),
            [left, right] => encoder.encode_to_vec(
                DualPcm {
                    left: left.as_slice(),
                    right: right.as_slice(),
                },
                &mut output,
            ),
            _ => {
                return Err(EncodeError::Codec {
                    stem: stem.to_string(),
                    reason: "unsupported channel layout".to_string(),
                });
            }
        };
        encoded.map_err(|e| codec("encode", &e))?;

        output.reserve(MP3_FLUSH_RESERVE);
        encoder
            .flush_to_vec::<FlushNoGap>(&mut output)
            .map_err(|e| codec("flush", &e))?;

        Ok(output)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn tone(frames: usize, channels: usize) -> AudioBuffer {
        let signal: Vec<f32> = (0..frames)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 44_100.0).sin() * 0.5)
            .collect();
        AudioBuffer::new(vec![signal; channels], 44_100).unwrap()
    }

    #[test]
    fn test_stereo_produces_mp3_frames() {
        let bytes = Mp3Encoder::new(320)
            .encode_bytes("vocals", &tone(44_100, 2))
            .unwrap();
        assert!(!bytes.is_empty());
        // MPEG audio frame sync
        let sync = bytes
            .windows(2)
            .any(|w| w[0] == 0xFF && w[1] & 0xE0 == 0xE0);
        assert!(sync);
    }

    #[test]
    fn test_mono_supported() {
        let bytes = Mp3Encoder::new(128).encode_bytes("bass", &tone(22_050, 1)).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_deterministic_output() {
        let audio = tone(44_100, 2);
        let encoder = Mp3Encoder::new(320);
        let a = encoder.encode_bytes("drums", &audio).unwrap();
        let b = encoder.encode_bytes("drums", &audio).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_surround_rejected() {
        let err = Mp3Encoder::new(320)
            .encode_bytes("other", &tone(100, 6))
            .unwrap_err();
        assert_eq!(err.kind(), "codec_error");
    }

    #[test]
    fn test_bitrate_rounds_down() {
        assert!(matches!(Mp3Encoder::new(200).bitrate(), Bitrate::Kbps192));
        assert!(matches!(Mp3Encoder::new(320).bitrate(), Bitrate::Kbps320));
        assert!(matches!(Mp3Encoder::new(96).bitrate(), Bitrate::Kbps96));
    }
}
