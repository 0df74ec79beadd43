//! Audio decoding using symphonia.

use super::AudioBuffer;
use crate::error::FetchError;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decode an audio file into planar f32 samples at its native rate and layout.
///
/// Supports WAV, FLAC, MP3, OGG/Vorbis, AAC and M4A.
pub fn decode_audio_file(path: &Path) -> Result<AudioBuffer, FetchError> {
    let file = File::open(path).map_err(|e| FetchError::Local {
        reason: format!("failed to open '{}': {e}", path.display()),
    })?;

    let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| unsupported(&e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| FetchError::UnsupportedFormat {
            reason: "no audio tracks found".to_string(),
        })?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| FetchError::UnsupportedFormat {
            reason: "missing sample rate".to_string(),
        })?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| unsupported(&e))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut channel_count = track
        .codec_params
        .channels
        .map_or(0, symphonia::core::audio::Channels::count);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(unsupported(&e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!("Skipping corrupt packet: {reason}");
                continue;
            }
            Err(e) => return Err(unsupported(&e)),
        };

        let spec = *decoded.spec();
        channel_count = spec.channels.count();

        let buf = match sample_buf.as_mut() {
            Some(buf) if buf.capacity() >= decoded.capacity() * channel_count => buf,
            _ => sample_buf.insert(SampleBuffer::new(decoded.capacity() as u64, spec)),
        };
        buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buf.samples());
    }

    if channel_count == 0 || interleaved.is_empty() {
        return Err(FetchError::UnsupportedFormat {
            reason: "stream contains no audio frames".to_string(),
        });
    }

    let buffer = AudioBuffer::from_interleaved(&interleaved, channel_count, sample_rate)?;
    debug!(
        "Decoded {} frames, {} channel(s) at {} Hz",
        buffer.frames(),
        buffer.channel_count(),
        buffer.sample_rate()
    );
    Ok(buffer)
}

fn unsupported(e: &SymphoniaError) -> FetchError {
    FetchError::UnsupportedFormat {
        reason: e.to_string(),
    }
}
