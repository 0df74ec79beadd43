//! CLI argument validators.

use crate::constants::encoder::{MAX_BITRATE_KBPS, MIN_BITRATE_KBPS};

/// Parse and validate an mp3 bitrate in kbps.
pub fn parse_bitrate(s: &str) -> Result<u32, String> {
    let value: u32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid bitrate"))?;

    if !(MIN_BITRATE_KBPS..=MAX_BITRATE_KBPS).contains(&value) {
        return Err(format!(
            "bitrate must be between {MIN_BITRATE_KBPS} and {MAX_BITRATE_KBPS} kbps, got {value}"
        ));
    }

    Ok(value)
}

/// Parse a concurrency limit (at least 1).
pub fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }

    Ok(value)
}
