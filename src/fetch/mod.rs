//! Audio acquisition: URL to decoded, model-ready samples.

mod http;

pub use http::HttpFetcher;

use crate::audio::AudioBuffer;
use crate::constants::fetch::{FALLBACK_EXTENSION, KNOWN_EXTENSIONS};
use crate::error::FetchError;
use reqwest::Url;
use std::future::Future;
use std::path::Path;

/// Sample layout the separation model consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: usize,
}

/// Resolves a URL to decoded audio.
///
/// Implementations stage any downloaded bytes inside `workspace`, which the
/// caller owns and removes once the job ends.
pub trait AudioFetcher: Send + Sync {
    /// Fetch `url` and decode it to `target`.
    fn fetch(
        &self,
        url: &Url,
        workspace: &Path,
        target: TargetFormat,
    ) -> impl Future<Output = Result<AudioBuffer, FetchError>> + Send;
}

impl<F: AudioFetcher> AudioFetcher for std::sync::Arc<F> {
    fn fetch(
        &self,
        url: &Url,
        workspace: &Path,
        target: TargetFormat,
    ) -> impl Future<Output = Result<AudioBuffer, FetchError>> + Send {
        self.as_ref().fetch(url, workspace, target)
    }
}

/// File extension used to stage the download, taken from the URL path.
///
/// Unknown or missing extensions fall back to `wav`; the decoder probes
/// content regardless, so the extension is only a hint.
pub fn download_extension(url: &Url) -> &'static str {
    let ext = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    ext.and_then(|ext| KNOWN_EXTENSIONS.iter().find(|known| **known == ext))
        .copied()
        .unwrap_or(FALLBACK_EXTENSION)
}
