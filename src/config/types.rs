//! Configuration type definitions.

use crate::constants::{
    DEFAULT_MODEL, DEFAULT_STEMS, DEFAULT_STORAGE_PREFIX, encoder, fetch, model, pipeline, storage,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configured models by name, in addition to the built-in catalogue.
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,

    /// Request defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Download limits.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Stem encoder settings.
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Object storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Inference settings.
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Configuration for a single separation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the ONNX file. Defaults to `<models_dir>/<name>.onnx`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Stems produced by the model, in output tensor order.
    pub sources: Vec<String>,

    /// Sample rate the model expects.
    #[serde(default = "default_model_sample_rate")]
    pub sample_rate: u32,

    /// Channel count the model expects.
    #[serde(default = "default_model_channels")]
    pub channels: usize,

    /// Fixed window length in seconds, for graphs exported with a static time axis.
    #[serde(default)]
    pub segment_secs: Option<f32>,

    /// Overlap between windows in seconds.
    #[serde(default = "default_overlap_secs")]
    pub overlap_secs: f32,

    /// Name of the graph's audio input.
    #[serde(default = "default_input_name")]
    pub input_name: String,
}

fn default_model_sample_rate() -> u32 {
    model::DEMUCS_SAMPLE_RATE
}

fn default_model_channels() -> usize {
    model::DEMUCS_CHANNELS
}

fn default_overlap_secs() -> f32 {
    model::DEMUCS_OVERLAP_SECS
}

fn default_input_name() -> String {
    model::DEFAULT_INPUT_NAME.to_string()
}

impl ModelConfig {
    /// A Demucs-family model with the given sources.
    pub fn demucs(sources: &[&str]) -> Self {
        Self {
            path: None,
            sources: sources.iter().map(|s| (*s).to_string()).collect(),
            sample_rate: model::DEMUCS_SAMPLE_RATE,
            channels: model::DEMUCS_CHANNELS,
            segment_secs: Some(model::DEMUCS_SEGMENT_SECS),
            overlap_secs: model::DEMUCS_OVERLAP_SECS,
            input_name: default_input_name(),
        }
    }

    /// Whether the model produces a stem with this name.
    pub fn has_source(&self, stem: &str) -> bool {
        self.sources.iter().any(|s| s == stem)
    }
}

/// Models known without any configuration file.
pub fn builtin_models() -> HashMap<String, ModelConfig> {
    HashMap::from([
        (
            "htdemucs".to_string(),
            ModelConfig::demucs(&model::FOUR_STEM_SOURCES),
        ),
        (
            "htdemucs_ft".to_string(),
            ModelConfig::demucs(&model::FOUR_STEM_SOURCES),
        ),
        (
            "htdemucs_6s".to_string(),
            ModelConfig::demucs(&model::SIX_STEM_SOURCES),
        ),
    ])
}

/// Defaults applied to fields omitted from a job request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Model name.
    pub model: String,

    /// Stems to return.
    pub stems: Vec<String>,

    /// Object key prefix.
    pub storage_prefix: String,

    /// Bucket, when requests may omit it.
    pub storage_bucket: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            stems: DEFAULT_STEMS.iter().map(|s| (*s).to_string()).collect(),
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
            storage_bucket: None,
        }
    }
}

/// Download limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum accepted size in bytes.
    pub max_bytes: u64,

    /// Total time budget in seconds.
    pub timeout_secs: u64,

    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_bytes: fetch::DEFAULT_MAX_BYTES,
            timeout_secs: fetch::DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: fetch::DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Container format for encoded stems.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// MPEG-1 Layer III via LAME.
    #[default]
    Mp3,
    /// 16-bit PCM WAV.
    Wav,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }

    /// MIME type sent with uploads.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" | "wave" => Ok(Self::Wav),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Stem encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Container format.
    pub format: OutputFormat,

    /// Constant bitrate for mp3, in kbps.
    pub bitrate_kbps: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Mp3,
            bitrate_kbps: encoder::DEFAULT_BITRATE_KBPS,
        }
    }
}

/// How published artifacts are made reachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlPolicy {
    /// Plain object URL; the object is expected to be publicly readable.
    #[default]
    Public,
    /// SigV4 presigned GET URL valid for `presign_expiry_secs`.
    Presigned,
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// URL policy for returned links.
    pub url_policy: UrlPolicy,

    /// Lifetime of presigned URLs in seconds.
    pub presign_expiry_secs: u64,

    /// Canned ACL sent with uploads; `None` sends no ACL header.
    pub acl: Option<String>,

    /// Base URL for public links (e.g. a CDN), replacing the bucket URL.
    pub public_base_url: Option<String>,

    /// Use path-style addressing (`endpoint/bucket/key`).
    pub path_style: bool,

    /// Per-upload timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url_policy: UrlPolicy::Public,
            presign_expiry_secs: storage::DEFAULT_PRESIGN_EXPIRY_SECS,
            acl: Some(storage::DEFAULT_ACL.to_string()),
            public_base_url: None,
            path_style: false,
            timeout_secs: storage::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Inference device configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InferenceDevice {
    /// Use CUDA when the runtime offers it, else CPU.
    #[default]
    Auto,
    /// Require CUDA.
    Gpu,
    /// Force CPU inference.
    Cpu,
}

impl std::fmt::Display for InferenceDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Inference settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Device to use for inference.
    pub device: InferenceDevice,

    /// Directory holding `<model>.onnx` files.
    pub models_dir: Option<PathBuf>,

    /// Intra-op thread count for CPU inference.
    pub intra_threads: Option<usize>,
}

/// Pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent uploads per job.
    pub upload_concurrency: usize,

    /// Parent directory for per-job workspaces (system temp dir when unset).
    pub work_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_concurrency: pipeline::DEFAULT_UPLOAD_CONCURRENCY,
            work_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("mp3".parse::<OutputFormat>().ok(), Some(OutputFormat::Mp3));
        assert_eq!("WAV".parse::<OutputFormat>().ok(), Some(OutputFormat::Wav));
        assert_eq!("wave".parse::<OutputFormat>().ok(), Some(OutputFormat::Wav));
        assert!("flac".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_content_type() {
        assert_eq!(OutputFormat::Mp3.content_type(), "audio/mpeg");
        assert_eq!(OutputFormat::Wav.extension(), "wav");
    }

    #[test]
    fn test_defaults_config_default_values() {
        let defaults = DefaultsConfig::default();
        assert_eq!(defaults.model, "htdemucs");
        assert_eq!(defaults.stems, vec!["vocals", "drums", "bass", "other"]);
        assert_eq!(defaults.storage_prefix, "demucs-outputs");
        assert!(defaults.storage_bucket.is_none());
    }

    #[test]
    fn test_builtin_catalogue_covers_default_stems() {
        let models = builtin_models();
        let htdemucs = &models["htdemucs"];
        for stem in DEFAULT_STEMS {
            assert!(htdemucs.has_source(stem), "htdemucs lacks {stem}");
        }
        assert_eq!(models["htdemucs_6s"].sources.len(), 6);
    }

    #[test]
    fn test_model_config_defaults_from_toml() {
        let parsed: ModelConfig = toml::from_str(r#"sources = ["vocals", "accompaniment"]"#)
            .unwrap_or_else(|_| ModelConfig::demucs(&[]));
        assert_eq!(parsed.sources, vec!["vocals", "accompaniment"]);
        assert_eq!(parsed.sample_rate, 44_100);
        assert_eq!(parsed.channels, 2);
        assert!(parsed.segment_secs.is_none());
        assert_eq!(parsed.input_name, "input");
    }
}
