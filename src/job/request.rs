//! Inbound job payload and its validated form.

use crate::config::{Config, ModelConfig, find_model, model_names};
use crate::error::JobError;
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashSet;

/// Raw job payload as delivered by the invoking platform.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobPayload {
    /// Platform-assigned invocation id, used only for logging.
    #[serde(default)]
    pub id: Option<String>,

    /// Job input fields.
    #[serde(default)]
    pub input: JobInput,
}

impl JobPayload {
    /// Parse a JSON payload.
    ///
    /// Malformed JSON or mistyped fields are validation errors.
    pub fn parse(json: &str) -> Result<Self, JobError> {
        serde_json::from_str(json).map_err(|e| JobError::validation(format!("malformed payload: {e}")))
    }
}

/// Recognised `input` fields. Every field is optional at this level;
/// [`JobInput::resolve`] applies defaults and enforces requirements.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobInput {
    /// URL of the mixed audio file.
    #[serde(default)]
    pub audio_url: Option<String>,

    /// Destination bucket.
    #[serde(default, alias = "s3_bucket")]
    pub storage_bucket: Option<String>,

    /// Key prefix inside the bucket.
    #[serde(default, alias = "s3_prefix")]
    pub storage_prefix: Option<String>,

    /// Separation model name.
    #[serde(default)]
    pub model: Option<String>,

    /// Stems to publish, in response order.
    #[serde(default)]
    pub stems: Option<Vec<String>>,
}

/// Where artifacts are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix without leading or trailing slashes. May be empty.
    pub prefix: String,
}

/// A fully validated separation job.
#[derive(Debug, Clone)]
pub struct SeparationRequest {
    /// Absolute http(s) URL of the input audio.
    pub source_url: Url,
    /// Destination for published stems.
    pub storage_target: StorageTarget,
    /// Name of the separation model.
    pub model_name: String,
    /// Resolved model definition.
    pub model: ModelConfig,
    /// Requested stems, unique, in caller order.
    pub requested_stems: Vec<String>,
}

impl JobInput {
    /// Apply defaults from `config` and validate.
    ///
    /// `fallback_bucket` is the bucket named by the process environment,
    /// used when neither the payload nor the config file names one.
    pub fn resolve(
        &self,
        config: &Config,
        fallback_bucket: Option<&str>,
    ) -> Result<SeparationRequest, JobError> {
        let source_url = parse_source_url(self.audio_url.as_deref())?;

        let model_name = non_blank(self.model.as_deref())
            .unwrap_or(&config.defaults.model)
            .to_string();
        let model = find_model(config, &model_name).ok_or_else(|| {
            JobError::validation(format!(
                "unknown model '{model_name}' (available: {})",
                model_names(config).join(", ")
            ))
        })?;

        let requested_stems = self
            .stems
            .clone()
            .unwrap_or_else(|| config.defaults.stems.clone());
        validate_stems(&requested_stems, &model_name, &model)?;

        let bucket = non_blank(self.storage_bucket.as_deref())
            .or_else(|| non_blank(config.defaults.storage_bucket.as_deref()))
            .or_else(|| non_blank(fallback_bucket))
            .ok_or_else(|| JobError::validation("storage bucket is required"))?
            .to_string();

        let prefix = self
            .storage_prefix
            .as_deref()
            .unwrap_or(&config.defaults.storage_prefix)
            .trim_matches('/')
            .to_string();

        Ok(SeparationRequest {
            source_url,
            storage_target: StorageTarget { bucket, prefix },
            model_name,
            model,
            requested_stems,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_source_url(raw: Option<&str>) -> Result<Url, JobError> {
    let raw = non_blank(raw).ok_or_else(|| JobError::validation("audio_url is required"))?;
    let url = Url::parse(raw)
        .map_err(|e| JobError::validation(format!("audio_url '{raw}' is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(JobError::validation(format!(
            "audio_url '{raw}' must be an absolute http(s) URL"
        )));
    }
    Ok(url)
}

fn validate_stems(stems: &[String], model_name: &str, model: &ModelConfig) -> Result<(), JobError> {
    if stems.is_empty() {
        return Err(JobError::validation("stems must not be empty"));
    }

    let mut seen = HashSet::new();
    for stem in stems {
        if !seen.insert(stem.as_str()) {
            return Err(JobError::validation(format!("duplicate stem '{stem}'")));
        }
        if !model.has_source(stem) {
            return Err(JobError::validation(format!(
                "stem '{stem}' is not produced by model '{model_name}' (sources: {})",
                model.sources.join(", ")
            )));
        }
    }
    Ok(())
}
