//! Configuration validation and model lookup.

use crate::config::types::builtin_models;
use crate::config::{Config, ModelConfig, UrlPolicy};
use crate::constants::{encoder, storage};
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::PathBuf;

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_defaults(config)?;
    validate_limits(config)?;
    for (name, model) in &config.models {
        validate_model_config(name, model)?;
    }
    Ok(())
}

/// Validate request defaults against the model catalogue.
fn validate_defaults(config: &Config) -> Result<()> {
    let defaults = &config.defaults;

    let model = find_model(config, &defaults.model).ok_or_else(|| Error::ModelNotFound {
        name: defaults.model.clone(),
    })?;

    if defaults.stems.is_empty() {
        return Err(Error::ConfigValidation {
            message: "defaults.stems must not be empty".to_string(),
        });
    }

    if let Some(stem) = defaults.stems.iter().find(|s| !model.has_source(s)) {
        return Err(Error::ConfigValidation {
            message: format!(
                "default stem '{stem}' is not produced by default model '{}'",
                defaults.model
            ),
        });
    }

    if defaults
        .storage_bucket
        .as_ref()
        .is_some_and(|b| b.trim().is_empty())
    {
        return Err(Error::ConfigValidation {
            message: "defaults.storage_bucket must not be blank".to_string(),
        });
    }

    Ok(())
}

/// Validate numeric limits.
fn validate_limits(config: &Config) -> Result<()> {
    if config.fetch.max_bytes == 0 {
        return Err(Error::ConfigValidation {
            message: "fetch.max_bytes must be at least 1".to_string(),
        });
    }

    if config.fetch.timeout_secs == 0 || config.storage.timeout_secs == 0 {
        return Err(Error::ConfigValidation {
            message: "timeouts must be at least 1 second".to_string(),
        });
    }

    if !(encoder::MIN_BITRATE_KBPS..=encoder::MAX_BITRATE_KBPS)
        .contains(&config.encoder.bitrate_kbps)
    {
        return Err(Error::ConfigValidation {
            message: format!(
                "encoder.bitrate_kbps must be between {} and {}, got {}",
                encoder::MIN_BITRATE_KBPS,
                encoder::MAX_BITRATE_KBPS,
                config.encoder.bitrate_kbps
            ),
        });
    }

    if config.storage.url_policy == UrlPolicy::Presigned
        && !(1..=storage::MAX_PRESIGN_EXPIRY_SECS).contains(&config.storage.presign_expiry_secs)
    {
        return Err(Error::ConfigValidation {
            message: format!(
                "storage.presign_expiry_secs must be between 1 and {}, got {}",
                storage::MAX_PRESIGN_EXPIRY_SECS,
                config.storage.presign_expiry_secs
            ),
        });
    }

    if config.pipeline.upload_concurrency == 0 {
        return Err(Error::ConfigValidation {
            message: "pipeline.upload_concurrency must be at least 1".to_string(),
        });
    }

    Ok(())
}

/// Validate a single model definition.
pub fn validate_model_config(name: &str, model: &ModelConfig) -> Result<()> {
    let invalid = |message: String| Error::ConfigValidation {
        message: format!("model '{name}': {message}"),
    };

    if model.sources.is_empty() {
        return Err(invalid("sources must not be empty".to_string()));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = model.sources.iter().find(|s| !seen.insert(s.as_str())) {
        return Err(invalid(format!("duplicate source '{dup}'")));
    }

    if model.sample_rate == 0 || model.channels == 0 {
        return Err(invalid(
            "sample_rate and channels must be positive".to_string(),
        ));
    }

    if let Some(segment) = model.segment_secs
        && !(segment > 0.0 && model.overlap_secs >= 0.0 && model.overlap_secs < segment)
    {
        return Err(invalid(format!(
            "overlap_secs ({}) must be non-negative and shorter than segment_secs ({segment})",
            model.overlap_secs
        )));
    }

    Ok(())
}

/// Look up a model by name: configured models first, then the built-in catalogue.
pub fn find_model(config: &Config, name: &str) -> Option<ModelConfig> {
    config
        .models
        .get(name)
        .cloned()
        .or_else(|| builtin_models().remove(name))
}

/// Get a model by name from the config.
pub fn get_model(config: &Config, name: &str) -> Result<ModelConfig> {
    find_model(config, name).ok_or_else(|| Error::ModelNotFound {
        name: name.to_string(),
    })
}

/// All model names, configured and built-in, sorted.
pub fn model_names(config: &Config) -> Vec<String> {
    let mut names: Vec<String> = builtin_models()
        .into_keys()
        .chain(config.models.keys().cloned())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    names.sort();
    names
}

/// Resolve the on-disk location of a model file.
pub fn model_path(config: &Config, name: &str, model: &ModelConfig) -> Result<PathBuf> {
    if let Some(path) = &model.path {
        return Ok(path.clone());
    }
    let dir = super::models_dir(config.inference.models_dir.as_ref())?;
    Ok(dir.join(format!(
        "{name}.{}",
        crate::constants::model::MODEL_FILE_EXTENSION
    )))
}
