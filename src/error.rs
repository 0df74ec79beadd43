//! Error types for stemsplit.
//!
//! Two layers: [`Error`] covers process-level failures (configuration,
//! credentials, I/O around the payload) that stop the worker, while
//! [`JobError`] covers a single invocation and is reported back to the
//! caller as a structured `{stage, kind, message}` object.

use serde::Serialize;

/// Result type alias for process-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for stemsplit.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Model not found in configuration or the built-in catalogue.
    #[error("model '{name}' not found in configuration")]
    ModelNotFound {
        /// Name of the missing model.
        name: String,
    },

    /// A required storage credential is missing from the environment.
    #[error("missing required environment variable {var}")]
    MissingCredentials {
        /// Name of the missing variable.
        var: &'static str,
    },

    /// Failed to read a job payload.
    #[error("failed to read job payload from '{path}'")]
    PayloadRead {
        /// Path the payload was read from (`-` for stdin).
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize a job response.
    #[error("failed to serialize job response")]
    ResponseSerialize {
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// A job failed; carried through so the CLI can set its exit code.
    #[error("job failed: {0}")]
    Job(#[from] JobError),

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Request validation.
    Validation,
    /// Audio download and decoding.
    Fetch,
    /// Model loading and inference.
    Separation,
    /// Stem encoding.
    Encode,
    /// Artifact upload.
    Upload,
    /// Failures outside any stage (worker bookkeeping).
    Internal,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Fetch => write!(f, "fetch"),
            Self::Separation => write!(f, "separation"),
            Self::Encode => write!(f, "encode"),
            Self::Upload => write!(f, "upload"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Failure while acquiring the source audio.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The download did not finish within the time budget.
    #[error("timed out fetching '{url}'")]
    Timeout {
        /// Source URL.
        url: String,
    },

    /// The resource exceeds the configured size limit.
    #[error("'{url}' exceeds the {limit} byte download limit")]
    TooLarge {
        /// Source URL.
        url: String,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// The server answered with an error status or could not be reached.
    #[error("failed to fetch '{url}': {reason}")]
    Http {
        /// Source URL.
        url: String,
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Status line or transport-level description.
        reason: String,
    },

    /// The downloaded bytes could not be decoded as audio.
    #[error("unsupported audio format: {reason}")]
    UnsupportedFormat {
        /// Decoder description.
        reason: String,
    },

    /// Writing the downloaded bytes or converting the samples failed locally.
    #[error("failed to stage downloaded audio: {reason}")]
    Local {
        /// Description of the failure.
        reason: String,
    },
}

impl FetchError {
    /// Machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::TooLarge { .. } => "too_large",
            Self::Http { .. } => "http_error",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::Local { .. } => "local_io",
        }
    }

    /// Whether re-dispatching the job may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => {
                status.is_none_or(|code| code == 408 || code == 429 || code >= 500)
            }
            Self::TooLarge { .. } | Self::UnsupportedFormat { .. } | Self::Local { .. } => false,
        }
    }
}

/// Failure while encoding a stem.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// Sample data is unusable (empty, NaN or infinite values, bad layout).
    #[error("invalid samples for stem '{stem}': {reason}")]
    InvalidSamples {
        /// Stem name.
        stem: String,
        /// What is wrong with the samples.
        reason: String,
    },

    /// The codec rejected its configuration or input.
    #[error("codec failure for stem '{stem}': {reason}")]
    Codec {
        /// Stem name.
        stem: String,
        /// Codec description.
        reason: String,
    },

    /// Writing the encoded file failed.
    #[error("failed to write encoded stem '{path}'")]
    Write {
        /// Output path.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl EncodeError {
    /// Machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSamples { .. } => "invalid_samples",
            Self::Codec { .. } => "codec_error",
            Self::Write { .. } => "write_error",
        }
    }
}

/// Failure while publishing an artifact.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The store rejected our credentials or permissions.
    #[error("storage rejected credentials uploading '{key}' (HTTP {status})")]
    Auth {
        /// Object key.
        key: String,
        /// HTTP status.
        status: u16,
    },

    /// Transport failure or server-side error.
    #[error("network error uploading '{key}': {reason}")]
    Network {
        /// Object key.
        key: String,
        /// Description of the failure.
        reason: String,
    },

    /// The store refused the upload for capacity or rate reasons.
    #[error("storage quota or rate limit hit uploading '{key}' (HTTP {status})")]
    Quota {
        /// Object key.
        key: String,
        /// HTTP status.
        status: u16,
    },

    /// The store refused the request for any other client-side reason.
    #[error("storage rejected upload of '{key}' (HTTP {status}): {reason}")]
    Rejected {
        /// Object key.
        key: String,
        /// HTTP status.
        status: u16,
        /// Error code or body returned by the store.
        reason: String,
    },

    /// The local artifact could not be read.
    #[error("failed to read artifact '{path}'")]
    Read {
        /// Local path.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// Machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Network { .. } => "network",
            Self::Quota { .. } => "quota",
            Self::Rejected { .. } => "rejected",
            Self::Read { .. } => "local_io",
        }
    }

    /// Whether re-dispatching the job may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Quota { .. })
    }
}

/// Failure of a single job invocation.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Bad or missing request fields.
    #[error("invalid request: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// Audio acquisition failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The separation model could not be loaded.
    #[error("failed to load model '{model}': {reason}")]
    ModelLoad {
        /// Model name.
        model: String,
        /// Description of the failure.
        reason: String,
    },

    /// The model file does not exist on this host.
    #[error("model '{model}' not found at '{path}'")]
    ModelMissing {
        /// Model name.
        model: String,
        /// Path that was checked.
        path: std::path::PathBuf,
    },

    /// Compute resources (memory, VRAM) were insufficient for inference.
    #[error("insufficient compute resources: {reason}")]
    ResourceExhausted {
        /// Description of the failure.
        reason: String,
    },

    /// Inference ran but failed or produced unusable output.
    #[error("inference failed: {reason}")]
    Inference {
        /// Description of the failure.
        reason: String,
    },

    /// Stem encoding failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Artifact upload failed.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Worker bookkeeping failed (workspace creation, task join).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl JobError {
    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Stage the error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Validation { .. } => Stage::Validation,
            Self::Fetch(_) => Stage::Fetch,
            Self::ModelLoad { .. }
            | Self::ModelMissing { .. }
            | Self::ResourceExhausted { .. }
            | Self::Inference { .. } => Stage::Separation,
            Self::Encode(_) => Stage::Encode,
            Self::Upload(_) => Stage::Upload,
            Self::Internal { .. } => Stage::Internal,
        }
    }

    /// Machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Fetch(e) => e.kind(),
            Self::ModelLoad { .. } => "model_load_error",
            Self::ModelMissing { .. } => "model_not_found",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::Inference { .. } => "inference_error",
            Self::Encode(e) => e.kind(),
            Self::Upload(e) => e.kind(),
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Whether the platform may re-dispatch the job with a chance of success.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_retryable(),
            Self::Upload(e) => e.is_retryable(),
            Self::ModelLoad { .. } | Self::ResourceExhausted { .. } => true,
            Self::Validation { .. }
            | Self::ModelMissing { .. }
            | Self::Inference { .. }
            | Self::Encode(_)
            | Self::Internal { .. } => false,
        }
    }

    /// Structured form returned to the caller.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            stage: self.stage(),
            kind: self.kind(),
            message: error_chain(self),
            retryable: self.is_retryable(),
        }
    }
}

/// Serializable job error as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// Stage that failed.
    pub stage: Stage,
    /// Machine-readable kind within the stage.
    pub kind: &'static str,
    /// Human-readable message including source causes.
    pub message: String,
    /// Whether the platform may retry.
    pub retryable: bool,
}

/// Render an error followed by its `source()` chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_report() {
        let report = JobError::validation("audio_url is required").report();
        assert_eq!(report.stage, Stage::Validation);
        assert_eq!(report.kind, "validation_error");
        assert!(!report.retryable);
        assert!(report.message.contains("audio_url is required"));
    }

    #[test]
    fn test_fetch_http_kind_and_retry() {
        let not_found = JobError::from(FetchError::Http {
            url: "https://x/a.mp3".to_string(),
            status: Some(404),
            reason: "Not Found".to_string(),
        });
        assert_eq!(not_found.stage(), Stage::Fetch);
        assert_eq!(not_found.kind(), "http_error");
        assert!(!not_found.is_retryable());

        let unavailable = JobError::from(FetchError::Http {
            url: "https://x/a.mp3".to_string(),
            status: Some(503),
            reason: "Service Unavailable".to_string(),
        });
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn test_upload_kinds() {
        let auth = JobError::from(UploadError::Auth {
            key: "k".to_string(),
            status: 403,
        });
        assert_eq!(auth.stage(), Stage::Upload);
        assert_eq!(auth.kind(), "auth");
        assert!(!auth.is_retryable());

        let quota = JobError::from(UploadError::Quota {
            key: "k".to_string(),
            status: 429,
        });
        assert!(quota.is_retryable());
    }

    #[test]
    fn test_resource_exhausted_is_retryable_separation_error() {
        let err = JobError::ResourceExhausted {
            reason: "CUDA out of memory".to_string(),
        };
        assert_eq!(err.stage(), Stage::Separation);
        assert_eq!(err.kind(), "resource_exhausted");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_missing_model_is_not_retryable() {
        let err = JobError::ModelMissing {
            model: "htdemucs".to_string(),
            path: std::path::PathBuf::from("/models/htdemucs.onnx"),
        };
        assert_eq!(err.stage(), Stage::Separation);
        assert_eq!(err.kind(), "model_not_found");
        assert!(!err.is_retryable());

        let err = JobError::ModelLoad {
            model: "htdemucs".to_string(),
            reason: "session creation failed".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_report_serializes_lowercase_stage() {
        let report = JobError::Encode(EncodeError::InvalidSamples {
            stem: "bass".to_string(),
            reason: "empty buffer".to_string(),
        })
        .report();
        let json = serde_json::to_value(&report).unwrap_or_default();
        assert_eq!(json["stage"], "encode");
        assert_eq!(json["kind"], "invalid_samples");
    }

    #[test]
    fn test_error_chain_includes_source() {
        let err = JobError::from(UploadError::Read {
            path: std::path::PathBuf::from("/tmp/vocals.mp3"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        });
        assert!(err.report().message.ends_with(": gone"));
    }
}
