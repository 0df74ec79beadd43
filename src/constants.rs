//! Application-wide constants.
//!
//! Defaults for the job payload and the tunables in the configuration file
//! live here so request parsing, config defaults and tests agree.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "stemsplit";

/// Model used when the request does not name one.
pub const DEFAULT_MODEL: &str = "htdemucs";

/// Stems returned when the request does not list any.
pub const DEFAULT_STEMS: [&str; 4] = ["vocals", "drums", "bass", "other"];

/// Key prefix used when neither the request nor the config sets one.
pub const DEFAULT_STORAGE_PREFIX: &str = "demucs-outputs";

/// Fetch limits.
pub mod fetch {
    /// Maximum accepted download size (512 MiB).
    pub const DEFAULT_MAX_BYTES: u64 = 512 * 1024 * 1024;

    /// Total time budget for a download, in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Connection establishment timeout, in seconds.
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

    /// Audio extensions recognised in source URLs, used as a decoder hint.
    pub const KNOWN_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "m4a", "aac", "wav"];

    /// Extension used when the URL does not reveal one.
    pub const FALLBACK_EXTENSION: &str = "wav";
}

/// Encoder settings.
pub mod encoder {
    /// Default mp3 bitrate in kbps.
    pub const DEFAULT_BITRATE_KBPS: u32 = 320;

    /// Accepted bitrate range in kbps.
    pub const MIN_BITRATE_KBPS: u32 = 96;
    /// Upper end of the accepted bitrate range in kbps.
    pub const MAX_BITRATE_KBPS: u32 = 320;

    /// Extra room reserved for the LAME flush frame.
    pub const MP3_FLUSH_RESERVE: usize = 7200;
}

/// Object storage settings.
pub mod storage {
    /// Region used when `AWS_REGION` is unset.
    pub const DEFAULT_REGION: &str = "us-east-1";

    /// Canned ACL applied to uploads by default.
    pub const DEFAULT_ACL: &str = "public-read";

    /// Default lifetime of presigned URLs (7 days, the SigV4 maximum).
    pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 604_800;

    /// Upper bound for presigned URL lifetime.
    pub const MAX_PRESIGN_EXPIRY_SECS: u64 = 604_800;

    /// Per-request upload timeout, in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
}

/// Separation model defaults.
pub mod model {
    /// Sample rate of the Demucs family.
    pub const DEMUCS_SAMPLE_RATE: u32 = 44_100;

    /// Channel count of the Demucs family.
    pub const DEMUCS_CHANNELS: usize = 2;

    /// Window length of the exported HTDemucs graphs, in seconds.
    pub const DEMUCS_SEGMENT_SECS: f32 = 7.8;

    /// Overlap between consecutive windows, in seconds.
    pub const DEMUCS_OVERLAP_SECS: f32 = 1.0;

    /// Input tensor name of the exported graphs.
    pub const DEFAULT_INPUT_NAME: &str = "input";

    /// Native sources of the four-stem models, in output order.
    pub const FOUR_STEM_SOURCES: [&str; 4] = ["drums", "bass", "other", "vocals"];

    /// Native sources of the six-stem model, in output order.
    pub const SIX_STEM_SOURCES: [&str; 6] = ["drums", "bass", "other", "vocals", "guitar", "piano"];

    /// File extension of model files in the models directory.
    pub const MODEL_FILE_EXTENSION: &str = "onnx";
}

/// Pipeline settings.
pub mod pipeline {
    /// Number of uploads in flight per job.
    pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

    /// Prefix of per-job temporary directories.
    pub const WORKSPACE_PREFIX: &str = "stemsplit-job-";
}

/// Environment variable names read at startup.
pub mod env {
    /// Storage access key id.
    pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    /// Storage secret access key.
    pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
    /// Optional session token for temporary credentials.
    pub const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
    /// Storage region.
    pub const REGION: &str = "AWS_REGION";
    /// Optional S3-compatible endpoint.
    pub const ENDPOINT_URL: &str = "AWS_ENDPOINT_URL";
    /// Optional default bucket.
    pub const BUCKET: &str = "STEMSPLIT_BUCKET";
    /// Optional directory holding model files.
    pub const MODELS_DIR: &str = "STEMSPLIT_MODELS_DIR";
}
