//! Process environment read once at startup.

use crate::constants::{env, storage};
use crate::error::{Error, Result};

/// Credentials used to sign storage requests.
#[derive(Clone)]
pub struct Credentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Storage provider settings taken from the environment.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Signing credentials.
    pub credentials: Credentials,
    /// Region used for signing and the default endpoint.
    pub region: String,
    /// Custom S3-compatible endpoint.
    pub endpoint: Option<String>,
    /// Bucket used when neither request nor config names one.
    pub default_bucket: Option<String>,
}

impl StorageSettings {
    /// Read settings from the process environment.
    ///
    /// Missing credentials are fatal: the worker cannot publish anything
    /// without them, so it refuses to start.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let access_key_id = non_empty(env::ACCESS_KEY_ID).ok_or(Error::MissingCredentials {
            var: env::ACCESS_KEY_ID,
        })?;
        let secret_access_key =
            non_empty(env::SECRET_ACCESS_KEY).ok_or(Error::MissingCredentials {
                var: env::SECRET_ACCESS_KEY,
            })?;

        Ok(Self {
            credentials: Credentials {
                access_key_id,
                secret_access_key,
                session_token: non_empty(env::SESSION_TOKEN),
            },
            region: non_empty(env::REGION).unwrap_or_else(|| storage::DEFAULT_REGION.to_string()),
            endpoint: non_empty(env::ENDPOINT_URL).map(|e| e.trim_end_matches('/').to_string()),
            default_bucket: non_empty(env::BUCKET),
        })
    }
}
