//! S3-compatible object store over plain HTTP with SigV4 signing.

use super::ObjectStore;
use super::sigv4::{Signer, sha256_hex, uri_encode};
use crate::config::{StorageConfig, StorageSettings, UrlPolicy};
use crate::error::{Error, Result, UploadError};
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Where an object lives on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ObjectLocation {
    scheme: String,
    /// Host, with port when non-default.
    host: String,
    /// URI-encoded absolute path.
    path: String,
}

impl ObjectLocation {
    fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path)
    }
}

/// Uploads to S3 or any S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    settings: StorageSettings,
    config: StorageConfig,
    endpoint: Option<Url>,
}

impl S3ObjectStore {
    /// Build a store from environment settings and the `[storage]` config.
    pub fn new(settings: StorageSettings, config: &StorageConfig) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .as_deref()
            .map(|e| {
                Url::parse(e).map_err(|err| Error::ConfigValidation {
                    message: format!("invalid storage endpoint '{e}': {err}"),
                })
            })
            .transpose()?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(30)))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            settings,
            config: config.clone(),
            endpoint,
        })
    }

    fn locate(&self, bucket: &str, key: &str) -> ObjectLocation {
        let encoded_key = uri_encode(key, false);
        let region = &self.settings.region;

        let (scheme, base_host) = self.endpoint.as_ref().map_or_else(
            || {
                let host = if region == "us-east-1" {
                    "s3.amazonaws.com".to_string()
                } else {
                    format!("s3.{region}.amazonaws.com")
                };
                ("https".to_string(), host)
            },
            |url| {
                let host = url.host_str().unwrap_or_default();
                let host = url
                    .port()
                    .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
                (url.scheme().to_string(), host)
            },
        );

        if self.config.path_style {
            ObjectLocation {
                scheme,
                host: base_host,
                path: format!("/{}/{encoded_key}", uri_encode(bucket, true)),
            }
        } else {
            ObjectLocation {
                scheme,
                host: format!("{bucket}.{base_host}"),
                path: format!("/{encoded_key}"),
            }
        }
    }

    /// URL handed to consumers for `bucket`/`key` under the configured policy.
    pub fn consumer_url(&self, bucket: &str, key: &str) -> String {
        match self.config.url_policy {
            UrlPolicy::Public => self.config.public_base_url.as_deref().map_or_else(
                || self.locate(bucket, key).url(),
                |base| format!("{}/{}", base.trim_end_matches('/'), uri_encode(key, false)),
            ),
            UrlPolicy::Presigned => {
                let location = self.locate(bucket, key);
                let signer = Signer::new(
                    &self.settings.credentials,
                    &self.settings.region,
                    Utc::now(),
                );
                let query = signer.presign_query(
                    &location.host,
                    &location.path,
                    self.config.presign_expiry_secs,
                );
                format!("{}?{query}", location.url())
            }
        }
    }
}

impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> std::result::Result<String, UploadError> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| UploadError::Read {
                path: local_path.to_path_buf(),
                source: e,
            })?;

        let location = self.locate(bucket, key);
        let signer = Signer::new(
            &self.settings.credentials,
            &self.settings.region,
            Utc::now(),
        );
        let payload_hash = sha256_hex(&body);

        let mut headers = vec![
            ("content-type".to_string(), content_type.to_string()),
            ("host".to_string(), location.host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), signer.amz_date()),
        ];
        if let Some(acl) = &self.config.acl {
            headers.push(("x-amz-acl".to_string(), acl.clone()));
        }
        if let Some(token) = &self.settings.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        let authorization = signer.authorization("PUT", &location.path, &headers, &payload_hash);

        debug!("PUT {} ({} bytes)", location.url(), body.len());
        let mut request = self.client.put(location.url()).body(body);
        for (name, value) in headers.iter().filter(|(name, _)| name != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .header("authorization", authorization)
            .send()
            .await
            .map_err(|e| UploadError::Network {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(self.consumer_url(bucket, key));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(key, status, &body))
    }
}

/// Map a non-success response to an upload error.
fn classify_failure(key: &str, status: StatusCode, body: &str) -> UploadError {
    let code = status.as_u16();
    let throttled = body.contains("<Code>SlowDown</Code>")
        || body.contains("QuotaExceeded")
        || body.contains("<Code>TooManyRequests</Code>");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UploadError::Auth {
            key: key.to_string(),
            status: code,
        },
        StatusCode::TOO_MANY_REQUESTS | StatusCode::INSUFFICIENT_STORAGE => UploadError::Quota {
            key: key.to_string(),
            status: code,
        },
        _ if throttled => UploadError::Quota {
            key: key.to_string(),
            status: code,
        },
        _ if status.is_client_error() => UploadError::Rejected {
            key: key.to_string(),
            status: code,
            reason: error_code(body).unwrap_or_else(|| status.to_string()),
        },
        _ => UploadError::Network {
            key: key.to_string(),
            reason: format!("HTTP {status}"),
        },
    }
}

/// `<Code>` element of an S3 XML error body.
fn error_code(body: &str) -> Option<String> {
    let start = body.find("<Code>")? + "<Code>".len();
    let end = body[start..].find("</Code>")? + start;
    Some(body[start..end].to_string())
}
