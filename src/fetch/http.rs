//! HTTP(S) audio fetcher.

use super::{AudioFetcher, TargetFormat, download_extension};
use crate::audio::{AudioBuffer, conform, decode_audio_file};
use crate::config::FetchConfig;
use crate::error::{Error, FetchError, Result};
use futures_util::StreamExt;
use reqwest::{Client, Url};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Downloads audio over HTTP with size and time limits, then decodes it.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpFetcher {
    /// Build a fetcher from configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    /// Stream `url` to `dest`, returning the number of bytes written.
    pub async fn download(&self, url: &Url, dest: &Path) -> std::result::Result<u64, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| request_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: format!("HTTP {status}"),
            });
        }

        if let Some(length) = response.content_length()
            && length > self.max_bytes
        {
            return Err(self.too_large(url));
        }

        let mut file = File::create(dest).await.map_err(|e| local_error(dest, &e))?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| request_error(url, &e))?;

            downloaded += chunk.len() as u64;
            if downloaded > self.max_bytes {
                return Err(self.too_large(url));
            }

            file.write_all(&chunk)
                .await
                .map_err(|e| local_error(dest, &e))?;
        }
        file.flush().await.map_err(|e| local_error(dest, &e))?;

        if downloaded == 0 {
            return Err(FetchError::UnsupportedFormat {
                reason: "response body is empty".to_string(),
            });
        }

        Ok(downloaded)
    }

    fn too_large(&self, url: &Url) -> FetchError {
        FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        }
    }
}

impl AudioFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &Url,
        workspace: &Path,
        target: TargetFormat,
    ) -> std::result::Result<AudioBuffer, FetchError> {
        let path = workspace.join(format!("input.{}", download_extension(url)));

        let bytes = self.download(url, &path).await?;
        info!("Downloaded {bytes} bytes from {url}");

        let audio = tokio::task::spawn_blocking(move || {
            let decoded = decode_audio_file(&path)?;
            debug!("Decoded input: {:.1}s", decoded.duration_secs());
            Ok::<_, FetchError>(conform(decoded, target.sample_rate, target.channels)?)
        })
        .await
        .map_err(|e| FetchError::Local {
            reason: format!("decode task failed: {e}"),
        })??;

        Ok(audio)
    }
}

fn request_error(url: &Url, e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Http {
            url: url.to_string(),
            status: e.status().map(|s| s.as_u16()),
            reason: e.to_string(),
        }
    }
}

fn local_error(path: &Path, e: &std::io::Error) -> FetchError {
    FetchError::Local {
        reason: format!("'{}': {e}", path.display()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str, body: Vec<u8>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.flush().await.unwrap();
        });
        addr
    }

    fn fetcher(max_bytes: u64) -> HttpFetcher {
        HttpFetcher::new(&FetchConfig {
            max_bytes,
            timeout_secs: 5,
            connect_timeout_secs: 5,
        })
        .unwrap()
    }

    fn stereo() -> TargetFormat {
        TargetFormat {
            sample_rate: 44_100,
            channels: 2,
        }
    }

    #[tokio::test]
    async fn test_404_is_http_error() {
        let addr = serve_once("404 Not Found", b"missing".to_vec()).await;
        let url = Url::parse(&format!("http://{addr}/a.mp3")).unwrap();
        let dir = TempDir::new().unwrap();

        let err = fetcher(1024).fetch(&url, dir.path(), stereo()).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: Some(404), .. }));
        assert_eq!(err.kind(), "http_error");
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_is_too_large() {
        let addr = serve_once("200 OK", vec![0u8; 2048]).await;
        let url = Url::parse(&format!("http://{addr}/a.wav")).unwrap();
        let dir = TempDir::new().unwrap();

        let err = fetcher(1024).fetch(&url, dir.path(), stereo()).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn test_non_audio_body_is_unsupported_format() {
        let addr = serve_once("200 OK", b"<html>hello</html>".to_vec()).await;
        let url = Url::parse(&format!("http://{addr}/a.mp3")).unwrap();
        let dir = TempDir::new().unwrap();

        let err = fetcher(1024).fetch(&url, dir.path(), stereo()).await.unwrap_err();
        assert_eq!(err.kind(), "unsupported_format");
        // Staged download stays inside the workspace
        assert!(dir.path().join("input.mp3").exists());
    }

    #[tokio::test]
    async fn test_wav_is_decoded_and_conformed() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&source, spec).unwrap();
        for i in 0..4_410i32 {
            writer.write_sample(i16::try_from(i % 1000).unwrap()).unwrap();
        }
        writer.finalize().unwrap();

        let addr = serve_once("200 OK", std::fs::read(&source).unwrap()).await;
        let url = Url::parse(&format!("http://{addr}/mono.wav")).unwrap();
        let workspace = TempDir::new().unwrap();

        let audio = fetcher(1 << 20)
            .fetch(&url, workspace.path(), stereo())
            .await
            .unwrap();
        assert_eq!(audio.channel_count(), 2);
        assert_eq!(audio.sample_rate(), 44_100);
        assert_eq!(audio.frames(), 4_410);
    }
}
