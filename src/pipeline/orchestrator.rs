//! Sequencing of a single separation job.

use crate::config::{Config, ModelConfig};
use crate::encode::{EncodedStem, StemEncoder, build_encoder};
use crate::error::{EncodeError, JobError};
use crate::fetch::{AudioFetcher, TargetFormat};
use crate::job::{
    HandlerResponse, JobPayload, JobResult, JobWorkspace, SeparationRequest, new_job_id,
};
use crate::publish::{ArtifactPublisher, ObjectStore};
use crate::separation::SeparationEngine;
use futures_util::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Runs separation jobs against injected collaborators.
///
/// One runner serves many jobs; the engine's model cache is shared across
/// them while every job gets its own workspace and `job_id`.
pub struct JobRunner<F, S> {
    config: Config,
    fallback_bucket: Option<String>,
    engine: SeparationEngine,
    encoder: Arc<dyn StemEncoder>,
    fetcher: F,
    publisher: ArtifactPublisher<S>,
}

impl<F: AudioFetcher, S: ObjectStore> JobRunner<F, S> {
    /// Runner using the encoder configured in `config`.
    pub fn new(config: Config, engine: SeparationEngine, fetcher: F, store: S) -> Self {
        let encoder = build_encoder(&config.encoder);
        Self {
            config,
            fallback_bucket: None,
            engine,
            encoder,
            fetcher,
            publisher: ArtifactPublisher::new(store),
        }
    }

    /// Bucket used when neither the payload nor the config names one.
    #[must_use]
    pub fn with_fallback_bucket(mut self, bucket: Option<String>) -> Self {
        self.fallback_bucket = bucket;
        self
    }

    /// Replace the stem encoder.
    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn StemEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Object store uploads go to.
    pub fn store(&self) -> &S {
        self.publisher.store()
    }

    /// Load `name` into the model cache ahead of the first job.
    pub fn preload(&self, name: &str, model: &ModelConfig) -> Result<(), JobError> {
        self.engine.preload(name, model)
    }

    /// Parse, validate and run a raw JSON payload.
    ///
    /// Never fails: every error becomes an `{"error": ...}` response.
    pub async fn handle(&self, payload: &str) -> HandlerResponse {
        let outcome = match JobPayload::parse(payload) {
            Ok(payload) => self.handle_payload(&payload).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            error!("Job failed at {} stage ({}): {e}", e.stage(), e.kind());
        }
        HandlerResponse::from(outcome)
    }

    /// Validate and run an already parsed payload.
    pub async fn handle_payload(&self, payload: &JobPayload) -> Result<JobResult, JobError> {
        let request = payload
            .input
            .resolve(&self.config, self.fallback_bucket.as_deref())?;
        if let Some(id) = &payload.id {
            debug!("Platform request id: {id}");
        }
        self.run(&request).await
    }

    /// Run a validated request under a fresh `job_id`.
    pub async fn run(&self, request: &SeparationRequest) -> Result<JobResult, JobError> {
        let job_id = new_job_id();
        self.run_with_id(&job_id, request).await
    }

    /// Run a validated request, keying artifacts under `job_id`.
    ///
    /// The workspace is dropped, and with it every local artifact, on all
    /// return paths.
    pub async fn run_with_id(
        &self,
        job_id: &str,
        request: &SeparationRequest,
    ) -> Result<JobResult, JobError> {
        let start = Instant::now();
        info!(
            "Job {job_id}: separating {} with '{}' into [{}]",
            request.source_url,
            request.model_name,
            request.requested_stems.join(", ")
        );

        let workspace = JobWorkspace::create(self.config.pipeline.work_dir.as_deref(), job_id)?;

        let target = TargetFormat {
            sample_rate: request.model.sample_rate,
            channels: request.model.channels,
        };
        let audio = self
            .fetcher
            .fetch(&request.source_url, workspace.path(), target)
            .await?;
        info!(
            "Job {job_id}: fetched {:.1}s of audio",
            audio.duration_secs()
        );

        let engine = self.engine.clone();
        let model_name = request.model_name.clone();
        let model = request.model.clone();
        let stems =
            tokio::task::spawn_blocking(move || engine.separate(&model_name, &model, &audio))
                .await
                .map_err(join_error)??;
        let selected = stems.select(&request.requested_stems)?;

        let encoder = Arc::clone(&self.encoder);
        let dir = workspace.path().to_path_buf();
        let encoded = tokio::task::spawn_blocking(move || {
            selected
                .iter()
                .map(|stem| encoder.encode(stem, &dir))
                .collect::<Result<Vec<EncodedStem>, EncodeError>>()
        })
        .await
        .map_err(join_error)??;
        debug!("Job {job_id}: encoded {} stems", encoded.len());

        // Completion order; the first error drops every upload still in flight
        let concurrency = self.config.pipeline.upload_concurrency.max(1);
        let mut published = stream::iter(encoded.iter().enumerate())
            .map(|(index, stem)| async move {
                self.publisher
                    .publish(stem, &request.storage_target, job_id)
                    .await
                    .map(|artifact| (index, artifact))
            })
            .buffer_unordered(concurrency)
            .try_collect::<Vec<_>>()
            .await?;
        published.sort_unstable_by_key(|(index, _)| *index);
        let artifacts: Vec<_> = published.into_iter().map(|(_, artifact)| artifact).collect();

        drop(workspace);
        info!(
            "Job {job_id}: published {} stems in {:.1}s",
            artifacts.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(JobResult::new(artifacts))
    }
}

fn join_error(e: tokio::task::JoinError) -> JobError {
    JobError::Internal {
        message: format!("worker task failed: {e}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::error::{FetchError, UploadError};
    use crate::separation::{ModelCache, ModelLoader, SeparationModel, Stem, StemSet};
    use reqwest::Url;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ToneFetcher;

    impl AudioFetcher for ToneFetcher {
        async fn fetch(
            &self,
            _url: &Url,
            _workspace: &Path,
            target: TargetFormat,
        ) -> Result<AudioBuffer, FetchError> {
            Ok(AudioBuffer::new(vec![vec![0.25; 4410]; target.channels], target.sample_rate).unwrap())
        }
    }

    struct EchoModel {
        sources: Vec<String>,
    }

    impl SeparationModel for EchoModel {
        fn sources(&self) -> &[String] {
            &self.sources
        }

        fn separate(&self, audio: &AudioBuffer) -> Result<StemSet, JobError> {
            StemSet::new(
                self.sources
                    .iter()
                    .map(|name| Stem {
                        name: name.clone(),
                        audio: audio.clone(),
                    })
                    .collect(),
            )
        }
    }

    struct EchoLoader;

    impl ModelLoader for EchoLoader {
        fn load(
            &self,
            _name: &str,
            config: &ModelConfig,
        ) -> Result<Arc<dyn SeparationModel>, JobError> {
            Ok(Arc::new(EchoModel {
                sources: config.sources.clone(),
            }))
        }
    }

    #[derive(Default)]
    struct CountingStore {
        uploads: AtomicUsize,
    }

    impl ObjectStore for CountingStore {
        async fn upload(
            &self,
            local_path: &Path,
            bucket: &str,
            key: &str,
            _content_type: &str,
        ) -> Result<String, UploadError> {
            assert!(local_path.is_file());
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://{bucket}.test/{key}"))
        }
    }

    fn runner(work_dir: &Path) -> JobRunner<ToneFetcher, CountingStore> {
        let mut config = Config::default();
        config.pipeline.work_dir = Some(work_dir.to_path_buf());
        let engine = SeparationEngine::new(Arc::new(ModelCache::new()), Arc::new(EchoLoader));
        JobRunner::new(config, engine, ToneFetcher, CountingStore::default())
    }

    #[tokio::test]
    async fn test_handle_returns_urls_in_requested_order() {
        let work = tempfile::TempDir::new().unwrap();
        let runner = runner(work.path());

        let response = runner
            .handle(
                r#"{"input": {"audio_url": "https://x.test/song.mp3",
                    "storage_bucket": "b", "stems": ["bass", "vocals"]}}"#,
            )
            .await;

        let HandlerResponse::Success(result) = response else {
            panic!("expected success");
        };
        assert_eq!(result.stems().collect::<Vec<_>>(), vec!["bass", "vocals"]);
        assert!(result.url("bass").unwrap().starts_with("https://b.test/demucs-outputs/"));
        assert_eq!(runner.store().uploads.load(Ordering::SeqCst), 2);
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_validation_error() {
        let work = tempfile::TempDir::new().unwrap();
        let runner = runner(work.path());

        let response = runner.handle("not json").await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["stage"], "validation");
        assert_eq!(runner.store().uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_with_id_keys_artifacts() {
        let work = tempfile::TempDir::new().unwrap();
        let runner = runner(work.path());
        let payload = JobPayload::parse(
            r#"{"input": {"audio_url": "https://x.test/a.wav", "storage_bucket": "b",
                "storage_prefix": "p", "stems": ["drums"]}}"#,
        )
        .unwrap();
        let request = payload.input.resolve(runner.config(), None).unwrap();

        let result = runner.run_with_id("fixed", &request).await.unwrap();
        assert_eq!(result.url("drums"), Some("https://b.test/p/fixed/drums.mp3"));
    }
}
