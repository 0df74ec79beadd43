//! Separation engine: cached model lookup plus output checks.

use super::{ModelCache, ModelLoader, StemSet};
use crate::audio::AudioBuffer;
use crate::config::ModelConfig;
use crate::error::JobError;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Runs separation models over decoded audio.
///
/// The model cache is owned by the caller and injected here, so one cache
/// can outlive many engines or be shared across workers.
#[derive(Clone)]
pub struct SeparationEngine {
    cache: Arc<ModelCache>,
    loader: Arc<dyn ModelLoader>,
}

impl SeparationEngine {
    /// Engine over `cache`, loading misses through `loader`.
    pub fn new(cache: Arc<ModelCache>, loader: Arc<dyn ModelLoader>) -> Self {
        Self { cache, loader }
    }

    /// Shared model cache.
    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// Load `name` ahead of the first job.
    pub fn preload(&self, name: &str, config: &ModelConfig) -> Result<(), JobError> {
        self.cache
            .get_or_load(name, config, self.loader.as_ref())
            .map(|_| ())
    }

    /// Separate `audio` with model `name`.
    ///
    /// Stems come back in model order and with the model's names; the
    /// output must match the input's rate, layout and length.
    pub fn separate(
        &self,
        name: &str,
        config: &ModelConfig,
        audio: &AudioBuffer,
    ) -> Result<StemSet, JobError> {
        let model = self.cache.get_or_load(name, config, self.loader.as_ref())?;

        let start = Instant::now();
        let stems = model.separate(audio)?;

        if !stems.names().eq(model.sources().iter().map(String::as_str)) {
            return Err(JobError::Inference {
                reason: format!(
                    "model '{name}' returned stems [{}], expected [{}]",
                    stems.names().collect::<Vec<_>>().join(", "),
                    model.sources().join(", ")
                ),
            });
        }

        for stem_name in model.sources() {
            let Some(stem) = stems.get(stem_name) else {
                continue;
            };
            if stem.audio.sample_rate() != audio.sample_rate()
                || stem.audio.channel_count() != audio.channel_count()
                || stem.audio.frames() != audio.frames()
            {
                return Err(JobError::Inference {
                    reason: format!(
                        "stem '{stem_name}' is {} ch x {} frames @ {} Hz, input is {} ch x {} frames @ {} Hz",
                        stem.audio.channel_count(),
                        stem.audio.frames(),
                        stem.audio.sample_rate(),
                        audio.channel_count(),
                        audio.frames(),
                        audio.sample_rate()
                    ),
                });
            }
        }

        info!(
            "Separated {:.1}s of audio into {} stems in {:.2}s",
            audio.duration_secs(),
            stems.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(stems)
    }
}

impl std::fmt::Debug for SeparationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeparationEngine")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::separation::{SeparationModel, Stem};

    /// Emits each source as the input scaled by its index + 1.
    struct ScaleModel {
        sources: Vec<String>,
        truncate: bool,
    }

    impl SeparationModel for ScaleModel {
        fn sources(&self) -> &[String] {
            &self.sources
        }

        #[allow(clippy::cast_precision_loss)]
        fn separate(&self, audio: &AudioBuffer) -> Result<StemSet, JobError> {
            let stems = self
                .sources
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let channels = audio
                        .channels()
                        .iter()
                        .map(|c| {
                            let keep = if self.truncate { c.len() / 2 } else { c.len() };
                            c[..keep].iter().map(|s| s * (i + 1) as f32).collect()
                        })
                        .collect();
                    Stem {
                        name: name.clone(),
                        audio: AudioBuffer::new(channels, audio.sample_rate()).unwrap(),
                    }
                })
                .collect();
            StemSet::new(stems)
        }
    }

    struct ScaleLoader {
        truncate: bool,
    }

    impl ModelLoader for ScaleLoader {
        fn load(
            &self,
            _name: &str,
            config: &ModelConfig,
        ) -> Result<Arc<dyn SeparationModel>, JobError> {
            Ok(Arc::new(ScaleModel {
                sources: config.sources.clone(),
                truncate: self.truncate,
            }))
        }
    }

    fn engine(truncate: bool) -> SeparationEngine {
        SeparationEngine::new(Arc::new(ModelCache::new()), Arc::new(ScaleLoader { truncate }))
    }

    fn stereo() -> AudioBuffer {
        AudioBuffer::new(vec![vec![0.5; 8], vec![-0.5; 8]], 44_100).unwrap()
    }

    #[test]
    fn test_separate_keeps_model_order_and_layout() {
        let config = ModelConfig::demucs(&["drums", "bass", "other", "vocals"]);
        let stems = engine(false).separate("htdemucs", &config, &stereo()).unwrap();

        assert_eq!(
            stems.names().collect::<Vec<_>>(),
            ["drums", "bass", "other", "vocals"]
        );
        let vocals = stems.get("vocals").unwrap();
        assert_eq!(vocals.audio.channel_count(), 2);
        assert_eq!(vocals.audio.channel(0).unwrap()[0], 2.0);
    }

    #[test]
    fn test_length_mismatch_is_inference_error() {
        let config = ModelConfig::demucs(&["drums", "bass"]);
        let result = engine(true).separate("htdemucs", &config, &stereo());
        assert!(matches!(result, Err(JobError::Inference { .. })));
    }

    #[test]
    fn test_engines_share_injected_cache() {
        let cache = Arc::new(ModelCache::new());
        let loader: Arc<dyn ModelLoader> = Arc::new(ScaleLoader { truncate: false });
        let a = SeparationEngine::new(Arc::clone(&cache), Arc::clone(&loader));
        let b = SeparationEngine::new(Arc::clone(&cache), loader);

        let config = ModelConfig::demucs(&["vocals"]);
        a.preload("htdemucs", &config).unwrap();
        assert!(b.cache().contains("htdemucs"));
    }
}
