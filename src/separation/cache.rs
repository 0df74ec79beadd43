//! Process-wide cache of loaded models.

use super::{ModelLoader, SeparationModel};
use crate::config::ModelConfig;
use crate::error::JobError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Loaded models keyed by name.
///
/// Each model is loaded at most once. A failed load leaves no entry, so a
/// later job can retry once resources free up.
#[derive(Default)]
pub struct ModelCache {
    models: Mutex<HashMap<String, Arc<dyn SeparationModel>>>,
}

impl ModelCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached model, loading it with `loader` on first use.
    ///
    /// The lock is held while loading so concurrent jobs never load the
    /// same model twice.
    pub fn get_or_load(
        &self,
        name: &str,
        config: &ModelConfig,
        loader: &dyn ModelLoader,
    ) -> Result<Arc<dyn SeparationModel>, JobError> {
        let mut models = self.models.lock().map_err(|_| JobError::Internal {
            message: "model cache lock poisoned".to_string(),
        })?;

        if let Some(model) = models.get(name) {
            return Ok(Arc::clone(model));
        }

        info!("Loading model '{name}'");
        match loader.load(name, config) {
            Ok(model) => {
                models.insert(name.to_string(), Arc::clone(&model));
                Ok(model)
            }
            Err(e) => {
                warn!("Model '{name}' failed to load: {e}");
                Err(e)
            }
        }
    }

    /// Whether `name` is loaded.
    pub fn contains(&self, name: &str) -> bool {
        self.models
            .lock()
            .map(|models| models.contains_key(name))
            .unwrap_or(false)
    }

    /// Number of loaded models.
    pub fn len(&self) -> usize {
        self.models.lock().map(|models| models.len()).unwrap_or(0)
    }

    /// Whether no model is loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .models
            .lock()
            .map(|models| models.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("ModelCache").field("models", &names).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::separation::StemSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullModel(Vec<String>);

    impl SeparationModel for NullModel {
        fn sources(&self) -> &[String] {
            &self.0
        }

        fn separate(&self, _audio: &AudioBuffer) -> Result<StemSet, JobError> {
            StemSet::new(Vec::new())
        }
    }

    /// Fails the first `failures` loads, then succeeds.
    struct FlakyLoader {
        calls: AtomicUsize,
        failures: usize,
    }

    impl ModelLoader for FlakyLoader {
        fn load(
            &self,
            name: &str,
            config: &ModelConfig,
        ) -> Result<Arc<dyn SeparationModel>, JobError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(JobError::ResourceExhausted {
                    reason: format!("no memory for {name}"),
                });
            }
            Ok(Arc::new(NullModel(config.sources.clone())))
        }
    }

    #[test]
    fn test_loads_once_and_reuses() {
        let cache = ModelCache::new();
        let loader = FlakyLoader {
            calls: AtomicUsize::new(0),
            failures: 0,
        };
        let config = ModelConfig::demucs(&["drums", "bass"]);

        let a = cache.get_or_load("htdemucs", &config, &loader).unwrap();
        let b = cache.get_or_load("htdemucs", &config, &loader).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains("htdemucs"));
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = ModelCache::new();
        let loader = FlakyLoader {
            calls: AtomicUsize::new(0),
            failures: 1,
        };
        let config = ModelConfig::demucs(&["vocals"]);

        let first = cache.get_or_load("htdemucs", &config, &loader);
        assert!(matches!(first, Err(JobError::ResourceExhausted { .. })));
        assert!(cache.is_empty());

        let second = cache.get_or_load("htdemucs", &config, &loader).unwrap();
        assert_eq!(second.sources(), ["vocals"]);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }
}
