//! Source separation: mixed audio in, one buffer per stem out.

mod cache;
mod engine;
mod onnx;
mod segment;

pub use cache::ModelCache;
pub use engine::SeparationEngine;
pub use onnx::{OnnxModel, OnnxModelLoader};
pub use segment::{SegmentPlan, Window, crossfade_weights};

use crate::audio::AudioBuffer;
use crate::config::ModelConfig;
use crate::error::JobError;
use std::sync::Arc;

/// One separated stem.
#[derive(Debug, Clone, PartialEq)]
pub struct Stem {
    /// Source name as reported by the model.
    pub name: String,
    /// Stem audio, same rate and layout as the input.
    pub audio: AudioBuffer,
}

/// All stems produced by one separation pass, in model order.
#[derive(Debug, Clone, PartialEq)]
pub struct StemSet {
    stems: Vec<Stem>,
}

impl StemSet {
    /// Build from stems in model order. Names must be unique.
    pub fn new(stems: Vec<Stem>) -> Result<Self, JobError> {
        for (i, stem) in stems.iter().enumerate() {
            if stems[..i].iter().any(|s| s.name == stem.name) {
                return Err(JobError::Inference {
                    reason: format!("model produced stem '{}' twice", stem.name),
                });
            }
        }
        Ok(Self { stems })
    }

    /// Stem by name.
    pub fn get(&self, name: &str) -> Option<&Stem> {
        self.stems.iter().find(|s| s.name == name)
    }

    /// Stem names in model order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stems.iter().map(|s| s.name.as_str())
    }

    /// Number of stems.
    pub fn len(&self) -> usize {
        self.stems.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    /// Keep only `requested`, in requested order.
    ///
    /// Fails if any requested stem is absent, so callers never see a
    /// partial selection.
    pub fn select(self, requested: &[String]) -> Result<Vec<Stem>, JobError> {
        let mut pool: Vec<Option<Stem>> = self.stems.into_iter().map(Some).collect();
        requested
            .iter()
            .map(|name| {
                pool.iter_mut()
                    .find(|slot| slot.as_ref().is_some_and(|s| &s.name == name))
                    .and_then(Option::take)
                    .ok_or_else(|| JobError::Inference {
                        reason: format!("model output is missing stem '{name}'"),
                    })
            })
            .collect()
    }
}

/// A loaded separation model.
///
/// Implementations are shared across jobs and must not mutate model state
/// during inference.
pub trait SeparationModel: Send + Sync {
    /// Stem names the model produces, in output order.
    fn sources(&self) -> &[String];

    /// Split `audio` into one buffer per source.
    fn separate(&self, audio: &AudioBuffer) -> Result<StemSet, JobError>;
}

/// Loads models by name.
pub trait ModelLoader: Send + Sync {
    /// Load `name` as described by `config`.
    fn load(&self, name: &str, config: &ModelConfig) -> Result<Arc<dyn SeparationModel>, JobError>;
}
