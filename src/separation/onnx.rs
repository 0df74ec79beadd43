//! ONNX Runtime backed separation models.

use super::segment::{OverlapAdd, SegmentPlan, Window};
use super::{ModelLoader, SeparationModel, Stem, StemSet};
use crate::audio::AudioBuffer;
use crate::config::{InferenceConfig, InferenceDevice, ModelConfig};
use crate::constants::model::MODEL_FILE_EXTENSION;
use crate::error::JobError;
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Error substrings ONNX Runtime and CUDA use for allocation failures.
const EXHAUSTION_MARKERS: &[&str] = &[
    "out of memory",
    "failed to allocate",
    "bad_alloc",
    "cudaerrormemoryallocation",
    "cudnn_status_alloc_failed",
];

/// A Demucs-style graph: `[1, channels, frames]` in, `[1, sources, channels, frames]` out.
pub struct OnnxModel {
    name: String,
    sources: Vec<String>,
    sample_rate: u32,
    channels: usize,
    input_name: String,
    plan: Option<SegmentPlan>,
    session: Mutex<Session>,
}

impl OnnxModel {
    /// Load `path` as model `name`.
    pub fn load(
        name: &str,
        config: &ModelConfig,
        path: &Path,
        device: InferenceDevice,
        intra_threads: Option<usize>,
    ) -> Result<Self, JobError> {
        if !path.exists() {
            return Err(JobError::ModelMissing {
                model: name.to_string(),
                path: path.to_path_buf(),
            });
        }

        let mut builder = Session::builder()
            .map_err(|e| load_error(name, &e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(name, &e))?
            .with_execution_providers(execution_providers(device))
            .map_err(|e| load_error(name, &e))?;

        if let Some(threads) = intra_threads {
            builder = builder
                .with_intra_threads(threads)
                .map_err(|e| load_error(name, &e))?;
        }

        let session = builder
            .commit_from_file(path)
            .map_err(|e| load_error(name, &e))?;

        let plan = config
            .segment_secs
            .map(|secs| SegmentPlan::from_secs(secs, config.overlap_secs, config.sample_rate));

        info!(
            "Loaded model '{name}' from {} (device: {device}, sources: {})",
            path.display(),
            config.sources.join(", ")
        );

        Ok(Self {
            name: name.to_string(),
            sources: config.sources.clone(),
            sample_rate: config.sample_rate,
            channels: config.channels,
            input_name: config.input_name.clone(),
            plan,
            session: Mutex::new(session),
        })
    }

    /// Run one window through the graph, returning `[source][channel][frame]`
    /// trimmed to the window's real length.
    fn run_window(
        &self,
        session: &mut Session,
        audio: &AudioBuffer,
        window: Window,
        frames: usize,
    ) -> Result<Vec<Vec<Vec<f32>>>, JobError> {
        let mut input = Vec::with_capacity(self.channels * frames);
        for channel in audio.channels() {
            input.extend_from_slice(&channel[window.start..window.start + window.len]);
            input.resize(input.len() + frames - window.len, 0.0);
        }

        let tensor = Tensor::from_array(([1usize, self.channels, frames], input))
            .map_err(|e| inference_error("failed to create input tensor", &e))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| inference_error("inference failed", &e))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| JobError::Inference {
                reason: "model produced no output tensor".to_string(),
            })?
            .1;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_error("failed to extract output", &e))?;

        let dims: Vec<usize> = shape
            .iter()
            .map(|&d| usize::try_from(d).unwrap_or(0))
            .collect();
        let sources = self.sources.len();

        // Expected shape: [1, sources, channels, frames]
        if dims.len() != 4
            || dims[0] != 1
            || dims[1] != sources
            || dims[2] != self.channels
            || dims[3] < window.len
        {
            return Err(JobError::Inference {
                reason: format!(
                    "unexpected output shape {dims:?}, expected [1, {sources}, {}, {}]",
                    self.channels, frames
                ),
            });
        }

        let out_frames = dims[3];
        Ok((0..sources)
            .map(|s| {
                (0..self.channels)
                    .map(|c| {
                        let base = (s * self.channels + c) * out_frames;
                        data[base..base + window.len].to_vec()
                    })
                    .collect()
            })
            .collect())
    }
}

impl SeparationModel for OnnxModel {
    fn sources(&self) -> &[String] {
        &self.sources
    }

    fn separate(&self, audio: &AudioBuffer) -> Result<StemSet, JobError> {
        if audio.channel_count() != self.channels || audio.sample_rate() != self.sample_rate {
            return Err(JobError::Inference {
                reason: format!(
                    "model '{}' expects {} ch @ {} Hz, got {} ch @ {} Hz",
                    self.name,
                    self.channels,
                    self.sample_rate,
                    audio.channel_count(),
                    audio.sample_rate()
                ),
            });
        }
        if audio.is_empty() {
            return Err(JobError::Inference {
                reason: "input audio is empty".to_string(),
            });
        }

        let total = audio.frames();
        // Graphs with a dynamic time axis take the whole buffer at once
        let plan = self.plan.unwrap_or(SegmentPlan {
            segment: total,
            overlap: 0,
        });
        let windows = plan.windows(total);
        debug!(
            "Separating {total} frames in {} window(s) of {} frames",
            windows.len(),
            plan.segment
        );

        let mut acc = OverlapAdd::new(
            self.sources.len(),
            self.channels,
            total,
            plan.overlap,
            windows.len(),
        );
        {
            let mut session = self.session.lock().map_err(|_| JobError::Internal {
                message: format!("session lock for model '{}' poisoned", self.name),
            })?;
            for (i, window) in windows.iter().enumerate() {
                debug!("Window {}/{}", i + 1, windows.len());
                let output = self.run_window(&mut session, audio, *window, plan.segment)?;
                acc.add(*window, &output);
            }
        }

        let stems = acc
            .finish()
            .into_iter()
            .zip(&self.sources)
            .map(|(channels, name)| {
                let audio = AudioBuffer::new(channels, self.sample_rate).map_err(|e| {
                    JobError::Inference {
                        reason: e.to_string(),
                    }
                })?;
                Ok(Stem {
                    name: name.clone(),
                    audio,
                })
            })
            .collect::<Result<Vec<_>, JobError>>()?;

        StemSet::new(stems)
    }
}

/// Loads [`OnnxModel`]s from a models directory.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    models_dir: PathBuf,
    device: InferenceDevice,
    intra_threads: Option<usize>,
}

impl OnnxModelLoader {
    /// Loader reading `<models_dir>/<name>.onnx` unless a model names its own path.
    pub fn new(models_dir: PathBuf, inference: &InferenceConfig) -> Self {
        Self {
            models_dir,
            device: inference.device,
            intra_threads: inference.intra_threads,
        }
    }

    /// File a model is loaded from.
    pub fn model_file(&self, name: &str, config: &ModelConfig) -> PathBuf {
        config.path.clone().unwrap_or_else(|| {
            self.models_dir
                .join(format!("{name}.{MODEL_FILE_EXTENSION}"))
        })
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, name: &str, config: &ModelConfig) -> Result<Arc<dyn SeparationModel>, JobError> {
        let path = self.model_file(name, config);
        let model = OnnxModel::load(name, config, &path, self.device, self.intra_threads)?;
        Ok(Arc::new(model))
    }
}

fn execution_providers(device: InferenceDevice) -> Vec<ExecutionProviderDispatch> {
    let cpu = CPUExecutionProvider::default().build();
    match device {
        InferenceDevice::Cpu => vec![cpu],
        #[cfg(feature = "cuda")]
        InferenceDevice::Auto => {
            use ort::execution_providers::CUDAExecutionProvider;
            vec![CUDAExecutionProvider::default().build(), cpu]
        }
        #[cfg(feature = "cuda")]
        InferenceDevice::Gpu => {
            use ort::execution_providers::CUDAExecutionProvider;
            vec![
                CUDAExecutionProvider::default().build().error_on_failure(),
                cpu,
            ]
        }
        #[cfg(not(feature = "cuda"))]
        InferenceDevice::Auto => vec![cpu],
        #[cfg(not(feature = "cuda"))]
        InferenceDevice::Gpu => {
            warn!("Built without CUDA support, running on CPU");
            vec![cpu]
        }
    }
}

fn is_resource_exhaustion(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    EXHAUSTION_MARKERS.iter().any(|m| message.contains(m))
}

fn load_error(name: &str, e: &dyn Display) -> JobError {
    let reason = e.to_string();
    if is_resource_exhaustion(&reason) {
        warn!("Loading model '{name}' exhausted device memory");
        JobError::ResourceExhausted { reason }
    } else {
        JobError::ModelLoad {
            model: name.to_string(),
            reason,
        }
    }
}

fn inference_error(context: &str, e: &dyn Display) -> JobError {
    let reason = format!("{context}: {e}");
    if is_resource_exhaustion(&reason) {
        JobError::ResourceExhausted { reason }
    } else {
        JobError::Inference { reason }
    }
}
