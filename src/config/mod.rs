//! Configuration loading and management.

mod env;
mod file;
mod paths;
mod types;
mod validate;

pub use env::{Credentials, StorageSettings};
pub use file::{load_config, load_config_file, save_config};
pub use paths::{config_dir, config_file_path, models_dir};
pub use types::{
    Config, DefaultsConfig, EncoderConfig, FetchConfig, InferenceConfig, InferenceDevice,
    ModelConfig, OutputFormat, PipelineConfig, StorageConfig, UrlPolicy, builtin_models,
};
pub use validate::{
    find_model, get_model, model_names, model_path, validate_config, validate_model_config,
};
