//! Platform-specific configuration paths.

use crate::constants::{APP_NAME, env};
use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the configuration directory for the current platform.
///
/// - Linux: `~/.config/stemsplit/`
/// - macOS: `~/Library/Application Support/stemsplit/`
/// - Windows: `%APPDATA%\stemsplit\`
pub fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(Error::ConfigDirNotFound)
}

/// Get the full path to the config file.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Directory searched for `<model>.onnx` files.
///
/// Priority: `STEMSPLIT_MODELS_DIR`, then `inference.models_dir` from the
/// config file, then the platform data directory.
pub fn models_dir(configured: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(env::MODELS_DIR) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = configured {
        return Ok(dir.clone());
    }
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().join("models"))
        .ok_or(Error::ConfigDirNotFound)
}
