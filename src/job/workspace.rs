//! Per-job scratch directories with cleanup on drop and on signal.

use crate::constants::pipeline::WORKSPACE_PREFIX;
use crate::error::JobError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// RAII guard for a job's temporary directory.
///
/// The directory and everything inside it is removed when the guard is
/// dropped, on both success and failure paths.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Create a workspace for `job_id` under `base`, or the system temp dir.
    pub fn create(base: Option<&Path>, job_id: &str) -> Result<Self, JobError> {
        let prefix = format!("{WORKSPACE_PREFIX}{job_id}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match base {
            Some(base) => {
                fs::create_dir_all(base).map_err(|e| JobError::Internal {
                    message: format!("failed to create work dir '{}': {e}", base.display()),
                })?;
                builder.tempdir_in(base)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| JobError::Internal {
            message: format!("failed to create job workspace: {e}"),
        })?;

        register_workspace(dir.path());
        Ok(Self { dir })
    }

    /// Workspace directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        // TempDir removes the directory after this runs
        unregister_workspace(self.dir.path());
    }
}

/// Global registry of live workspaces for cleanup on signal.
static ACTIVE_WORKSPACES: std::sync::LazyLock<std::sync::Mutex<Vec<PathBuf>>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(Vec::new()));

fn register_workspace(path: &Path) {
    if let Ok(mut workspaces) = ACTIVE_WORKSPACES.lock() {
        workspaces.push(path.to_path_buf());
    }
}

fn unregister_workspace(path: &Path) {
    if let Ok(mut workspaces) = ACTIVE_WORKSPACES.lock() {
        workspaces.retain(|p| p != path);
    }
}

/// Remove all registered workspaces. Called on signal.
pub fn cleanup_all_workspaces() {
    if let Ok(workspaces) = ACTIVE_WORKSPACES.lock() {
        for path in workspaces.iter() {
            let _ = fs::remove_dir_all(path);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn is_registered(path: &Path) -> bool {
        ACTIVE_WORKSPACES
            .lock()
            .unwrap()
            .iter()
            .any(|p| p == path)
    }

    #[test]
    fn test_drop_removes_directory_and_contents() {
        let base = TempDir::new().unwrap();
        let workspace = JobWorkspace::create(Some(base.path()), "abc").unwrap();
        let path = workspace.path().to_path_buf();
        fs::write(workspace.path().join("input.mp3"), b"data").unwrap();

        assert!(path.exists());
        assert!(is_registered(&path));
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("stemsplit-job-abc-")
        );

        drop(workspace);
        assert!(!path.exists());
        assert!(!is_registered(&path));
    }

    #[test]
    fn test_cleanup_all_removes_registered_directories() {
        let base = TempDir::new().unwrap();
        let workspace = JobWorkspace::create(Some(base.path()), "sig").unwrap();
        let path = workspace.path().to_path_buf();
        fs::write(workspace.path().join("vocals.mp3"), b"data").unwrap();

        cleanup_all_workspaces();
        assert!(!path.exists());

        drop(workspace);
    }

    #[test]
    fn test_creates_missing_base_dir() {
        let base = TempDir::new().unwrap();
        let nested = base.path().join("a").join("b");
        let workspace = JobWorkspace::create(Some(&nested), "n").unwrap();
        assert!(workspace.path().starts_with(&nested));
    }
}
