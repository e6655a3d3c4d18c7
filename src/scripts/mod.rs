//! Script storage: uploaded `.py` files the Supervisor can run.
//!
//! The store is read-only to the supervision core; it only resolves and
//! validates `script_path` values coming from uploads.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::supervisor::error::SupervisorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
}

pub struct ScriptStore {
    dir: PathBuf,
}

impl ScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist an uploaded script. Only bare `.py` filenames are accepted.
    pub async fn save(&self, filename: &str, data: &[u8]) -> Result<ScriptInfo, SupervisorError> {
        if filename.is_empty() || !filename.ends_with(".py") {
            return Err(SupervisorError::Validation(
                "uploaded file must be a Python script (.py)".to_string(),
            ));
        }
        // reject path traversal: the filename must stay inside the store
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(SupervisorError::Validation(format!(
                "invalid script filename '{}'",
                filename
            )));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| anyhow::anyhow!("failed to create scripts directory: {}", e))?;

        let path = self.dir.join(filename);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| anyhow::anyhow!("failed to save script '{}': {}", filename, e))?;

        tracing::info!("saved script '{}' ({} bytes)", filename, data.len());
        Ok(ScriptInfo {
            name: filename.to_string(),
            path: path.to_string_lossy().to_string(),
            size: data.len() as u64,
        })
    }

    /// All `.py` files currently in the store.
    pub fn list(&self) -> Vec<ScriptInfo> {
        let pattern = self.dir.join("*.py");
        let Ok(paths) = glob::glob(&pattern.to_string_lossy()) else {
            return Vec::new();
        };

        let mut scripts = Vec::new();
        for path in paths.flatten() {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            scripts.push(ScriptInfo {
                name,
                path: path.to_string_lossy().to_string(),
                size,
            });
        }
        scripts.sort_by(|a, b| a.name.cmp(&b.name));
        scripts
    }

    /// Whether `script_path` points at an existing file.
    pub fn exists(script_path: &str) -> bool {
        Path::new(script_path).is_file()
    }
}
