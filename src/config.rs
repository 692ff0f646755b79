//! Cache configuration and mount-point path derivation.

use crate::error::{AssetError, Result};
use crate::kind::AssetKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Cache configuration, usually read from a JSON project file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root every asset path is relative to
    pub mount_root: PathBuf,
    /// Directory under the root holding per-kind metadata folders
    pub metadata_dir: PathBuf,
    /// Extension of metadata files, without the dot
    pub metadata_extension: String,
    /// Worker threads for parallel creation inside a batch
    pub worker_threads: usize,
    /// Cap on dependent-propagation waves per reload; 0 means store size
    pub max_reload_waves: usize,
    /// Deferred operations processed per pump; 0 means all pending
    pub poll_budget: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from("assets"),
            metadata_dir: PathBuf::from(".meta"),
            metadata_extension: "json".to_string(),
            worker_threads: 4,
            max_reload_waves: 0,
            poll_budget: 0,
        }
    }
}

impl CacheConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CacheConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AssetError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(AssetError::Config("worker_threads must be at least 1".into()));
        }
        if self.metadata_extension.is_empty() || self.metadata_extension.starts_with('.') {
            return Err(AssetError::Config(format!(
                "metadata_extension '{}' must be non-empty and given without a dot",
                self.metadata_extension
            )));
        }
        if self.metadata_dir.is_absolute() {
            return Err(AssetError::Config(
                "metadata_dir must be relative to mount_root".into(),
            ));
        }
        Ok(())
    }

    pub fn mount_point(&self) -> MountPoint {
        MountPoint {
            root: self.mount_root.clone(),
            metadata_dir: self.metadata_dir.clone(),
            metadata_extension: self.metadata_extension.clone(),
        }
    }
}

/// Where an asset tree lives on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountPoint {
    root: PathBuf,
    metadata_dir: PathBuf,
    metadata_extension: String,
}

impl MountPoint {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CacheConfig {
            mount_root: root.into(),
            ..CacheConfig::default()
        }
        .mount_point()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<metadata_dir>/<kind dir>/<name>.<ext>`
    pub fn metadata_path(&self, kind: AssetKind, name: &str) -> PathBuf {
        self.root
            .join(&self.metadata_dir)
            .join(kind.dir_name())
            .join(format!("{name}.{}", self.metadata_extension))
    }

    /// Key for the time stamp of one record. Records sharing a name but not
    /// a target file get distinct keys; file-less records use their
    /// metadata path.
    pub fn stamp_key(&self, kind: AssetKind, name: &str, file: Option<&Path>) -> PathBuf {
        let Some(file) = file else {
            return self.metadata_path(kind, name);
        };
        let flat: String = file
            .to_string_lossy()
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.root
            .join(&self.metadata_dir)
            .join(kind.dir_name())
            .join(format!("{name}@{flat}.{}", self.metadata_extension))
    }

    /// Target files are stored relative to the root
    pub fn target_path(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        }
    }
}
