//! Instance records for detached containers

use crate::{Result, ShroudError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Subsystem name under which engine instances are recorded
pub const SUBSYSTEM: &str = "shroud";

/// A stored instance record
pub trait InstanceRecord {
    fn delete(&self) -> Result<()>;
}

/// Lookup of instance records by container id
pub trait InstanceRegistry: Sync {
    fn get(&self, container_id: &str, subsystem: &str) -> Result<Box<dyn InstanceRecord>>;
}

/// Contents of an instance record file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub container_id: String,
    pub pid: Option<i32>,
    pub image: PathBuf,
}

/// Instance records kept as `<root>/<subsystem>/<container_id>.json`
#[derive(Debug, Clone)]
pub struct InstanceDir {
    root: PathBuf,
}

impl InstanceDir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, container_id: &str, subsystem: &str) -> Result<PathBuf> {
        if container_id.is_empty() || container_id.contains('/') || container_id.starts_with('.') {
            return Err(ShroudError::Instance(format!(
                "invalid container id {container_id:?}"
            )));
        }
        Ok(self.root.join(subsystem).join(format!("{container_id}.json")))
    }

    /// Write the record for `info` under `subsystem`
    pub fn record(&self, subsystem: &str, info: &InstanceInfo) -> Result<()> {
        let path = self.path(&info.container_id, subsystem)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec_pretty(info)?)?;
        tracing::debug!(path = %path.display(), "instance recorded");
        Ok(())
    }
}

impl InstanceRegistry for InstanceDir {
    fn get(&self, container_id: &str, subsystem: &str) -> Result<Box<dyn InstanceRecord>> {
        let path = self.path(container_id, subsystem)?;
        let data = std::fs::read(&path).map_err(|e| {
            ShroudError::Instance(format!("no instance record at {}: {e}", path.display()))
        })?;
        let info: InstanceInfo = serde_json::from_slice(&data)?;
        Ok(Box::new(InstanceFile { path, info }))
    }
}

/// Record backed by a file in an [`InstanceDir`]
#[derive(Debug)]
pub struct InstanceFile {
    path: PathBuf,
    info: InstanceInfo,
}

impl InstanceFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn info(&self) -> &InstanceInfo {
        &self.info
    }
}

impl InstanceRecord for InstanceFile {
    fn delete(&self) -> Result<()> {
        std::fs::remove_file(&self.path).map_err(|e| {
            ShroudError::Instance(format!(
                "failed to delete instance {}: {e}",
                self.info.container_id
            ))
        })
    }
}
