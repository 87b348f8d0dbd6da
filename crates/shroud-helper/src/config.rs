//! Helper configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the privileged helper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    /// Path to Unix socket
    pub socket_path: PathBuf,

    /// Permission bits applied to the socket after binding
    pub socket_mode: u32,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            socket_path: shroud_core::config::default_socket_path(),
            socket_mode: 0o600,
        }
    }
}

impl HelperConfig {
    /// Read a JSON config file, or use defaults when no path is given
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.json");
        std::fs::write(&path, r#"{ "socket_path": "/tmp/h.sock" }"#).unwrap();

        let config = HelperConfig::load(Some(&path)).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/h.sock"));
        assert_eq!(config.socket_mode, 0o600);
    }
}
