//! Container network teardown

use crate::config::NetworkConfig;
use crate::{Result, ShroudError};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Releases the networks attached to a container
pub trait NetworkTeardown: Sync {
    fn del_networks(&self, network: &NetworkConfig) -> Result<()>;
}

/// Deletes named network namespaces with `ip netns delete`
#[derive(Debug, Clone)]
pub struct IpNetns {
    program: PathBuf,
}

impl Default for IpNetns {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ip"),
        }
    }
}

impl IpNetns {
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl NetworkTeardown for IpNetns {
    /// Every namespace is attempted; failures are reported together.
    fn del_networks(&self, network: &NetworkConfig) -> Result<()> {
        let mut failures = Vec::new();

        for ns in &network.namespaces {
            tracing::debug!(netns = %ns, "deleting network namespace");
            let outcome = Command::new(&self.program)
                .args(["netns", "delete", ns])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::inherit())
                .status();
            match outcome {
                Ok(status) if status.success() => {}
                Ok(status) => failures.push(format!("{ns}: {status}")),
                Err(e) => failures.push(format!("{ns}: {e}")),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShroudError::Network(format!(
                "failed to delete network namespaces: {}",
                failures.join(", ")
            )))
        }
    }
}
