//! Cleanup phase: best-effort teardown of everything a container may own

use super::Engine;
use crate::crypt::{self, CryptDevice, Unmounter};
use crate::instance::{InstanceRegistry, SUBSYSTEM};
use crate::isolation::cgroups::CgroupTeardown;
use crate::isolation::privilege::{Escalator, privileged_section};
use crate::network::NetworkTeardown;
use crate::{Result, ShroudError};
use std::io::ErrorKind;
use std::process::ExitStatus;

/// What a failing cleanup step does to the rest of the teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and move on to the next step
    Continue,
    /// Stop the teardown and report the failure to the caller
    Abort,
}

/// Teardown steps, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    DeleteImage,
    Network,
    Cgroup,
    Instance,
    Crypt,
}

impl CleanupStep {
    pub const ORDER: [Self; 5] = [
        Self::DeleteImage,
        Self::Network,
        Self::Cgroup,
        Self::Instance,
        Self::Crypt,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DeleteImage => "image",
            Self::Network => "network",
            Self::Cgroup => "cgroup",
            Self::Instance => "instance",
            Self::Crypt => "crypt",
        }
    }

    /// Image, network, cgroup and crypt teardown are advisory. The instance
    /// record must stay consistent with what is running, so its failure is
    /// returned.
    #[must_use]
    pub const fn policy(self) -> FailurePolicy {
        match self {
            Self::Instance => FailurePolicy::Abort,
            _ => FailurePolicy::Continue,
        }
    }
}

/// Host capabilities cleanup delegates to
#[derive(Clone, Copy)]
pub struct Teardown<'a> {
    pub escalator: &'a dyn Escalator,
    pub network: &'a dyn NetworkTeardown,
    pub cgroup: &'a dyn CgroupTeardown,
    pub instances: &'a dyn InstanceRegistry,
    pub unmounter: &'a dyn Unmounter,
    pub crypt: &'a dyn CryptDevice,
}

/// Result of one attempted step
#[derive(Debug)]
pub struct StepOutcome {
    pub step: CleanupStep,
    pub error: Option<ShroudError>,
}

/// Every step cleanup attempted, in order
#[derive(Debug)]
pub struct CleanupReport {
    /// Wait status of the container process, as handed in
    pub status: ExitStatus,
    pub steps: Vec<StepOutcome>,
}

impl CleanupReport {
    #[must_use]
    pub fn attempted(&self) -> Vec<CleanupStep> {
        self.steps.iter().map(|o| o.step).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|o| o.error.is_some())
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl Engine {
    /// Tear down whatever the container may have created.
    ///
    /// Runs once per container whether creation and start succeeded or
    /// not; `fatal` is the error that ended the container, if any. Steps
    /// that don't apply to this configuration are skipped. Only a failing
    /// [`FailurePolicy::Abort`] step makes this return an error; the rest
    /// are logged and listed in the report.
    pub fn cleanup_container(
        &self,
        fatal: Option<&ShroudError>,
        status: ExitStatus,
        teardown: &Teardown<'_>,
    ) -> Result<CleanupReport> {
        if let Some(err) = fatal {
            tracing::warn!(error = %err, "cleaning up after container failure");
        }
        tracing::debug!(container = %self.common.container_id, %status, "cleaning up container");

        let mut report = CleanupReport {
            status,
            steps: Vec::new(),
        };

        for step in CleanupStep::ORDER {
            if !self.cleanup_applies(step) {
                continue;
            }

            match (self.run_cleanup_step(step, teardown), step.policy()) {
                (Ok(()), _) => report.steps.push(StepOutcome { step, error: None }),
                (Err(e), FailurePolicy::Continue) => {
                    tracing::error!(step = step.name(), error = %e, "cleanup step failed");
                    report.steps.push(StepOutcome {
                        step,
                        error: Some(e),
                    });
                }
                (Err(e), FailurePolicy::Abort) => {
                    return Err(ShroudError::Cleanup {
                        step: step.name(),
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(report)
    }

    fn cleanup_applies(&self, step: CleanupStep) -> bool {
        match step {
            CleanupStep::DeleteImage => self.config.delete_image,
            CleanupStep::Network => self.config.network.is_some(),
            CleanupStep::Cgroup => self.config.cgroup.is_some(),
            CleanupStep::Instance => self.config.instance,
            CleanupStep::Crypt => self.config.crypt_dev.is_some(),
        }
    }

    fn run_cleanup_step(&self, step: CleanupStep, teardown: &Teardown<'_>) -> Result<()> {
        match step {
            CleanupStep::DeleteImage => self.remove_image(),
            CleanupStep::Network => {
                let Some(network) = &self.config.network else {
                    return Ok(());
                };
                if self.config.fakeroot {
                    privileged_section(teardown.escalator, || {
                        teardown.network.del_networks(network)
                    })
                } else {
                    teardown.network.del_networks(network)
                }
            }
            CleanupStep::Cgroup => match &self.config.cgroup {
                Some(cgroup) => teardown.cgroup.remove(cgroup),
                None => Ok(()),
            },
            CleanupStep::Instance => teardown
                .instances
                .get(&self.common.container_id, SUBSYSTEM)?
                .delete(),
            CleanupStep::Crypt => match &self.config.crypt_dev {
                Some(device) => crypt::teardown(
                    &self.config.layout,
                    device,
                    teardown.escalator,
                    teardown.unmounter,
                    teardown.crypt,
                ),
                None => Ok(()),
            },
        }
    }

    fn remove_image(&self) -> Result<()> {
        let image = &self.config.image;
        tracing::info!(image = %image.display(), "cleaning up image");

        let removed = match std::fs::symlink_metadata(image) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(image),
            Ok(_) => std::fs::remove_file(image),
            Err(e) => Err(e),
        };
        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(image = %image.display(), "image already gone");
                Ok(())
            }
            Err(e) => Err(ShroudError::Io(e)),
        }
    }
}
