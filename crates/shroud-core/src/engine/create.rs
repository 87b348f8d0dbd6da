//! Creation phase: assemble the container root and chroot into it

use super::{Engine, NAME, chdir};
use crate::config::{PHASE_PRE, PHASE_SETUP};
use crate::isolation::mounts::{MountPlan, tmp_sources};
use crate::ops::PrivilegedOps;
use crate::{Result, ShroudError};
use std::path::Path;

impl Engine {
    /// Assemble the container root through `ops` and chroot into it.
    ///
    /// Every step is fatal. Mounts already made when a later step fails
    /// stay in place for the cleanup phase to release. `ops` is closed once
    /// the chroot succeeded.
    pub fn create_container(&self, ops: &mut dyn PrivilegedOps) -> Result<()> {
        if self.common.engine_name != NAME {
            return Err(ShroudError::EngineMismatch {
                expected: NAME.to_owned(),
                found: self.common.engine_name.clone(),
            });
        }

        let rootfs = &self.config.rootfs;
        let meta = std::fs::metadata(rootfs).map_err(|source| ShroudError::Stat {
            path: rootfs.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(ShroudError::NotADirectory(rootfs.clone()));
        }

        let plan = MountPlan::for_container(&self.config)?;

        self.scripts
            .run_phase(PHASE_PRE, self.config.recipe.scripts(PHASE_PRE))?;

        if self.config.mount_tmp && self.config.contain {
            for (source, _) in tmp_sources(&self.config) {
                std::fs::create_dir_all(&source)?;
            }
        }

        tracing::debug!(rootfs = %rootfs.display(), "mounting image directory");
        plan.apply(ops)?;

        self.scripts
            .run_phase(PHASE_SETUP, self.config.recipe.scripts(PHASE_SETUP))?;

        let session = &self.config.layout.session_dir;
        tracing::debug!(dir = %session.display(), "chdir into session directory");
        chdir(session)?;

        tracing::debug!(dir = %session.display(), "chroot into session directory");
        ops.chroot(session)?;

        chdir(Path::new("/"))?;

        ops.close()?;
        tracing::info!(container = %self.common.container_id, "container created");
        Ok(())
    }
}
