//! In-process privileged operations

use super::PrivilegedOps;
use crate::protocol::MountRequest;
use crate::{Result, ShroudError};
use caps::{CapSet, Capability};
use nix::mount::MsFlags;
use std::path::Path;

/// Performs mounts and chroot with direct syscalls
#[derive(Debug)]
pub struct LocalOps {
    closed: bool,
}

impl LocalOps {
    /// Create the in-process variant, refusing when `CAP_SYS_ADMIN` is not
    /// in the effective set.
    pub fn new() -> Result<Self> {
        let held = caps::has_cap(None, CapSet::Effective, Capability::CAP_SYS_ADMIN)
            .map_err(|e| ShroudError::Privilege(format!("failed to read capabilities: {e}")))?;
        if !held {
            return Err(ShroudError::Privilege(
                "CAP_SYS_ADMIN is required for in-process mounts".into(),
            ));
        }
        Ok(Self { closed: false })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ShroudError::Channel("privileged operations already closed".into()));
        }
        Ok(())
    }
}

/// Perform `req` with `mount(2)`; empty strings stand for null arguments.
pub fn mount_now(req: &MountRequest) -> Result<()> {
    let fstype = (!req.fstype.is_empty()).then_some(req.fstype.as_str());
    let data = (!req.data.is_empty()).then_some(req.data.as_str());
    #[allow(clippy::cast_possible_truncation)]
    let flags = MsFlags::from_bits_truncate(req.flags as libc::c_ulong);

    nix::mount::mount(Some(req.source.as_path()), &req.target, fstype, flags, data).map_err(|e| {
        ShroudError::Mount(format!(
            "failed to mount {} on {}: {e}",
            req.source.display(),
            req.target.display()
        ))
    })
}

/// Change the root of the calling process to `path`
pub fn chroot_now(path: &Path) -> Result<()> {
    nix::unistd::chroot(path)
        .map_err(|e| ShroudError::Chroot(format!("chroot to {} failed: {e}", path.display())))
}

impl PrivilegedOps for LocalOps {
    fn mount(&mut self, req: &MountRequest) -> Result<i32> {
        self.ensure_open()?;
        mount_now(req)?;
        Ok(0)
    }

    fn chroot(&mut self, path: &Path) -> Result<i32> {
        self.ensure_open()?;
        chroot_now(path)?;
        Ok(0)
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }
}
