//! Encrypted root device teardown

use crate::config::Layout;
use crate::isolation::privilege::{Escalator, privileged_section};
use crate::{Result, ShroudError};
use nix::mount::MntFlags;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Closes a mapped encrypted device by name
pub trait CryptDevice: Sync {
    fn close(&self, name: &str) -> Result<()>;
}

/// Detaches a mount point
pub trait Unmounter: Sync {
    fn unmount(&self, target: &Path) -> Result<()>;
}

/// `cryptsetup close <name>`
#[derive(Debug, Clone)]
pub struct CryptSetup {
    program: PathBuf,
}

impl Default for CryptSetup {
    fn default() -> Self {
        Self {
            program: PathBuf::from("cryptsetup"),
        }
    }
}

impl CryptDevice for CryptSetup {
    fn close(&self, name: &str) -> Result<()> {
        let status = Command::new(&self.program)
            .args(["close", name])
            .stdin(Stdio::null())
            .status()
            .map_err(|e| ShroudError::Crypt(format!("failed to run cryptsetup: {e}")))?;

        if !status.success() {
            return Err(ShroudError::Crypt(format!(
                "unable to delete crypt device {name}: cryptsetup {status}"
            )));
        }
        Ok(())
    }
}

/// Lazy `umount2(MNT_DETACH)`
#[derive(Debug, Default, Clone, Copy)]
pub struct LazyUnmount;

impl Unmounter for LazyUnmount {
    fn unmount(&self, target: &Path) -> Result<()> {
        nix::mount::umount2(target, MntFlags::MNT_DETACH).map_err(|e| {
            ShroudError::Mount(format!("failed to unmount {}: {e}", target.display()))
        })
    }
}

/// Mapper name of an encrypted device: the last segment of its path
pub fn device_name(device: &Path) -> Result<&str> {
    device
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            ShroudError::Crypt(format!("no device name in {}", device.display()))
        })
}

/// Release the encrypted device backing a container root.
///
/// Runs elevated. Each step depends on the previous one: a mount point
/// that fails to detach keeps the device busy, so the first failure ends
/// the teardown.
pub fn teardown(
    layout: &Layout,
    device: &Path,
    escalator: &dyn Escalator,
    unmounter: &dyn Unmounter,
    crypt: &dyn CryptDevice,
) -> Result<()> {
    privileged_section(escalator, || {
        let overlay = layout.overlay_mount();
        unmounter.unmount(&overlay).inspect_err(|e| {
            tracing::debug!(error = %e, "error while unmounting overlay fs");
        })?;

        let rootfs = layout.rootfs_mount();
        unmounter.unmount(&rootfs).inspect_err(|e| {
            tracing::debug!(error = %e, "error while unmounting rootfs");
        })?;

        let name = device_name(device)?;
        crypt.close(name).inspect_err(|e| {
            tracing::debug!(device = name, error = %e, "unable to delete crypt device");
        })?;

        tracing::info!(device = name, "crypt device closed");
        Ok(())
    })
}
