//! Cgroups v2 teardown

use crate::config::CgroupConfig;
use crate::{Result, ShroudError};
use std::io::ErrorKind;
use std::path::Path;

/// Removes the cgroup hierarchy created for a container
pub trait CgroupTeardown: Sync {
    fn remove(&self, cgroup: &CgroupConfig) -> Result<()>;
}

/// Removes cgroup directories from the unified hierarchy
#[derive(Debug, Default, Clone, Copy)]
pub struct CgroupFs;

impl CgroupTeardown for CgroupFs {
    fn remove(&self, cgroup: &CgroupConfig) -> Result<()> {
        tracing::debug!(cgroup = %cgroup.path.display(), "removing cgroup");
        remove_tree(&cgroup.path)
    }
}

/// Cgroup directories hold only kernel interface files, which `rmdir`
/// takes with them, so children are removed depth first and files are
/// never unlinked.
fn remove_tree(path: &Path) -> Result<()> {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(ShroudError::Cgroup(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    };

    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            remove_tree(&entry.path())?;
        }
    }

    match std::fs::remove_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ShroudError::Cgroup(format!(
            "failed to remove {}: {e}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("shroud").join("c1");
        std::fs::create_dir_all(root.join("child/grandchild")).unwrap();

        CgroupFs.remove(&CgroupConfig { path: root.clone() }).unwrap();
        assert!(!root.exists());
        assert!(dir.path().join("shroud").exists());
    }

    #[test]
    fn absent_cgroup_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone");
        CgroupFs.remove(&CgroupConfig { path }).unwrap();
    }

    #[test]
    fn stray_file_keeps_directory_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("c2");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("cgroup.procs"), "1").unwrap();

        let err = CgroupFs.remove(&CgroupConfig { path: root.clone() }).unwrap_err();
        assert!(matches!(err, ShroudError::Cgroup(_)));
        assert!(root.exists());
    }
}
