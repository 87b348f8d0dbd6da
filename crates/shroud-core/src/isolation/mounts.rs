//! Ordered bind tree assembled under the final directory

use crate::config::EngineConfig;
use crate::ops::PrivilegedOps;
use crate::protocol::MountRequest;
use crate::{Result, ShroudError};
use nix::mount::MsFlags;
use std::path::{Component, Path, PathBuf};

/// One entry of the mount sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountStep {
    /// Short name used in logs and errors
    pub label: String,
    pub request: MountRequest,
    /// When false a failure is logged and the sequence continues
    pub must_succeed: bool,
}

impl MountStep {
    fn new(
        label: impl Into<String>,
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        fstype: &str,
        flags: MsFlags,
        data: &str,
    ) -> Self {
        Self {
            label: label.into(),
            request: MountRequest {
                source: source.into(),
                target: target.into(),
                fstype: fstype.to_owned(),
                flags: u64::from(flags.bits()),
                data: data.to_owned(),
            },
            must_succeed: true,
        }
    }

    const fn optional(mut self) -> Self {
        self.must_succeed = false;
        self
    }
}

/// The mounts needed to build a container root, in issue order.
///
/// Later entries target paths that only exist once earlier ones are in
/// place, and the recursive `/proc` and `/dev` binds must not be shadowed,
/// so the order is fixed.
#[derive(Debug, Clone, Default)]
pub struct MountPlan {
    steps: Vec<MountStep>,
}

impl MountPlan {
    /// Build the sequence for `config`. Fails when a user bind would land
    /// outside the container root.
    pub fn for_container(config: &EngineConfig) -> Result<Self> {
        let final_dir = &config.layout.final_dir;
        let inside = |path: &str| final_dir.join(path);
        let bind_rec = MsFlags::MS_BIND | MsFlags::MS_NOSUID | MsFlags::MS_REC;

        let mut steps = vec![
            MountStep::new(
                "image directory",
                &config.rootfs,
                final_dir,
                "",
                MsFlags::MS_BIND | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
                "errors=remount-ro",
            ),
            MountStep::new("proc", "/proc", inside("proc"), "", bind_rec, ""),
            MountStep::new("sys", "sysfs", inside("sys"), "sysfs", MsFlags::MS_NOSUID, ""),
            MountStep::new("/home", "/home", inside("home"), "", MsFlags::MS_BIND, ""),
            MountStep::new("/dev", "/dev", inside("dev"), "", bind_rec, ""),
            MountStep::new(
                "/etc/resolv.conf",
                "/etc/resolv.conf",
                inside("etc/resolv.conf"),
                "",
                bind_rec,
                "",
            ),
            MountStep::new("/etc/hosts", "/etc/hosts", inside("etc/hosts"), "", bind_rec, ""),
        ];

        if config.mount_tmp {
            for (source, target) in tmp_sources(config) {
                let label = format!("/{target}");
                steps.push(
                    MountStep::new(label, source, inside(target), "", bind_rec, "").optional(),
                );
            }
        }

        for bind in &config.binds {
            let target = final_dir.join(contained(bind.destination())?);
            steps.push(MountStep::new(
                bind.source.display().to_string(),
                &bind.source,
                target,
                "",
                bind_rec,
                "",
            ));
        }

        steps.push(MountStep::new(
            "staging directory",
            final_dir,
            &config.layout.session_dir,
            "",
            MsFlags::MS_BIND | MsFlags::MS_REC,
            "",
        ));

        Ok(Self { steps })
    }

    #[must_use]
    pub fn steps(&self) -> &[MountStep] {
        &self.steps
    }

    /// Issue every step in order through `ops`, stopping at the first
    /// failure of a required step. Completed mounts are left in place.
    pub fn apply(&self, ops: &mut dyn PrivilegedOps) -> Result<()> {
        for step in &self.steps {
            tracing::debug!(
                step = %step.label,
                source = %step.request.source.display(),
                target = %step.request.target.display(),
                "mounting"
            );

            match ops.mount(&step.request) {
                Ok(_) => {}
                Err(e) if !step.must_succeed => {
                    tracing::warn!(step = %step.label, error = %e, "optional mount skipped");
                }
                Err(ShroudError::Mount(msg)) => {
                    return Err(ShroudError::Mount(format!("mount {} failed: {msg}", step.label)));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// `dest` relative to the container root, refusing `..` so the kernel
/// can't resolve it outside
fn contained(dest: &Path) -> Result<PathBuf> {
    let mut relative = PathBuf::new();
    for component in dest.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(ShroudError::Config(format!(
                    "bind destination {} escapes the container root",
                    dest.display()
                )));
            }
        }
    }
    Ok(relative)
}

/// Sources of the `/tmp` and `/var/tmp` binds, paired with their
/// destination relative to the container root
#[must_use]
pub fn tmp_sources(config: &EngineConfig) -> [(PathBuf, &'static str); 2] {
    if config.contain {
        let session: &Path = &config.layout.session_dir;
        [
            (session.join("tmp"), "tmp"),
            (session.join("var_tmp"), "var/tmp"),
        ]
    } else {
        [
            (PathBuf::from("/tmp"), "tmp"),
            (PathBuf::from("/var/tmp"), "var/tmp"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::builder()
            .rootfs("/images/rootfs")
            .layout("/mnt/session", "/mnt/final")
            .build()
    }

    fn targets(plan: &MountPlan) -> Vec<PathBuf> {
        plan.steps().iter().map(|s| s.request.target.clone()).collect()
    }

    #[test]
    fn default_plan_order() {
        let plan = MountPlan::for_container(&config()).unwrap();
        let expected: Vec<PathBuf> = [
            "/mnt/final",
            "/mnt/final/proc",
            "/mnt/final/sys",
            "/mnt/final/home",
            "/mnt/final/dev",
            "/mnt/final/etc/resolv.conf",
            "/mnt/final/etc/hosts",
            "/mnt/session",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(targets(&plan), expected);
        assert!(plan.steps().iter().all(|s| s.must_succeed));
    }

    #[test]
    fn rootfs_bind_remounts_read_only_on_errors() {
        let plan = MountPlan::for_container(&config()).unwrap();
        let first = &plan.steps()[0].request;
        assert_eq!(first.source, PathBuf::from("/images/rootfs"));
        assert_eq!(first.data, "errors=remount-ro");
        let flags = MsFlags::from_bits_truncate(first.flags.try_into().unwrap());
        assert!(flags.contains(MsFlags::MS_BIND | MsFlags::MS_NODEV));
    }

    #[test]
    fn recursive_binds_for_proc_and_dev_only_sysfs_is_typed() {
        let plan = MountPlan::for_container(&config()).unwrap();
        let rec = |i: usize| {
            MsFlags::from_bits_truncate(plan.steps()[i].request.flags.try_into().unwrap())
                .contains(MsFlags::MS_REC)
        };
        assert!(rec(1));
        assert!(!rec(2));
        assert!(!rec(3));
        assert!(rec(4));
        assert_eq!(plan.steps()[2].request.fstype, "sysfs");
        assert!(plan.steps().iter().filter(|s| s.label != "sys").all(|s| s.request.fstype.is_empty()));
    }

    #[test]
    fn tmp_and_user_binds_sit_between_hosts_and_session() {
        let config = EngineConfig::builder()
            .rootfs("/images/rootfs")
            .layout("/mnt/session", "/mnt/final")
            .mount_tmp(true, true)
            .bind("/data", Some(PathBuf::from("/srv/data")))
            .build();
        let plan = MountPlan::for_container(&config).unwrap();
        let steps = plan.steps();
        assert_eq!(steps.len(), 11);
        assert_eq!(steps[7].request.source, PathBuf::from("/mnt/session/tmp"));
        assert_eq!(steps[7].request.target, PathBuf::from("/mnt/final/tmp"));
        assert!(!steps[7].must_succeed);
        assert_eq!(steps[8].request.target, PathBuf::from("/mnt/final/var/tmp"));
        assert_eq!(steps[9].request.target, PathBuf::from("/mnt/final/srv/data"));
        assert!(steps[9].must_succeed);
        assert_eq!(steps[10].label, "staging directory");
    }

    #[test]
    fn bind_destinations_stay_under_final_dir() {
        let config = EngineConfig::builder()
            .layout("/mnt/session", "/mnt/final")
            .bind("/data", Some(PathBuf::from("./srv//data/.")))
            .bind("/opt/tools", None)
            .build();
        let plan = MountPlan::for_container(&config).unwrap();
        let steps = plan.steps();
        assert_eq!(steps[7].request.target, PathBuf::from("/mnt/final/srv/data"));
        assert_eq!(steps[8].request.target, PathBuf::from("/mnt/final/opt/tools"));
    }

    #[test]
    fn parent_dir_in_bind_destination_is_refused() {
        for dest in ["/../../etc/shadow", "srv/../../../etc", ".."] {
            let config = EngineConfig::builder()
                .layout("/mnt/session", "/mnt/final")
                .bind("/data", Some(PathBuf::from(dest)))
                .build();
            let err = MountPlan::for_container(&config).unwrap_err();
            assert!(matches!(err, ShroudError::Config(_)), "{dest}: {err}");
        }
    }

    #[test]
    fn defaulted_destination_is_checked_too() {
        let config = EngineConfig::builder()
            .bind("/data/../../etc", None)
            .build();
        assert!(MountPlan::for_container(&config).is_err());
    }

    #[test]
    fn host_tmp_sources_without_contain() {
        let config = EngineConfig::builder().mount_tmp(true, false).build();
        let [(tmp, _), (var_tmp, _)] = tmp_sources(&config);
        assert_eq!(tmp, PathBuf::from("/tmp"));
        assert_eq!(var_tmp, PathBuf::from("/var/tmp"));
    }
}
