//! Host-side isolation plumbing
//!
//! This module contains the pieces the engine drives directly:
//! - `mounts` - ordered bind tree for the container root
//! - `privilege` - per-thread privilege escalation brackets
//! - `cgroups` - cgroup v2 teardown

pub mod cgroups;
pub mod mounts;
pub mod privilege;

pub use self::cgroups::{CgroupFs, CgroupTeardown};
pub use self::mounts::{MountPlan, MountStep};
pub use self::privilege::{Escalator, ThreadPrivilege, privileged_section};
