//! Engine configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Hook phase run before any mount is issued
pub const PHASE_PRE: &str = "pre";
/// Hook phase run once the session directory is bound, before chroot
pub const PHASE_SETUP: &str = "setup";

/// OCI-style process description consumed at handoff time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Argument vector, `args[0]` is the executable path
    pub args: Vec<String>,
    /// Environment in `KEY=VALUE` form
    pub env: Vec<String>,
}

/// Metadata shared by every engine type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommonConfig {
    pub container_id: String,
    /// Must equal the name of the engine loading this configuration
    pub engine_name: String,
    pub process: ProcessSpec,
}

/// Build recipe hook scripts, keyed by phase name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipe {
    scripts: BTreeMap<String, Vec<String>>,
}

impl Recipe {
    /// Scripts registered for `phase`, in run order
    #[must_use]
    pub fn scripts(&self, phase: &str) -> &[String] {
        self.scripts.get(phase).map(Vec::as_slice).unwrap_or_default()
    }

    /// Append a script to `phase`
    pub fn push(&mut self, phase: impl Into<String>, script: impl Into<String>) {
        self.scripts
            .entry(phase.into())
            .or_default()
            .push(script.into());
    }
}

/// Network attached to the container, torn down at cleanup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Named network namespaces created for the container
    pub namespaces: Vec<String>,
}

/// Cgroup created for the container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CgroupConfig {
    /// Absolute path of the cgroup v2 directory
    pub path: PathBuf,
}

/// Additional host path bound into the container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindPath {
    pub source: PathBuf,
    /// Destination inside the container root; defaults to `source`
    #[serde(default)]
    pub target: Option<PathBuf>,
}

impl BindPath {
    /// Destination of the bind, relative to the container root
    #[must_use]
    pub fn destination(&self) -> &Path {
        self.target.as_deref().unwrap_or(&self.source)
    }
}

/// Well-known directories the engine assembles the container under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Directory the final chroot is issued from
    pub session_dir: PathBuf,
    /// Directory the root bind tree is assembled in
    pub final_dir: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            session_dir: env_path("SHROUD_SESSION_DIR", "/var/lib/shroud/mnt/session"),
            final_dir: env_path("SHROUD_FINAL_DIR", "/var/lib/shroud/mnt/final"),
        }
    }
}

impl Layout {
    /// Overlay mount point released by crypt teardown
    #[must_use]
    pub fn overlay_mount(&self) -> PathBuf {
        self.session_dir.join("final")
    }

    /// Rootfs mount point released by crypt teardown
    #[must_use]
    pub fn rootfs_mount(&self) -> PathBuf {
        self.session_dir.join("rootfs")
    }
}

/// Per-container engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Resolved container root filesystem (a directory)
    pub rootfs: PathBuf,

    /// Backing image file, removed at cleanup when `delete_image` is set
    pub image: PathBuf,

    pub recipe: Recipe,

    pub network: Option<NetworkConfig>,

    pub cgroup: Option<CgroupConfig>,

    /// Encrypted device backing the rootfs
    pub crypt_dev: Option<PathBuf>,

    pub delete_image: bool,

    /// Container runs detached and owns an instance record
    pub instance: bool,

    pub fakeroot: bool,

    /// Bind `/tmp` and `/var/tmp` into the container
    pub mount_tmp: bool,

    /// Source the tmp binds from the session directory instead of the host
    pub contain: bool,

    /// Extra host paths to bind, after the system binds
    pub binds: Vec<BindPath>,

    pub layout: Layout,
}

impl EngineConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn rootfs(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.rootfs = path.into();
        self
    }

    #[must_use]
    pub fn image(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.image = path.into();
        self
    }

    #[must_use]
    pub fn script(mut self, phase: impl Into<String>, script: impl Into<String>) -> Self {
        self.config.recipe.push(phase, script);
        self
    }

    #[must_use]
    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.config.network = Some(network);
        self
    }

    #[must_use]
    pub fn cgroup(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cgroup = Some(CgroupConfig { path: path.into() });
        self
    }

    #[must_use]
    pub fn crypt_dev(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.crypt_dev = Some(path.into());
        self
    }

    #[must_use]
    pub fn delete_image(mut self, delete: bool) -> Self {
        self.config.delete_image = delete;
        self
    }

    #[must_use]
    pub fn instance(mut self, instance: bool) -> Self {
        self.config.instance = instance;
        self
    }

    #[must_use]
    pub fn fakeroot(mut self, fakeroot: bool) -> Self {
        self.config.fakeroot = fakeroot;
        self
    }

    #[must_use]
    pub fn mount_tmp(mut self, mount: bool, contain: bool) -> Self {
        self.config.mount_tmp = mount;
        self.config.contain = contain;
        self
    }

    #[must_use]
    pub fn bind(mut self, source: impl Into<PathBuf>, target: Option<PathBuf>) -> Self {
        self.config.binds.push(BindPath {
            source: source.into(),
            target,
        });
        self
    }

    #[must_use]
    pub fn layout(mut self, session_dir: impl Into<PathBuf>, final_dir: impl Into<PathBuf>) -> Self {
        self.config.layout = Layout {
            session_dir: session_dir.into(),
            final_dir: final_dir.into(),
        };
        self
    }

    #[must_use]
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

/// On-disk container description read by the runner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerFile {
    pub common: CommonConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ContainerFile {
    /// Load a container description from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let data = std::fs::read(path)?;
        let file: Self = serde_json::from_slice(&data)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> crate::Result<()> {
        if self.common.container_id.is_empty() {
            return Err(crate::ShroudError::Config("container_id is empty".into()));
        }
        if self.common.engine_name.is_empty() {
            return Err(crate::ShroudError::Config("engine_name is empty".into()));
        }
        Ok(())
    }
}

/// Get default helper socket path from SHROUD_HELPER_SOCKET env var or system default
///
/// Returns:
/// - `$SHROUD_HELPER_SOCKET` if set (for development)
/// - `/run/shroud/helper.sock` otherwise (production)
pub fn default_socket_path() -> PathBuf {
    env_path("SHROUD_HELPER_SOCKET", "/run/shroud/helper.sock")
}

fn env_path(var: &str, fallback: &str) -> PathBuf {
    std::env::var(var).map_or_else(|_| PathBuf::from(fallback), PathBuf::from)
}
