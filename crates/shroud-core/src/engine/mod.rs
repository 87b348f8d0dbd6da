//! Container engine lifecycle
//!
//! An engine drives one container through three phases, each entered
//! separately by the supervisor:
//! - `create` - hook scripts, bind tree assembly and chroot
//! - `process` - handoff to the container entrypoint
//! - `cleanup` - best-effort teardown after exit or failed creation

pub mod cleanup;
pub mod create;
pub mod process;

pub use self::cleanup::{CleanupReport, CleanupStep, FailurePolicy, StepOutcome, Teardown};

use crate::config::{CommonConfig, EngineConfig};
use crate::script::ScriptRunner;
use crate::{Result, ShroudError};
use std::path::Path;

/// Engine type name; loaded configurations must carry the same name
pub const NAME: &str = "shroud";

/// Lifecycle driver for a single container
#[derive(Debug)]
pub struct Engine {
    common: CommonConfig,
    config: EngineConfig,
    scripts: ScriptRunner,
}

impl Engine {
    #[must_use]
    pub fn new(common: CommonConfig, config: EngineConfig) -> Self {
        Self {
            common,
            config,
            scripts: ScriptRunner::default(),
        }
    }

    /// Replace the runner used for recipe hooks
    #[must_use]
    pub fn with_scripts(mut self, scripts: ScriptRunner) -> Self {
        self.scripts = scripts;
        self
    }

    #[must_use]
    pub const fn common(&self) -> &CommonConfig {
        &self.common
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Change the working directory of the whole process
fn chdir(path: &Path) -> Result<()> {
    nix::unistd::chdir(path).map_err(|source| ShroudError::Chdir {
        path: path.to_path_buf(),
        source,
    })
}
