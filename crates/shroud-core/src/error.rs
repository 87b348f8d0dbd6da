//! Error types for shroud-core

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShroudError {
    #[error("engine name {found:?} in configuration doesn't match runtime name {expected:?}")]
    EngineMismatch { expected: String, found: String },

    #[error("stat on {} failed: {source}", .path.display())]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("mount error: {0}")]
    Mount(String),

    #[error("chroot error: {0}")]
    Chroot(String),

    #[error("change directory to {} failed: {source}", .path.display())]
    Chdir {
        path: PathBuf,
        source: nix::Error,
    },

    /// A hook script failed to start or exited non-zero. Not recoverable.
    #[error("%{label} script failed: {reason}")]
    Hook { label: String, reason: String },

    #[error("privileged channel error: {0}")]
    Channel(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("privilege error: {0}")]
    Privilege(String),

    #[error("exec error: {0}")]
    Exec(String),

    #[error("crypt device error: {0}")]
    Crypt(String),

    #[error("network teardown error: {0}")]
    Network(String),

    #[error("cgroup error: {0}")]
    Cgroup(String),

    #[error("instance error: {0}")]
    Instance(String),

    #[error("cleanup step {step} failed: {source}")]
    Cleanup {
        step: &'static str,
        source: Box<ShroudError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ShroudError {
    /// Hook failures abort the whole container startup rather than being
    /// handled by the caller.
    #[must_use]
    pub const fn is_fatal_hook(&self) -> bool {
        matches!(self, Self::Hook { .. })
    }
}
