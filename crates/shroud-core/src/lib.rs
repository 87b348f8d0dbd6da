//! # shroud-core
//!
//! Container execution engine: assembles a container root, hands control to
//! the containerized process and tears everything down afterward.
//!
//! This crate provides:
//! - The three-phase engine lifecycle (create, start, cleanup)
//! - An ordered mount plan issued through a privileged-operations capability
//! - A msgpack RPC client for an out-of-process privileged helper
//! - Scoped, per-thread privilege escalation for teardown steps
//! - Cgroup, network, instance record and encrypted device teardown

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crypt;
pub mod engine;
pub mod error;
pub mod instance;
pub mod isolation;
pub mod network;
pub mod ops;
pub mod protocol;
pub mod script;

pub use config::{CommonConfig, EngineConfig};
pub use engine::Engine;
pub use error::ShroudError;

/// Crate-level result type
pub type Result<T> = std::result::Result<T, ShroudError>;
