//! Start phase: replace this process with the container entrypoint

use super::Engine;
use crate::{Result, ShroudError};
use std::convert::Infallible;
use std::ffi::CString;
use std::path::Path;

/// Prompt set for interactive shells when the process doesn't set one
pub const DEFAULT_PS1: &str = "PS1=shell> ";

impl Engine {
    /// Exec the configured process. Only returns on failure.
    pub fn start_process(&self) -> Result<Infallible> {
        let process = &self.common.process;
        let program = process
            .args
            .first()
            .ok_or_else(|| ShroudError::Exec("process has no arguments".into()))?;

        let args = to_cstrings(&process.args)?;
        let env = to_cstrings(&handoff_env(&process.env))?;
        let path = CString::new(program.as_str())
            .map_err(|e| ShroudError::Exec(format!("invalid program {program:?}: {e}")))?;

        super::chdir(Path::new("/"))?;

        tracing::debug!(program = %program, argc = args.len(), "exec container process");
        match nix::unistd::execve(&path, &args, &env) {
            Err(e) => Err(ShroudError::Exec(format!("exec {program} failed: {e}"))),
        }
    }
}

/// Environment handed to the entrypoint: the process list plus a default
/// prompt unless one is already set.
#[must_use]
pub fn handoff_env(env: &[String]) -> Vec<String> {
    let mut out = env.to_vec();
    if !out.iter().any(|var| var.starts_with("PS1=")) {
        out.push(DEFAULT_PS1.to_owned());
    }
    out
}

fn to_cstrings(items: &[String]) -> Result<Vec<CString>> {
    items
        .iter()
        .map(|s| {
            CString::new(s.as_str())
                .map_err(|e| ShroudError::Exec(format!("invalid argument {s:?}: {e}")))
        })
        .collect()
}
