//! Recipe hook scripts (`%pre`, `%setup`, ...)

use crate::{Result, ShroudError};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Log labels for a phase holding `count` scripts: the bare phase name for
/// a single script, `phase-N` otherwise.
#[must_use]
pub fn labels(phase: &str, count: usize) -> Vec<String> {
    match count {
        0 => Vec::new(),
        1 => vec![phase.to_owned()],
        _ => (0..count).map(|i| format!("{phase}-{i}")).collect(),
    }
}

/// Runs hook scripts synchronously through a shell
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    shell: PathBuf,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
        }
    }
}

impl ScriptRunner {
    #[must_use]
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Run every script of `phase` in order.
    ///
    /// The first script that fails to start or exits non-zero stops the
    /// phase with [`ShroudError::Hook`]; hooks are trusted, so callers treat
    /// that as fatal to the container.
    pub fn run_phase(&self, phase: &str, scripts: &[String]) -> Result<()> {
        for (label, script) in labels(phase, scripts.len()).iter().zip(scripts) {
            self.run(label, script)?;
        }
        Ok(())
    }

    fn run(&self, label: &str, content: &str) -> Result<()> {
        tracing::info!(script = label, "running %{label} script");

        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(content)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| ShroudError::Hook {
                label: label.to_owned(),
                reason: format!("failed to start: {e}"),
            })?;

        if !status.success() {
            return Err(ShroudError::Hook {
                label: label.to_owned(),
                reason: status.to_string(),
            });
        }

        tracing::info!(script = label, "finished running %{label} script, exit status 0");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_forms() {
        assert!(labels("pre", 0).is_empty());
        assert_eq!(labels("pre", 1), ["pre"]);
        assert_eq!(labels("setup", 3), ["setup-0", "setup-1", "setup-2"]);
    }

    #[test]
    fn empty_phase_is_a_no_op() {
        ScriptRunner::with_shell("/nonexistent/shell")
            .run_phase("pre", &[])
            .unwrap();
    }

    #[test]
    fn scripts_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        let scripts = vec![
            format!("echo first >> {}", log.display()),
            format!("echo second >> {}", log.display()),
        ];
        ScriptRunner::default().run_phase("setup", &scripts).unwrap();
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn failing_script_stops_the_phase() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let scripts = vec![
            "exit 3".to_owned(),
            format!("touch {}", marker.display()),
        ];
        let err = ScriptRunner::default().run_phase("pre", &scripts).unwrap_err();
        assert!(err.is_fatal_hook());
        assert!(matches!(err, ShroudError::Hook { ref label, .. } if label == "pre-0"));
        assert!(!marker.exists());
    }

    #[test]
    fn missing_shell_is_a_hook_failure() {
        let err = ScriptRunner::with_shell("/nonexistent/shell")
            .run_phase("pre", &["true".to_owned()])
            .unwrap_err();
        assert!(matches!(err, ShroudError::Hook { ref label, .. } if label == "pre"));
    }
}
