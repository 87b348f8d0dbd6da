//! Scoped privilege elevation
//!
//! Credentials changed with the raw `setresuid` syscall apply to the calling
//! OS thread only. A privileged section therefore runs its closure on a
//! dedicated scoped thread: the elevation can't leak to other work in the
//! process, and it ends with the thread even if restoring fails.

use crate::{Result, ShroudError};
use std::thread;

/// Raises and lowers the effective user id of the calling thread
pub trait Escalator: Sync {
    /// Raise privilege on the calling thread
    fn escalate(&self) -> Result<()>;

    /// Return the calling thread to its original privilege
    fn restore(&self) -> Result<()>;
}

/// Real escalator for setuid-root installs: effective uid 0 is taken from
/// the saved set-user-id and handed back on restore.
#[derive(Debug, Clone, Copy)]
pub struct ThreadPrivilege {
    uid: libc::uid_t,
}

impl ThreadPrivilege {
    /// Escalator for the real uid of this process
    #[must_use]
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
        }
    }
}

impl Escalator for ThreadPrivilege {
    fn escalate(&self) -> Result<()> {
        setresuid_thread(self.uid, 0, self.uid)
    }

    fn restore(&self) -> Result<()> {
        setresuid_thread(self.uid, self.uid, 0)
    }
}

fn setresuid_thread(ruid: libc::uid_t, euid: libc::uid_t, suid: libc::uid_t) -> Result<()> {
    // SAFETY: raw setresuid syscall, affects only the calling thread's credentials
    let ret = unsafe { libc::syscall(libc::SYS_setresuid, ruid, euid, suid) };

    if ret != 0 {
        return Err(ShroudError::Privilege(format!(
            "setresuid({ruid}, {euid}, {suid}) failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Restores privilege when the section unwinds, whatever the outcome
struct RestoreGuard<'a> {
    escalator: &'a dyn Escalator,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.escalator.restore() {
            tracing::error!(error = %e, "failed to drop privileges after privileged section");
        }
    }
}

/// Run `f` with elevated privilege on a pinned thread.
///
/// Restoration happens on every exit path once escalation succeeded. If
/// escalation fails, `f` is not run.
pub fn privileged_section<T, F>(escalator: &dyn Escalator, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send,
    T: Send,
{
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("shroud-privileged".into())
            .spawn_scoped(scope, move || {
                escalator.escalate()?;
                let _restore = RestoreGuard { escalator };
                tracing::debug!("privilege escalated");
                f()
            })
            .map_err(|e| ShroudError::Privilege(format!("failed to spawn privileged thread: {e}")))?;

        handle
            .join()
            .map_err(|_| ShroudError::Privilege("privileged section panicked".into()))?
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records escalation events in order
    #[derive(Default)]
    pub struct RecordingEscalator {
        pub events: Mutex<Vec<&'static str>>,
        pub fail_escalate: bool,
    }

    impl RecordingEscalator {
        pub fn count(&self, event: &str) -> usize {
            self.events.lock().iter().filter(|e| **e == event).count()
        }
    }

    impl Escalator for RecordingEscalator {
        fn escalate(&self) -> Result<()> {
            if self.fail_escalate {
                return Err(ShroudError::Privilege("setresuid refused".into()));
            }
            self.events.lock().push("escalate");
            Ok(())
        }

        fn restore(&self) -> Result<()> {
            self.events.lock().push("restore");
            Ok(())
        }
    }

    #[test]
    fn restores_after_success() {
        let esc = RecordingEscalator::default();
        let out = privileged_section(&esc, || Ok(7)).unwrap();
        assert_eq!(out, 7);
        assert_eq!(*esc.events.lock(), ["escalate", "restore"]);
    }

    #[test]
    fn restores_after_error() {
        let esc = RecordingEscalator::default();
        let err = privileged_section::<(), _>(&esc, || Err(ShroudError::Network("boom".into())))
            .unwrap_err();
        assert!(matches!(err, ShroudError::Network(_)));
        assert_eq!(esc.count("escalate"), esc.count("restore"));
    }

    #[test]
    fn restores_after_panic() {
        let esc = RecordingEscalator::default();
        let err = privileged_section::<(), _>(&esc, || panic!("teardown exploded")).unwrap_err();
        assert!(matches!(err, ShroudError::Privilege(_)));
        assert_eq!(*esc.events.lock(), ["escalate", "restore"]);
    }

    #[test]
    fn failed_escalation_skips_closure() {
        let esc = RecordingEscalator {
            fail_escalate: true,
            ..Default::default()
        };
        let mut ran = false;
        let err = privileged_section(&esc, || {
            ran = true;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, ShroudError::Privilege(_)));
        assert!(!ran);
        assert!(esc.events.lock().is_empty());
    }

    #[test]
    fn runs_on_a_different_thread() {
        let esc = RecordingEscalator::default();
        let caller = thread::current().id();
        let inner = privileged_section(&esc, || Ok(thread::current().id())).unwrap();
        assert_ne!(caller, inner);
    }
}
