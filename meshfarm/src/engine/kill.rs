//! Out-of-band engine termination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle that terminates an engine from another thread.
///
/// Triggering is idempotent. A process-group switch delivers `SIGKILL` to the
/// whole group, so helper processes the engine spawned die with it.
#[derive(Debug, Clone)]
pub enum KillSwitch {
    /// Kill an OS process group.
    ProcessGroup(i32),
    /// Raise a cooperative cancellation flag.
    Flag(Arc<AtomicBool>),
}

impl KillSwitch {
    /// Terminates the engine.
    pub fn trigger(&self) {
        match self {
            Self::ProcessGroup(pgid) => kill_process_group(*pgid),
            Self::Flag(flag) => flag.store(true, Ordering::SeqCst),
        }
    }
}

/// Sends `SIGKILL` to a process group, ignoring groups that are already gone.
pub(crate) fn kill_process_group(pgid: i32) {
    if pgid <= 1 {
        return;
    }
    // SAFETY: killpg has no memory-safety preconditions; a stale pgid yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::trace!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_switch_is_idempotent() {
        let flag = Arc::new(AtomicBool::new(false));
        let switch = KillSwitch::Flag(Arc::clone(&flag));
        switch.trigger();
        switch.trigger();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_invalid_group_is_ignored() {
        // Must never signal init or the whole session.
        KillSwitch::ProcessGroup(0).trigger();
        KillSwitch::ProcessGroup(1).trigger();
    }
}
