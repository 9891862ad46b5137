//! Process liveness checks for session producers.

/// Answers whether the process that owns a session is still running.
///
/// Abstracted so discovery and cleanup can be tested without real pids.
pub trait LivenessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

impl<F> LivenessProbe for F
where
    F: Fn(u32) -> bool + Send + Sync,
{
    fn is_alive(&self, pid: u32) -> bool {
        self(pid)
    }
}

/// Probes the operating system with a null signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessProbe;

impl LivenessProbe for ProcessProbe {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }

        match kill(Pid::from_raw(raw), None::<Signal>) {
            // EPERM: the process exists but belongs to someone else.
            Ok(()) | Err(Errno::EPERM) => true,
            Err(err) => {
                tracing::trace!(pid, error = %err, "Liveness probe failed");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_probe() {
        let probe = |pid: u32| pid == 7;
        assert!(probe.is_alive(7));
        assert!(!probe.is_alive(8));
    }

    #[cfg(unix)]
    #[test]
    fn test_own_process_is_alive() {
        assert!(ProcessProbe.is_alive(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_invalid_pids_are_dead() {
        assert!(!ProcessProbe.is_alive(0));
        assert!(!ProcessProbe.is_alive(u32::MAX));
    }
}
