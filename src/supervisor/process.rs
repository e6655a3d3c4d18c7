//! Cross-platform process termination helpers.
//!
//! Only the Supervisor spawns or kills OS processes; these helpers are the
//! single place that touches signals.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to terminate process {pid}: {reason}")]
    TerminationFailed { pid: u32, reason: String },
}

/// Send a termination request to `pid`. With `force = false` this is the
/// graceful signal (SIGTERM); with `force = true` the process is killed
/// outright (SIGKILL / TerminateProcess).
pub fn terminate(pid: u32, force: bool) -> Result<(), ProcessError> {
    let signal_name = if force { "KILL" } else { "TERM" };
    tracing::debug!("sending {} to pid {}", signal_name, pid);

    #[cfg(target_os = "windows")]
    {
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
        use winapi::um::winnt::PROCESS_TERMINATE;

        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
            if handle.is_null() {
                return Err(ProcessError::TerminationFailed {
                    pid,
                    reason: "failed to open process handle".to_string(),
                });
            }

            let result = TerminateProcess(handle, 1);
            CloseHandle(handle);

            if result == 0 {
                return Err(ProcessError::TerminationFailed {
                    pid,
                    reason: "TerminateProcess failed".to_string(),
                });
            }
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), signal) {
            return Err(ProcessError::TerminationFailed {
                pid,
                reason: format!("failed to send signal: {}", e),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_unknown_pid_fails() {
        // far above any real pid on both platforms
        let result = terminate(999_999_999, false);
        assert!(result.is_err());
    }
}
