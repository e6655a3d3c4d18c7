//! Managed process - direct child spawning with stdio capture.
//!
//! Each spawn pipes stdout/stderr into the record's shared log buffer via
//! background reader tasks and reports the exit outcome on a watch channel.
//! The readers never touch the Supervisor's transition path; exit detection
//! flows back through the watch channel only.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::{watch, Mutex};

use super::error::SupervisorError;
use super::log_buffer::LogBuffer;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A child process spawned and owned by the Supervisor.
pub struct ManagedProcess {
    pub pid: u32,
    running_rx: watch::Receiver<bool>,
    exit_rx: watch::Receiver<Option<ExitOutcome>>,
}

impl ManagedProcess {
    /// Spawn `interpreter script_path` with stdout/stderr piped into `logs`.
    ///
    /// Reader tasks append lines to the shared buffer; a waiter task records
    /// the exit outcome and flips the running flag. The returned handle does
    /// not kill the child on drop; termination is signal-driven.
    ///
    /// Cancel-safe for the caller's startup timeout: the only await point is
    /// taken before the child exists, so dropping this future can never
    /// orphan a spawned process.
    pub async fn spawn(
        interpreter: &str,
        script_path: &str,
        logs: Arc<Mutex<LogBuffer>>,
    ) -> Result<Self, SupervisorError> {
        let mut startup_log = logs.lock().await;

        let mut cmd = TokioCommand::new(interpreter);
        cmd.arg(script_path)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(false);

        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::Spawn(format!("'{} {}': {}", interpreter, script_path, e)))?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::Spawn("spawned process has no pid".to_string()))?;

        let (running_tx, running_rx) = watch::channel(true);
        let (exit_tx, exit_rx) = watch::channel::<Option<ExitOutcome>>(None);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        if let Some(stdout) = stdout {
            let buf = logs.clone();
            tokio::spawn(async move {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    buf.lock().await.append(format!("[{}] {}", current_timestamp(), line));
                }
            });
        }

        if let Some(stderr) = stderr {
            let buf = logs.clone();
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    buf.lock()
                        .await
                        .append(format!("[{}] [stderr] {}", current_timestamp(), line));
                }
            });
        }

        // waiter: reaps the child, logs the exit and publishes the outcome
        {
            let buf = logs.clone();
            tokio::spawn(async move {
                let outcome = match child.wait().await {
                    Ok(status) => {
                        let msg = format!("[{}] Process exited with {}", current_timestamp(), status);
                        buf.lock().await.append(msg);
                        ExitOutcome { code: status.code() }
                    }
                    Err(e) => {
                        let msg = format!("[{}] Failed to wait for process: {}", current_timestamp(), e);
                        tracing::error!("{}", msg);
                        buf.lock().await.append(msg);
                        ExitOutcome { code: None }
                    }
                };
                let _ = running_tx.send(false);
                let _ = exit_tx.send(Some(outcome));
            });
        }

        startup_log.append(format!("[{}] Process started (PID {})", current_timestamp(), pid));

        Ok(Self {
            pid,
            running_rx,
            exit_rx,
        })
    }

    /// Whether the child is still alive.
    pub fn is_running(&self) -> bool {
        *self.running_rx.borrow()
    }

    /// Watch channel that flips to `false` when the child exits.
    pub fn running_receiver(&self) -> watch::Receiver<bool> {
        self.running_rx.clone()
    }

    /// Watch channel carrying the exit outcome once the child is reaped.
    pub fn exit_receiver(&self) -> watch::Receiver<Option<ExitOutcome>> {
        self.exit_rx.clone()
    }
}

pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
