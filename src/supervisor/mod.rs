//! Process supervision core.
//!
//! The Supervisor owns the table of managed processes and is the only
//! component that spawns or kills OS processes. Transitions for a single
//! process are serialized behind that record's lock; different processes
//! proceed independently. Every committed transition publishes a fresh
//! snapshot list to the status broadcaster.

pub mod error;
pub mod log_buffer;
pub mod managed_process;
pub mod process;
pub mod record;
pub mod state_machine;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use uuid::Uuid;

use crate::broadcaster::StatusBroadcaster;
use error::SupervisorError;
use log_buffer::LogBuffer;
use managed_process::{current_timestamp, ExitOutcome, ManagedProcess};
use record::{ProcessRecord, ProcessSnapshot, ProcessStatus};

/// Tunables for spawn, stop and auto-restart behavior. Loaded from
/// `config/global.toml` by the config module; defaults documented there.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Interpreter used to run scripts (`python3` in production; tests
    /// point it at `/bin/sh`).
    pub interpreter: String,
    pub log_buffer_size: usize,
    /// Bounded window for declaring spawn failure.
    pub startup_timeout: Duration,
    /// Grace period between the termination signal and the forceful kill.
    pub stop_grace: Duration,
    /// Pause before an automatic re-spawn.
    pub restart_backoff: Duration,
    /// Crash-loop cap: at most this many automatic re-spawns...
    pub max_restarts: u32,
    /// ...within this window; beyond it the record settles into `error`
    /// until a manual restart.
    pub restart_window: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            log_buffer_size: log_buffer::DEFAULT_LOG_BUFFER,
            startup_timeout: Duration::from_secs(10),
            stop_grace: Duration::from_secs(5),
            restart_backoff: Duration::from_secs(5),
            max_restarts: 5,
            restart_window: Duration::from_secs(60),
        }
    }
}

/// Per-record transition state. Guarded by `ProcessEntry::state`; at most
/// one transition is in flight per id at a time.
struct EntryState {
    record: ProcessRecord,
    managed: Option<ManagedProcess>,
    /// Bumped on every spawn and on every requested stop. Exit events carry
    /// the generation of their spawn; a mismatch marks the event stale
    /// (a stop or restart already consumed that child).
    generation: u64,
    /// Timestamps of recent automatic re-spawns, pruned to the window.
    restart_marks: VecDeque<Instant>,
}

/// One managed process: serialized transition state, the shared log buffer
/// the output readers append into, and a cached snapshot refreshed on every
/// committed transition so list/publish never wait behind a slow stop.
struct ProcessEntry {
    state: Mutex<EntryState>,
    logs: Arc<Mutex<LogBuffer>>,
    snapshot: std::sync::Mutex<ProcessSnapshot>,
}

impl ProcessEntry {
    fn cached_snapshot(&self) -> ProcessSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Commit the record's current shape to the snapshot cache. Called
    /// while the state lock is held, so per-process snapshots are ordered.
    fn refresh_snapshot(&self, record: &ProcessRecord) {
        let mut cached = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cached = record.snapshot();
    }
}

pub struct Supervisor {
    settings: SupervisorSettings,
    entries: RwLock<HashMap<String, Arc<ProcessEntry>>>,
    broadcaster: StatusBroadcaster,
    /// Serializes snapshot-list reads with their sends. Without it two
    /// publishers could read in one order and send in the other, leaving a
    /// stale list as the latest value in the watch channel.
    publish_lock: Mutex<()>,
    /// Handle for the monitor and backoff tasks; fails to upgrade only
    /// while the daemon is tearing down.
    weak_self: Weak<Supervisor>,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            settings,
            entries: RwLock::new(HashMap::new()),
            broadcaster: StatusBroadcaster::new(),
            publish_lock: Mutex::new(()),
            weak_self: weak.clone(),
        })
    }

    pub fn broadcaster(&self) -> &StatusBroadcaster {
        &self.broadcaster
    }

    /// Create a record and start its process.
    ///
    /// Validation failures leave the table unchanged; a spawn failure leaves
    /// the new record in `error` with the reason in its log.
    pub async fn start(
        &self,
        name: &str,
        script_path: &str,
        auto_restart: bool,
    ) -> Result<ProcessSnapshot, SupervisorError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SupervisorError::Validation(
                "process name must not be empty".to_string(),
            ));
        }
        if !crate::scripts::ScriptStore::exists(script_path) {
            return Err(SupervisorError::Validation(format!(
                "script '{}' does not exist",
                script_path
            )));
        }

        let id = Uuid::new_v4().to_string();
        let record = ProcessRecord::new(id.clone(), name.to_string(), script_path.to_string(), auto_restart);
        let entry = Arc::new(ProcessEntry {
            snapshot: std::sync::Mutex::new(record.snapshot()),
            state: Mutex::new(EntryState {
                record,
                managed: None,
                generation: 0,
                restart_marks: VecDeque::new(),
            }),
            logs: Arc::new(Mutex::new(LogBuffer::with_capacity(self.settings.log_buffer_size))),
        });
        self.entries.write().await.insert(id.clone(), entry.clone());
        tracing::info!("created process '{}' (id: {})", name, id);

        let result = {
            let mut state = entry.state.lock().await;
            let spawned = self.spawn_locked(&entry, &mut state).await;
            spawned.map(|_| state.record.snapshot())
        };
        self.publish().await;
        result
    }

    /// Stop a process. No-op if already stopped; otherwise graceful signal,
    /// bounded grace period, forceful kill.
    pub async fn stop(&self, id: &str) -> Result<ProcessSnapshot, SupervisorError> {
        let entry = self.entry(id).await?;
        let snapshot = {
            let mut state = entry.state.lock().await;
            if state.record.status == ProcessStatus::Stopped {
                return Ok(state.record.snapshot());
            }
            self.stop_locked(&entry, &mut state).await;
            state.record.snapshot()
        };
        self.publish().await;
        Ok(snapshot)
    }

    /// Stop (if live) and re-spawn with the same name/script/policy.
    /// Increments `restart_count` and lifts any crash-loop suspension.
    pub async fn restart(&self, id: &str) -> Result<ProcessSnapshot, SupervisorError> {
        let entry = self.entry(id).await?;
        let result = {
            let mut state = entry.state.lock().await;
            if state.record.status != ProcessStatus::Stopped {
                self.stop_locked(&entry, &mut state).await;
            }
            if let Err(e) = state_machine::transition(&mut state.record, ProcessStatus::Starting) {
                return Err(SupervisorError::Internal(e.into()));
            }
            state.record.restart_count += 1;
            state.restart_marks.clear();
            entry
                .logs
                .lock()
                .await
                .append(format!("[{}] Manual restart requested", current_timestamp()));
            let spawned = self.spawn_locked(&entry, &mut state).await;
            spawned.map(|_| state.record.snapshot())
        };
        self.publish().await;
        result
    }

    /// Force-stop any live child and remove the record and its log buffer.
    pub async fn delete(&self, id: &str) -> Result<(), SupervisorError> {
        let entry = self.entry(id).await?;
        {
            let mut state = entry.state.lock().await;
            if state.record.status != ProcessStatus::Stopped {
                self.stop_locked(&entry, &mut state).await;
            }
            // invalidate any pending backoff re-spawn
            state.generation += 1;
        }
        self.entries.write().await.remove(id);
        tracing::info!("deleted process {}", id);
        self.publish().await;
        Ok(())
    }

    /// Most recent `limit` log lines, oldest first. Read-only; safe to call
    /// concurrently with output capture.
    pub async fn get_logs(&self, id: &str, limit: usize) -> Result<Vec<String>, SupervisorError> {
        let entry = self.entry(id).await?;
        let logs = entry.logs.lock().await;
        Ok(logs.snapshot(limit))
    }

    pub async fn get(&self, id: &str) -> Result<ProcessSnapshot, SupervisorError> {
        let entry = self.entry(id).await?;
        Ok(entry.cached_snapshot())
    }

    /// Snapshots of all records, in a stable order.
    pub async fn list(&self) -> Vec<ProcessSnapshot> {
        let entries = self.entries.read().await;
        let mut snapshots: Vec<ProcessSnapshot> =
            entries.values().map(|e| e.cached_snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        snapshots
    }

    /// Shutdown sweep: stop every live child.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.entries.read().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.stop(&id).await {
                tracing::warn!("failed to stop {} during shutdown: {}", id, e);
            }
        }
    }

    async fn entry(&self, id: &str) -> Result<Arc<ProcessEntry>, SupervisorError> {
        self.entries
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))
    }

    /// Read the current snapshot list and send it, atomically with respect
    /// to other publishers. The list read under the lock reflects every
    /// transition committed before any earlier send, so the latest watch
    /// value never regresses.
    async fn publish(&self) {
        let _ordering = self.publish_lock.lock().await;
        self.broadcaster.publish(self.list().await);
    }

    /// Spawn the record's script and register exit monitoring. Caller holds
    /// the state lock and has the record in `starting`.
    fn spawn_locked<'a>(
        &'a self,
        entry: &'a Arc<ProcessEntry>,
        state: &'a mut EntryState,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<(), SupervisorError>> + Send + 'a>,
    > {
        Box::pin(async move {
        let spawn = ManagedProcess::spawn(
            &self.settings.interpreter,
            &state.record.script_path,
            entry.logs.clone(),
        );
        let spawned = match timeout(self.settings.startup_timeout, spawn).await {
            Ok(result) => result,
            Err(_) => Err(SupervisorError::Spawn(format!(
                "spawn timed out after {:?}",
                self.settings.startup_timeout
            ))),
        };

        match spawned {
            Ok(proc) => {
                state.generation += 1;
                let generation = state.generation;
                state.record.pid = Some(proc.pid);
                state.record.start_time = Some(current_timestamp());
                state_machine::transition(&mut state.record, ProcessStatus::Running)
                    .map_err(|e| SupervisorError::Internal(e.into()))?;
                tracing::info!(
                    "process '{}' running (id: {}, pid: {})",
                    state.record.name,
                    state.record.id,
                    proc.pid
                );

                let mut exit_rx = proc.exit_receiver();
                state.managed = Some(proc);
                entry.refresh_snapshot(&state.record);

                if let Some(supervisor) = self.weak_self.upgrade() {
                    let id = state.record.id.clone();
                    tokio::spawn(async move {
                        loop {
                            let outcome = *exit_rx.borrow_and_update();
                            if let Some(outcome) = outcome {
                                supervisor.handle_exit(&id, generation, outcome).await;
                                break;
                            }
                            if exit_rx.changed().await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                entry
                    .logs
                    .lock()
                    .await
                    .append(format!("[{}] Failed to start: {}", current_timestamp(), reason));
                tracing::error!("failed to start process {}: {}", state.record.id, reason);
                state.record.pid = None;
                state.record.start_time = None;
                let _ = state_machine::transition(&mut state.record, ProcessStatus::Error);
                entry.refresh_snapshot(&state.record);
                Err(SupervisorError::Spawn(reason))
            }
        }
        })
    }

    /// Terminate the live child, escalating after the grace period. Caller
    /// holds the state lock.
    async fn stop_locked(&self, entry: &Arc<ProcessEntry>, state: &mut EntryState) {
        // exit events from this child are now ours, not the monitor's
        state.generation += 1;

        if let Some(proc) = state.managed.take() {
            if proc.is_running() {
                if let Err(e) = process::terminate(proc.pid, false) {
                    tracing::warn!("graceful termination of pid {} failed: {}", proc.pid, e);
                }
                let mut running_rx = proc.running_receiver();
                let waited = timeout(self.settings.stop_grace, async {
                    while *running_rx.borrow_and_update() {
                        if running_rx.changed().await.is_err() {
                            break;
                        }
                    }
                })
                .await;
                if waited.is_err() {
                    tracing::warn!(
                        "pid {} did not exit within {:?}, killing",
                        proc.pid,
                        self.settings.stop_grace
                    );
                    let _ = process::terminate(proc.pid, true);
                }
            }
            entry
                .logs
                .lock()
                .await
                .append(format!("[{}] Process stopped by request", current_timestamp()));
        }

        state.record.pid = None;
        state.record.start_time = None;
        if let Err(e) = state_machine::transition(&mut state.record, ProcessStatus::Stopped) {
            tracing::error!("stop transition rejected for {}: {}", state.record.id, e);
        }
        entry.refresh_snapshot(&state.record);
        tracing::info!("process {} stopped", state.record.id);
    }

    /// React to an unrequested child exit reported by the monitor task.
    ///
    /// Stale generations are discarded: a stop/restart/delete already owned
    /// that child. Failures here are isolated to this record.
    async fn handle_exit(&self, id: &str, generation: u64, outcome: ExitOutcome) {
        let entry = match self.entries.read().await.get(id).cloned() {
            Some(entry) => entry,
            None => return, // deleted while exiting
        };

        let respawn_generation = {
            let mut state = entry.state.lock().await;
            if state.generation != generation {
                return;
            }
            state.managed = None;
            state.record.pid = None;
            state.record.start_time = None;

            if state.record.auto_restart {
                let now = Instant::now();
                state.restart_marks.push_back(now);
                while let Some(&front) = state.restart_marks.front() {
                    if now.duration_since(front) > self.settings.restart_window {
                        state.restart_marks.pop_front();
                    } else {
                        break;
                    }
                }

                if state.restart_marks.len() as u32 > self.settings.max_restarts {
                    entry.logs.lock().await.append(format!(
                        "[{}] Restart limit reached ({} within {:?}), giving up",
                        current_timestamp(),
                        self.settings.max_restarts,
                        self.settings.restart_window
                    ));
                    tracing::warn!(
                        "process {} hit the crash-loop cap, auto-restart suspended",
                        id
                    );
                    let _ = state_machine::transition(&mut state.record, ProcessStatus::Error);
                    entry.refresh_snapshot(&state.record);
                    None
                } else {
                    let _ = state_machine::transition(&mut state.record, ProcessStatus::Starting);
                    state.record.restart_count += 1;
                    state.generation += 1;
                    entry.logs.lock().await.append(format!(
                        "[{}] Process exited (code: {:?}), restarting in {:?} (attempt {})",
                        current_timestamp(),
                        outcome.code,
                        self.settings.restart_backoff,
                        state.record.restart_count
                    ));
                    entry.refresh_snapshot(&state.record);
                    Some(state.generation)
                }
            } else {
                let next = if outcome.success() {
                    ProcessStatus::Stopped
                } else {
                    ProcessStatus::Error
                };
                tracing::info!("process {} exited on its own (code: {:?})", id, outcome.code);
                let _ = state_machine::transition(&mut state.record, next);
                entry.refresh_snapshot(&state.record);
                None
            }
        };
        self.publish().await;

        if let Some(expected_generation) = respawn_generation {
            let Some(supervisor) = self.weak_self.upgrade() else {
                return;
            };
            let entry = entry.clone();
            let id = id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(supervisor.settings.restart_backoff).await;
                if supervisor.entries.read().await.get(&id).is_none() {
                    return; // deleted during backoff
                }
                let result = {
                    let mut state = entry.state.lock().await;
                    // a stop, restart or delete intervened during the backoff
                    if state.generation != expected_generation
                        || state.record.status != ProcessStatus::Starting
                    {
                        return;
                    }
                    supervisor.spawn_locked(&entry, &mut state).await
                };
                if let Err(e) = result {
                    tracing::error!("auto-restart of {} failed: {}", id, e);
                }
                supervisor.publish().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn test_settings() -> SupervisorSettings {
        SupervisorSettings {
            interpreter: "/bin/sh".to_string(),
            log_buffer_size: 200,
            startup_timeout: Duration::from_secs(5),
            stop_grace: Duration::from_secs(2),
            restart_backoff: Duration::from_millis(50),
            max_restarts: 2,
            restart_window: Duration::from_secs(60),
        }
    }

    fn write_script(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{}", body).unwrap();
        path
    }

    async fn wait_for_status(
        supervisor: &Arc<Supervisor>,
        id: &str,
        status: ProcessStatus,
    ) -> ProcessSnapshot {
        for _ in 0..100 {
            if let Ok(snap) = supervisor.get(id).await {
                if snap.status == status {
                    return snap;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("process {} never reached {:?}", id, status);
    }

    #[tokio::test]
    async fn start_rejects_empty_name() {
        let supervisor = Supervisor::new(test_settings());
        let result = supervisor.start("  ", "whatever.py", false).await;
        assert!(matches!(result, Err(SupervisorError::Validation(_))));
        assert!(supervisor.list().await.is_empty());
    }

    #[tokio::test]
    async fn start_rejects_missing_script() {
        let supervisor = Supervisor::new(test_settings());
        let result = supervisor.start("bot2", "/nonexistent/bot2.py", false).await;
        assert!(matches!(result, Err(SupervisorError::Validation(_))));
        // no record was created
        assert!(supervisor.list().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let supervisor = Supervisor::new(test_settings());
        assert!(matches!(
            supervisor.stop("ghost").await,
            Err(SupervisorError::NotFound(_))
        ));
        assert!(matches!(
            supervisor.restart("ghost").await,
            Err(SupervisorError::NotFound(_))
        ));
        assert!(matches!(
            supervisor.get_logs("ghost", 10).await,
            Err(SupervisorError::NotFound(_))
        ));
        assert!(matches!(
            supervisor.delete("ghost").await,
            Err(SupervisorError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_stop_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "long.py", "sleep 30");
        let supervisor = Supervisor::new(test_settings());

        let snap = supervisor
            .start("long", script.to_str().unwrap(), false)
            .await
            .unwrap();
        assert_eq!(snap.status, ProcessStatus::Running);
        assert!(snap.pid.is_some());
        assert!(snap.start_time.is_some());

        let stopped = supervisor.stop(&snap.id).await.unwrap();
        assert_eq!(stopped.status, ProcessStatus::Stopped);
        assert!(stopped.pid.is_none());
        assert!(stopped.start_time.is_none());
        assert_eq!(stopped.restart_count, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_on_stopped_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "quick.py", "sleep 30");
        let supervisor = Supervisor::new(test_settings());

        let snap = supervisor
            .start("quick", script.to_str().unwrap(), false)
            .await
            .unwrap();
        let first = supervisor.stop(&snap.id).await.unwrap();
        let second = supervisor.stop(&snap.id).await.unwrap();
        assert_eq!(second.status, ProcessStatus::Stopped);
        assert_eq!(second.restart_count, first.restart_count);
        assert_eq!(second.start_time, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn concurrent_stops_both_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "race.py", "sleep 30");
        let supervisor = Supervisor::new(test_settings());

        let snap = supervisor
            .start("race", script.to_str().unwrap(), false)
            .await
            .unwrap();

        let (a, b) = tokio::join!(supervisor.stop(&snap.id), supervisor.stop(&snap.id));
        assert!(a.is_ok());
        assert!(b.is_ok());
        let final_snap = supervisor.get(&snap.id).await.unwrap();
        assert_eq!(final_snap.status, ProcessStatus::Stopped);
        assert!(final_snap.pid.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restart_increments_count() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "cycle.py", "sleep 30");
        let supervisor = Supervisor::new(test_settings());

        let snap = supervisor
            .start("cycle", script.to_str().unwrap(), false)
            .await
            .unwrap();
        assert_eq!(snap.restart_count, 0);

        let restarted = supervisor.restart(&snap.id).await.unwrap();
        assert_eq!(restarted.restart_count, 1);
        assert_eq!(restarted.status, ProcessStatus::Running);
        assert_ne!(restarted.pid, snap.pid);

        supervisor.stop(&snap.id).await.unwrap();
        let again = supervisor.restart(&snap.id).await.unwrap();
        assert_eq!(again.restart_count, 2);
        supervisor.stop(&snap.id).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn delete_removes_record_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "gone.py", "sleep 30");
        let supervisor = Supervisor::new(test_settings());

        let snap = supervisor
            .start("gone", script.to_str().unwrap(), false)
            .await
            .unwrap();
        supervisor.delete(&snap.id).await.unwrap();

        assert!(matches!(
            supervisor.stop(&snap.id).await,
            Err(SupervisorError::NotFound(_))
        ));
        assert!(matches!(
            supervisor.get_logs(&snap.id, 10).await,
            Err(SupervisorError::NotFound(_))
        ));
        assert!(supervisor.list().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "talky.py", "echo alpha\necho beta\nsleep 30");
        let supervisor = Supervisor::new(test_settings());

        let snap = supervisor
            .start("talky", script.to_str().unwrap(), false)
            .await
            .unwrap();

        let mut captured = Vec::new();
        for _ in 0..50 {
            captured = supervisor.get_logs(&snap.id, 100).await.unwrap();
            if captured.iter().any(|l| l.contains("beta")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(captured.iter().any(|l| l.contains("alpha")));
        assert!(captured.iter().any(|l| l.contains("beta")));

        supervisor.stop(&snap.id).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_exit_without_auto_restart_stops() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "oneshot.py", "exit 0");
        let supervisor = Supervisor::new(test_settings());

        let snap = supervisor
            .start("oneshot", script.to_str().unwrap(), false)
            .await
            .unwrap();
        let final_snap = wait_for_status(&supervisor, &snap.id, ProcessStatus::Stopped).await;
        assert_eq!(final_snap.restart_count, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_exit_without_auto_restart_errors() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "broken.py", "exit 1");
        let supervisor = Supervisor::new(test_settings());

        let snap = supervisor
            .start("broken", script.to_str().unwrap(), false)
            .await
            .unwrap();
        wait_for_status(&supervisor, &snap.id, ProcessStatus::Error).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn crash_loop_settles_into_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "crashy.py", "exit 1");
        let supervisor = Supervisor::new(test_settings());

        let snap = supervisor
            .start("crashy", script.to_str().unwrap(), true)
            .await
            .unwrap();

        // max_restarts = 2: two automatic re-spawns, then error
        let final_snap = wait_for_status(&supervisor, &snap.id, ProcessStatus::Error).await;
        assert_eq!(final_snap.restart_count, 2);

        // auto-restart stays suspended; status remains error
        tokio::time::sleep(Duration::from_millis(300)).await;
        let still = supervisor.get(&snap.id).await.unwrap();
        assert_eq!(still.status, ProcessStatus::Error);
        assert_eq!(still.restart_count, 2);

        let logs = supervisor.get_logs(&snap.id, 100).await.unwrap();
        assert!(logs.iter().any(|l| l.contains("Restart limit reached")));

        // a manual restart lifts the suspension and spawns again
        let restarted = supervisor.restart(&snap.id).await.unwrap();
        assert_eq!(restarted.restart_count, 3);
        assert_eq!(restarted.status, ProcessStatus::Running);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn auto_restart_increments_count() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "flaky.py", "exit 1");
        let mut settings = test_settings();
        settings.max_restarts = 1;
        let supervisor = Supervisor::new(settings);

        let snap = supervisor
            .start("flaky", script.to_str().unwrap(), true)
            .await
            .unwrap();
        let final_snap = wait_for_status(&supervisor, &snap.id, ProcessStatus::Error).await;
        assert_eq!(final_snap.restart_count, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn transitions_are_pushed_to_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "watched.py", "sleep 30");
        let supervisor = Supervisor::new(test_settings());
        let mut rx = supervisor.broadcaster().subscribe();
        assert!(rx.borrow_and_update().is_empty());

        let snap = supervisor
            .start("watched", script.to_str().unwrap(), false)
            .await
            .unwrap();

        rx.changed().await.unwrap();
        let update = rx.borrow_and_update().clone();
        assert_eq!(update.len(), 1);
        assert_eq!(update[0].id, snap.id);
        assert_eq!(update[0].status, ProcessStatus::Running);

        supervisor.stop(&snap.id).await.unwrap();
        rx.changed().await.unwrap();
        let update = rx.borrow_and_update().clone();
        assert_eq!(update[0].status, ProcessStatus::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn latest_broadcast_reflects_all_committed_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "churn.py", "sleep 30");
        let supervisor = Supervisor::new(test_settings());

        let mut ids = Vec::new();
        for i in 0..4 {
            let snap = supervisor
                .start(&format!("churn-{}", i), script.to_str().unwrap(), false)
                .await
                .unwrap();
            ids.push(snap.id);
        }

        // interleave restart/stop cycles across processes so publishes race
        let mut handles = Vec::new();
        for id in &ids {
            let supervisor = supervisor.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..3 {
                    supervisor.restart(&id).await.unwrap();
                    supervisor.stop(&id).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // the last published list must match the table, not an older read
        let table: HashMap<String, ProcessStatus> = supervisor
            .list()
            .await
            .into_iter()
            .map(|s| (s.id, s.status))
            .collect();
        let published = supervisor.broadcaster().latest();
        assert_eq!(published.len(), table.len());
        for snap in published {
            assert_eq!(snap.status, ProcessStatus::Stopped);
            assert_eq!(snap.status, table[&snap.id]);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failures_are_isolated_per_process() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_script(&dir, "good.py", "sleep 30");
        let bad = write_script(&dir, "bad.py", "exit 1");
        let supervisor = Supervisor::new(test_settings());

        let good_snap = supervisor
            .start("good", good.to_str().unwrap(), false)
            .await
            .unwrap();
        let bad_snap = supervisor
            .start("bad", bad.to_str().unwrap(), false)
            .await
            .unwrap();

        wait_for_status(&supervisor, &bad_snap.id, ProcessStatus::Error).await;
        let good_now = supervisor.get(&good_snap.id).await.unwrap();
        assert_eq!(good_now.status, ProcessStatus::Running);

        supervisor.stop(&good_snap.id).await.unwrap();
    }
}
