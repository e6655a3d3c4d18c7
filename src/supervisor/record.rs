//! Record types for one managed process.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a managed process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

/// State of one managed process. Owned exclusively by the Supervisor;
/// all mutation goes through Supervisor operations.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    /// Opaque unique identifier, assigned at creation, immutable.
    pub id: String,
    /// User-supplied label, non-empty.
    pub name: String,
    /// Path of the uploaded script to run.
    pub script_path: String,
    pub status: ProcessStatus,
    /// OS process id, present only while the child is alive.
    pub pid: Option<u32>,
    /// Unix timestamp of the last successful spawn; cleared on stop.
    pub start_time: Option<u64>,
    /// Re-spawn automatically after an unrequested exit.
    pub auto_restart: bool,
    /// Incremented once per completed restart, manual or automatic.
    /// Never decreases; survives every transition except delete.
    pub restart_count: u32,
}

impl ProcessRecord {
    pub fn new(id: String, name: String, script_path: String, auto_restart: bool) -> Self {
        Self {
            id,
            name,
            script_path,
            status: ProcessStatus::Starting,
            pid: None,
            start_time: None,
            auto_restart,
            restart_count: 0,
        }
    }

    /// Serializable point-in-time view of the public fields. Log lines are
    /// excluded from the snapshot payload.
    pub fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            script_path: self.script_path.clone(),
            status: self.status,
            pid: self.pid,
            start_time: self.start_time,
            auto_restart: self.auto_restart,
            restart_count: self.restart_count,
        }
    }
}

/// What viewers see: one entry per managed process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub id: String,
    pub name: String,
    pub script_path: String,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub start_time: Option<u64>,
    pub auto_restart: bool,
    pub restart_count: u32,
}
