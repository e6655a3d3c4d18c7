//! Bounded ring buffer for captured process output.

use std::collections::VecDeque;

/// Default maximum number of log lines kept per process.
/// Can be overridden via `log_buffer_size` in config/global.toml.
pub const DEFAULT_LOG_BUFFER: usize = 1_000;

/// FIFO ring of recent output lines. `append` drops the oldest line once
/// capacity is reached and never blocks the writer.
pub struct LogBuffer {
    lines: VecDeque<String>,
    max_size: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_BUFFER)
    }

    pub fn with_capacity(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            lines: VecDeque::with_capacity(max_size.min(1_024)),
            max_size,
        }
    }

    /// Append one line, evicting the oldest when the buffer is full.
    pub fn append(&mut self, line: String) {
        if self.lines.len() >= self.max_size {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// The most recent `limit` lines in chronological order. Non-destructive.
    pub fn snapshot(&self, limit: usize) -> Vec<String> {
        self.lines.iter().rev().take(limit).rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}
