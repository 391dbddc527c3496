use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use artifex_utils::bytes::{format_bytes, format_rate};

use crate::observer::ChunkObserver;

/// Receives a snapshot after every chunk written to disk.
pub type ProgressCallback = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// A point-in-time view of one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub name: String,
    /// Human-readable bytes written so far, e.g. `1.5 MiB`.
    pub downloaded: String,
    /// Human-readable total, `None` when the server did not say.
    pub total: Option<String>,
    /// Overall completion in `[0, 1]` across the whole batch.
    pub fraction: Option<f64>,
    pub rate: String,
    pub eta: Option<Duration>,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// 1-based position of this file in its batch.
    pub file_index: usize,
    pub file_count: usize,
}

/// Tracks bytes written for a single file and turns them into [`ProgressUpdate`]s.
pub struct ProgressReporter {
    name: String,
    total: Option<u64>,
    downloaded: u64,
    file_index: usize,
    file_count: usize,
    started: Instant,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    /// A reporter for a single-file batch. A `total` of zero is treated as unknown.
    pub fn new(name: impl Into<String>, total: Option<u64>) -> Self {
        Self {
            name: name.into(),
            total: total.filter(|&t| t > 0),
            downloaded: 0,
            file_index: 1,
            file_count: 1,
            started: Instant::now(),
            callback: None,
        }
    }

    /// Places this file at `index` (1-based) of `count` files.
    pub fn batch(mut self, index: usize, count: usize) -> Self {
        self.file_count = count.max(1);
        self.file_index = index.clamp(1, self.file_count);
        self
    }

    pub fn callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub fn snapshot(&self) -> ProgressUpdate {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.downloaded as f64 / elapsed
        } else {
            0.0
        };

        let eta = match self.total {
            Some(total) if rate > 0.0 => {
                let remaining = total.saturating_sub(self.downloaded) as f64;
                Some(Duration::from_secs_f64(remaining / rate))
            }
            _ => None,
        };

        ProgressUpdate {
            name: self.name.clone(),
            downloaded: format_bytes(self.downloaded, 1),
            total: self.total.map(|t| format_bytes(t, 1)),
            fraction: self.fraction(),
            rate: format_rate(rate),
            eta,
            downloaded_bytes: self.downloaded,
            total_bytes: self.total,
            file_index: self.file_index,
            file_count: self.file_count,
        }
    }

    /// `(index - 1 + downloaded / total) / count`, capped at 1.
    fn fraction(&self) -> Option<f64> {
        let total = self.total?;
        let file = (self.downloaded as f64 / total as f64).min(1.0);
        let overall = ((self.file_index - 1) as f64 + file) / self.file_count as f64;
        Some(overall.min(1.0))
    }
}

impl ChunkObserver for ProgressReporter {
    fn observe(&mut self, chunk: &[u8]) {
        self.downloaded += chunk.len() as u64;
        if let Some(callback) = &self.callback {
            callback(&self.snapshot());
        }
    }
}
