use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by the capture thread and the tick.
#[derive(Debug, Default)]
pub struct PipelineDiagnostics {
    pub chunks_captured: AtomicU64,
    pub ticks: AtomicU64,
    pub empty_ticks: AtomicU64,
    pub frames_rendered: AtomicU64,
    /// Chunks drained in a tick but superseded by a newer one.
    pub chunks_skipped: AtomicU64,
    pub malformed_chunks: AtomicU64,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.chunks_captured.store(0, Ordering::Relaxed);
        self.ticks.store(0, Ordering::Relaxed);
        self.empty_ticks.store(0, Ordering::Relaxed);
        self.frames_rendered.store(0, Ordering::Relaxed);
        self.chunks_skipped.store(0, Ordering::Relaxed);
        self.malformed_chunks.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_captured: self.chunks_captured.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            empty_ticks: self.empty_ticks.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
            malformed_chunks: self.malformed_chunks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub chunks_captured: u64,
    pub ticks: u64,
    pub empty_ticks: u64,
    pub frames_rendered: u64,
    pub chunks_skipped: u64,
    pub malformed_chunks: u64,
}
