use serde::Serialize;
use std::sync::Mutex;

/// Counters accumulated over one optimization run.
pub struct MetricsRecorder {
    inner: Mutex<SweepCounts>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepCounts {
    pub evaluated: usize,
    pub degraded: usize,
    pub readback_mismatches: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SweepCounts::default()),
        }
    }

    pub fn record_evaluated(&self) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.evaluated += 1;
        }
    }

    /// A candidate whose scan could not be scored.
    pub fn record_degraded(&self) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.degraded += 1;
        }
    }

    pub fn record_mismatch(&self) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.readback_mismatches += 1;
        }
    }

    pub fn snapshot(&self) -> SweepCounts {
        self.inner
            .lock()
            .map(|counts| *counts)
            .unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
