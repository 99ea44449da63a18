//! Synthesis statistics
//!
//! Tracks run counts and a rolling window of durations behind one mutex. Atomics
//! alone cannot compute accurate averages across samples.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const MAX_SAMPLES: usize = 50;

#[derive(Debug, Clone)]
pub struct SynthStats {
    inner: Arc<Mutex<StatsInner>>,
}

#[derive(Debug)]
struct StatsInner {
    total_runs: u64,
    active_runs: u64,
    failed_runs: u64,
    superseded_runs: u64,
    duration_samples: VecDeque<u64>,
}

impl Default for SynthStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatsInner {
                total_runs: 0,
                active_runs: 0,
                failed_runs: 0,
                superseded_runs: 0,
                duration_samples: VecDeque::with_capacity(MAX_SAMPLES),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn synth_started(&self) {
        let mut inner = self.lock();
        inner.total_runs += 1;
        inner.active_runs += 1;
    }

    pub fn synth_completed(&self, duration: Duration) {
        let mut inner = self.lock();
        inner.active_runs = inner.active_runs.saturating_sub(1);

        let duration_ms = duration.as_millis() as u64;
        if inner.duration_samples.len() >= MAX_SAMPLES {
            inner.duration_samples.pop_front();
        }
        inner.duration_samples.push_back(duration_ms);
    }

    pub fn synth_failed(&self) {
        let mut inner = self.lock();
        inner.active_runs = inner.active_runs.saturating_sub(1);
        inner.failed_runs += 1;
    }

    /// A run finished but a newer generation made its result obsolete.
    pub fn synth_superseded(&self) {
        let mut inner = self.lock();
        inner.active_runs = inner.active_runs.saturating_sub(1);
        inner.superseded_runs += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.lock();
        let avg_duration_ms = if inner.duration_samples.is_empty() {
            0
        } else {
            inner.duration_samples.iter().sum::<u64>() / inner.duration_samples.len() as u64
        };

        StatsSnapshot {
            total_runs: inner.total_runs,
            active_runs: inner.active_runs,
            failed_runs: inner.failed_runs,
            superseded_runs: inner.superseded_runs,
            average_duration_ms: avg_duration_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_runs: u64,
    pub active_runs: u64,
    pub failed_runs: u64,
    pub superseded_runs: u64,
    pub average_duration_ms: u64,
}
