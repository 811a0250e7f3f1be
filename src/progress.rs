//! Batch-wide progress accounting.
//!
//! [`ProgressAggregator`] owns the only mutable state shared between workers.
//! Every completed job goes through [`ProgressAggregator::record`], which
//! updates the totals under one lock and hands back an immutable
//! [`BatchSnapshot`] that can be sent anywhere.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::job::JobResult;

#[derive(Clone, Debug)]
struct BatchState {
    total_jobs: usize,
    completed_jobs: usize,
    total_input_bytes: u64,
    processed_bytes: u64,
    total_output_bytes: u64,
    started_at: Instant,
}

/// Point-in-time copy of the batch totals.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchSnapshot {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub total_input_bytes: u64,
    pub processed_bytes: u64,
    pub total_output_bytes: u64,
    pub elapsed: Duration,
    pub fraction_done: f64,
    /// Input bytes consumed per second since the batch started.
    pub throughput: f64,
    /// `None` while throughput is still zero.
    pub eta: Option<Duration>,
}

pub struct ProgressAggregator {
    state: Mutex<BatchState>,
}

impl ProgressAggregator {
    pub fn new(total_jobs: usize, total_input_bytes: u64) -> Self {
        ProgressAggregator::started_at(total_jobs, total_input_bytes, Instant::now())
    }

    pub fn started_at(total_jobs: usize, total_input_bytes: u64, started_at: Instant) -> Self {
        ProgressAggregator {
            state: Mutex::new(BatchState {
                total_jobs,
                completed_jobs: 0,
                total_input_bytes,
                processed_bytes: 0,
                total_output_bytes: 0,
                started_at,
            }),
        }
    }

    pub fn record(&self, result: &JobResult) -> BatchSnapshot {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(state.completed_jobs < state.total_jobs, "more results than jobs");
        state.completed_jobs = usize::min(state.completed_jobs + 1, state.total_jobs);
        state.processed_bytes += result.input_bytes;
        if result.is_success() {
            state.total_output_bytes += result.output_bytes;
        }
        if state.processed_bytes > state.total_input_bytes {
            // the source grew between enqueue and encode
            debug!(
                processed = state.processed_bytes,
                total = state.total_input_bytes,
                "input larger than measured at enqueue time");
            state.total_input_bytes = state.processed_bytes;
        }
        snapshot_of(&state, Instant::now())
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        snapshot_of(&state, Instant::now())
    }
}

fn snapshot_of(state: &BatchState, now: Instant) -> BatchSnapshot {
    let elapsed = now.saturating_duration_since(state.started_at);
    let throughput = throughput(state.processed_bytes, elapsed);
    BatchSnapshot {
        total_jobs: state.total_jobs,
        completed_jobs: state.completed_jobs,
        total_input_bytes: state.total_input_bytes,
        processed_bytes: state.processed_bytes,
        total_output_bytes: state.total_output_bytes,
        elapsed,
        fraction_done: match state.total_jobs {
            0 => 1.0,
            total => state.completed_jobs as f64 / total as f64,
        },
        throughput,
        eta: estimate_remaining(state.total_input_bytes.saturating_sub(state.processed_bytes), throughput),
    }
}

fn throughput(processed_bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        processed_bytes as f64 / secs
    } else {
        0.0
    }
}

/// Time left at the given rate; unknown when nothing has been processed yet.
pub fn estimate_remaining(remaining_bytes: u64, throughput: f64) -> Option<Duration> {
    if throughput.is_finite() && throughput > 0.0 {
        Duration::try_from_secs_f64(remaining_bytes as f64 / throughput).ok()
    } else {
        None
    }
}
