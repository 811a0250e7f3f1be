use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::error::RunnerError;
use crate::job::JobResult;
use crate::progress::BatchSnapshot;

/// Observer of a running batch.
///
/// The runner never calls a sink from two threads at once, so implementations
/// take `&mut self` and need no locking of their own. Calls happen on worker
/// threads, so a sink should hand work off rather than block.
pub trait EventSink: Send {
    fn on_queued(&mut self, total_jobs: usize, total_input_bytes: u64);

    fn on_progress(&mut self, result: &JobResult, snapshot: &BatchSnapshot);

    fn on_batch_complete(&mut self, summary: &BatchSummary);
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Input minus output bytes over successful jobs; negative if outputs grew.
    pub total_saved_bytes: i64,
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs never started because the batch was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    pub fn new(results: Vec<JobResult>, skipped: usize, cancelled: bool, elapsed: Duration) -> Self {
        let saved: i128 = results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| i128::from(r.input_bytes) - i128::from(r.output_bytes))
            .sum();
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        BatchSummary {
            total_saved_bytes: saved.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64,
            succeeded,
            failed: results.len() - succeeded,
            skipped,
            cancelled,
            elapsed,
            results,
        }
    }

    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn write_json(&self, path: &Path) -> Result<(), RunnerError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
