use std::collections::VecDeque;
use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::events::{BatchSummary, EventSink};
use crate::job::{JobResult, JobSpec};
use crate::progress::ProgressAggregator;
use crate::transcoder::{Invoke, Transcoder};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drains a fixed set of jobs through at most `concurrency` workers.
pub struct BatchRunner<I: Invoke> {
    invoker: I,
    concurrency: usize,
    cancel: CancellationToken,
}

impl BatchRunner<Transcoder> {
    pub fn from_config(config: &RunnerConfig) -> Result<Self, RunnerError> {
        BatchRunner::new(Transcoder::new(config.encoder.clone()), config.concurrency)
    }
}

impl<I: Invoke> BatchRunner<I> {
    pub fn new(invoker: I, concurrency: usize) -> Result<Self, RunnerError> {
        if concurrency == 0 {
            return Err(RunnerError::InvalidConcurrency);
        }
        Ok(BatchRunner {
            invoker,
            concurrency,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops this runner. Once cancelled it stays cancelled, so
    /// later calls to [`BatchRunner::run`] start no jobs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Runs every job and returns the summary, which is also handed to
    /// `sink` exactly once. Only a failed preflight is an error; individual
    /// job failures are reported in the summary.
    pub fn run(&self, jobs: Vec<JobSpec>, sink: &mut dyn EventSink) -> Result<BatchSummary, RunnerError> {
        self.invoker.preflight()?;

        let total_jobs = jobs.len();
        let total_input_bytes: u64 = jobs.iter().map(|job| source_size(job)).sum();
        info!(jobs = total_jobs, bytes = total_input_bytes, concurrency = self.concurrency, "starting batch");
        sink.on_queued(total_jobs, total_input_bytes);

        let aggregator = ProgressAggregator::new(total_jobs, total_input_bytes);
        let queue = Mutex::new(VecDeque::from(jobs));
        let results = Mutex::new(Vec::with_capacity(total_jobs));
        let sink = Mutex::new(sink);

        thread::scope(|scope| {
            let mut spawned = 0;
            for id in 0..usize::min(self.concurrency, total_jobs) {
                let worker = thread::Builder::new()
                    .name(format!("transcode-worker-{}", id))
                    .spawn_scoped(scope, || self.work(&queue, &aggregator, &results, &sink));
                match worker {
                    Ok(_) => spawned += 1,
                    Err(err) => warn!(worker = id, "unable to start worker: {}", err),
                }
            }
            if spawned == 0 && total_jobs > 0 {
                // nothing else will drain the queue
                self.work(&queue, &aggregator, &results, &sink);
            }
        });

        let skipped = queue.into_inner().unwrap_or_else(PoisonError::into_inner).len();
        let results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        let sink = sink.into_inner().unwrap_or_else(PoisonError::into_inner);
        let summary = BatchSummary::new(results, skipped, self.cancel.is_cancelled(), aggregator.snapshot().elapsed);

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            saved = summary.total_saved_bytes,
            "batch finished");
        sink.on_batch_complete(&summary);
        Ok(summary)
    }

    fn next_item(&self, queue: &Mutex<VecDeque<JobSpec>>) -> Option<JobSpec> {
        let mut q = lock(queue);
        if self.cancel.is_cancelled() {
            return None;
        }
        q.pop_front()
    }

    fn work(
        &self,
        queue: &Mutex<VecDeque<JobSpec>>,
        aggregator: &ProgressAggregator,
        results: &Mutex<Vec<JobResult>>,
        sink: &Mutex<&mut dyn EventSink>,
    ) {
        while let Some(job) = self.next_item(queue) {
            let result = self.invoker.invoke(job, &self.cancel);
            log_result(&result);

            // record and notify under the sink lock so observers see
            // completed_jobs strictly increasing
            let mut sink = lock(sink);
            let snapshot = aggregator.record(&result);
            sink.on_progress(&result, &snapshot);
            drop(sink);

            lock(results).push(result);
        }
    }
}

fn source_size(job: &JobSpec) -> u64 {
    fs::metadata(&job.source_path).map(|m| m.len()).unwrap_or(0)
}

fn log_result(result: &JobResult) {
    let name = result.job.file_name();
    match result.failure() {
        None => info!(
            file = %name,
            input = result.input_bytes,
            output = result.output_bytes,
            elapsed = ?result.duration,
            "done"),
        Some(reason) => warn!(file = %name, reason = reason.tag(), "{}", reason),
    }
}
