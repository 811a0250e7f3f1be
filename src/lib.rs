//! Batch video compression through an external `ffmpeg`, run by a fixed-size
//! worker pool with live progress and cooperative cancellation.

pub mod cancel;
pub mod codecs;
pub mod config;
pub mod error;
pub mod estimate;
pub mod events;
pub mod ffmpeg;
pub mod filescanner;
pub mod fstools;
pub mod job;
pub mod progress;
pub mod quality;
pub mod queue_processor;
pub mod terminal;
pub mod transcoder;

#[cfg(test)]
mod test_support;

pub use cancel::CancellationToken;
pub use config::RunnerConfig;
pub use error::{FailureReason, RunnerError};
pub use events::{BatchSummary, EventSink};
pub use job::{JobResult, JobSpec, Outcome};
pub use progress::{BatchSnapshot, ProgressAggregator};
pub use queue_processor::BatchRunner;
pub use transcoder::{Invoke, Transcoder};
