use std::path::PathBuf;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Conditions that stop a whole batch, or stop one from being built.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("encoder {binary:?} cannot be launched: {reason}")]
    LaunchFailure { binary: PathBuf, reason: String },

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("quality {value} is outside the allowed range [{min}, {max}]")]
    QualityOutOfRange { value: u8, min: u8, max: u8 },

    #[error("invalid quality range [{min}, {max}]")]
    InvalidQualityRange { min: u8, max: u8 },

    #[error("{path:?} has no file name")]
    NoFileName { path: PathBuf },

    #[error("output {path:?} would overwrite a source file")]
    OutputIsSource { path: PathBuf },

    #[error("unknown {kind}: {value}")]
    UnknownOption { kind: &'static str, value: String },

    #[error("error reading configuration {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("error writing report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    pub fn launch_failure(binary: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RunnerError::LaunchFailure {
            binary: binary.into(),
            reason: reason.into(),
        }
    }
}

/// Why a single job did not produce an output file.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FailureReason {
    #[error("source file does not exist")]
    SourceMissing,

    #[error("encoder could not be started: {0}")]
    LaunchFailure(String),

    #[error("encoder exited with {}", exit_code_str(.exit_code))]
    EncodeFailure {
        exit_code: Option<i32>,
        stderr: Option<String>,
    },

    #[error("encoder exited successfully but wrote no output")]
    MissingOutput,

    #[error("output path is the source file")]
    OutputIsSource,

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Io(String),
}

fn exit_code_str(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => String::from("a signal"),
    }
}

impl FailureReason {
    /// Short stable tag for logs and reports.
    pub fn tag(&self) -> &'static str {
        match self {
            FailureReason::SourceMissing => "source-missing",
            FailureReason::LaunchFailure(_) => "launch-failure",
            FailureReason::EncodeFailure { .. } => "encode-failure",
            FailureReason::MissingOutput => "missing-output",
            FailureReason::OutputIsSource => "output-is-source",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Io(_) => "io",
        }
    }

    pub fn from_io(context: &str, err: &std::io::Error) -> Self {
        FailureReason::Io(format!("{}: {}", context, err))
    }
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}: {}", self.tag(), self))
    }
}
