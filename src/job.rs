use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::config::{EncoderConfig, OutputLayout};
use crate::error::{FailureReason, RunnerError};
use crate::fstools;
use crate::quality::{Preset, Quality};

/// One source file to be converted into one output file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobSpec {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub quality: Quality,
    pub preset: Preset,
}

impl JobSpec {
    pub fn new(source_path: PathBuf, output_path: PathBuf, quality: Quality, preset: Preset) -> Self {
        JobSpec { source_path, output_path, quality, preset }
    }

    /// Builds one job per source, with outputs placed according to `layout`.
    ///
    /// Every job gets its own output: when two sources map to the same path
    /// (same file name, one output directory) the later one is numbered
    /// `<prefix><stem>_2.<ext>`, `_3`, and so on. An output that lands on any
    /// source file is an error.
    pub fn for_sources(
        sources: &[PathBuf],
        encoder: &EncoderConfig,
        layout: &OutputLayout,
    ) -> Result<Vec<JobSpec>, RunnerError> {
        let quality = encoder.quality()?;
        let source_keys: BTreeSet<PathBuf> = sources.iter().map(|s| fstools::normalize(s)).collect();
        let mut taken = BTreeSet::new();
        let mut jobs = Vec::with_capacity(sources.len());

        for source in sources {
            let base = layout.output_path(source)?;
            if source_keys.contains(&fstools::normalize(&base)) {
                return Err(RunnerError::OutputIsSource { path: base });
            }
            let mut output = base.clone();
            let mut n = 1;
            loop {
                let key = fstools::normalize(&output);
                if !source_keys.contains(&key) && taken.insert(key) {
                    break;
                }
                n += 1;
                output = numbered(&base, n);
            }
            jobs.push(JobSpec::new(source.clone(), output, quality, encoder.preset));
        }
        Ok(jobs)
    }

    pub fn file_name(&self) -> String {
        display_name(&self.source_path)
    }
}

fn numbered(path: &Path, n: usize) -> PathBuf {
    let mut name = path.file_stem().map(OsString::from).unwrap_or_default();
    name.push(format!("_{}", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

pub(crate) fn display_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.display().to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Outcome {
    Success,
    Failed(FailureReason),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobResult {
    pub job: JobSpec,
    pub outcome: Outcome,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub duration: Duration,
}

impl JobResult {
    pub fn success(job: JobSpec, input_bytes: u64, output_bytes: u64, duration: Duration) -> Self {
        JobResult { job, outcome: Outcome::Success, input_bytes, output_bytes, duration }
    }

    /// Failed jobs never report output bytes.
    pub fn failed(job: JobSpec, reason: FailureReason, input_bytes: u64, duration: Duration) -> Self {
        JobResult { job, outcome: Outcome::Failed(reason), input_bytes, output_bytes: 0, duration }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failed(reason) => Some(reason),
        }
    }

    /// Bytes saved by this job; zero for failures and for outputs that grew.
    pub fn saved_bytes(&self) -> u64 {
        match self.outcome {
            Outcome::Success => self.input_bytes.saturating_sub(self.output_bytes),
            Outcome::Failed(_) => 0,
        }
    }
}
