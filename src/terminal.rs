use human_repr::{HumanCount, HumanDuration, HumanThroughput};
use kdam::{term, tqdm, Bar, BarExt};

use crate::events::{BatchSummary, EventSink};
use crate::job::JobResult;
use crate::progress::BatchSnapshot;

/// Renders a batch as a progress bar with one log line per finished file.
#[derive(Default)]
pub struct TerminalSink {
    bar: Option<Bar>,
}

impl TerminalSink {
    pub fn new() -> Self {
        TerminalSink::default()
    }

    fn print(&mut self, line: String) {
        match &mut self.bar {
            Some(bar) => {
                if bar.write(line.clone()).is_err() {
                    println!("{}", line);
                }
            },
            None => println!("{}", line),
        }
    }
}

pub fn signed_bytes(bytes: i64) -> String {
    match bytes < 0 {
        true => format!("-{}", bytes.unsigned_abs().human_count_bytes()),
        false => format!("{}", (bytes as u64).human_count_bytes()),
    }
}

pub fn result_line(result: &JobResult) -> String {
    let name = result.job.file_name();
    match result.failure() {
        None => format!(
            "✔ Done: {} ({} -> {}, saved {})",
            name,
            result.input_bytes.human_count_bytes(),
            result.output_bytes.human_count_bytes(),
            result.saved_bytes().human_count_bytes()),
        Some(reason) => format!("❌ Error on {}: {}", name, reason),
    }
}

pub fn status_postfix(snapshot: &BatchSnapshot) -> String {
    let eta = match snapshot.eta {
        Some(eta) => format!("{}", eta.human_duration()),
        None => String::from("unknown"),
    };
    format!(
        "{}/{} at {}, {} left",
        snapshot.processed_bytes.human_count_bytes(),
        snapshot.total_input_bytes.human_count_bytes(),
        snapshot.throughput.human_throughput_bytes(),
        eta)
}

pub fn summary_lines(summary: &BatchSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "{} succeeded, {} failed{} in {}.",
        summary.succeeded,
        summary.failed,
        match summary.skipped {
            0 => String::new(),
            n => format!(", {} not started", n),
        },
        summary.elapsed.human_duration())];
    if summary.cancelled {
        lines.push(String::from("Batch was cancelled."));
    }
    lines.push(format!("DONE! Total saved: {}", signed_bytes(summary.total_saved_bytes)));
    lines
}

impl EventSink for TerminalSink {
    fn on_queued(&mut self, total_jobs: usize, total_input_bytes: u64) {
        println!("Queued {} files ({}).", total_jobs, total_input_bytes.human_count_bytes());
        term::init(false);
        self.bar = Some(tqdm!(
            total = total_jobs,
            desc = "compressing",
            unit = " files",
            position = 0,
            force_refresh = true
        ));
    }

    fn on_progress(&mut self, result: &JobResult, snapshot: &BatchSnapshot) {
        self.print(result_line(result));
        if let Some(bar) = &mut self.bar {
            bar.set_postfix(status_postfix(snapshot));
            let _ = bar.update_to(snapshot.completed_jobs);
        }
    }

    fn on_batch_complete(&mut self, summary: &BatchSummary) {
        if let Some(mut bar) = self.bar.take() {
            let _ = bar.refresh();
            eprintln!();
        }
        for line in summary_lines(summary) {
            println!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::error::FailureReason;
    use crate::test_support::job;

    #[test]
    fn test_result_line() {
        let spec = job(&PathBuf::from("/v/clip.mp4"), &PathBuf::from("/v/out/clip.mp4"));
        let ok = JobResult::success(spec.clone(), 2_000_000, 500_000, Duration::ZERO);
        assert!(result_line(&ok).starts_with("✔ Done: clip.mp4 ("));
        let failed = JobResult::failed(spec, FailureReason::MissingOutput, 10, Duration::ZERO);
        assert_eq!(
            result_line(&failed),
            "❌ Error on clip.mp4: encoder exited successfully but wrote no output");
    }

    #[test]
    fn test_signed_bytes() {
        assert!(signed_bytes(-2048).starts_with('-'));
        assert!(!signed_bytes(2048).starts_with('-'));
    }

    #[test]
    fn test_summary_lines() {
        let summary = BatchSummary::new(vec![], 3, true, Duration::from_secs(5));
        let lines = summary_lines(&summary);
        assert!(lines[0].starts_with("0 succeeded, 0 failed, 3 not started in "));
        assert_eq!(lines[1], "Batch was cancelled.");
        assert!(lines[2].starts_with("DONE! Total saved: "));
    }

    #[test]
    fn test_status_postfix_unknown_eta() {
        let snapshot = BatchSnapshot {
            total_jobs: 2,
            completed_jobs: 0,
            total_input_bytes: 100,
            processed_bytes: 0,
            total_output_bytes: 0,
            elapsed: Duration::ZERO,
            fraction_done: 0.0,
            throughput: 0.0,
            eta: None,
        };
        assert!(status_postfix(&snapshot).ends_with("unknown left"));
    }
}
