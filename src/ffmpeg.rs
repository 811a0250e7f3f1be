use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::RunnerError;

/// Checks once that the encoder binary can be launched at all, so a missing
/// `ffmpeg` surfaces as one error instead of one failure per job.
pub fn preflight(binary: &Path) -> Result<(), RunnerError> {
    let status = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => {
            debug!(binary = %binary.display(), "encoder preflight passed");
            Ok(())
        },
        Ok(status) => Err(RunnerError::launch_failure(binary, format!("`-version` exited with {}", status))),
        Err(err) => Err(RunnerError::launch_failure(binary, err.to_string())),
    }
}
