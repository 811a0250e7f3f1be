use std::ffi::OsString;
use std::fs;
use std::io::{self, ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::config::{AudioMode, EncoderConfig};
use crate::error::{FailureReason, RunnerError};
use crate::ffmpeg;
use crate::fstools;
use crate::job::{JobResult, JobSpec};

/// Runs one job to completion. Implementations must report every failure in
/// the returned [`JobResult`] rather than panicking or erroring.
pub trait Invoke: Sync {
    /// Batch-fatal environment check, run once before any job starts.
    fn preflight(&self) -> Result<(), RunnerError>;

    fn invoke(&self, job: JobSpec, cancel: &CancellationToken) -> JobResult;
}

enum WaitResult {
    Exited(ExitStatus),
    Cancelled,
}

/// Encodes a job by running the configured `ffmpeg` binary.
pub struct Transcoder {
    pub config: EncoderConfig,
    pub poll_interval: Duration,
}

impl Transcoder {
    pub fn new(config: EncoderConfig) -> Self {
        Transcoder {
            config,
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.config.binary = binary.into();
        self
    }

    pub fn audio(mut self, audio: AudioMode) -> Self {
        self.config.audio = audio;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn build_args(&self, job: &JobSpec) -> Vec<OsString> {
        fn os(s: &str) -> OsString { OsString::from(s) }

        let codec = self.config.codec;
        let mut args = vec![
            os("-hide_banner"),
            os("-nostats"),
            os("-loglevel"), os("warning"),
            // overwrite without prompting, so retries replace earlier outputs
            os("-y"),
            os("-i"), job.source_path.clone().into_os_string(),
            os("-c:v"), os(codec.encoder_library()),
            os("-crf"), OsString::from(job.quality.value().to_string()),
            os("-preset"), OsString::from(job.preset.parameter(codec)),
        ];
        args.extend(self.config.audio.parameters().into_iter().map(OsString::from));
        args.push(job.output_path.clone().into_os_string());
        args
    }

    fn wait(&self, child: &mut Child, cancel: &CancellationToken) -> io::Result<WaitResult> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(WaitResult::Exited(status)),
                Ok(None) => (),
                Err(err) => {
                    let _ = kill_encoder(child);
                    let _ = child.wait();
                    return Err(err);
                },
            }

            if cancel.is_cancelled() {
                debug!(pid = child.id(), "cancellation requested; killing encoder");
                if let Err(err) = kill_encoder(child) {
                    warn!(pid = child.id(), "error killing encoder: {}", err);
                }
                let _ = child.wait();
                return Ok(WaitResult::Cancelled);
            }

            thread::sleep(self.poll_interval);
        }
    }
}

impl Invoke for Transcoder {
    fn preflight(&self) -> Result<(), RunnerError> {
        ffmpeg::preflight(&self.config.binary)
    }

    fn invoke(&self, job: JobSpec, cancel: &CancellationToken) -> JobResult {
        let started = Instant::now();

        let input_bytes = match fs::metadata(&job.source_path) {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => return JobResult::failed(job, FailureReason::SourceMissing, 0, started.elapsed()),
        };

        if fstools::same_file(&job.source_path, &job.output_path) {
            return JobResult::failed(job, FailureReason::OutputIsSource, input_bytes, started.elapsed());
        }

        if cancel.is_cancelled() {
            return JobResult::failed(job, FailureReason::Cancelled, input_bytes, started.elapsed());
        }

        if let Some(dir) = job.output_path.parent() {
            if let Err(err) = fs::create_dir_all(dir) {
                let reason = FailureReason::from_io(&format!("creating {}", dir.display()), &err);
                return JobResult::failed(job, reason, input_bytes, started.elapsed());
            }
        }

        let args = self.build_args(&job);
        debug!(binary = %self.config.binary.display(), ?args, "starting encoder");

        let mut command = Command::new(&self.config.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        // own process group, so cancelling also reaches anything a wrapper script forked
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let reason = FailureReason::LaunchFailure(err.to_string());
                return JobResult::failed(job, reason, input_bytes, started.elapsed());
            },
        };

        // drained on its own thread so a chatty encoder never blocks on a full pipe
        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || read_stderr_to_end(stderr));

        let waited = self.wait(&mut child, cancel);
        // after a kill the pipe may still be held open by a stray descendant,
        // so the reader is only joined for an encoder that exited by itself
        let stderr = match waited {
            Ok(WaitResult::Exited(_)) => stderr_reader.join().ok().flatten(),
            _ => None,
        };

        let status = match waited {
            Ok(WaitResult::Exited(status)) => status,
            Ok(WaitResult::Cancelled) => {
                remove_partial_output(&job);
                return JobResult::failed(job, FailureReason::Cancelled, input_bytes, started.elapsed());
            },
            Err(err) => {
                remove_partial_output(&job);
                let reason = FailureReason::from_io("waiting for encoder", &err);
                return JobResult::failed(job, reason, input_bytes, started.elapsed());
            },
        };

        if !status.success() {
            remove_partial_output(&job);
            let reason = FailureReason::EncodeFailure { exit_code: status.code(), stderr };
            return JobResult::failed(job, reason, input_bytes, started.elapsed());
        }

        match fs::metadata(&job.output_path) {
            Ok(metadata) if metadata.is_file() => {
                let output_bytes = metadata.len();
                JobResult::success(job, input_bytes, output_bytes, started.elapsed())
            },
            Ok(_) => JobResult::failed(job, FailureReason::MissingOutput, input_bytes, started.elapsed()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                JobResult::failed(job, FailureReason::MissingOutput, input_bytes, started.elapsed())
            },
            Err(err) => {
                let reason = FailureReason::from_io("measuring output", &err);
                JobResult::failed(job, reason, input_bytes, started.elapsed())
            },
        }
    }
}

#[cfg(unix)]
fn kill_encoder(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(_) => child.kill(),
    }
}

#[cfg(not(unix))]
fn kill_encoder(child: &mut Child) -> io::Result<()> {
    child.kill()
}

fn remove_partial_output(job: &JobSpec) {
    if fstools::same_file(&job.source_path, &job.output_path) {
        warn!(path = %job.output_path.display(), "output is the source file; leaving it in place");
        return;
    }
    match fs::remove_file(&job.output_path) {
        Ok(()) => debug!(path = %job.output_path.display(), "removed partial output"),
        Err(err) if err.kind() == ErrorKind::NotFound => (),
        Err(err) => warn!(path = %job.output_path.display(), "unable to remove partial output: {}", err),
    }
}

fn read_stderr_to_end(stderr: Option<ChildStderr>) -> Option<String> {
    let mut buf = Vec::new();
    let mut stream = stderr?;
    stream.read_to_end(&mut buf).ok()?;
    let text = String::from_utf8_lossy(&buf).trim().to_string();
    match text.is_empty() {
        true => None,
        false => Some(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::Codec;
    use crate::config::Profile;
    use crate::quality::{Preset, Quality, QualityRange};

    fn args_to_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_build_args_standard() {
        let transcoder = Transcoder::new(Profile::Standard.config().encoder);
        let job = JobSpec::new(
            PathBuf::from("/v/in.mp4"),
            PathBuf::from("/v/Compressed_Reels/comp_in.mp4"),
            Quality::new(23, &QualityRange::default()).unwrap(),
            Preset::Balanced);
        assert_eq!(args_to_strings(transcoder.build_args(&job)), vec![
            "-hide_banner", "-nostats", "-loglevel", "warning", "-y",
            "-i", "/v/in.mp4",
            "-c:v", "libx264", "-crf", "23", "-preset", "faster",
            "-c:a", "aac", "-b:a", "128k",
            "/v/Compressed_Reels/comp_in.mp4",
        ]);
    }

    #[test]
    fn test_build_args_audio_copy_and_codec() {
        let mut config = Profile::Turbo.config().encoder;
        config.codec = Codec::AV1;
        let transcoder = Transcoder::new(config).audio(AudioMode::Copy);
        let job = JobSpec::new(
            PathBuf::from("in.mkv"),
            PathBuf::from("out.mkv"),
            Quality::new(30, &QualityRange::default()).unwrap(),
            Preset::Fast);
        let args = args_to_strings(transcoder.build_args(&job));
        assert_eq!(&args[7..], &[
            "-c:v", "libsvtav1", "-crf", "30", "-preset", "12",
            "-c:a", "copy",
            "out.mkv",
        ]);
    }

    #[test]
    fn test_build_args_is_deterministic() {
        let transcoder = Transcoder::new(Profile::Standard.config().encoder);
        let job = JobSpec::new(
            PathBuf::from("a.mov"),
            PathBuf::from("b.mov"),
            Quality::new(20, &QualityRange::default()).unwrap(),
            Preset::MaxCompression);
        assert_eq!(transcoder.build_args(&job), transcoder.build_args(&job));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::test_support::{fake_encoder, job, sparse_file};

        fn transcoder(binary: impl Into<PathBuf>) -> Transcoder {
            Transcoder::new(Profile::Standard.config().encoder)
                .binary(binary)
                .poll_interval(Duration::from_millis(10))
        }

        #[test]
        fn test_source_missing_never_spawns() {
            let dir = tempfile::tempdir().unwrap();
            let result = transcoder("/nonexistent/bin/ffmpeg").invoke(
                job(&dir.path().join("missing.mp4"), &dir.path().join("out/missing.mp4")),
                &CancellationToken::new());
            assert_eq!(result.failure(), Some(&FailureReason::SourceMissing));
            assert_eq!(result.input_bytes, 0);
            assert!(!dir.path().join("out").exists());
        }

        #[test]
        fn test_launch_failure() {
            let dir = tempfile::tempdir().unwrap();
            let source = sparse_file(&dir.path().join("in.mp4"), 1024);
            let result = transcoder("/nonexistent/bin/ffmpeg")
                .invoke(job(&source, &dir.path().join("out.mp4")), &CancellationToken::new());
            assert_eq!(result.failure().map(|r| r.tag()), Some("launch-failure"));
            assert_eq!(result.input_bytes, 1024);
            assert_eq!(result.output_bytes, 0);
        }

        #[test]
        fn test_nonzero_exit_keeps_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let encoder = fake_encoder(dir.path(), "printf 'partial' > \"$out\"\necho 'Invalid data found' >&2\nexit 3");
            let source = sparse_file(&dir.path().join("in.mp4"), 10);
            let output = dir.path().join("out.mp4");
            let result = transcoder(encoder).invoke(job(&source, &output), &CancellationToken::new());
            assert_eq!(result.failure(), Some(&FailureReason::EncodeFailure {
                exit_code: Some(3),
                stderr: Some(String::from("Invalid data found")),
            }));
            assert!(!output.exists(), "partial output should be removed");
        }

        #[test]
        fn test_zero_exit_without_output() {
            let dir = tempfile::tempdir().unwrap();
            let source = sparse_file(&dir.path().join("in.mp4"), 10);
            let result = transcoder("true").invoke(job(&source, &dir.path().join("out.mp4")), &CancellationToken::new());
            assert_eq!(result.failure(), Some(&FailureReason::MissingOutput));
        }

        #[test]
        fn test_success_creates_destination_and_overwrites() {
            let dir = tempfile::tempdir().unwrap();
            let encoder = fake_encoder(dir.path(), "printf 'encoded' > \"$out\"");
            let source = sparse_file(&dir.path().join("in.mp4"), 4096);
            let output = dir.path().join("nested/deeper/comp_in.mp4");
            let transcoder = transcoder(encoder);

            let first = transcoder.invoke(job(&source, &output), &CancellationToken::new());
            assert!(first.is_success(), "{:?}", first.outcome);
            assert_eq!(first.input_bytes, 4096);
            assert_eq!(first.output_bytes, 7);

            let second = transcoder.invoke(job(&source, &output), &CancellationToken::new());
            assert!(second.is_success(), "{:?}", second.outcome);
            assert_eq!(fs::read_to_string(&output).unwrap(), "encoded");
            assert_eq!(fs::read_dir(output.parent().unwrap()).unwrap().count(), 1);
        }

        #[test]
        fn test_cancel_kills_running_encoder() {
            let dir = tempfile::tempdir().unwrap();
            let encoder = fake_encoder(dir.path(), "printf 'partial' > \"$out\"\nexec sleep 30");
            let source = sparse_file(&dir.path().join("in.mp4"), 10);
            let output = dir.path().join("out.mp4");
            let cancel = CancellationToken::new();
            let transcoder = transcoder(encoder);

            let canceller = {
                let cancel = cancel.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(300));
                    cancel.cancel();
                })
            };
            let started = Instant::now();
            let result = transcoder.invoke(job(&source, &output), &cancel);
            canceller.join().unwrap();

            assert_eq!(result.failure(), Some(&FailureReason::Cancelled));
            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(!output.exists());
        }

        #[test]
        fn test_cancel_kills_forked_descendants() {
            let dir = tempfile::tempdir().unwrap();
            let encoder = fake_encoder(dir.path(), "printf 'partial' > \"$out\"\nsleep 30\necho done");
            let source = sparse_file(&dir.path().join("in.mp4"), 10);
            let output = dir.path().join("out.mp4");
            let cancel = CancellationToken::new();
            let transcoder = transcoder(encoder);

            let canceller = {
                let cancel = cancel.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(300));
                    cancel.cancel();
                })
            };
            let started = Instant::now();
            let result = transcoder.invoke(job(&source, &output), &cancel);
            canceller.join().unwrap();

            assert_eq!(result.failure(), Some(&FailureReason::Cancelled));
            assert!(started.elapsed() < Duration::from_secs(10), "took {:?}", started.elapsed());
            assert!(!output.exists());
        }

        #[test]
        fn test_output_equal_to_source_is_never_touched() {
            let dir = tempfile::tempdir().unwrap();
            let encoder = fake_encoder(dir.path(), "exit 1");
            let source = dir.path().join("clip.mp4");
            fs::write(&source, b"original").unwrap();

            let result = transcoder(encoder).invoke(job(&source, &source), &CancellationToken::new());
            assert_eq!(result.failure(), Some(&FailureReason::OutputIsSource));
            assert_eq!(fs::read(&source).unwrap(), b"original");
        }

        #[test]
        fn test_already_cancelled_does_not_start() {
            let dir = tempfile::tempdir().unwrap();
            let source = sparse_file(&dir.path().join("in.mp4"), 10);
            let cancel = CancellationToken::new();
            cancel.cancel();
            let result = transcoder("/nonexistent/bin/ffmpeg").invoke(job(&source, &dir.path().join("o.mp4")), &cancel);
            assert_eq!(result.failure(), Some(&FailureReason::Cancelled));
        }
    }
}
