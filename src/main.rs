use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use human_repr::HumanCount;
use rustop::opts;
use tracing_subscriber::EnvFilter;

use reel_squeeze::config::{self, ConfigOverrides};
use reel_squeeze::estimate::estimated_savings;
use reel_squeeze::filescanner::FileScanner;
use reel_squeeze::terminal::TerminalSink;
use reel_squeeze::{BatchRunner, CancellationToken, JobSpec, RunnerError};

struct Invocation {
    inputs: Vec<PathBuf>,
    overrides: ConfigOverrides,
    config_file: Option<PathBuf>,
    report: Option<PathBuf>,
    recursive: bool,
    estimate_only: bool,
}

fn main() -> ExitCode {
    let (args, _rest) = opts! {
        synopsis "Compress video files with ffmpeg, several at a time.";
        opt profile:Option<String>, desc:"Starting defaults. [standard, turbo]";
        opt quality:Option<u8>, desc:"CRF value; lower means better quality and bigger files.";
        opt preset:Option<String>, desc:"Encoder speed. [fast, balanced, max-compression]";
        opt codec:Option<String>, desc:"Video codec. [h264, hevc, av1]";
        opt jobs:Option<usize>, desc:"Number of files to encode at once. (default 3)";
        opt output:Option<String>, desc:"Write every output into this directory instead of a subdirectory beside each source.";
        opt ffmpeg:Option<String>, desc:"Path to the ffmpeg binary.";
        opt config:Option<String>, desc:"JSON file with configuration overrides.";
        opt report:Option<String>, desc:"Write a JSON summary of the batch to this file.";
        opt flat:bool=false, desc:"Only take videos directly inside input folders, not from their subfolders.";
        opt estimate:bool=false, desc:"Print the estimated savings and exit.";
        param inputs:Vec<String>, desc:"Input files and/or directories.";
    }.parse_or_exit();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let overrides = match cli_overrides(
        args.profile.as_deref(),
        args.preset.as_deref(),
        args.codec.as_deref(),
    ) {
        Ok(overrides) => ConfigOverrides {
            quality: args.quality,
            concurrency: args.jobs,
            binary: args.ffmpeg.map(PathBuf::from),
            output_dir: args.output.map(PathBuf::from),
            ..overrides
        },
        Err(err) => {
            println!("{}", err);
            return ExitCode::FAILURE;
        },
    };

    let invocation = Invocation {
        inputs: args.inputs.iter().map(PathBuf::from).collect(),
        overrides,
        config_file: args.config.map(PathBuf::from),
        report: args.report.map(PathBuf::from),
        recursive: !args.flat,
        estimate_only: args.estimate,
    };

    match run(invocation) {
        Ok(code) => code,
        Err(err) => {
            println!("Failure -__-\n{}", err);
            ExitCode::FAILURE
        },
    }
}

fn cli_overrides(profile: Option<&str>, preset: Option<&str>, codec: Option<&str>) -> Result<ConfigOverrides, RunnerError> {
    Ok(ConfigOverrides {
        profile: profile.map(str::parse).transpose()?,
        preset: preset.map(str::parse).transpose()?,
        codec: codec.map(str::parse).transpose()?,
        ..Default::default()
    })
}

fn install_signal_handlers(cancel: &CancellationToken) -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::flag;

    // a second Ctrl-C exits immediately
    flag::register_conditional_shutdown(SIGINT, 130, cancel.flag())?;
    flag::register(SIGINT, cancel.flag())?;
    flag::register(SIGTERM, cancel.flag())?;
    Ok(())
}

fn run(invocation: Invocation) -> Result<ExitCode, RunnerError> {
    let file = match &invocation.config_file {
        Some(path) => Some(ConfigOverrides::load(path)?),
        None => None,
    };
    let config = config::resolve(file.as_ref(), &invocation.overrides)?;

    let mut scanner = FileScanner::new(invocation.recursive);
    if let Some(subdirectory) = config.output.subdirectory() {
        scanner = scanner.skip_dir(subdirectory);
    }
    if invocation.inputs.is_empty() {
        println!("Nothing to do: no input files or directories given.");
        return Ok(ExitCode::FAILURE);
    }
    let sources = scanner.collect(&invocation.inputs)?;
    if sources.is_empty() {
        println!("No video files found in {:?}.", invocation.inputs);
        return Ok(ExitCode::FAILURE);
    }

    let quality = config.encoder.quality()?;
    let total_bytes: u64 = sources.iter().filter_map(|s| fs::metadata(s).ok()).map(|m| m.len()).sum();
    println!(
        "{} files, {}. Compression level: {} ({}). Est. saving: ~{}",
        sources.len(),
        total_bytes.human_count_bytes(),
        quality.tier(),
        quality,
        estimated_savings(total_bytes, quality).human_count_bytes());
    if invocation.estimate_only {
        return Ok(ExitCode::SUCCESS);
    }

    let jobs = JobSpec::for_sources(&sources, &config.encoder, &config.output)?;
    let cancel = CancellationToken::new();
    install_signal_handlers(&cancel)?;
    let runner = BatchRunner::from_config(&config)?.with_cancellation(cancel);

    let summary = runner.run(jobs, &mut TerminalSink::new())?;

    if let Some(path) = &invocation.report {
        summary.write_json(path)?;
        println!("Report written to {:?}.", path);
    }

    if summary.failed == 0 && !summary.cancelled {
        println!("Success! ^__^");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
