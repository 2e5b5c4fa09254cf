// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The `cosmic` executable (§6 "External interfaces", §1.1 ADDED "CLI
//! argument parsing"). Two subcommands, `run` and `test`, both of which
//! bootstrap a [`cosmic_runtime::Runtime`] from parsed flags and drive it
//! to completion; the only difference is whether the frame loop is entered
//! after the main script finishes its top-level evaluation.

mod error;
mod logger;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cosmic_runtime::event_loop::ExitReason;
use cosmic_runtime::headless::{HeadlessWindowBackend, NullReactor};
use cosmic_runtime::{BootstrapOptions, ExitStatus, Runtime, RunMode};

use error::{Error, Result};

#[derive(Parser)]
#[command(name = "cosmic", version, about = "A desktop JavaScript runtime")]
struct Cli {
  #[command(subcommand)]
  command: Command,

  /// Log level filter used when `RUST_LOG` isn't set.
  #[arg(short = 'L', long = "log-level", global = true, default_value = "info")]
  log_level: String,
}

#[derive(Subcommand)]
enum Command {
  /// Load a script and enter the frame loop (§6).
  Run {
    script: PathBuf,
    #[arg(long)]
    dev: bool,
    #[arg(long, default_value_t = 4)]
    workers: usize,
  },
  /// Load a script, run it to completion, and exit non-zero on failure
  /// (§6, §8 scenario S6).
  Test {
    script: PathBuf,
    #[arg(long, default_value_t = 4)]
    workers: usize,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  if let Err(err) = logger::install(&cli.log_level) {
    eprintln!("failed to install logger: {err}");
  }

  let result = match cli.command {
    Command::Run { script, dev, workers } => run(script, dev, workers),
    Command::Test { script, workers } => test(script, workers),
  };

  match result {
    Ok(status) => ExitCode::from(status.code().clamp(0, 255) as u8),
    Err(err) => {
      log::error!("{err}");
      ExitCode::from(1)
    }
  }
}

fn bootstrap(script: &PathBuf, mode: RunMode, dev_mode: bool, workers: usize, log_level: &str) -> Result<Runtime> {
  if !script.exists() {
    return Err(Error::ScriptNotFound(script.clone()));
  }
  let options = BootstrapOptions {
    mode,
    script_path: script.clone(),
    worker_count: workers,
    dev_mode,
    log_filter: log_level.to_string(),
    ..Default::default()
  };
  let runtime = Runtime::new(options, Box::new(HeadlessWindowBackend), Box::new(NullReactor::default()))?;
  Ok(runtime)
}

/// `run <path>`: loads the script, then enters the frame loop if it opened
/// a window, otherwise drains events until idle (§6).
fn run(script: PathBuf, dev: bool, workers: usize) -> Result<ExitStatus> {
  let mut runtime = bootstrap(&script, RunMode::Run, dev, workers, "info")?;
  runtime.load_main_script(&script)?;
  let exit_reason = runtime.run();
  runtime.shutdown()?;

  match exit_reason {
    ExitReason::NoWindowsRemain | ExitReason::RestartRequested => Ok(ExitStatus::SUCCESS),
    ExitReason::UncaughtException => Ok(ExitStatus::FAILURE),
  }
}

/// `test <path>`: loads the script as a module, which runs its top-level
/// synchronous assertions and awaits any top-level async tests as part of
/// module evaluation (§4.7), then runs every isolated test registered via
/// `op_cosmic_register_test` one at a time (§3, §6, §8 scenario S6). Exit
/// code 0 iff the module evaluated cleanly and `tests_passed == tests_total`.
fn test(script: PathBuf, workers: usize) -> Result<ExitStatus> {
  let mut runtime = bootstrap(&script, RunMode::Test, false, workers, "info")?;
  let load_result = runtime.load_main_script(&script);
  let (tests_passed, tests_total) = if load_result.is_ok() { runtime.run_isolated_tests() } else { (0, 0) };
  runtime.shutdown()?;
  load_result?;

  if tests_passed != tests_total {
    return Err(Error::TestsFailed { tests_passed, tests_total });
  }
  Ok(ExitStatus::SUCCESS)
}
