// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The runtime orchestration layer: owns the script engine, multiplexes the
//! reactor, the worker pool and script microtasks, and manages the lifetime
//! of native resources exposed to script as opaque handles.

pub mod context;
pub mod dev_mode;
pub mod error;
pub mod event_loop;
pub mod headless;
pub mod module_loader;
pub mod ops;
pub mod promise_registry;
pub mod reactor;
pub mod reactor_poller;
pub mod resource_table;
pub mod value_bridge;
pub mod weak_handle_table;
pub mod window;
pub mod work_queue;

pub use context::Runtime;
pub use error::{CapturedException, Error, Result};

use std::path::PathBuf;
use std::time::Duration;

/// Which CLI subcommand is driving this runtime (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
  Run,
  Test,
}

/// Constructed by the CLI from parsed flags and passed into [`Runtime::new`]
/// (§3.1 ADDED). There is no persisted configuration file (§6).
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
  pub mode: RunMode,
  pub script_path: PathBuf,
  pub worker_count: usize,
  pub dev_mode: bool,
  pub log_filter: String,
  pub target_fps: u32,
}

impl Default for BootstrapOptions {
  fn default() -> Self {
    BootstrapOptions {
      mode: RunMode::Run,
      script_path: PathBuf::new(),
      worker_count: 4,
      dev_mode: false,
      log_filter: "info".to_string(),
      target_fps: 60,
    }
  }
}

impl BootstrapOptions {
  pub fn frame_interval(&self) -> Duration {
    Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
  }
}

/// Maps to a process exit code (§3.1 ADDED, §6 `test`/`run` contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus(i32);

impl ExitStatus {
  pub const SUCCESS: ExitStatus = ExitStatus(0);
  pub const FAILURE: ExitStatus = ExitStatus(1);

  pub fn code(self) -> i32 {
    self.0
  }
}

impl From<Result<()>> for ExitStatus {
  fn from(result: Result<()>) -> Self {
    match result {
      Ok(()) => ExitStatus::SUCCESS,
      Err(_) => ExitStatus::FAILURE,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frame_interval_scales_with_fps() {
    let mut options = BootstrapOptions { target_fps: 60, ..Default::default() };
    assert!((options.frame_interval().as_secs_f64() - 1.0 / 60.0).abs() < 1e-9);
    options.target_fps = 30;
    assert!((options.frame_interval().as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
  }

  #[test]
  fn exit_status_maps_from_result() {
    assert_eq!(ExitStatus::from(Ok(())).code(), 0);
    assert_eq!(ExitStatus::from(Err(Error::HandleExpired)).code(), 1);
  }
}
