// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The CLI's own error type (§7 "Implementation mapping"): wraps
//! `runtime::Error` plus variants for failures that never reach the
//! library (bad path, bad flags). `main` converts this to an exit code via
//! `Display`, never `unwrap`/`expect`/`panic!`.

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error(transparent)]
  Runtime(#[from] cosmic_runtime::Error),

  #[error("script not found: {0}")]
  ScriptNotFound(std::path::PathBuf),

  #[error("{0}")]
  Logger(#[from] log::SetLoggerError),

  #[error("{tests_passed}/{tests_total} tests passed")]
  TestsFailed { tests_passed: u32, tests_total: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
