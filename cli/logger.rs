// Copyright 2018-2026 the Cosmic authors. MIT license.

//! A small, custom `log::Log` implementation (§1.1 ADDED) rather than
//! `env_logger`'s own logger and default formatter: we want a compact,
//! colorized prefix and a `target: "script"` line style distinguishable
//! from native log lines, but still want `RUST_LOG`'s familiar directive
//! syntax (`module=level,...`) for the filter itself, so we reuse
//! `env_logger`'s filter parser without installing its logger.

use std::io::{IsTerminal, Write};

use log::{Level, Log, Metadata, Record, SetLoggerError};

struct CosmicLogger {
  filter: env_logger::filter::Filter,
  color: bool,
}

impl Log for CosmicLogger {
  fn enabled(&self, metadata: &Metadata) -> bool {
    self.filter.enabled(metadata)
  }

  fn log(&self, record: &Record) {
    if !self.filter.matches(record) {
      return;
    }
    let prefix = level_prefix(record.level(), self.color);
    let target = record.target();
    let mut stderr = std::io::stderr();
    if target == "script" {
      let _ = writeln!(stderr, "{prefix} [script] {}", record.args());
    } else {
      let _ = writeln!(stderr, "{prefix} {}", record.args());
    }
  }

  fn flush(&self) {
    let _ = std::io::stderr().flush();
  }
}

fn level_prefix(level: Level, color: bool) -> String {
  if !color {
    return level.to_string();
  }
  let code = match level {
    Level::Error => "31",
    Level::Warn => "33",
    Level::Info => "32",
    Level::Debug => "34",
    Level::Trace => "90",
  };
  format!("\x1b[{code}m{level}\x1b[0m")
}

/// Installs the process-wide logger. `default_filter` is used when
/// `RUST_LOG` isn't set (§6 "Environment variables"); colorization is
/// enabled only when stderr is a tty.
pub fn install(default_filter: &str) -> Result<(), SetLoggerError> {
  let mut builder = env_logger::filter::Builder::new();
  match std::env::var("RUST_LOG") {
    Ok(spec) => builder.parse(&spec),
    Err(_) => builder.parse(default_filter),
  };
  let filter = builder.build();
  log::set_max_level(filter.filter());
  let logger = CosmicLogger { filter, color: std::io::stderr().is_terminal() };
  log::set_boxed_logger(Box::new(logger))
}
