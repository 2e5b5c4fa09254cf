// Copyright 2018-2026 the Cosmic authors. MIT license.

//! Dev mode & restart (§4.9).
//!
//! The watcher coalesces the handful of write events a single editor save
//! tends to produce into exactly one restart request, watching the main
//! script plus every file the module loader has registered so edits to
//! imported modules trigger a restart too.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};

use crate::error::{Error, Result};

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// A restart request raised by the file watcher.
#[derive(Debug, Clone)]
pub struct RestartRequest {
  pub changed: Vec<PathBuf>,
}

/// Watches the main script and its transitively imported modules, emitting
/// at most one coalesced [`RestartRequest`] per save (§4.9 "File watching").
pub struct FileWatcher {
  debouncer: Debouncer<notify::RecommendedWatcher>,
  events: Receiver<RestartRequest>,
  watched: Vec<PathBuf>,
}

impl FileWatcher {
  pub fn new(main_script: &Path) -> Result<Self> {
    let (tx, rx) = mpsc::channel();

    let mut debouncer = new_debouncer(DEBOUNCE_WINDOW, move |result| match result {
      Ok(events) => {
        let changed: Vec<PathBuf> = events
          .into_iter()
          .filter(|e: &notify_debouncer_mini::DebouncedEvent| e.kind == DebouncedEventKind::Any)
          .map(|e| e.path)
          .collect();
        if !changed.is_empty() {
          let _ = tx.send(RestartRequest { changed });
        }
      }
      Err(_err) => {
        // The watcher itself failing isn't load-bearing: dev mode simply
        // stops getting restart requests until the runtime restarts fresh.
      }
    })
    .map_err(|err| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string())))?;

    debouncer
      .watcher()
      .watch(main_script, RecursiveMode::NonRecursive)
      .map_err(|err| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string())))?;

    Ok(FileWatcher { debouncer, events: rx, watched: vec![main_script.to_path_buf()] })
  }

  /// Adds a module file discovered after the watcher was created (the
  /// module loader registers files as imports are resolved, which happens
  /// after the initial watch is set up).
  pub fn watch_additional(&mut self, path: &Path) -> Result<()> {
    if self.watched.iter().any(|p| p == path) {
      return Ok(());
    }
    self
      .debouncer
      .watcher()
      .watch(path, RecursiveMode::NonRecursive)
      .map_err(|err| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string())))?;
    self.watched.push(path.to_path_buf());
    Ok(())
  }

  /// Non-blocking: returns a coalesced restart request if one has arrived.
  pub fn poll_restart(&self) -> Option<RestartRequest> {
    self.events.try_recv().ok()
  }
}

/// Runtime-facing state machine for the JS-error overlay (§4.9 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevModeState {
  Running,
  /// A script error occurred; the chrome window keeps rendering the error
  /// overlay but user callbacks (`on_update`, event dispatch) are suppressed
  /// until the next successful restart.
  ShowingError,
}

impl DevModeState {
  pub fn suppresses_user_callbacks(self) -> bool {
    matches!(self, DevModeState::ShowingError)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dev_mode_state_suppresses_callbacks_only_in_error() {
    assert!(!DevModeState::Running.suppresses_user_callbacks());
    assert!(DevModeState::ShowingError.suppresses_user_callbacks());
  }

  #[test]
  fn watcher_reports_no_restart_with_no_changes() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("main.js");
    std::fs::write(&script, "// empty").unwrap();
    let watcher = FileWatcher::new(&script).unwrap();
    assert!(watcher.poll_restart().is_none());
  }

  #[test]
  fn watcher_coalesces_a_saved_file_into_one_restart() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("main.js");
    std::fs::write(&script, "// empty").unwrap();
    let watcher = FileWatcher::new(&script).unwrap();

    // Simulate an editor doing several quick writes on save.
    for _ in 0..3 {
      std::fs::write(&script, "// changed").unwrap();
      std::thread::sleep(Duration::from_millis(10));
    }
    std::thread::sleep(DEBOUNCE_WINDOW * 3);

    let request = watcher.poll_restart();
    assert!(request.is_some());
    assert!(watcher.poll_restart().is_none());
  }
}
