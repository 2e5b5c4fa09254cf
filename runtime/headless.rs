// Copyright 2018-2026 the Cosmic authors. MIT license.

//! Minimal non-test stand-ins for the windowing and reactor collaborators
//! (§6, §1 "Out of scope: graphics/window/audio backends, platform
//! sockets"). A real embedding links its own `WindowBackend`/`Reactor`
//! against a real windowing toolkit and I/O multiplexer; these exist so the
//! CLI binary has something to construct a [`crate::Runtime`] with when no
//! such embedding is present — e.g. running a script that performs no
//! window or socket I/O, which covers the `test` subcommand and most `run`
//! scripts exercised in this repository's own test suite.

use std::time::Duration;

use crate::error::Result;
use crate::reactor::{Reactor, ReactorHandle};
use crate::window::{NativeEvent, WindowBackend};

/// A `WindowBackend` that never reports a window being opened and never
/// produces events. `run` against a script that opens no window exits
/// through the "drain events until idle" path (§6).
#[derive(Default)]
pub struct HeadlessWindowBackend;

impl WindowBackend for HeadlessWindowBackend {
  fn open(&mut self, _title: &str, _width: u32, _height: u32) -> Result<()> {
    Ok(())
  }
  fn close(&mut self) {}
  fn poll_events(&mut self) -> Vec<NativeEvent> {
    Vec::new()
  }
  fn swap_buffers(&mut self) {}
  fn set_title(&mut self, _title: &str) {}
}

/// A `Reactor` with no backing I/O multiplexer: nothing ever becomes
/// pending, so the poller thread only ever times out and the shutdown
/// sequence's reactor-drain step is a no-op.
#[derive(Default)]
pub struct NullReactor {
  next_id: u64,
}

impl Reactor for NullReactor {
  fn register(&mut self) -> ReactorHandle {
    let id = self.next_id;
    self.next_id += 1;
    id
  }
  fn backend_descriptor(&self) -> i64 {
    -1
  }
  fn timeout(&self) -> Duration {
    Duration::from_millis(200)
  }
  fn run_nonblocking(&mut self) -> Result<()> {
    Ok(())
  }
  fn has_pending_work(&self) -> bool {
    false
  }
  fn open_handles(&self) -> Vec<ReactorHandle> {
    Vec::new()
  }
  fn is_closing(&self, _handle: ReactorHandle) -> bool {
    true
  }
  fn close_handle(&mut self, _handle: ReactorHandle) {}
  fn wake(&mut self) {}
  fn close(&mut self) -> Result<()> {
    Ok(())
  }
}
