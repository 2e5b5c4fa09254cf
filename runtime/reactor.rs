// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The reactor seam (§6 "External collaborator interfaces", §4.1).
//!
//! Platform sockets and the OS event-multiplexing primitive are out of scope
//! (§1); `Reactor` is the narrow trait the poller thread and the event loop
//! driver depend on. The real implementation (epoll/kqueue/IOCP) lives
//! behind this trait in the embedding application; [`reactor_poller`] only
//! needs `backend_descriptor` and `timeout` to know how to block.

use std::time::Duration;

use crate::error::Result;

pub type ReactorHandle = u64;

/// A single unit of reactor-driven work (§4.10: "walk every live reactor
/// handle and close any not already closing").
pub trait Reactor: Send {
  /// Registers a new unit of pending work, returning a handle id.
  fn register(&mut self) -> ReactorHandle;

  /// The OS descriptor or handle value the poller thread blocks on.
  /// Interpreted by [`reactor_poller`] according to the target platform.
  fn backend_descriptor(&self) -> i64;

  /// How long the poller should block before re-checking its close flag.
  fn timeout(&self) -> Duration;

  /// Runs one non-blocking pass over ready work, invoking native callbacks.
  fn run_nonblocking(&mut self) -> Result<()>;

  fn has_pending_work(&self) -> bool;

  /// Ids of handles that are registered and not yet closing.
  fn open_handles(&self) -> Vec<ReactorHandle>;

  fn is_closing(&self, handle: ReactorHandle) -> bool;

  fn close_handle(&mut self, handle: ReactorHandle);

  /// Posts a dummy async event so a thread blocked on `backend_descriptor`
  /// wakes immediately (§4.1, §4.10 step 1).
  fn wake(&mut self);

  /// Stops accepting new registrations. Returns an error carrying the
  /// number of handles still open if any remain (§4.10 step 3, §7
  /// `ReactorBusy`).
  fn close(&mut self) -> Result<()>;
}

/// Lets the runtime context hold a boxed reactor collaborator while still
/// handing it to [`crate::reactor_poller::ReactorPoller::spawn`], which is
/// generic over a concrete `Reactor` rather than a trait object.
impl Reactor for Box<dyn Reactor> {
  fn register(&mut self) -> ReactorHandle {
    (**self).register()
  }
  fn backend_descriptor(&self) -> i64 {
    (**self).backend_descriptor()
  }
  fn timeout(&self) -> Duration {
    (**self).timeout()
  }
  fn run_nonblocking(&mut self) -> Result<()> {
    (**self).run_nonblocking()
  }
  fn has_pending_work(&self) -> bool {
    (**self).has_pending_work()
  }
  fn open_handles(&self) -> Vec<ReactorHandle> {
    (**self).open_handles()
  }
  fn is_closing(&self, handle: ReactorHandle) -> bool {
    (**self).is_closing(handle)
  }
  fn close_handle(&mut self, handle: ReactorHandle) {
    (**self).close_handle(handle)
  }
  fn wake(&mut self) {
    (**self).wake()
  }
  fn close(&mut self) -> Result<()> {
    (**self).close()
  }
}

/// A test double with no real I/O, used to exercise the event loop driver
/// and shutdown sequence deterministically (§6).
#[cfg(test)]
pub struct FakeReactor {
  next_id: u64,
  handles: std::collections::HashMap<ReactorHandle, bool>,
  pub wake_count: u32,
  pub nonblocking_runs: u32,
}

#[cfg(test)]
impl FakeReactor {
  pub fn new() -> Self {
    FakeReactor { next_id: 0, handles: std::collections::HashMap::new(), wake_count: 0, nonblocking_runs: 0 }
  }
}

#[cfg(test)]
impl Default for FakeReactor {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
impl Reactor for FakeReactor {
  fn register(&mut self) -> ReactorHandle {
    let id = self.next_id;
    self.next_id += 1;
    self.handles.insert(id, false);
    id
  }

  fn backend_descriptor(&self) -> i64 {
    -1
  }

  fn timeout(&self) -> Duration {
    Duration::from_millis(50)
  }

  fn run_nonblocking(&mut self) -> Result<()> {
    self.nonblocking_runs += 1;
    Ok(())
  }

  fn has_pending_work(&self) -> bool {
    !self.handles.is_empty()
  }

  fn open_handles(&self) -> Vec<ReactorHandle> {
    self.handles.keys().copied().collect()
  }

  fn is_closing(&self, handle: ReactorHandle) -> bool {
    self.handles.get(&handle).copied().unwrap_or(false)
  }

  fn close_handle(&mut self, handle: ReactorHandle) {
    self.handles.remove(&handle);
  }

  fn wake(&mut self) {
    self.wake_count += 1;
  }

  fn close(&mut self) -> Result<()> {
    if self.handles.is_empty() {
      Ok(())
    } else {
      Err(crate::error::Error::ReactorBusy(self.handles.len()))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn register_and_close_handle_tracks_open_set() {
    let mut reactor = FakeReactor::new();
    let a = reactor.register();
    let b = reactor.register();
    assert_eq!(reactor.open_handles().len(), 2);
    reactor.close_handle(a);
    assert_eq!(reactor.open_handles(), vec![b]);
  }

  #[test]
  fn close_refuses_while_handles_remain() {
    let mut reactor = FakeReactor::new();
    reactor.register();
    assert!(matches!(reactor.close(), Err(crate::error::Error::ReactorBusy(1))));
    reactor.close_handle(0);
    assert!(reactor.close().is_ok());
  }
}
