// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The event loop driver (§4.8).
//!
//! This module only encodes the *shape* of the run step — poll, check
//! termination, frame, conditionally drain — against a narrow [`EventLoopHost`]
//! trait. The runtime context implements that trait by wiring in the real
//! script engine, tables, and collaborators; tests here use a host double
//! that just counts calls, which is enough to pin down step ordering.

use std::time::Duration;

use crate::window::NativeEvent;

/// Everything the driver needs from the runtime context to run one step.
/// Draining order within step 4 is contractual (§4.8): worker completions,
/// then the reactor, then microtasks.
pub trait EventLoopHost {
  fn poll_window_events(&mut self) -> Vec<(u32, NativeEvent)>;
  fn dispatch_event(&mut self, window_id: u32, event: NativeEvent);

  fn window_count(&self) -> u32;
  fn uncaught_exception_received(&self) -> bool;
  fn dev_mode(&self) -> bool;
  fn restart_requested(&self) -> bool;

  /// Runs one frame per open window, returning each window's requested
  /// delay before its next frame (§4.8 step 3: "use the minimum frame delay
  /// across them").
  fn frame_step(&mut self) -> Vec<Duration>;

  /// Takes and clears the poller's wakeup signal.
  fn poller_signaled(&mut self) -> bool;

  fn drain_worker_completions(&mut self);
  fn run_reactor_nonblocking(&mut self);
  fn drain_microtasks(&mut self);
}

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
  NoWindowsRemain,
  UncaughtException,
  RestartRequested,
}

/// Runs the top-level loop until a termination condition is met (§4.8).
pub fn run(host: &mut impl EventLoopHost) -> ExitReason {
  loop {
    for (window_id, event) in host.poll_window_events() {
      host.dispatch_event(window_id, event);
    }

    if host.window_count() == 0 {
      return ExitReason::NoWindowsRemain;
    }
    if host.uncaught_exception_received() && !host.dev_mode() {
      return ExitReason::UncaughtException;
    }
    if host.restart_requested() {
      return ExitReason::RestartRequested;
    }

    let delays = host.frame_step();
    if let Some(&min_delay) = delays.iter().min() {
      if !min_delay.is_zero() {
        std::thread::sleep(min_delay);
      }
    }

    if host.poller_signaled() {
      host.drain_worker_completions();
      host.run_reactor_nonblocking();
      host.drain_microtasks();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use std::rc::Rc;

  #[derive(Default)]
  struct Calls {
    dispatched: Vec<(u32, NativeEvent)>,
    drain_order: Vec<&'static str>,
  }

  struct TestHost {
    calls: Rc<RefCell<Calls>>,
    events: Vec<(u32, NativeEvent)>,
    window_count: u32,
    uncaught: bool,
    dev_mode: bool,
    restart: bool,
    poller_signaled: bool,
    frames_run: u32,
  }

  impl EventLoopHost for TestHost {
    fn poll_window_events(&mut self) -> Vec<(u32, NativeEvent)> {
      std::mem::take(&mut self.events)
    }

    fn dispatch_event(&mut self, window_id: u32, event: NativeEvent) {
      self.calls.borrow_mut().dispatched.push((window_id, event));
    }

    fn window_count(&self) -> u32 {
      self.window_count
    }

    fn uncaught_exception_received(&self) -> bool {
      self.uncaught
    }

    fn dev_mode(&self) -> bool {
      self.dev_mode
    }

    fn restart_requested(&self) -> bool {
      self.restart
    }

    fn frame_step(&mut self) -> Vec<Duration> {
      self.frames_run += 1;
      // Window count drops to zero after a couple of frames to end the test.
      if self.frames_run >= 2 {
        self.window_count = 0;
      }
      vec![Duration::from_millis(0)]
    }

    fn poller_signaled(&mut self) -> bool {
      std::mem::take(&mut self.poller_signaled)
    }

    fn drain_worker_completions(&mut self) {
      self.calls.borrow_mut().drain_order.push("worker");
    }

    fn run_reactor_nonblocking(&mut self) {
      self.calls.borrow_mut().drain_order.push("reactor");
    }

    fn drain_microtasks(&mut self) {
      self.calls.borrow_mut().drain_order.push("microtasks");
    }
  }

  #[test]
  fn terminates_when_window_count_reaches_zero() {
    let calls = Rc::new(RefCell::new(Calls::default()));
    let mut host = TestHost {
      calls: calls.clone(),
      events: vec![(0, NativeEvent::Close)],
      window_count: 1,
      uncaught: false,
      dev_mode: false,
      restart: false,
      poller_signaled: true,
      frames_run: 0,
    };
    let reason = run(&mut host);
    assert_eq!(reason, ExitReason::NoWindowsRemain);
    assert_eq!(calls.borrow().dispatched, vec![(0, NativeEvent::Close)]);
  }

  #[test]
  fn drains_in_contractual_order_when_poller_signals() {
    let calls = Rc::new(RefCell::new(Calls::default()));
    let mut host = TestHost {
      calls: calls.clone(),
      events: vec![],
      window_count: 1,
      uncaught: false,
      dev_mode: false,
      restart: false,
      poller_signaled: true,
      frames_run: 0,
    };
    run(&mut host);
    assert_eq!(calls.borrow().drain_order[..3], ["worker", "reactor", "microtasks"]);
  }

  #[test]
  fn uncaught_exception_only_terminates_outside_dev_mode() {
    let calls = Rc::new(RefCell::new(Calls::default()));
    let mut host = TestHost {
      calls,
      events: vec![],
      window_count: 1,
      uncaught: true,
      dev_mode: false,
      restart: false,
      poller_signaled: false,
      frames_run: 0,
    };
    assert_eq!(run(&mut host), ExitReason::UncaughtException);
  }

  #[test]
  fn restart_requested_terminates_the_loop() {
    let calls = Rc::new(RefCell::new(Calls::default()));
    let mut host = TestHost {
      calls,
      events: vec![],
      window_count: 1,
      uncaught: false,
      dev_mode: true,
      restart: true,
      poller_signaled: false,
      frames_run: 0,
    };
    assert_eq!(run(&mut host), ExitReason::RestartRequested);
  }
}
