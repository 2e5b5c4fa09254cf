// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The parallel worker pool (§4.2).
//!
//! A `Task` is type-erased at the point it's executed: the generic success
//! value only has to survive long enough to be handed to its own
//! continuation, so the boxed work closure returns a `Completion` — a
//! closure of no arguments — rather than leaking its `Out` type into the
//! queue's own types. This is what lets `WorkQueue` hold a single
//! `VecDeque<Completion>` instead of needing an enum per task shape.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// A unit of work already bound to its own success/failure continuations.
pub struct Task {
  work: Box<dyn FnOnce() -> Completion + Send>,
}

impl Task {
  /// `work` runs on a worker thread; whichever of `on_success`/`on_failure`
  /// matches its result later runs on the main thread, in FIFO dequeue order
  /// relative to other completions (§4.2).
  pub fn new<Out, F, S, Fl>(work: F, on_success: S, on_failure: Fl) -> Task
  where
    Out: Send + 'static,
    F: FnOnce() -> Result<Out> + Send + 'static,
    S: FnOnce(Out) + Send + 'static,
    Fl: FnOnce(Error) + Send + 'static,
  {
    Task {
      work: Box::new(move || match work() {
        Ok(out) => Completion { apply: Box::new(move || on_success(out)) },
        Err(err) => Completion { apply: Box::new(move || on_failure(err)) },
      }),
    }
  }
}

/// A finished task, ready to be applied on the main thread.
pub struct Completion {
  apply: Box<dyn FnOnce() + Send>,
}

impl Completion {
  pub fn apply(self) {
    (self.apply)()
  }
}

struct Shared {
  pending: Mutex<VecDeque<Task>>,
  pending_cv: Condvar,
  close: AtomicBool,
}

/// A fixed pool of worker threads draining a shared pending queue, pushing
/// completions onto a done-queue the main thread later drains in FIFO order
/// (§4.2, §5 "the done-queue is the single synchronization point").
pub struct WorkQueue {
  shared: Arc<Shared>,
  done: Arc<Mutex<VecDeque<Completion>>>,
  handles: Vec<JoinHandle<()>>,
}

impl WorkQueue {
  /// `wake` is called from a worker thread every time a completion is
  /// pushed; the runtime context wires it to the reactor's dummy-async-event
  /// mechanism so the Event Loop Driver wakes up (§4.1, §4.2).
  pub fn new(worker_count: usize, wake: impl Fn() + Send + Sync + 'static) -> Self {
    let shared = Arc::new(Shared {
      pending: Mutex::new(VecDeque::new()),
      pending_cv: Condvar::new(),
      close: AtomicBool::new(false),
    });
    let done: Arc<Mutex<VecDeque<Completion>>> = Arc::new(Mutex::new(VecDeque::new()));
    let wake = Arc::new(wake);

    let handles = (0..worker_count.max(1))
      .map(|_| {
        let shared = shared.clone();
        let done = done.clone();
        let wake = wake.clone();
        std::thread::spawn(move || worker_loop(shared, done, wake))
      })
      .collect();

    WorkQueue { shared, done, handles }
  }

  pub fn submit(&self, task: Task) {
    let mut pending = self.shared.pending.lock();
    pending.push_back(task);
    self.shared.pending_cv.notify_one();
  }

  /// `processDone` (§4.2): removes and returns every completion currently
  /// queued, in FIFO dequeue order. The caller applies them on the main
  /// thread.
  pub fn drain_completions(&self) -> Vec<Completion> {
    let mut done = self.done.lock();
    done.drain(..).collect()
  }

  pub fn pending_count(&self) -> usize {
    self.shared.pending.lock().len()
  }

  /// Shutdown step 2 (§4.10): set every worker's close flag and wake them.
  pub fn request_close(&self) {
    self.shared.close.store(true, Ordering::SeqCst);
    self.shared.pending_cv.notify_all();
  }

  /// Shutdown step 4 (§4.10): block until every worker thread has exited.
  /// Must be called after `request_close`; any outstanding work still runs
  /// to completion first (§5 "there is no in-flight task cancellation").
  pub fn join(mut self) {
    for handle in self.handles.drain(..) {
      let _ = handle.join();
    }
  }
}

impl Drop for WorkQueue {
  fn drop(&mut self) {
    self.request_close();
    for handle in self.handles.drain(..) {
      let _ = handle.join();
    }
  }
}

fn worker_loop(shared: Arc<Shared>, done: Arc<Mutex<VecDeque<Completion>>>, wake: Arc<dyn Fn() + Send + Sync>) {
  loop {
    let task = {
      let mut pending = shared.pending.lock();
      loop {
        if let Some(task) = pending.pop_front() {
          break Some(task);
        }
        if shared.close.load(Ordering::SeqCst) {
          break None;
        }
        shared.pending_cv.wait(&mut pending);
      }
    };
    let Some(task) = task else { break };
    let completion = (task.work)();
    done.lock().push_back(completion);
    wake();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[test]
  fn success_path_runs_on_success_continuation() {
    let wake_count = Arc::new(AtomicUsize::new(0));
    let wake_count2 = wake_count.clone();
    let queue = WorkQueue::new(2, move || {
      wake_count2.fetch_add(1, Ordering::SeqCst);
    });

    let result = Arc::new(Mutex::new(None));
    let result2 = result.clone();
    queue.submit(Task::new(
      || Ok::<_, Error>(41 + 1),
      move |out: i32| *result2.lock() = Some(out),
      |_err| unreachable!("task should not fail"),
    ));

    // Wait for the worker to push a completion.
    let mut completions = Vec::new();
    while completions.is_empty() {
      completions = queue.drain_completions();
      if completions.is_empty() {
        std::thread::yield_now();
      }
    }
    for completion in completions {
      completion.apply();
    }
    assert_eq!(*result.lock(), Some(42));
    assert!(wake_count.load(Ordering::SeqCst) >= 1);
  }

  #[test]
  fn failure_path_runs_on_failure_continuation() {
    let queue = WorkQueue::new(1, || {});
    let result = Arc::new(Mutex::new(None));
    let result2 = result.clone();
    queue.submit(Task::new(
      || Err::<i32, _>(Error::Panic("boom".into())),
      |_out| unreachable!("task should not succeed"),
      move |err| *result2.lock() = Some(err.to_string()),
    ));

    let mut completions = Vec::new();
    while completions.is_empty() {
      completions = queue.drain_completions();
      if completions.is_empty() {
        std::thread::yield_now();
      }
    }
    for completion in completions {
      completion.apply();
    }
    assert_eq!(result.lock().as_deref(), Some("internal panic: boom"));
  }
}
