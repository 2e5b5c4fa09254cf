// Copyright 2018-2026 the Cosmic authors. MIT license.

//! Native functions exposed to script (§4.2, §4.5 integration example).
//!
//! `op_cosmic_read_file` is the canonical async-native-call shape (scenario
//! S1, §8): it allocates a promise, stashes the resolver in the Promise
//! Registry, and submits a closure to the Work Queue. The task's
//! continuations can't touch `v8` directly — they run on a worker thread's
//! `Completion`, which must be `Send`, and `v8` handles aren't — so they
//! only push a plain `Vec<u8>`/`Error` outcome onto [`PendingResolutions`].
//! The runtime context drains that queue against a real `v8::HandleScope`
//! as part of draining worker completions (§4.8 step 4).
//!
//! `op_cosmic_register_test` feeds the separate [`IsolatedTestRegistry`],
//! which the runtime context drains after the main script's top-level
//! evaluation completes (§3 "Isolated Test", §6 `test` contract).
//!
//! `op_cosmic_window_set_callback` stashes a per-window event callback
//! directly on the resource table's `WindowResource` payload, so dispatch
//! (§4.8 step 1) needs no registry of its own.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use deno_core::{op2, v8, Extension, OpState};

use crate::context::WindowResource;
use crate::error::Error;
use crate::promise_registry::PromiseRegistry;
use crate::resource_table::ResourceTable;
use crate::weak_handle_table::WeakHandleTable;
use crate::work_queue::{Task, WorkQueue};

pub struct PendingResolution {
  pub promise_id: u32,
  pub outcome: Result<Vec<u8>, Error>,
}

/// A `Send`-safe mailbox for task outcomes awaiting an actual promise
/// resolution against the script engine (which only the main thread, inside
/// a `v8::HandleScope`, may touch).
#[derive(Clone, Default)]
pub struct PendingResolutions(Arc<Mutex<VecDeque<PendingResolution>>>);

impl PendingResolutions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, promise_id: u32, outcome: Result<Vec<u8>, Error>) {
    self.0.lock().unwrap().push_back(PendingResolution { promise_id, outcome });
  }

  pub fn drain(&self) -> Vec<PendingResolution> {
    self.0.lock().unwrap().drain(..).collect()
  }
}

/// Reads a file on a worker thread and resolves the returned promise with
/// its bytes (scenario S1, §8).
#[op2]
fn op_cosmic_read_file<'s>(
  scope: &mut v8::HandleScope<'s>,
  state: &mut OpState,
  #[string] path: String,
) -> Result<v8::Local<'s, v8::Value>, Error> {
  let resolver = v8::PromiseResolver::new(scope)
    .ok_or_else(|| Error::Panic("failed to allocate a promise resolver".into()))?;
  let promise = resolver.get_promise(scope);
  let global_resolver = v8::Global::new(scope, resolver);

  let promise_id = state.borrow::<Rc<RefCell<PromiseRegistry>>>().borrow_mut().add(global_resolver);
  let pending_success = state.borrow::<PendingResolutions>().clone();
  let pending_failure = pending_success.clone();
  let work_queue = state.borrow::<Rc<WorkQueue>>().clone();

  work_queue.submit(Task::new(
    move || std::fs::read(&path).map_err(Error::Io),
    move |bytes: Vec<u8>| pending_success.push(promise_id, Ok(bytes)),
    move |err| pending_failure.push(promise_id, Err(err)),
  ));

  Ok(promise.into())
}

/// A deferred test registered via `op_cosmic_register_test` (§3 "Isolated
/// Test"): run sequentially, in registration order, after the main
/// script's top-level evaluation completes (§6 `test` contract).
pub struct IsolatedTest {
  pub name: String,
  pub script_fn: v8::Global<v8::Function>,
}

/// Holds every isolated test a script has registered so far. Drained by
/// `Runtime::run_isolated_tests`, which owns actually calling each
/// `script_fn` and awaiting its promise (that needs a live `HandleScope`,
/// which this registry — reachable from worker threads via `OpState` —
/// deliberately never touches).
#[derive(Default)]
pub struct IsolatedTestRegistry {
  tests: Vec<IsolatedTest>,
}

impl IsolatedTestRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, name: String, script_fn: v8::Global<v8::Function>) {
    self.tests.push(IsolatedTest { name, script_fn });
  }

  pub fn take_all(&mut self) -> Vec<IsolatedTest> {
    std::mem::take(&mut self.tests)
  }
}

/// Registers a deferred test (§3 "Isolated Test", §6 `test` contract). The
/// function itself isn't called here — only stashed — so registration
/// order is preserved regardless of where in the module graph it happens.
#[op2]
fn op_cosmic_register_test(
  scope: &mut v8::HandleScope,
  state: &mut OpState,
  #[string] name: String,
  func: v8::Local<v8::Function>,
) {
  let global = v8::Global::new(scope, func);
  state.borrow::<Rc<RefCell<IsolatedTestRegistry>>>().borrow_mut().register(name, global);
}

/// Registers a per-window callback invoked by `dispatch_event` for every
/// native event dispatched to that window (§4.8 step 1 "dispatch through
/// per-window callbacks via the Value Bridge"). Replaces any previously
/// registered callback for the same id.
#[op2]
fn op_cosmic_window_set_callback(
  scope: &mut v8::HandleScope,
  state: &mut OpState,
  id: u32,
  func: v8::Local<v8::Function>,
) -> Result<(), Error> {
  let global = v8::Global::new(scope, func);
  let resources = state.borrow::<Rc<RefCell<ResourceTable>>>().clone();
  let mut resources = resources.borrow_mut();
  let window = resources
    .get_mut(id)?
    .as_any_mut()
    .downcast_mut::<WindowResource>()
    .ok_or_else(|| Error::CantConvert(format!("resource {id} is not a window")))?;
  window.on_event = Some(global);
  Ok(())
}

/// Script-driven teardown of a resource handle (e.g. closing a window
/// explicitly rather than waiting on GC) — runs `start_deinit` only; the
/// slot itself is freed later from the finalizer (§4.3 invariant 3).
#[op2(fast)]
fn op_cosmic_resource_start_deinit(state: &mut OpState, id: u32) -> Result<(), Error> {
  state.borrow::<Rc<RefCell<ResourceTable>>>().borrow_mut().start_deinit(id)
}

/// Explicit native-side deinit of a weak handle (§4.4).
#[op2(fast)]
fn op_cosmic_weak_handle_deinit(state: &mut OpState, id: u32) -> Result<(), Error> {
  state.borrow::<Rc<RefCell<WeakHandleTable>>>().borrow_mut().explicit_deinit(id)
}

/// Structured logging bridge for script-originated log lines, routed
/// through the ambient `log` facade rather than stdout directly so it
/// participates in the same level filtering and tty colorization as native
/// log lines.
#[op2(fast)]
fn op_cosmic_log(#[smi] level: i32, #[string] message: &str) {
  match level {
    0 => log::error!(target: "script", "{message}"),
    1 => log::warn!(target: "script", "{message}"),
    2 => log::info!(target: "script", "{message}"),
    _ => log::debug!(target: "script", "{message}"),
  }
}

/// Bundles every native function exposed to script into one `deno_core`
/// extension.
pub fn cosmic_ops() -> Extension {
  Extension {
    name: "cosmic",
    ops: vec![
      op_cosmic_read_file(),
      op_cosmic_register_test(),
      op_cosmic_window_set_callback(),
      op_cosmic_resource_start_deinit(),
      op_cosmic_weak_handle_deinit(),
      op_cosmic_log(),
    ]
    .into(),
    ..Default::default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pending_resolutions_drains_in_push_order() {
    let pending = PendingResolutions::new();
    pending.push(1, Ok(vec![0x61, 0x62]));
    pending.push(2, Err(Error::Panic("boom".into())));

    let drained = pending.drain();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].promise_id, 1);
    assert!(drained[0].outcome.is_ok());
    assert_eq!(drained[1].promise_id, 2);
    assert!(drained[1].outcome.is_err());
    assert!(pending.drain().is_empty());
  }
}
