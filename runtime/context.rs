// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The runtime context (§4.8 "Runtime", §4.10 "Shutdown Sequence").
//!
//! Owns every table, the script engine, the worker pool and the reactor
//! poller. This is the only module that holds a live `deno_core::JsRuntime`;
//! everything else in the crate is plain data the context wires together.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use deno_core::{v8, ModuleLoader, ModuleSpecifier, PollEventLoopOptions, RuntimeOptions};
use parking_lot::Mutex;

use crate::dev_mode::{DevModeState, FileWatcher};
use crate::error::{Error, Result};
use crate::event_loop::{self, EventLoopHost, ExitReason};
use crate::module_loader::CosmicModuleLoader;
use crate::ops;
use crate::promise_registry::PromiseRegistry;
use crate::reactor::Reactor;
use crate::reactor_poller::{ReactorPoller, WakeupEvent};
use crate::resource_table::{NativeResource, ResourceTable, ResourceTag};
use crate::value_bridge::{RecordTemplates, ToScript};
use crate::weak_handle_table::WeakHandleTable;
use crate::window::{NativeEvent, WindowBackend};
use crate::work_queue::WorkQueue;
use crate::BootstrapOptions;

/// A window's script-facing resource payload. Its native window lives in
/// `Runtime::window_backend`, not here; `start_deinit` is a no-op because
/// the (currently single, dev-mode chrome) window is only ever torn down by
/// closing the whole process, never by script (§4.9 invariant: restart
/// preserves the chrome window's OS handle).
///
/// `on_event` is the per-window callback registered via
/// `op_cosmic_window_set_callback`, invoked by `dispatch_event` for every
/// native event this window receives (§4.8 step 1).
pub(crate) struct WindowResource {
  pub(crate) on_event: Option<v8::Global<v8::Function>>,
}

impl WindowResource {
  fn new() -> Self {
    WindowResource { on_event: None }
  }
}

impl NativeResource for WindowResource {
  fn tag(&self) -> crate::resource_table::ResourceTag {
    ResourceTag::Window
  }
  fn start_deinit(&mut self) {}
  fn as_any(&self) -> &dyn std::any::Any {
    self
  }
  fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
    self
  }
}

/// Dev-mode-only state: the file watcher and the chrome window's current
/// resource-table id (re-registered fresh on every restart, §4.9 step 3).
struct DevRuntimeState {
  file_watcher: FileWatcher,
  chrome_window_resource_id: u32,
}

/// Process-singleton owner of the script engine and every table (§3
/// "Runtime"). Lifecycle: `new` (init) → `load_main_script` (enter) →
/// `run` → `shutdown` (exit/deinit).
pub struct Runtime {
  js_runtime: deno_core::JsRuntime,
  module_loader: Rc<CosmicModuleLoader>,
  resources: Rc<RefCell<ResourceTable>>,
  weak_handles: Rc<RefCell<WeakHandleTable>>,
  promises: Rc<RefCell<PromiseRegistry>>,
  pending_resolutions: ops::PendingResolutions,
  isolated_tests: Rc<RefCell<ops::IsolatedTestRegistry>>,
  window_backend: Box<dyn WindowBackend>,
  reactor: Arc<Mutex<Box<dyn Reactor>>>,
  poller: Option<ReactorPoller>,
  main_wakeup: Arc<WakeupEvent>,
  work_queue: Option<Rc<WorkQueue>>,
  options: BootstrapOptions,
  uncaught_exception: bool,
  dev_mode_state: DevModeState,
  restart_requested: bool,
  dev_runtime: Option<DevRuntimeState>,
  tokio_rt: tokio::runtime::Runtime,
}

impl Runtime {
  pub fn new(
    options: BootstrapOptions,
    mut window_backend: Box<dyn WindowBackend>,
    reactor: Box<dyn Reactor>,
  ) -> Result<Self> {
    ignore_sigpipe();

    let module_loader = Rc::new(CosmicModuleLoader::new());
    let resources = Rc::new(RefCell::new(ResourceTable::new()));
    let weak_handles = Rc::new(RefCell::new(WeakHandleTable::new()));
    let promises = Rc::new(RefCell::new(PromiseRegistry::new()));
    let pending_resolutions = ops::PendingResolutions::new();
    let isolated_tests = Rc::new(RefCell::new(ops::IsolatedTestRegistry::new()));

    let main_wakeup = Arc::new(WakeupEvent::new());
    let reactor: Arc<Mutex<Box<dyn Reactor>>> = Arc::new(Mutex::new(reactor));
    let poller = ReactorPoller::spawn(reactor.clone(), main_wakeup.clone());

    let reactor_for_wake = reactor.clone();
    let wake_for_queue = main_wakeup.clone();
    let work_queue = Rc::new(WorkQueue::new(options.worker_count, move || {
      reactor_for_wake.lock().wake();
      wake_for_queue.set();
    }));

    let mut js_runtime = deno_core::JsRuntime::new(RuntimeOptions {
      module_loader: Some(module_loader.clone() as Rc<dyn ModuleLoader>),
      extensions: vec![ops::cosmic_ops()],
      ..Default::default()
    });

    {
      let op_state = js_runtime.op_state();
      let mut op_state = op_state.borrow_mut();
      op_state.put(resources.clone());
      op_state.put(weak_handles.clone());
      op_state.put(promises.clone());
      op_state.put(pending_resolutions.clone());
      op_state.put(work_queue.clone());
      op_state.put(isolated_tests.clone());
    }
    RecordTemplates::new().register_all(&mut js_runtime.handle_scope());

    let tokio_rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    // Dev mode creates a chrome window up front and watches the main script
    // (§4.9). The watcher additionally picks up every file the module loader
    // registers as imports resolve, so edits to imported modules restart too.
    let dev_runtime = if options.dev_mode {
      window_backend.open("Cosmic (dev)", 1280, 720)?;
      let (chrome_window_resource_id, _) =
        resources.borrow_mut().create(ResourceTag::Window, Box::new(WindowResource::new()));
      Some(DevRuntimeState {
        file_watcher: FileWatcher::new(&options.script_path)?,
        chrome_window_resource_id,
      })
    } else {
      None
    };

    Ok(Runtime {
      js_runtime,
      module_loader,
      resources,
      weak_handles,
      promises,
      pending_resolutions,
      isolated_tests,
      window_backend,
      reactor,
      poller: Some(poller),
      main_wakeup,
      work_queue: Some(work_queue),
      options,
      uncaught_exception: false,
      dev_mode_state: DevModeState::Running,
      restart_requested: false,
      dev_runtime,
      tokio_rt,
    })
  }

  /// Compiles, instantiates and evaluates the main script as a module
  /// (§4.7). Evaluation failures are captured as a stack trace and returned
  /// as [`Error::MainScriptError`], fatal per §7.
  pub fn load_main_script(&mut self, path: &Path) -> Result<()> {
    let specifier = ModuleSpecifier::from_file_path(path)
      .map_err(|_| Error::CantConvert(format!("not an absolute path: {}", path.display())))?;

    let js_runtime = &mut self.js_runtime;
    let load_result: std::result::Result<(), deno_core::error::CoreError> = self.tokio_rt.block_on(async {
      let module_id = js_runtime.load_main_es_module(&specifier).await?;
      let mut receiver = js_runtime.mod_evaluate(module_id);
      tokio::select! {
        biased;
        maybe_result = &mut receiver => maybe_result,
        event_loop_result = js_runtime.run_event_loop(PollEventLoopOptions::default()) => {
          event_loop_result?;
          receiver.await
        }
      }
    });

    load_result.map_err(|err| Error::MainScriptError {
      specifier: specifier.to_string(),
      message: err.to_string(),
      stack: String::new(),
    })?;

    if let Some(dev) = &mut self.dev_runtime {
      for path in self.module_loader.loaded_file_paths() {
        let _ = dev.file_watcher.watch_additional(&path);
      }
    }
    Ok(())
  }

  /// Runs the top-level loop until a termination condition is met (§4.8),
  /// transparently handling dev-mode restarts in between runs (§4.9) so only
  /// a final, non-restart termination is ever returned to the caller.
  pub fn run(&mut self) -> ExitReason {
    loop {
      let reason = event_loop::run(self);
      if !matches!(reason, ExitReason::RestartRequested) {
        return reason;
      }
      if let Err(err) = self.restart() {
        log::error!("dev-mode restart failed: {err}");
        self.enter_error_state();
        self.restart_requested = false;
      }
    }
  }

  /// Tears down and rebuilds every piece of script-engine-facing state,
  /// preserving the chrome window's OS handle and re-registering it as a new
  /// resource (§4.9 steps 1-3). The reactor, its poller thread, and the
  /// worker pool are infrastructure, not script state, and survive a restart
  /// unchanged.
  fn restart(&mut self) -> Result<()> {
    let module_loader = Rc::new(CosmicModuleLoader::new());
    let resources = Rc::new(RefCell::new(ResourceTable::new()));
    let weak_handles = Rc::new(RefCell::new(WeakHandleTable::new()));
    let promises = Rc::new(RefCell::new(PromiseRegistry::new()));
    let pending_resolutions = ops::PendingResolutions::new();
    let isolated_tests = Rc::new(RefCell::new(ops::IsolatedTestRegistry::new()));

    let mut js_runtime = deno_core::JsRuntime::new(RuntimeOptions {
      module_loader: Some(module_loader.clone() as Rc<dyn ModuleLoader>),
      extensions: vec![ops::cosmic_ops()],
      ..Default::default()
    });
    {
      let op_state = js_runtime.op_state();
      let mut op_state = op_state.borrow_mut();
      op_state.put(resources.clone());
      op_state.put(weak_handles.clone());
      op_state.put(promises.clone());
      op_state.put(pending_resolutions.clone());
      op_state.put(isolated_tests.clone());
      if let Some(queue) = &self.work_queue {
        op_state.put(queue.clone());
      }
    }
    RecordTemplates::new().register_all(&mut js_runtime.handle_scope());

    if let Some(old) = &self.dev_runtime {
      let (chrome_window_resource_id, _) =
        resources.borrow_mut().create(ResourceTag::Window, Box::new(WindowResource::new()));
      log::debug!(
        "chrome window resource re-registered: {} -> {chrome_window_resource_id}",
        old.chrome_window_resource_id
      );
      self.dev_runtime = Some(DevRuntimeState {
        file_watcher: FileWatcher::new(&self.options.script_path)?,
        chrome_window_resource_id,
      });
    }

    self.js_runtime = js_runtime;
    self.module_loader = module_loader;
    self.resources = resources;
    self.weak_handles = weak_handles;
    self.promises = promises;
    self.pending_resolutions = pending_resolutions;
    self.isolated_tests = isolated_tests;
    self.uncaught_exception = false;
    self.dev_mode_state = DevModeState::Running;
    self.restart_requested = false;

    let script_path = self.options.script_path.clone();
    self.load_main_script(&script_path)
  }

  /// Runs every test registered via `op_cosmic_register_test`, one at a
  /// time, in registration order (§3 "Isolated Test", §6 `test` contract).
  /// A rejection is reported as `Test Failed: "<name>" <reason>` (§8
  /// scenario S6) and counted as a failure; everything else counts as a
  /// pass. Returns `(tests_passed, tests_total)`.
  pub fn run_isolated_tests(&mut self) -> (u32, u32) {
    let tests = self.isolated_tests.borrow_mut().take_all();
    let total = tests.len() as u32;
    let mut passed = 0;
    for test in &tests {
      match self.run_one_isolated_test(&test.script_fn) {
        Ok(()) => passed += 1,
        Err(reason) => log::error!("Test Failed: \"{}\" {reason}", test.name),
      }
    }
    (passed, total)
  }

  /// Calls `script_fn` and, if it returns a promise, drives the runtime
  /// (worker completions, reactor, microtasks — the same draining order as
  /// the frame loop, §4.8 step 4) until that promise settles.
  fn run_one_isolated_test(&mut self, script_fn: &v8::Global<v8::Function>) -> std::result::Result<(), String> {
    let global_promise = {
      let scope = &mut self.js_runtime.handle_scope();
      let func = v8::Local::new(scope, script_fn);
      let recv = v8::undefined(scope).into();
      let result = func
        .call(scope, recv, &[])
        .ok_or_else(|| "threw synchronously".to_string())?;
      match v8::Local::<v8::Promise>::try_from(result) {
        Ok(promise) => v8::Global::new(scope, promise),
        Err(_) => return Ok(()),
      }
    };

    loop {
      let scope = &mut self.js_runtime.handle_scope();
      let promise = v8::Local::new(scope, &global_promise);
      match promise.state() {
        v8::PromiseState::Fulfilled => return Ok(()),
        v8::PromiseState::Rejected => {
          let reason = promise.result(scope);
          return Err(reason.to_rust_string_lossy(scope));
        }
        v8::PromiseState::Pending => {}
      }
      drop(scope);

      self.drain_worker_completions();
      self.run_reactor_nonblocking();
      self.drain_microtasks();
    }
  }

  pub fn dev_mode_state(&self) -> DevModeState {
    self.dev_mode_state
  }

  pub fn enter_error_state(&mut self) {
    self.dev_mode_state = DevModeState::ShowingError;
  }

  pub fn request_restart(&mut self) {
    self.restart_requested = true;
  }

  /// Executes the shutdown sequence in the order §4.10 requires, to avoid
  /// deadlocking the reactor poller against the work queue.
  pub fn shutdown(&mut self) -> Result<()> {
    // 1. Close the poller: wake it so it doesn't wait out its full timeout,
    // then join it.
    if let Some(poller) = self.poller.take() {
      self.reactor.lock().wake();
      drop(poller);
    }

    // 2. Signal every worker to stop taking new work.
    if let Some(queue) = &self.work_queue {
      queue.request_close();
    }

    // 3. Stop the reactor: close every handle not already closing, drain
    // until empty, then refuse to proceed if it reports it's still busy.
    {
      let mut reactor = self.reactor.lock();
      for handle in reactor.open_handles() {
        if !reactor.is_closing(handle) {
          reactor.close_handle(handle);
        }
      }
      while reactor.has_pending_work() {
        reactor.run_nonblocking()?;
      }
      reactor.close()?;
    }

    // 4. Wait for every worker to acknowledge the close flag, draining
    // whatever completions arrive while we wait.
    if let Some(queue) = self.work_queue.take() {
      self.js_runtime.op_state().borrow_mut().try_take::<Rc<WorkQueue>>();
      for completion in queue.drain_completions() {
        completion.apply();
      }
      match Rc::try_unwrap(queue) {
        Ok(queue) => queue.join(),
        Err(queue) => queue.request_close(),
      }
    }
    Ok(())
  }
}

/// SIGPIPE is ignored so writes to a closed socket return an error instead
/// of terminating the process (§6 "Signals (POSIX)").
#[cfg(unix)]
fn ignore_sigpipe() {
  unsafe {
    libc::signal(libc::SIGPIPE, libc::SIG_IGN);
  }
}

#[cfg(not(unix))]
fn ignore_sigpipe() {}

impl EventLoopHost for Runtime {
  fn poll_window_events(&mut self) -> Vec<(u32, NativeEvent)> {
    if let Some(dev) = &self.dev_runtime {
      if let Some(request) = dev.file_watcher.poll_restart() {
        log::info!("restarting: {:?} changed", request.changed);
        self.restart_requested = true;
      }
    }
    let events = self.window_backend.poll_events();
    let active = self.resources.borrow().active_window().unwrap_or(0);
    events.into_iter().map(|event| (active, event)).collect()
  }

  /// Translates a native event to a record and invokes the target window's
  /// callback, if one was registered via `op_cosmic_window_set_callback`
  /// (§4.8 step 1: "dispatch through per-window callbacks via the Value
  /// Bridge"). `Close` additionally starts resource teardown regardless of
  /// whether a callback is registered, since liveness bookkeeping must stay
  /// correct even for windows script never subscribed to.
  fn dispatch_event(&mut self, window_id: u32, event: NativeEvent) {
    if self.dev_mode_state.suppresses_user_callbacks() {
      return;
    }
    if matches!(event, NativeEvent::Close) {
      let _ = self.resources.borrow_mut().start_deinit(window_id);
    }

    let callback = self
      .resources
      .borrow_mut()
      .get_mut(window_id)
      .ok()
      .and_then(|resource| resource.as_any_mut().downcast_mut::<WindowResource>())
      .and_then(|window| window.on_event.clone());
    let Some(callback) = callback else { return };

    let scope = &mut self.js_runtime.handle_scope();
    let func = v8::Local::new(scope, &callback);
    let recv = v8::undefined(scope).into();
    let args = [window_id.to_script(scope), event.to_script(scope)];
    let [Ok(window_id_value), Ok(event_value)] = args else {
      log::warn!("failed to convert window event for dispatch");
      return;
    };
    if func.call(scope, recv, &[window_id_value, event_value]).is_none() {
      log::warn!("window event callback for window {window_id} threw");
    }
  }

  fn window_count(&self) -> u32 {
    self.resources.borrow().window_count()
  }

  fn uncaught_exception_received(&self) -> bool {
    self.uncaught_exception
  }

  fn dev_mode(&self) -> bool {
    self.options.dev_mode
  }

  fn restart_requested(&self) -> bool {
    self.restart_requested
  }

  fn frame_step(&mut self) -> Vec<Duration> {
    if !self.dev_mode_state.suppresses_user_callbacks() {
      self.window_backend.swap_buffers();
    }
    vec![self.options.frame_interval()]
  }

  fn poller_signaled(&mut self) -> bool {
    self.main_wakeup.take()
  }

  fn drain_worker_completions(&mut self) {
    if let Some(queue) = &self.work_queue {
      for completion in queue.drain_completions() {
        completion.apply();
      }
    }
    let scope = &mut self.js_runtime.handle_scope();
    let mut promises = self.promises.borrow_mut();
    for resolution in self.pending_resolutions.drain() {
      let outcome = match resolution.outcome {
        Ok(bytes) => promises.resolve(scope, resolution.promise_id, bytes),
        Err(err) => promises.reject(scope, resolution.promise_id, &err),
      };
      if outcome.is_err() {
        log::warn!("dropped completion for unknown promise {}", resolution.promise_id);
      }
    }
  }

  fn run_reactor_nonblocking(&mut self) {
    if let Err(err) = self.reactor.lock().run_nonblocking() {
      log::warn!("reactor pass failed: {err}");
    }
  }

  fn drain_microtasks(&mut self) {
    self.js_runtime.v8_isolate().perform_microtask_checkpoint();
  }
}
