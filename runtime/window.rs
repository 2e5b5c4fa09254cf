// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The window backend seam (§6 "External collaborator interfaces").
//!
//! Real window/graphics handling lives outside this crate's scope (§1
//! Out of scope). `WindowBackend` is the narrow trait this layer depends on
//! so the event loop driver and resource table are testable without a real
//! windowing system.

use deno_core::v8;

use crate::error::Result;
use crate::value_bridge::{object_to_script, to_script, ToScript};

/// A translated platform window event (§4.8 step 1).
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
  Close,
  Resize { width: u32, height: u32 },
  KeyDown { code: u32 },
  KeyUp { code: u32 },
  MouseDown { button: u8, x: f64, y: f64 },
  MouseUp { button: u8, x: f64, y: f64 },
  MouseMove { x: f64, y: f64 },
}

/// Bridges a native event into the generic-record shape a per-window script
/// callback receives (§4.6 "generic records", §4.8 step 1). `type` names the
/// event the way the kind is spelled in script (lowercase, no underscores).
impl ToScript for NativeEvent {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    Ok(match self {
      NativeEvent::Close => {
        let ty = to_script(scope, "close".to_string())?;
        object_to_script(scope, &[("type", ty)])
      }
      NativeEvent::Resize { width, height } => {
        let ty = to_script(scope, "resize".to_string())?;
        let width = to_script(scope, width)?;
        let height = to_script(scope, height)?;
        object_to_script(scope, &[("type", ty), ("width", width), ("height", height)])
      }
      NativeEvent::KeyDown { code } => {
        let ty = to_script(scope, "keydown".to_string())?;
        let code = to_script(scope, code)?;
        object_to_script(scope, &[("type", ty), ("code", code)])
      }
      NativeEvent::KeyUp { code } => {
        let ty = to_script(scope, "keyup".to_string())?;
        let code = to_script(scope, code)?;
        object_to_script(scope, &[("type", ty), ("code", code)])
      }
      NativeEvent::MouseDown { button, x, y } => {
        let ty = to_script(scope, "mousedown".to_string())?;
        let button = to_script(scope, button)?;
        let x = to_script(scope, x)?;
        let y = to_script(scope, y)?;
        object_to_script(scope, &[("type", ty), ("button", button), ("x", x), ("y", y)])
      }
      NativeEvent::MouseUp { button, x, y } => {
        let ty = to_script(scope, "mouseup".to_string())?;
        let button = to_script(scope, button)?;
        let x = to_script(scope, x)?;
        let y = to_script(scope, y)?;
        object_to_script(scope, &[("type", ty), ("button", button), ("x", x), ("y", y)])
      }
      NativeEvent::MouseMove { x, y } => {
        let ty = to_script(scope, "mousemove".to_string())?;
        let x = to_script(scope, x)?;
        let y = to_script(scope, y)?;
        object_to_script(scope, &[("type", ty), ("x", x), ("y", y)])
      }
    })
  }
}

/// The native window collaborator (§6).
pub trait WindowBackend: Send {
  fn open(&mut self, title: &str, width: u32, height: u32) -> Result<()>;
  fn close(&mut self);
  /// Drains and returns every event observed since the last call.
  fn poll_events(&mut self) -> Vec<NativeEvent>;
  fn swap_buffers(&mut self);
  fn set_title(&mut self, title: &str);
}

/// A test double recording calls and replaying a scripted event queue
/// (§6 "a `FakeWindowBackend` test double is provided").
#[cfg(test)]
#[derive(Default)]
pub struct FakeWindowBackend {
  pub open_calls: Vec<(String, u32, u32)>,
  pub closed: bool,
  pub title: String,
  pub swap_count: u32,
  pub queued_events: std::collections::VecDeque<NativeEvent>,
}

#[cfg(test)]
impl FakeWindowBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn queue_event(&mut self, event: NativeEvent) {
    self.queued_events.push_back(event);
  }
}

#[cfg(test)]
impl WindowBackend for FakeWindowBackend {
  fn open(&mut self, title: &str, width: u32, height: u32) -> Result<()> {
    self.open_calls.push((title.to_string(), width, height));
    self.title = title.to_string();
    Ok(())
  }

  fn close(&mut self) {
    self.closed = true;
  }

  fn poll_events(&mut self) -> Vec<NativeEvent> {
    self.queued_events.drain(..).collect()
  }

  fn swap_buffers(&mut self) {
    self.swap_count += 1;
  }

  fn set_title(&mut self, title: &str) {
    self.title = title.to_string();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fake_backend_replays_queued_events_once() {
    let mut backend = FakeWindowBackend::new();
    backend.queue_event(NativeEvent::Close);
    backend.queue_event(NativeEvent::Resize { width: 640, height: 480 });

    let events = backend.poll_events();
    assert_eq!(events, vec![NativeEvent::Close, NativeEvent::Resize { width: 640, height: 480 }]);
    assert!(backend.poll_events().is_empty());
  }

  #[test]
  fn fake_backend_records_open_and_title() {
    let mut backend = FakeWindowBackend::new();
    backend.open("Cosmic", 800, 600).unwrap();
    assert_eq!(backend.open_calls, vec![("Cosmic".to_string(), 800, 600)]);
    backend.set_title("Renamed");
    assert_eq!(backend.title, "Renamed");
  }
}
