// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The weak handle table (§4.4, §3 "Weak Handle").
//!
//! Unlike the resource table, weak handles have no enumeration need (nothing
//! walks "all weak handles"), so this is a flat slot allocator rather than an
//! intrusive list. A weak handle's sole purpose is to survive the gap between
//! an explicit native-side deinit and the script engine's GC finalizer: after
//! `explicit_deinit`, the slot's tag becomes `Null` and stays allocated (the
//! finalizer still needs a slot to land on) but every further native lookup
//! fails with `HandleExpired` until `destroy` finally frees it.

use std::any::Any;

use slab::Slab;

use crate::error::{Error, Result};

/// A persistent script-engine reference kept alive until the GC finalizer
/// calls back. Opaque to this module; owned and dropped by `destroy`.
pub trait ScriptRef: Any {}
impl<T: Any> ScriptRef for T {}

enum Slot {
  Live { native: Box<dyn Any>, script_object: Box<dyn ScriptRef> },
  /// Explicit deinit has occurred; the tag is conceptually `Null`.
  Expired,
}

/// A compact slot allocator for GC-driven native handles (§4.4).
pub struct WeakHandleTable {
  slots: Slab<Slot>,
}

impl WeakHandleTable {
  pub fn new() -> Self {
    WeakHandleTable { slots: Slab::new() }
  }

  pub fn create(&mut self, native: Box<dyn Any>, script_object: Box<dyn ScriptRef>) -> u32 {
    self.slots.insert(Slot::Live { native, script_object }) as u32
  }

  /// Validates the tag before exposing the native payload; a `Null` tag
  /// (explicit deinit already ran) surfaces as `HandleExpired`.
  pub fn get(&self, id: u32) -> Result<&dyn Any> {
    match self.slots.get(id as usize) {
      Some(Slot::Live { native, .. }) => Ok(native.as_ref()),
      Some(Slot::Expired) => Err(Error::HandleExpired),
      None => Err(Error::HandleExpired),
    }
  }

  pub fn get_mut(&mut self, id: u32) -> Result<&mut dyn Any> {
    match self.slots.get_mut(id as usize) {
      Some(Slot::Live { native, .. }) => Ok(native.as_mut()),
      Some(Slot::Expired) => Err(Error::HandleExpired),
      None => Err(Error::HandleExpired),
    }
  }

  pub fn is_expired(&self, id: u32) -> bool {
    !matches!(self.slots.get(id as usize), Some(Slot::Live { .. }))
  }

  /// Explicit native-side deinit: drops the native payload and marks the
  /// slot `Null`, but keeps the slot (and the script reference) alive until
  /// the finalizer runs `destroy`.
  pub fn explicit_deinit(&mut self, id: u32) -> Result<()> {
    let slot = self.slots.get_mut(id as usize).ok_or(Error::HandleExpired)?;
    *slot = Slot::Expired;
    Ok(())
  }

  /// The GC finalizer path: deinits by tag if still live, then frees the slot.
  pub fn destroy(&mut self, id: u32) -> Result<()> {
    if !self.slots.contains(id as usize) {
      return Err(Error::HandleExpired);
    }
    self.slots.remove(id as usize);
    Ok(())
  }
}

impl Default for WeakHandleTable {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn deinit_then_access_is_expired() {
    let mut table = WeakHandleTable::new();
    let id = table.create(Box::new(42u32), Box::new(()));
    assert!(table.get(id).is_ok());
    table.explicit_deinit(id).unwrap();
    assert!(matches!(table.get(id), Err(Error::HandleExpired)));
    // The slot survives until the finalizer runs.
    assert!(table.is_expired(id));
    table.destroy(id).unwrap();
    assert!(matches!(table.destroy(id), Err(Error::HandleExpired)));
  }

  #[test]
  fn live_handle_round_trips_payload() {
    let mut table = WeakHandleTable::new();
    let id = table.create(Box::new(String::from("hello")), Box::new(()));
    let value = table.get(id).unwrap().downcast_ref::<String>().unwrap();
    assert_eq!(value, "hello");
  }
}
