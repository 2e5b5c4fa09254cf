// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The strong resource table (§4.3, §3 "Resource Handle"/"Resource List").
//!
//! Resources are grouped into two singly linked lists threaded through slab
//! keys: one for windows (so the frame loop can walk them in order) and one
//! generic list for everything else (currently just HTTP servers). Each list
//! begins with a `Dummy` sentinel entry so insertion and removal never need
//! to special-case an empty list.

use std::any::Any;

use slab::Slab;

use crate::error::{Error, Result};

/// Discriminates the native type a resource handle wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceTag {
  /// Sentinel head-of-list marker. Never returned from `create`.
  Dummy,
  Window,
  HttpServer,
}

/// Teardown behavior for a resource's native payload.
///
/// `start_deinit` may be synchronous (windows: the native window is closed
/// immediately) or request asynchronous completion (servers: a shutdown is
/// requested and `on_deinit` fires only once the native side later confirms
/// closure via [`ResourceTable::complete_async_deinit`]).
pub trait NativeResource: Any {
  fn tag(&self) -> ResourceTag;

  /// Begin teardown. Implementations that complete synchronously should do
  /// all their work here; implementations that need to wait on an external
  /// confirmation should kick off that request and return immediately.
  fn start_deinit(&mut self);

  fn as_any(&self) -> &dyn Any;
  fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The stable back-pointer handed to the script engine as finalizer context.
///
/// Its address, not its content, is the contract: the engine calls back with
/// this pointer on GC, long after `ptr` may have already been torn down by an
/// explicit `start_deinit`. Never use a raw native pointer as finalizer
/// payload for this reason.
#[derive(Debug)]
#[repr(C)]
pub struct ExternalHandle {
  pub resource_id: u32,
}

struct Entry {
  tag: ResourceTag,
  native: Option<Box<dyn NativeResource>>,
  external: Box<ExternalHandle>,
  deinited: bool,
  on_deinit: Option<Box<dyn FnOnce()>>,
  next: Option<usize>,
}

/// A singly linked list of slab keys, always headed by a `Dummy` entry.
struct ResourceList {
  head: usize,
  last: usize,
}

/// Two intrusive lists of typed native handles (§3, §4.3).
pub struct ResourceTable {
  entries: Slab<Entry>,
  windows: ResourceList,
  generic: ResourceList,
  window_count: u32,
  active_window: Option<u32>,
}

impl ResourceTable {
  pub fn new() -> Self {
    let mut entries = Slab::new();
    let windows_head = entries.insert(Entry {
      tag: ResourceTag::Dummy,
      native: None,
      external: Box::new(ExternalHandle { resource_id: u32::MAX }),
      deinited: true,
      on_deinit: None,
      next: None,
    });
    let generic_head = entries.insert(Entry {
      tag: ResourceTag::Dummy,
      native: None,
      external: Box::new(ExternalHandle { resource_id: u32::MAX }),
      deinited: true,
      on_deinit: None,
      next: None,
    });
    ResourceTable {
      entries,
      windows: ResourceList { head: windows_head, last: windows_head },
      generic: ResourceList { head: generic_head, last: generic_head },
      window_count: 0,
      active_window: None,
    }
  }

  fn list_for(&mut self, tag: ResourceTag) -> &mut ResourceList {
    match tag {
      ResourceTag::Window => &mut self.windows,
      _ => &mut self.generic,
    }
  }

  /// Appends a handle and populates its external back-pointer (invariant 1).
  pub fn create(
    &mut self,
    tag: ResourceTag,
    native: Box<dyn NativeResource>,
  ) -> (u32, *const ExternalHandle) {
    assert!(!matches!(tag, ResourceTag::Dummy), "cannot create a Dummy resource");

    let id = self.entries.vacant_key() as u32;
    let external = Box::new(ExternalHandle { resource_id: id });
    let external_ptr: *const ExternalHandle = external.as_ref();

    let key = self.entries.insert(Entry {
      tag,
      native: Some(native),
      external,
      deinited: false,
      on_deinit: None,
      next: None,
    });
    debug_assert_eq!(key as u32, id);

    let list = self.list_for(tag);
    self.entries[list.last].next = Some(key);
    list.last = key;

    if matches!(tag, ResourceTag::Window) {
      self.window_count += 1;
      if self.active_window.is_none() {
        self.active_window = Some(id);
      }
    }

    (id, external_ptr)
  }

  /// Registers a callback fired exactly once, from `destroy`.
  pub fn set_on_deinit(&mut self, id: u32, cb: impl FnOnce() + 'static) -> Result<()> {
    let entry = self.entries.get_mut(id as usize).ok_or(Error::NoSuchResource(id))?;
    entry.on_deinit = Some(Box::new(cb));
    Ok(())
  }

  pub fn get(&self, id: u32) -> Result<&dyn NativeResource> {
    let entry = self.entries.get(id as usize).ok_or(Error::NoSuchResource(id))?;
    entry.native.as_deref().ok_or(Error::HandleExpired)
  }

  pub fn get_mut(&mut self, id: u32) -> Result<&mut dyn NativeResource> {
    let entry = self.entries.get_mut(id as usize).ok_or(Error::NoSuchResource(id))?;
    entry.native.as_deref_mut().ok_or(Error::HandleExpired)
  }

  pub fn is_deinited(&self, id: u32) -> Result<bool> {
    Ok(self.entries.get(id as usize).ok_or(Error::NoSuchResource(id))?.deinited)
  }

  pub fn window_count(&self) -> u32 {
    self.window_count
  }

  pub fn active_window(&self) -> Option<u32> {
    self.active_window
  }

  /// Iterates live (non-`Dummy`) window ids in insertion order.
  pub fn windows(&self) -> impl Iterator<Item = u32> + '_ {
    let mut cur = self.entries[self.windows.head].next;
    std::iter::from_fn(move || {
      let id = cur?;
      cur = self.entries[id].next;
      Some(id as u32)
    })
  }

  /// Runs tag-specific teardown (§4.3). Idempotent: a second call is a no-op.
  pub fn start_deinit(&mut self, id: u32) -> Result<()> {
    let entry = self.entries.get_mut(id as usize).ok_or(Error::NoSuchResource(id))?;
    if entry.deinited {
      return Ok(());
    }
    if let Some(native) = entry.native.as_mut() {
      native.start_deinit();
    }
    entry.deinited = true;

    if matches!(entry.tag, ResourceTag::Window) {
      self.window_count = self.window_count.saturating_sub(1);
      if self.active_window == Some(id) {
        self.reelect_active_window();
      }
    }
    Ok(())
  }

  /// Called once an asynchronous `start_deinit` (e.g. a server shutdown) has
  /// been confirmed by the native side; fires `on_deinit` but does not
  /// unlink the slot (that only happens from the script finalizer, `destroy`,
  /// per invariant 3).
  pub fn complete_async_deinit(&mut self, id: u32) -> Result<()> {
    let entry = self.entries.get_mut(id as usize).ok_or(Error::NoSuchResource(id))?;
    if let Some(cb) = entry.on_deinit.take() {
      cb();
    }
    Ok(())
  }

  fn reelect_active_window(&mut self) {
    self.active_window = self
      .windows()
      .find(|&id| !self.entries[id as usize].deinited);
  }

  /// Called from the script-engine finalizer (§4.3). Frees the slot.
  pub fn destroy(&mut self, id: u32) -> Result<()> {
    if !self.entries.contains(id as usize) {
      return Err(Error::NoSuchResource(id));
    }
    self.start_deinit(id)?;

    let tag = self.entries[id as usize].tag;
    if let Some(cb) = self.entries[id as usize].on_deinit.take() {
      cb();
    }

    // Unlink: find the predecessor by linear scan (resources are few; see §4.3).
    let list = match tag {
      ResourceTag::Window => &mut self.windows,
      _ => &mut self.generic,
    };
    let mut prev = list.head;
    loop {
      let next = self.entries[prev].next;
      match next {
        Some(n) if n == id as usize => break,
        Some(n) => prev = n,
        None => unreachable!("resource {id} not linked into its own list"),
      }
    }
    let removed_next = self.entries[id as usize].next;
    self.entries[prev].next = removed_next;
    if list.last == id as usize {
      list.last = prev;
    }

    let removed = self.entries.remove(id as usize);
    drop(removed.native);
    drop(removed.external);
    Ok(())
  }

  /// Resolves a raw `ExternalHandle*` delivered by the engine's finalizer
  /// back to the resource id it identifies. Safety: the pointer must be one
  /// previously returned by `create` on this table and not yet freed.
  pub unsafe fn resource_id_of(external: *const ExternalHandle) -> u32 {
    debug_assert!(!external.is_null());
    (*external).resource_id
  }
}

impl Default for ResourceTable {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct DummyWindow {
    deinited: bool,
  }

  impl NativeResource for DummyWindow {
    fn tag(&self) -> ResourceTag {
      ResourceTag::Window
    }
    fn start_deinit(&mut self) {
      self.deinited = true;
    }
    fn as_any(&self) -> &dyn Any {
      self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
      self
    }
  }

  #[test]
  fn create_populates_external_back_pointer() {
    let mut table = ResourceTable::new();
    let (id, external) = table.create(ResourceTag::Window, Box::new(DummyWindow { deinited: false }));
    let resolved = unsafe { ResourceTable::resource_id_of(external) };
    assert_eq!(resolved, id);
  }

  #[test]
  fn two_phase_release_runs_in_order() {
    let mut table = ResourceTable::new();
    let (id, _) = table.create(ResourceTag::Window, Box::new(DummyWindow { deinited: false }));
    assert!(!table.is_deinited(id).unwrap());
    table.start_deinit(id).unwrap();
    assert!(table.is_deinited(id).unwrap());
    // destroy() after start_deinit() must not re-run teardown, just unlink.
    table.destroy(id).unwrap();
    assert!(matches!(table.get(id), Err(Error::NoSuchResource(_))));
  }

  #[test]
  fn on_deinit_fires_exactly_once() {
    let mut table = ResourceTable::new();
    let (id, _) = table.create(ResourceTag::Window, Box::new(DummyWindow { deinited: false }));
    let count = std::rc::Rc::new(std::cell::Cell::new(0));
    let count2 = count.clone();
    table.set_on_deinit(id, move || count2.set(count2.get() + 1)).unwrap();
    table.destroy(id).unwrap();
    assert_eq!(count.get(), 1);
  }

  #[test]
  fn active_window_reelection() {
    let mut table = ResourceTable::new();
    let (a, _) = table.create(ResourceTag::Window, Box::new(DummyWindow { deinited: false }));
    let (b, _) = table.create(ResourceTag::Window, Box::new(DummyWindow { deinited: false }));
    assert_eq!(table.active_window(), Some(a));
    table.destroy(a).unwrap();
    assert_eq!(table.active_window(), Some(b));
    table.destroy(b).unwrap();
    assert_eq!(table.active_window(), None);
    assert_eq!(table.window_count(), 0);
  }

  #[test]
  fn removal_fixes_up_predecessor_and_last() {
    let mut table = ResourceTable::new();
    let (a, _) = table.create(ResourceTag::Window, Box::new(DummyWindow { deinited: false }));
    let (b, _) = table.create(ResourceTag::Window, Box::new(DummyWindow { deinited: false }));
    let (c, _) = table.create(ResourceTag::Window, Box::new(DummyWindow { deinited: false }));
    table.destroy(b).unwrap();
    let remaining: Vec<u32> = table.windows().collect();
    assert_eq!(remaining, vec![a, c]);
    table.destroy(c).unwrap();
    let remaining: Vec<u32> = table.windows().collect();
    assert_eq!(remaining, vec![a]);
  }
}
