// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The promise registry (§4.5, §3 "Promise Entry").
//!
//! Outstanding script-side resolvers are kept in an indexed table so that
//! native async tasks, which only carry a plain `u32`, can resolve or reject
//! the right promise without holding a `v8::Global` themselves across the
//! work-queue boundary.

use deno_core::v8;
use slab::Slab;

use crate::error::{Error, Result};
use crate::value_bridge;

/// An indexed table of outstanding script-side resolvers (§3).
pub struct PromiseRegistry {
  entries: Slab<v8::Global<v8::PromiseResolver>>,
}

impl PromiseRegistry {
  pub fn new() -> Self {
    PromiseRegistry { entries: Slab::new() }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Registers a resolver and returns the id native tasks will reference it
  /// by. Lifecycle: consumed exactly once, by `resolve` or `reject`.
  pub fn add(&mut self, resolver: v8::Global<v8::PromiseResolver>) -> u32 {
    self.entries.insert(resolver) as u32
  }

  /// Converts `value` through the value bridge and resolves the promise,
  /// removing the entry (invariant 4: no id is resolved twice).
  pub fn resolve<T: value_bridge::ToScript>(
    &mut self,
    scope: &mut v8::HandleScope,
    id: u32,
    value: T,
  ) -> Result<()> {
    let resolver = self.entries.try_remove(id as usize).ok_or(Error::NoSuchPromise(id))?;
    let local_resolver = v8::Local::new(scope, resolver);
    let local_value = value_bridge::to_script(scope, value)?;
    local_resolver.resolve(scope, local_value);
    Ok(())
  }

  /// Rejects the promise with `err`. A known error enum produces a script
  /// error object carrying both a message and a numeric `code` property
  /// (§4.5, §8 boundary behavior 12); anything else is stringified by the
  /// value bridge's generic error path.
  pub fn reject(&mut self, scope: &mut v8::HandleScope, id: u32, err: &Error) -> Result<()> {
    let resolver = self.entries.try_remove(id as usize).ok_or(Error::NoSuchPromise(id))?;
    let local_resolver = v8::Local::new(scope, resolver);
    let local_value = value_bridge::error_to_script(scope, err);
    local_resolver.reject(scope, local_value);
    Ok(())
  }
}

impl Default for PromiseRegistry {
  fn default() -> Self {
    Self::new()
  }
}
