// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The module loader (§4.7, §3 "Module Info").
//!
//! Resolution is deliberately simple: absolute specifiers are used directly,
//! relative specifiers are joined against the referrer specifier itself
//! (`ModuleSpecifier::join`), which `deno_core` always hands `resolve` as an
//! already-absolute `file:` URL. That's what makes invariant 6 (§8) hold for
//! arbitrarily deep import chains without this loader needing to track a
//! separate directory table of its own: the referrer string *is* the
//! directory context. `CosmicModuleLoader::loaded_file_paths` separately
//! tracks every specifier `load` has seen, keyed by the specifier rather
//! than an engine-assigned module id (`resolve`/`load` never receive one —
//! only `mod_evaluate` does, after the fact), purely so dev-mode file
//! watching (§4.9) can watch every imported file, not just the main script.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use deno_core::{
  ModuleLoadResponse, ModuleLoader, ModuleSource, ModuleSourceCode, ModuleSpecifier, ModuleType,
  RequestedModuleType, ResolutionKind,
};

use crate::error::{CapturedException, Error, Result};

/// Resolves a specifier seen while loading `referrer_dir` to an absolute
/// path, without touching the filesystem (§4.7: "relative specifiers are
/// joined to the referrer's directory").
pub fn resolve_specifier(referrer_dir: &Path, specifier: &str) -> PathBuf {
  let path = Path::new(specifier);
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    referrer_dir.join(path)
  }
}

/// Reads and returns module source, recording its containing directory.
///
/// The caller (the runtime context, which actually holds the script engine)
/// is responsible for compiling the returned source as a module; this
/// function only owns the filesystem half of §4.7's resolver.
pub struct LoadedFile {
  pub path: PathBuf,
  pub dir: PathBuf,
  pub code: String,
}

/// Loads the file at `path`, read failures become [`Error::Io`] which the
/// caller surfaces to the script engine as a thrown exception (§4.7: "Any
/// compile or read failure throws a script-engine exception").
pub fn load(path: &Path) -> Result<LoadedFile> {
  let code = std::fs::read_to_string(path)?;
  let dir = path
    .parent()
    .map(Path::to_path_buf)
    .unwrap_or_else(|| PathBuf::from("."));
  Ok(LoadedFile { path: path.to_path_buf(), dir, code })
}

/// Formats an instantiation or evaluation failure as a captured exception
/// (§4.7: "instantiation or evaluation failure produces a captured stack
/// trace string that is returned to the caller").
pub fn capture_exception(specifier: &str, message: String, stack: String) -> Error {
  Error::MainScriptError { specifier: specifier.to_string(), message, stack }
}

impl From<CapturedException> for Error {
  fn from(exc: CapturedException) -> Self {
    Error::MainScriptError {
      specifier: "<unknown>".to_string(),
      message: exc.message,
      stack: exc.stack,
    }
  }
}

/// The `deno_core::ModuleLoader` implementation (§4.7): every `resolve`
/// joins the specifier against the referrer specifier directly (already an
/// absolute `file:` URL, per `deno_core`'s own contract), which is what
/// makes invariant 6 (§8) hold without this loader needing to resolve
/// through any directory table of its own. Every successful `load` records
/// `{specifier -> dir}` purely so `loaded_file_paths` can list every file
/// dev-mode should watch (§4.9) — that bookkeeping plays no part in
/// resolution itself.
pub struct CosmicModuleLoader {
  dirs_by_specifier: Rc<RefCell<HashMap<ModuleSpecifier, PathBuf>>>,
}

impl CosmicModuleLoader {
  pub fn new() -> Self {
    CosmicModuleLoader { dirs_by_specifier: Rc::new(RefCell::new(HashMap::new())) }
  }

  /// File paths of every module loaded so far, for dev-mode file watching
  /// (§4.9: "watches... every file registered in the Module Loader's module
  /// table"). Only `file:` specifiers resolve to a path; anything else is
  /// skipped.
  pub fn loaded_file_paths(&self) -> Vec<PathBuf> {
    self
      .dirs_by_specifier
      .borrow()
      .keys()
      .filter_map(|specifier| specifier.to_file_path().ok())
      .collect()
  }
}

impl Default for CosmicModuleLoader {
  fn default() -> Self {
    Self::new()
  }
}

impl ModuleLoader for CosmicModuleLoader {
  fn resolve(
    &self,
    specifier: &str,
    referrer: &str,
    _kind: ResolutionKind,
  ) -> std::result::Result<ModuleSpecifier, deno_core::anyhow::Error> {
    if let Ok(absolute) = ModuleSpecifier::parse(specifier) {
      return Ok(absolute);
    }
    let referrer_specifier = ModuleSpecifier::parse(referrer)
      .map_err(|err| deno_core::anyhow::anyhow!("invalid referrer {referrer}: {err}"))?;
    referrer_specifier
      .join(specifier)
      .map_err(|err| deno_core::anyhow::anyhow!("cannot resolve {specifier} against {referrer}: {err}"))
  }

  fn load(
    &self,
    module_specifier: &ModuleSpecifier,
    _maybe_referrer: Option<&ModuleSpecifier>,
    _is_dynamic: bool,
    _requested_module_type: RequestedModuleType,
  ) -> ModuleLoadResponse {
    let specifier = module_specifier.clone();
    let dirs = self.dirs_by_specifier.clone();
    let result = (|| -> Result<ModuleSource> {
      let path = specifier
        .to_file_path()
        .map_err(|_| Error::CantConvert(format!("non-file module specifier: {specifier}")))?;
      let file = load(&path)?;
      dirs.borrow_mut().insert(specifier.clone(), file.dir);
      Ok(ModuleSource::new(
        ModuleType::JavaScript,
        ModuleSourceCode::String(file.code.into()),
        &specifier,
        None,
      ))
    })();
    ModuleLoadResponse::Sync(result.map_err(|err| deno_core::anyhow::anyhow!(err.to_string())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn absolute_specifier_is_used_directly() {
    let referrer_dir = Path::new("/project/src");
    let resolved = resolve_specifier(referrer_dir, "/other/util.js");
    assert_eq!(resolved, PathBuf::from("/other/util.js"));
  }

  #[test]
  fn relative_specifier_joins_referrer_dir() {
    let referrer_dir = Path::new("/project/src");
    let resolved = resolve_specifier(referrer_dir, "./util.js");
    assert_eq!(resolved, PathBuf::from("/project/src/./util.js"));
  }

  #[test]
  fn nested_import_resolves_against_its_own_referrer() {
    // main.js (dir /app) imports lib/a.js; a.js (dir /app/lib) imports b.js.
    // b.js must resolve against /app/lib, not /app (invariant 6, §8).
    let a_dir = resolve_specifier(Path::new("/app"), "lib/a.js");
    let a_dir = a_dir.parent().unwrap();
    let b_path = resolve_specifier(a_dir, "b.js");
    assert_eq!(b_path, PathBuf::from("/app/lib/b.js"));
  }
}
