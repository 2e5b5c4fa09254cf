// Copyright 2018-2026 the Cosmic authors. MIT license.

use std::borrow::Cow;
use std::fmt;

/// The error taxonomy for the runtime orchestration layer.
///
/// Names are semantic, not linguistic: each variant corresponds to a
/// failure mode a caller (native or script) needs to distinguish, not to a
/// particular wording of a message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// Script source failed to parse.
  #[error("parse error in {specifier}: {message}")]
  ParseError { specifier: String, message: String },

  /// Script source parsed but failed to compile as a module.
  #[error("compile error in {specifier}: {message}")]
  CompileError { specifier: String, message: String },

  /// The main script failed during instantiation or evaluation.
  #[error("error evaluating {specifier}: {message}\n{stack}")]
  MainScriptError {
    specifier: String,
    message: String,
    stack: String,
  },

  /// A weak handle's slot was explicitly deinited before this lookup.
  #[error("handle expired")]
  HandleExpired,

  /// A script-side value could not be converted to the requested native shape.
  #[error("cannot convert value: {0}")]
  CantConvert(String),

  /// An index or range fell outside the bounds of the subject container.
  #[error("index out of bounds: {0}")]
  IndexOutOfBounds(String),

  /// A generic bounds violation that isn't index-shaped (e.g. a byte count).
  #[error("out of bounds: {0}")]
  OutOfBounds(String),

  /// An internal invariant was violated in a native code path.
  #[error("internal panic: {0}")]
  Panic(String),

  /// The resource table has no entry for the given id.
  #[error("no such resource: {0}")]
  NoSuchResource(u32),

  /// The promise registry has no entry for the given id.
  #[error("no such promise: {0}")]
  NoSuchPromise(u32),

  /// Propagated failure from the underlying script engine.
  #[error("script engine error: {0}")]
  Engine(#[from] deno_core::error::CoreError),

  /// Propagated I/O failure (module reads, file watching, worker spawn).
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  /// The reactor refused to close because outstanding work remained.
  #[error("reactor refused to close: {0} handle(s) still pending")]
  ReactorBusy(usize),
}

impl Error {
  /// The numeric error code exposed to script on a rejected promise,
  /// per the `code` property invariant (see §8, boundary behavior 12).
  pub fn code(&self) -> i32 {
    match self {
      Error::ParseError { .. } => 1,
      Error::CompileError { .. } => 2,
      Error::MainScriptError { .. } => 3,
      Error::HandleExpired => 4,
      Error::CantConvert(_) => 5,
      Error::IndexOutOfBounds(_) => 6,
      Error::OutOfBounds(_) => 7,
      Error::Panic(_) => 8,
      Error::NoSuchResource(_) => 9,
      Error::NoSuchPromise(_) => 10,
      Error::Engine(_) => 11,
      Error::Io(_) => 12,
      Error::ReactorBusy(_) => 13,
    }
  }

  /// Whether this error is fatal to the current script load (§7): the
  /// caller must enter dev-mode's JS-error state or exit non-zero.
  pub fn is_load_fatal(&self) -> bool {
    matches!(
      self,
      Error::ParseError { .. } | Error::CompileError { .. } | Error::MainScriptError { .. }
    )
  }
}

/// `#[op2]` requires every custom error type returned from an op to satisfy
/// `deno_error::JsErrorClass` so the engine can surface it to script as a
/// proper `Error` subclass instead of an opaque string (mirrors how every
/// `ext/*` crate with its own error enum implements this for `#[op2]`).
impl deno_error::JsErrorClass for Error {
  fn get_class(&self) -> Cow<'static, str> {
    match self {
      Error::ParseError { .. } | Error::CompileError { .. } => Cow::Borrowed("SyntaxError"),
      Error::HandleExpired | Error::NoSuchResource(_) | Error::NoSuchPromise(_) => {
        Cow::Borrowed("ReferenceError")
      }
      Error::CantConvert(_) => Cow::Borrowed("TypeError"),
      Error::IndexOutOfBounds(_) | Error::OutOfBounds(_) => Cow::Borrowed("RangeError"),
      Error::MainScriptError { .. }
      | Error::Panic(_)
      | Error::Engine(_)
      | Error::Io(_)
      | Error::ReactorBusy(_) => Cow::Borrowed("Error"),
    }
  }

  fn get_message(&self) -> Cow<'static, str> {
    Cow::Owned(self.to_string())
  }

  fn get_additional_properties(&self) -> Vec<(Cow<'static, str>, Cow<'static, str>)> {
    Vec::new()
  }

  fn as_any(&self) -> &dyn std::any::Any {
    self
  }
}

/// A captured script-engine exception: message plus formatted stack trace,
/// produced at the module-loader and main-script boundary (§4.7).
#[derive(Debug, Clone)]
pub struct CapturedException {
  pub message: String,
  pub stack: String,
}

impl fmt::Display for CapturedException {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}\n{}", self.message, self.stack)
  }
}

pub type Result<T> = std::result::Result<T, Error>;
