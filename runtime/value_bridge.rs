// Copyright 2018-2026 the Cosmic authors. MIT license.

//! The value bridge (§4.6): bidirectional conversion between native typed
//! values and script engine values.
//!
//! Both directions enumerate a closed set of supported shapes rather than
//! being fully generic — that's deliberate, it's what lets `FromScript`
//! return a precise `CantConvert` instead of silently coercing. Numeric
//! narrowing always range-checks; enum conversion accepts both a
//! case-insensitive string-sum name and an integer, with an optional
//! default fallback.

use std::collections::HashMap;

use deno_core::v8;

use crate::error::{Error, Result};

/// Converts a native value into a script engine value.
pub trait ToScript {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>>;
}

pub fn to_script<'s, T: ToScript>(
  scope: &mut v8::HandleScope<'s>,
  value: T,
) -> Result<v8::Local<'s, v8::Value>> {
  value.to_script(scope)
}

/// Converts a script engine value into a native value.
pub trait FromScript: Sized {
  fn from_script(scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Result<Self>;
}

macro_rules! impl_small_int {
  ($ty:ty, $min:expr, $max:expr) => {
    impl ToScript for $ty {
      fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
        Ok(v8::Integer::new(scope, self as i32).into())
      }
    }
    impl FromScript for $ty {
      fn from_script(scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Result<Self> {
        let n = value
          .number_value(scope)
          .ok_or_else(|| Error::CantConvert(format!("expected a number for {}", stringify!($ty))))?;
        if n.fract() != 0.0 || n < $min as f64 || n > $max as f64 {
          return Err(Error::CantConvert(format!(
            "{} is out of range for {}",
            n,
            stringify!($ty)
          )));
        }
        Ok(n as $ty)
      }
    }
  };
}

impl_small_int!(i16, i16::MIN, i16::MAX);
impl_small_int!(u8, 0, u8::MAX);
// "safe-range unsigned integer": u32 values representable exactly as an
// IEEE-754 double without resorting to bigint.
impl_small_int!(u32, 0, u32::MAX);

impl ToScript for u64 {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    Ok(v8::BigInt::new_from_u64(scope, self).into())
  }
}

impl FromScript for u64 {
  fn from_script(scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Result<Self> {
    let bigint: v8::Local<v8::BigInt> = value
      .try_into()
      .map_err(|_| Error::CantConvert("expected a bigint".into()))?;
    let (v, lossless) = bigint.u64_value();
    if !lossless {
      return Err(Error::CantConvert("bigint does not fit in u64".into()));
    }
    let _ = scope; // silence unused warning on some toolchains
    Ok(v)
  }
}

impl ToScript for f32 {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    Ok(v8::Number::new(scope, self as f64).into())
  }
}

impl FromScript for f32 {
  fn from_script(scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Result<Self> {
    value
      .number_value(scope)
      .map(|n| n as f32)
      .ok_or_else(|| Error::CantConvert("expected a number".into()))
  }
}

impl ToScript for f64 {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    Ok(v8::Number::new(scope, self).into())
  }
}

impl FromScript for f64 {
  fn from_script(scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Result<Self> {
    value
      .number_value(scope)
      .ok_or_else(|| Error::CantConvert("expected a number".into()))
  }
}

impl ToScript for bool {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    Ok(v8::Boolean::new(scope, self).into())
  }
}

impl FromScript for bool {
  fn from_script(_scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Result<Self> {
    Ok(value.boolean_value(_scope))
  }
}

impl ToScript for String {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    Ok(
      v8::String::new(scope, &self)
        .ok_or_else(|| Error::CantConvert("string too long for the engine".into()))?
        .into(),
    )
  }
}

impl FromScript for String {
  fn from_script(scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Result<Self> {
    let s: v8::Local<v8::String> = value
      .try_into()
      .map_err(|_| Error::CantConvert("expected a string".into()))?;
    Ok(s.to_rust_string_lossy(scope))
  }
}

/// Raw byte buffers bridge as typed byte arrays over an owned backing store
/// (§4.6 "raw byte buffers").
impl ToScript for Vec<u8> {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    let len = self.len();
    let store = v8::ArrayBuffer::new_backing_store_from_vec(self).make_shared();
    let buffer = v8::ArrayBuffer::with_backing_store(scope, &store);
    let array = v8::Uint8Array::new(scope, buffer, 0, len)
      .ok_or_else(|| Error::CantConvert("byte buffer exceeds engine limits".into()))?;
    Ok(array.into())
  }
}

impl FromScript for Vec<u8> {
  fn from_script(_scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Result<Self> {
    let view: v8::Local<v8::ArrayBufferView> = value
      .try_into()
      .map_err(|_| Error::CantConvert("expected a typed byte array".into()))?;
    let mut buf = vec![0u8; view.byte_length()];
    view.copy_contents(&mut buf);
    Ok(buf)
  }
}

/// `None -> null`; `Some(v)` converts `v` normally.
impl<T: ToScript> ToScript for Option<T> {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    match self {
      Some(v) => v.to_script(scope),
      None => Ok(v8::null(scope).into()),
    }
  }
}

impl<T: FromScript> FromScript for Option<T> {
  fn from_script(scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Result<Self> {
    if value.is_null_or_undefined() {
      Ok(None)
    } else {
      Ok(Some(T::from_script(scope, value)?))
    }
  }
}

/// Opaque script-engine values pass through unchanged.
impl ToScript for v8::Global<v8::Value> {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    Ok(v8::Local::new(scope, self))
  }
}

/// Error values: stringified (the error-taxonomy-aware path with a `code`
/// property lives in `error_to_script`, used by the promise registry).
impl ToScript for Error {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    Ok(error_to_script(scope, &self))
  }
}

/// Builds a script error object carrying a human-readable message and a
/// numeric `code` property (§4.5, §8 boundary behavior 12).
pub fn error_to_script<'s>(scope: &mut v8::HandleScope<'s>, err: &Error) -> v8::Local<'s, v8::Value> {
  let message = v8::String::new(scope, &err.to_string()).unwrap();
  let exception = v8::Exception::error(scope, message);
  if let Ok(obj) = v8::Local::<v8::Object>::try_from(exception) {
    let key = v8::String::new(scope, "code").unwrap();
    let val = v8::Integer::new(scope, err.code());
    obj.set(scope, key.into(), val.into());
  }
  exception
}

/// A generic record, reflectively enumerated field-by-field, for native
/// structs with no pre-registered class template (§4.6 "generic records").
pub fn object_to_script<'s>(
  scope: &mut v8::HandleScope<'s>,
  fields: &[(&str, v8::Local<'s, v8::Value>)],
) -> v8::Local<'s, v8::Value> {
  let obj = v8::Object::new(scope);
  for (name, val) in fields {
    let key = v8::String::new(scope, name).unwrap();
    obj.set(scope, key.into(), *val);
  }
  obj.into()
}

/// Enum conversion support: string-sum types serialize to their name;
/// otherwise integer. Script -> native accepts case-insensitive name lookup
/// or the integer, with an optional `DEFAULT` fallback (§4.6).
pub trait StringSumEnum: Sized + Copy {
  /// `(name, discriminant)` pairs, in declaration order.
  const VARIANTS: &'static [(&'static str, i32)];
  const DEFAULT: Option<Self> = None;

  fn to_i32(self) -> i32;
  fn from_i32(v: i32) -> Option<Self>;
}

pub fn enum_to_script<'s, E: StringSumEnum>(
  scope: &mut v8::HandleScope<'s>,
  value: E,
) -> Result<v8::Local<'s, v8::Value>> {
  let discriminant = value.to_i32();
  for (name, v) in E::VARIANTS {
    if *v == discriminant {
      return Ok(
        v8::String::new(scope, name)
          .ok_or_else(|| Error::CantConvert("enum name too long".into()))?
          .into(),
      );
    }
  }
  Ok(v8::Integer::new(scope, discriminant).into())
}

pub fn enum_from_script<E: StringSumEnum>(
  scope: &mut v8::HandleScope,
  value: v8::Local<v8::Value>,
) -> Result<E> {
  if value.is_string() {
    let s = value.to_rust_string_lossy(scope);
    for (name, v) in E::VARIANTS {
      if name.eq_ignore_ascii_case(&s) {
        if let Some(parsed) = E::from_i32(*v) {
          return Ok(parsed);
        }
      }
    }
  } else if let Some(n) = value.to_int32(scope) {
    if let Some(parsed) = E::from_i32(n.value()) {
      return Ok(parsed);
    }
  }
  E::DEFAULT.ok_or_else(|| Error::CantConvert("value does not match any enum variant".into()))
}

/// Resolves start/end slice bounds the way the rest of the bridge's ranges
/// are resolved: half-open, with negative indices counting from the end
/// (Python-style), and no extra `+1` on a negative end.
///
/// This is the chosen resolution of the open question in §9: the source had
/// an ambiguous `+1` on the negative-index branch. We read it as *not*
/// inclusive-end; both ends are covered by the unit tests below.
pub fn resolve_slice_bounds(len: usize, start: i64, end: Option<i64>) -> Result<(usize, usize)> {
  fn resolve_index(len: usize, idx: i64) -> i64 {
    if idx < 0 {
      idx + len as i64
    } else {
      idx
    }
  }
  let start_r = resolve_index(len, start).clamp(0, len as i64) as usize;
  let end_r = match end {
    Some(e) => resolve_index(len, e).clamp(0, len as i64) as usize,
    None => len,
  };
  if start_r > end_r {
    return Err(Error::IndexOutOfBounds(format!(
      "start {start_r} is past end {end_r} (len {len})"
    )));
  }
  Ok((start_r, end_r))
}

/// A reusable scratch buffer for script-string conversions whose lifetime is
/// bounded by the current native call (§4.6): the returned `&str` is valid
/// only until the next `store` call on the same buffer.
#[derive(Default)]
pub struct ScratchBuffer {
  storage: String,
}

impl ScratchBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn store(&mut self, value: String) -> &str {
    self.storage = value;
    &self.storage
  }
}

/// Caches pre-registered function templates keyed by a record's class name,
/// and binds each one onto `globalThis` as a constructor so specialized
/// records (`Color`, `FileEntry`, ...) support script-side `instanceof`
/// instead of being plain object literals (§4.6).
///
/// The templates are only needed once, at script-engine construction;
/// conversion itself (`templated_object_to_script`) doesn't touch this
/// struct — it looks the constructor back up on `globalThis` by name, so
/// `ToScript` impls don't need a registry threaded through every call.
#[derive(Default)]
pub struct RecordTemplates {
  templates: HashMap<&'static str, v8::Global<v8::FunctionTemplate>>,
}

impl RecordTemplates {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers every record class the value bridge gives `instanceof`
  /// support to. Idempotent: re-running it (e.g. after a dev-mode restart
  /// rebuilds the script engine) just re-binds the same names.
  pub fn register_all(&mut self, scope: &mut v8::HandleScope) {
    self.register(scope, "Color");
    self.register(scope, "FileEntry");
  }

  fn register(&mut self, scope: &mut v8::HandleScope, class_name: &'static str) {
    if self.templates.contains_key(class_name) {
      return;
    }
    let template = v8::FunctionTemplate::new(scope, |_scope, _args, mut ret| {
      ret.set_undefined();
    });
    if let Some(ctor) = template.get_function(scope) {
      let global = scope.get_current_context().global(scope);
      let key = v8::String::new(scope, class_name).unwrap();
      global.set(scope, key.into(), ctor.into());
    }
    self.templates.insert(class_name, v8::Global::new(scope, template));
  }
}

/// Builds a record object whose prototype is `globalThis[class_name]`'s
/// `.prototype`, so `value instanceof <class_name>` holds in script (§4.6).
/// Falls back to a plain object, matching [`object_to_script`], if that
/// constructor hasn't been registered yet — conversion should never fail
/// just because `RecordTemplates::register_all` hasn't run.
fn templated_object_to_script<'s>(
  scope: &mut v8::HandleScope<'s>,
  class_name: &str,
  fields: &[(&str, v8::Local<'s, v8::Value>)],
) -> v8::Local<'s, v8::Value> {
  let obj = v8::Object::new(scope);
  let global = scope.get_current_context().global(scope);
  let class_key = v8::String::new(scope, class_name).unwrap();
  if let Some(ctor) = global.get(scope, class_key.into()) {
    if let Ok(ctor) = v8::Local::<v8::Function>::try_from(ctor) {
      let proto_key = v8::String::new(scope, "prototype").unwrap();
      if let Some(proto) = ctor.get(scope, proto_key.into()) {
        obj.set_prototype(scope, proto);
      }
    }
  }
  for (name, val) in fields {
    let key = v8::String::new(scope, name).unwrap();
    obj.set(scope, key.into(), *val);
  }
  obj.into()
}

/// A `{r, g, b, a}` color: a struct whose fields are all optional, so
/// `from_script(undefined)` allocates the all-default record directly
/// instead of converting field-by-field (§4.6 "Struct conversions").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
  pub r: u8,
  pub g: u8,
  pub b: u8,
  pub a: u8,
}

impl Default for Color {
  fn default() -> Self {
    Color { r: 0, g: 0, b: 0, a: 255 }
  }
}

impl ToScript for Color {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    let r = to_script(scope, self.r)?;
    let g = to_script(scope, self.g)?;
    let b = to_script(scope, self.b)?;
    let a = to_script(scope, self.a)?;
    Ok(templated_object_to_script(scope, "Color", &[("r", r), ("g", g), ("b", b), ("a", a)]))
  }
}

impl FromScript for Color {
  fn from_script(scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Result<Self> {
    if value.is_null_or_undefined() {
      return Ok(Color::default());
    }
    let obj: v8::Local<v8::Object> = value
      .try_into()
      .map_err(|_| Error::CantConvert("expected a color object".into()))?;
    Ok(Color {
      r: get_optional_field(scope, obj, "r")?.unwrap_or(0),
      g: get_optional_field(scope, obj, "g")?.unwrap_or(0),
      b: get_optional_field(scope, obj, "b")?.unwrap_or(0),
      a: get_optional_field(scope, obj, "a")?.unwrap_or(255),
    })
  }
}

/// A directory entry: every field is required, so conversion always walks
/// each field individually rather than taking the all-default shortcut.
#[derive(Debug, Clone)]
pub struct FileEntry {
  pub name: String,
  pub size: u64,
  pub is_dir: bool,
}

impl ToScript for FileEntry {
  fn to_script<'s>(self, scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Value>> {
    let name = to_script(scope, self.name)?;
    let size = to_script(scope, self.size)?;
    let is_dir = to_script(scope, self.is_dir)?;
    Ok(templated_object_to_script(scope, "FileEntry", &[("name", name), ("size", size), ("isDir", is_dir)]))
  }
}

impl FromScript for FileEntry {
  fn from_script(scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Result<Self> {
    let obj: v8::Local<v8::Object> = value
      .try_into()
      .map_err(|_| Error::CantConvert("expected a file entry object".into()))?;
    Ok(FileEntry {
      name: get_required_field(scope, obj, "name")?,
      size: get_required_field(scope, obj, "size")?,
      is_dir: get_required_field(scope, obj, "isDir")?,
    })
  }
}

fn get_required_field<T: FromScript>(
  scope: &mut v8::HandleScope,
  obj: v8::Local<v8::Object>,
  name: &str,
) -> Result<T> {
  let key = v8::String::new(scope, name).unwrap();
  let value = obj
    .get(scope, key.into())
    .ok_or_else(|| Error::CantConvert(format!("missing required field {name}")))?;
  T::from_script(scope, value)
}

fn get_optional_field<T: FromScript>(
  scope: &mut v8::HandleScope,
  obj: v8::Local<v8::Object>,
  name: &str,
) -> Result<Option<T>> {
  let key = v8::String::new(scope, name).unwrap();
  match obj.get(scope, key.into()) {
    Some(value) if !value.is_null_or_undefined() => Ok(Some(T::from_script(scope, value)?)),
    _ => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, Copy, PartialEq)]
  enum TrafficLight {
    Red,
    Yellow,
    Green,
  }

  impl StringSumEnum for TrafficLight {
    const VARIANTS: &'static [(&'static str, i32)] =
      &[("red", 0), ("yellow", 1), ("green", 2)];
    const DEFAULT: Option<Self> = Some(TrafficLight::Red);

    fn to_i32(self) -> i32 {
      match self {
        TrafficLight::Red => 0,
        TrafficLight::Yellow => 1,
        TrafficLight::Green => 2,
      }
    }
    fn from_i32(v: i32) -> Option<Self> {
      match v {
        0 => Some(TrafficLight::Red),
        1 => Some(TrafficLight::Yellow),
        2 => Some(TrafficLight::Green),
        _ => None,
      }
    }
  }

  #[test]
  fn slice_bounds_positive_half_open() {
    assert_eq!(resolve_slice_bounds(10, 2, Some(5)).unwrap(), (2, 5));
  }

  #[test]
  fn slice_bounds_negative_start() {
    // -1 addresses the last element; half-open to len, not len+1.
    assert_eq!(resolve_slice_bounds(5, -1, None).unwrap(), (4, 5));
  }

  #[test]
  fn slice_bounds_negative_end() {
    // -2 on a length-5 slice resolves to index 3, and the interval stays
    // half-open: [1, 3), not [1, 3].
    assert_eq!(resolve_slice_bounds(5, 1, Some(-2)).unwrap(), (1, 3));
  }

  #[test]
  fn slice_bounds_reject_inverted_range() {
    assert!(resolve_slice_bounds(5, 4, Some(1)).is_err());
  }

  #[test]
  fn scratch_buffer_reuses_storage() {
    let mut scratch = ScratchBuffer::new();
    assert_eq!(scratch.store("first".to_string()), "first");
    assert_eq!(scratch.store("second".to_string()), "second");
  }

  #[test]
  fn enum_round_trips_by_discriminant() {
    assert_eq!(TrafficLight::from_i32(TrafficLight::Green.to_i32()), Some(TrafficLight::Green));
  }
}
