//! Decoding values into host types.

use std::sync::Arc;

use itertools::Itertools as _;

use crate::{
   CachePath,
   CommandPath,
   DirPath,
   Error,
   FileOrDir,
   FilePath,
   FsPath,
   HostPath,
   Result,
   Scope,
   Secret,
   Sink,
   Source,
   Symbol,
   Thunk,
   ThunkPath,
   Value,
};

/// A host type a [`Value`] can be decoded into.
///
/// Decoding always looks through metadata: an annotated value decodes as
/// its inner value.
pub trait FromValue: Sized {
   fn from_value(value: &Value) -> Result<Self>;
}

impl Value {
   /// Decodes this value into a host type.
   pub fn decode<T: FromValue>(&self) -> Result<T> {
      T::from_value(self)
   }
}

macro_rules! decode_variant {
   ($type:ty, $name:literal, $($pattern:pat => $result:expr),+ $(,)?) => {
      impl FromValue for $type {
         fn from_value(value: &Value) -> Result<Self> {
            match *value.unannotated() {
               $($pattern => Ok($result),)+
               _ => Err(Error::decode(value, $name)),
            }
         }
      }
   };
}

decode_variant!(bool, "boolean", Value::Bool(boolean) => boolean);
decode_variant!(i64, "int", Value::Int(int) => int);
decode_variant!(String, "string", Value::String(ref string) => string.to_string());
decode_variant!(Arc<str>, "string", Value::String(ref string) => string.clone());
decode_variant!(Symbol, "symbol", Value::Symbol(ref symbol) => symbol.clone());
decode_variant!(Scope, "scope", Value::Scope(ref scope) => scope.clone());
decode_variant!(DirPath, "dir path", Value::Dir(ref dir) => dir.clone());
decode_variant!(FilePath, "file path", Value::File(ref file) => file.clone());
decode_variant!(CommandPath, "command path", Value::Command(ref command) => command.clone());
decode_variant!(Arc<HostPath>, "host path", Value::HostPath(ref path) => path.clone());
decode_variant!(Arc<FsPath>, "fs path", Value::FsPath(ref path) => path.clone());
decode_variant!(Arc<CachePath>, "cache path", Value::CachePath(ref path) => path.clone());
decode_variant!(Arc<ThunkPath>, "thunk path", Value::ThunkPath(ref path) => path.clone());
decode_variant!(Secret, "secret", Value::Secret(ref secret) => secret.clone());
decode_variant!(Source, "source", Value::Source(ref source) => source.clone());
decode_variant!(Sink, "sink", Value::Sink(ref sink) => sink.clone());
decode_variant!(
   FileOrDir,
   "file or dir path",
   Value::File(ref file) => FileOrDir::File(file.clone()),
   Value::Dir(ref dir) => FileOrDir::Dir(dir.clone()),
);

impl FromValue for Value {
   fn from_value(value: &Value) -> Result<Self> {
      Ok(value.clone())
   }
}

impl FromValue for usize {
   fn from_value(value: &Value) -> Result<Self> {
      i64::from_value(value)
         .ok()
         .and_then(|int| usize::try_from(int).ok())
         .ok_or_else(|| Error::decode(value, "non-negative int"))
   }
}

impl FromValue for Arc<Thunk> {
   fn from_value(value: &Value) -> Result<Self> {
      match *value.unannotated() {
         Value::Thunk(ref thunk) => Ok(thunk.clone()),
         Value::Scope(_) => Thunk::from_fields(value).map(Arc::new),
         _ => Err(Error::decode(value, "thunk")),
      }
   }
}

impl<T: FromValue> FromValue for Vec<T> {
   fn from_value(value: &Value) -> Result<Self> {
      value
         .to_vec()
         .ok_or_else(|| Error::decode(value, "list"))?
         .iter()
         .map(T::from_value)
         .collect()
   }
}

/// `null` decodes as [`None`].
impl<T: FromValue> FromValue for Option<T> {
   fn from_value(value: &Value) -> Result<Self> {
      match *value.unannotated() {
         Value::Null => Ok(None),
         _ => T::from_value(value).map(Some),
      }
   }
}

/// Any value that can be called.
#[derive(Debug, Clone)]
pub struct Combiner(pub Value);

impl FromValue for Combiner {
   fn from_value(value: &Value) -> Result<Self> {
      if value.is_combiner() {
         Ok(Self(value.clone()))
      } else {
         Err(Error::decode(value, "combiner"))
      }
   }
}

/// Any kind of path.
#[derive(Debug, Clone)]
pub struct Path(pub Value);

impl FromValue for Path {
   fn from_value(value: &Value) -> Result<Self> {
      if value.is_path() {
         Ok(Self(value.clone()))
      } else {
         Err(Error::decode(value, "path"))
      }
   }
}

/// Anything usable in binder position.
#[derive(Debug, Clone)]
pub struct Bindable(pub Value);

impl FromValue for Bindable {
   fn from_value(value: &Value) -> Result<Self> {
      if value.each_binding(&mut |_, _| Ok(())).is_ok() {
         Ok(Self(value.clone()))
      } else {
         Err(Error::decode(value, "bindable"))
      }
   }
}

/// Anything with content to read: a thunk's output, a file it produced, a
/// host file, or a file in an in-memory filesystem.
#[derive(Debug, Clone)]
pub struct Readable(pub Value);

impl FromValue for Readable {
   fn from_value(value: &Value) -> Result<Self> {
      match *value.unannotated() {
         Value::Thunk(_) | Value::ThunkPath(_) | Value::HostPath(_) | Value::FsPath(_) => {
            Ok(Self(value.clone()))
         },

         _ => Err(Error::decode(value, "readable")),
      }
   }
}

/// Record-style access to the bindings of a scope being decoded into a
/// struct.
///
/// Keys are looked up by their hyphenated name first, then by their
/// underscored JSON name.
pub struct Fields {
   scope: Scope,
   src:   Value,
   dst:   &'static str,
}

impl Fields {
   /// Fails with a decode error listing every required key the scope lacks.
   pub fn new(value: &Value, dst: &'static str, required: &[&str]) -> Result<Self> {
      let Value::Scope(ref scope) = *value.unannotated() else {
         return Err(Error::decode(value, dst));
      };

      let fields = Self {
         scope: scope.clone(),
         src: value.clone(),
         dst,
      };

      let missing = required
         .iter()
         .filter(|key| !fields.has(key))
         .map(|key| Symbol::new(key))
         .collect_vec();

      if !missing.is_empty() {
         return Err(Error::Decode {
            src: fields.src,
            dst,
            missing,
         });
      }

      Ok(fields)
   }

   /// Like [`Fields::new`], but a list is accepted too, its elements filling
   /// `order` from the first field on.
   pub fn positional(value: &Value, dst: &'static str, order: &[&str], required: &[&str]) -> Result<Self> {
      let Some(elements) = value.to_vec() else {
         return Self::new(value, dst, required);
      };

      if elements.len() > order.len() {
         return Err(Error::decode(value, dst));
      }

      let scope = Scope::new();
      for (&key, element) in order.iter().zip(elements) {
         scope.set(key, element);
      }

      let mut fields = Self::new(&Value::Scope(scope), dst, required)?;
      fields.src = value.clone();
      Ok(fields)
   }

   fn lookup(&self, key: &str) -> Option<Value> {
      self
         .scope
         .get(&Symbol::new(key))
         .or_else(|| self.scope.get(&Symbol::new(&key.replace('-', "_"))))
         .filter(|value| !matches!(*value.unannotated(), Value::Null))
   }

   #[must_use]
   pub fn has(&self, key: &str) -> bool {
      self.lookup(key).is_some()
   }

   /// An optional field. `null` counts as absent.
   pub fn get<T: FromValue>(&self, key: &str) -> Result<Option<T>> {
      self.lookup(key).as_ref().map(T::from_value).transpose()
   }

   pub fn require<T: FromValue>(&self, key: &str) -> Result<T> {
      self.get(key)?.ok_or_else(|| {
         Error::Decode {
            src:     self.src.clone(),
            dst:     self.dst,
            missing: vec![Symbol::new(key)],
         }
      })
   }
}
