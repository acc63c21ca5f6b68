use std::sync::Arc;

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
   ThunkPath,
   Value,
   decode::{
      Fields,
      FromValue,
   },
};

/// What a thunk executes.
#[derive(Debug, Clone, PartialEq)]
pub enum ThunkCmd {
   Command(CommandPath),
   File(FilePath),
   ThunkPath(Arc<ThunkPath>),
   Host(Arc<HostPath>),
   Fs(Arc<FsPath>),
}

impl ThunkCmd {
   #[must_use]
   pub fn to_value(&self) -> Value {
      match *self {
         Self::Command(ref command) => Value::Command(command.clone()),
         Self::File(ref file) => Value::File(file.clone()),
         Self::ThunkPath(ref path) => Value::ThunkPath(path.clone()),
         Self::Host(ref path) => Value::HostPath(path.clone()),
         Self::Fs(ref path) => Value::FsPath(path.clone()),
      }
   }
}

impl FromValue for ThunkCmd {
   fn from_value(value: &Value) -> Result<Self> {
      Ok(match *value.unannotated() {
         Value::Command(ref command) => Self::Command(command.clone()),
         Value::File(ref file) => Self::File(file.clone()),
         Value::ThunkPath(ref path) if !path.path.is_dir() => Self::ThunkPath(path.clone()),
         Value::HostPath(ref path) if !path.path.is_dir() => Self::Host(path.clone()),
         Value::FsPath(ref path) if !path.path.is_dir() => Self::Fs(path.clone()),
         _ => return Err(Error::decode(value, "thunk command")),
      })
   }
}

/// The working directory of a thunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ThunkDir {
   Dir(DirPath),
   ThunkPath(Arc<ThunkPath>),
   Host(Arc<HostPath>),
}

impl ThunkDir {
   #[must_use]
   pub fn to_value(&self) -> Value {
      match *self {
         Self::Dir(ref dir) => Value::Dir(dir.clone()),
         Self::ThunkPath(ref path) => Value::ThunkPath(path.clone()),
         Self::Host(ref path) => Value::HostPath(path.clone()),
      }
   }
}

impl FromValue for ThunkDir {
   fn from_value(value: &Value) -> Result<Self> {
      Ok(match *value.unannotated() {
         Value::Dir(ref dir) => Self::Dir(dir.clone()),
         Value::ThunkPath(ref path) if path.path.is_dir() => Self::ThunkPath(path.clone()),
         Value::HostPath(ref path) if path.path.is_dir() => Self::Host(path.clone()),
         _ => return Err(Error::decode(value, "thunk dir")),
      })
   }
}

/// Anything that can be mounted into a thunk.
#[derive(Debug, Clone, PartialEq)]
pub enum MountSource {
   ThunkPath(Arc<ThunkPath>),
   Host(Arc<HostPath>),
   Fs(Arc<FsPath>),
   Cache(Arc<CachePath>),
   Secret(Secret),
}

impl MountSource {
   #[must_use]
   pub fn to_value(&self) -> Value {
      match *self {
         Self::ThunkPath(ref path) => Value::ThunkPath(path.clone()),
         Self::Host(ref path) => Value::HostPath(path.clone()),
         Self::Fs(ref path) => Value::FsPath(path.clone()),
         Self::Cache(ref path) => Value::CachePath(path.clone()),
         Self::Secret(ref secret) => Value::Secret(secret.clone()),
      }
   }
}

impl FromValue for MountSource {
   fn from_value(value: &Value) -> Result<Self> {
      Ok(match *value.unannotated() {
         Value::ThunkPath(ref path) => Self::ThunkPath(path.clone()),
         Value::HostPath(ref path) => Self::Host(path.clone()),
         Value::FsPath(ref path) => Self::Fs(path.clone()),
         Value::CachePath(ref path) => Self::Cache(path.clone()),
         Value::Secret(ref secret) => Self::Secret(secret.clone()),
         _ => return Err(Error::decode(value, "mount source")),
      })
   }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThunkMount {
   pub source: MountSource,
   pub target: FileOrDir,
}

impl ThunkMount {
   #[must_use]
   pub fn to_value(&self) -> Value {
      let scope = Scope::new();
      scope.set("source", self.source.to_value());
      scope.set("target", self.target.to_value());
      Value::Scope(scope)
   }
}

impl FromValue for ThunkMount {
   fn from_value(value: &Value) -> Result<Self> {
      let fields = Fields::new(value, "thunk mount", &["source", "target"])?;

      Ok(Self {
         source: fields.require("source")?,
         target: fields.require("target")?,
      })
   }
}

/// A port the thunk listens on once started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThunkPort {
   pub name: String,
   pub port: i64,
}

impl ThunkPort {
   #[must_use]
   pub fn to_value(&self) -> Value {
      let scope = Scope::new();
      scope.set("name", Value::string(&*self.name));
      scope.set("port", Value::Int(self.port));
      Value::Scope(scope)
   }
}

impl FromValue for ThunkPort {
   fn from_value(value: &Value) -> Result<Self> {
      let fields = Fields::positional(value, "thunk port", &["name", "port"], &["name", "port"])?;

      Ok(Self {
         name: fields.require("name")?,
         port: fields.require("port")?,
      })
   }
}

/// Where a thunk expects a generated TLS certificate and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThunkTls {
   pub cert: FilePath,
   pub key:  FilePath,
}

impl ThunkTls {
   #[must_use]
   pub fn to_value(&self) -> Value {
      let scope = Scope::new();
      scope.set("cert", Value::File(self.cert.clone()));
      scope.set("key", Value::File(self.key.clone()));
      Value::Scope(scope)
   }
}

impl FromValue for ThunkTls {
   fn from_value(value: &Value) -> Result<Self> {
      let fields = Fields::new(value, "thunk tls", &["cert", "key"])?;

      Ok(Self {
         cert: fields.require("cert")?,
         key:  fields.require("key")?,
      })
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn ports_from_lists() {
      let port = Value::list([Value::string("http"), Value::Int(8080)])
         .decode::<ThunkPort>()
         .unwrap();
      assert_eq!(port.name, "http");
      assert_eq!(port.port, 8080);

      let port = port.to_value().decode::<ThunkPort>().unwrap();
      assert_eq!(port.port, 8080);

      assert!(Value::list([Value::string("http")]).decode::<ThunkPort>().is_err());
   }
}
