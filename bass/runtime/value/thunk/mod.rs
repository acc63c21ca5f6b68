//! Thunks: declarative descriptions of containerized commands.

mod image;
mod path;
mod types;

use std::{
   fmt,
   sync::Arc,
};

pub use self::{
   image::{
      ImageArchive,
      ImageDockerBuild,
      ImageRef,
      Platform,
      ThunkImage,
   },
   path::{
      ThunkAddr,
      ThunkPath,
   },
   types::{
      MountSource,
      ThunkCmd,
      ThunkDir,
      ThunkMount,
      ThunkPort,
      ThunkTls,
   },
};
use crate::{
   Result,
   Scope,
   Value,
   decode::Fields,
   hash,
};

/// A command to run in a container, along with everything it depends on.
///
/// Thunks are immutable. The `with_*` builders return modified copies.
#[derive(Debug, Clone)]
pub struct Thunk {
   pub image:    Option<ThunkImage>,
   pub insecure: bool,
   pub cmd:      ThunkCmd,
   pub args:     Vec<Value>,
   pub stdin:    Vec<Value>,
   pub env:      Option<Scope>,
   pub dir:      Option<ThunkDir>,
   pub mounts:   Vec<ThunkMount>,
   pub ports:    Vec<ThunkPort>,
   pub tls:      Option<ThunkTls>,
   pub labels:   Option<Scope>,
}

impl Thunk {
   #[must_use]
   pub fn new(cmd: ThunkCmd) -> Self {
      Self {
         image: None,
         insecure: false,
         cmd,
         args: Vec::new(),
         stdin: Vec::new(),
         env: None,
         dir: None,
         mounts: Vec::new(),
         ports: Vec::new(),
         tls: None,
         labels: None,
      }
   }

   pub(crate) fn from_fields(value: &Value) -> Result<Self> {
      let fields = Fields::new(value, "thunk", &["cmd"])?;

      Ok(Self {
         image:    fields.get("image")?,
         insecure: fields.get("insecure")?.unwrap_or(false),
         cmd:      fields.require("cmd")?,
         args:     fields.get("args")?.unwrap_or_default(),
         stdin:    fields.get("stdin")?.unwrap_or_default(),
         env:      fields.get("env")?,
         dir:      fields.get("dir")?,
         mounts:   fields.get("mounts")?.unwrap_or_default(),
         ports:    fields.get("ports")?.unwrap_or_default(),
         tls:      fields.get("tls")?,
         labels:   fields.get("labels")?,
      })
   }

   /// The platform of the innermost image. Thunks without an image have
   /// none and can only be run by the Bass runtime itself.
   #[must_use]
   pub fn platform(&self) -> Option<&Platform> {
      self.image.as_ref().and_then(ThunkImage::platform)
   }

   /// Sets the image. If the current image is a thunk, rebases that thunk
   /// instead so the chain keeps its intermediate steps.
   #[must_use]
   pub fn with_image(&self, image: ThunkImage) -> Self {
      let image = match self.image {
         Some(ThunkImage::Thunk(ref parent)) => ThunkImage::Thunk(Arc::new(parent.with_image(image))),
         _ => image,
      };

      Self {
         image: Some(image),
         ..self.clone()
      }
   }

   #[must_use]
   pub fn with_cmd(&self, cmd: ThunkCmd) -> Self {
      Self {
         cmd,
         ..self.clone()
      }
   }

   /// Prepends a new command, shifting the current one into the arguments.
   #[must_use]
   pub fn wrap_cmd(&self, cmd: ThunkCmd) -> Self {
      let mut args = Vec::with_capacity(self.args.len() + 1);
      args.push(self.cmd.to_value());
      args.extend(self.args.iter().cloned());

      Self {
         cmd,
         args,
         ..self.clone()
      }
   }

   #[must_use]
   pub fn with_args(&self, args: Vec<Value>) -> Self {
      Self {
         args,
         ..self.clone()
      }
   }

   #[must_use]
   pub fn with_stdin(&self, stdin: Vec<Value>) -> Self {
      Self {
         stdin,
         ..self.clone()
      }
   }

   #[must_use]
   pub fn with_env(&self, env: Scope) -> Self {
      Self {
         env: Some(env),
         ..self.clone()
      }
   }

   #[must_use]
   pub fn with_dir(&self, dir: ThunkDir) -> Self {
      Self {
         dir: Some(dir),
         ..self.clone()
      }
   }

   #[must_use]
   pub fn with_insecure(&self, insecure: bool) -> Self {
      Self {
         insecure,
         ..self.clone()
      }
   }

   #[must_use]
   pub fn with_mount(&self, source: MountSource, target: crate::FileOrDir) -> Self {
      let mut mounts = self.mounts.clone();
      mounts.push(ThunkMount { source, target });

      Self {
         mounts,
         ..self.clone()
      }
   }

   #[must_use]
   pub fn with_port(&self, name: &str, port: i64) -> Self {
      let mut ports = self.ports.clone();
      ports.push(ThunkPort {
         name: name.to_owned(),
         port,
      });

      Self {
         ports,
         ..self.clone()
      }
   }

   #[must_use]
   pub fn with_tls(&self, cert: crate::FilePath, key: crate::FilePath) -> Self {
      Self {
         tls: Some(ThunkTls { cert, key }),
         ..self.clone()
      }
   }

   /// Sets a label. The labels scope is copied so the original thunk keeps
   /// its labels.
   #[must_use]
   pub fn with_label(&self, name: &str, value: Value) -> Self {
      let labels = self.labels.as_ref().map_or_else(Scope::new, Scope::copy);
      labels.set(name, value);

      Self {
         labels: Some(labels),
         ..self.clone()
      }
   }

   /// The canonical wire form. Fields appear in a fixed order and empty
   /// fields are omitted, so equal thunks always produce equal bytes.
   pub fn to_json(&self) -> Result<serde_json::Value> {
      let mut object = serde_json::Map::new();

      if let Some(ref image) = self.image {
         object.insert("image".to_owned(), image.to_value().to_json()?);
      }

      if self.insecure {
         object.insert("insecure".to_owned(), serde_json::Value::Bool(true));
      }

      object.insert("cmd".to_owned(), self.cmd.to_value().to_json()?);

      if !self.args.is_empty() {
         object.insert("args".to_owned(), Value::list(self.args.iter().cloned()).to_json()?);
      }

      if !self.stdin.is_empty() {
         object.insert(
            "stdin".to_owned(),
            Value::list(self.stdin.iter().cloned()).to_json()?,
         );
      }

      if let Some(ref env) = self.env
         && !env.is_empty()
      {
         object.insert("env".to_owned(), Value::Scope(env.clone()).to_json()?);
      }

      if let Some(ref dir) = self.dir {
         object.insert("dir".to_owned(), dir.to_value().to_json()?);
      }

      if !self.mounts.is_empty() {
         object.insert(
            "mounts".to_owned(),
            Value::list(self.mounts.iter().map(ThunkMount::to_value)).to_json()?,
         );
      }

      if !self.ports.is_empty() {
         object.insert(
            "ports".to_owned(),
            Value::list(self.ports.iter().map(ThunkPort::to_value)).to_json()?,
         );
      }

      if let Some(ref tls) = self.tls {
         object.insert("tls".to_owned(), tls.to_value().to_json()?);
      }

      if let Some(ref labels) = self.labels
         && !labels.is_empty()
      {
         object.insert("labels".to_owned(), Value::Scope(labels.clone()).to_json()?);
      }

      Ok(serde_json::Value::Object(object))
   }

   /// The canonical form as bytes.
   pub fn canonical(&self) -> Result<Vec<u8>> {
      Ok(serde_json::to_vec(&self.to_json()?)?)
   }

   /// The short hash of the canonical form. Fails only if the thunk embeds a
   /// value that cannot be encoded.
   pub fn hash(&self) -> Result<String> {
      Ok(hash::short(&self.canonical()?))
   }

   pub fn sha256(&self) -> Result<String> {
      Ok(hash::sha256(&self.canonical()?))
   }

   /// The name of the thunk, used for mount targets and display. Falls back
   /// to a placeholder when the thunk cannot be encoded.
   #[must_use]
   pub fn name(&self) -> String {
      self.hash().unwrap_or_else(|_| "unhashable".to_owned())
   }
}

impl PartialEq for Thunk {
   fn eq(&self, other: &Self) -> bool {
      match (self.canonical(), other.canonical()) {
         (Ok(this), Ok(other)) => this == other,
         _ => false,
      }
   }
}

impl fmt::Display for Thunk {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(
         writer,
         "<thunk: {cmd} name:{name}>",
         cmd = Value::list([self.cmd.to_value()]),
         name = self.name(),
      )
   }
}
