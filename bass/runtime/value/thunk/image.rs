use std::{
   fmt,
   sync::Arc,
};

use crate::{
   Error,
   FilePath,
   Result,
   Scope,
   Thunk,
   Value,
   decode::{
      Fields,
      FromValue,
   },
   thunk::MountSource,
};

/// The platform a thunk runs on. Used to select a runtime.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Platform {
   pub os:   String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub arch: Option<String>,
}

impl Platform {
   /// Whether a runtime configured for `self` can run thunks for `other`.
   /// Architectures are only compared when both sides name one.
   #[must_use]
   pub fn matches(&self, other: &Platform) -> bool {
      self.os == other.os
         && match (&self.arch, &other.arch) {
            (Some(arch), Some(other)) => arch == other,
            _ => true,
         }
   }

   #[must_use]
   pub fn to_value(&self) -> Value {
      let scope = Scope::new();
      scope.set("os", Value::string(&*self.os));
      if let Some(ref arch) = self.arch {
         scope.set("arch", Value::string(&**arch));
      }
      Value::Scope(scope)
   }
}

impl fmt::Display for Platform {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self.arch {
         Some(ref arch) => write!(writer, "{os}/{arch}", os = self.os),
         None => writer.write_str(&self.os),
      }
   }
}

impl FromValue for Platform {
   fn from_value(value: &Value) -> Result<Self> {
      let fields = Fields::new(value, "platform", &["os"])?;

      Ok(Self {
         os:   fields.require("os")?,
         arch: fields.get("arch")?,
      })
   }
}

/// A reference to an image in a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
   pub platform:   Platform,
   pub repository: String,
   pub tag:        Option<String>,
   pub digest:     Option<String>,
}

impl ImageRef {
   /// The reference in `repository:tag@digest` form.
   #[must_use]
   pub fn reference(&self) -> String {
      let mut reference = self.repository.clone();

      if let Some(ref tag) = self.tag {
         reference.push(':');
         reference.push_str(tag);
      }

      if let Some(ref digest) = self.digest {
         reference.push('@');
         reference.push_str(digest);
      }

      reference
   }

   #[must_use]
   pub fn to_value(&self) -> Value {
      let scope = Scope::new();
      scope.set("platform", self.platform.to_value());
      scope.set("repository", Value::string(&*self.repository));
      if let Some(ref tag) = self.tag {
         scope.set("tag", Value::string(&**tag));
      }
      if let Some(ref digest) = self.digest {
         scope.set("digest", Value::string(&**digest));
      }
      Value::Scope(scope)
   }
}

impl FromValue for ImageRef {
   fn from_value(value: &Value) -> Result<Self> {
      let fields = Fields::new(value, "image ref", &["platform", "repository"])?;

      Ok(Self {
         platform:   fields.require("platform")?,
         repository: fields.require("repository")?,
         tag:        fields.get("tag")?,
         digest:     fields.get("digest")?,
      })
   }
}

/// An OCI image tarball.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArchive {
   pub file:     MountSource,
   pub platform: Platform,
   pub tag:      Option<String>,
}

/// An image built from a Dockerfile in a context directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDockerBuild {
   pub platform:   Platform,
   pub context:    MountSource,
   pub dockerfile: Option<FilePath>,
   pub target:     Option<String>,
   pub args:       Option<Scope>,
}

/// The image a thunk runs in.
#[derive(Debug, Clone)]
pub enum ThunkImage {
   Ref(ImageRef),
   Thunk(Arc<Thunk>),
   Archive(ImageArchive),
   DockerBuild(ImageDockerBuild),
}

impl ThunkImage {
   /// The platform of the innermost image.
   #[must_use]
   pub fn platform(&self) -> Option<&Platform> {
      match *self {
         Self::Ref(ref reference) => Some(&reference.platform),
         Self::Thunk(ref thunk) => thunk.platform(),
         Self::Archive(ref archive) => Some(&archive.platform),
         Self::DockerBuild(ref build) => Some(&build.platform),
      }
   }

   #[must_use]
   pub fn to_value(&self) -> Value {
      match *self {
         Self::Ref(ref reference) => reference.to_value(),

         Self::Thunk(ref thunk) => Value::Thunk(thunk.clone()),

         Self::Archive(ref archive) => {
            let scope = Scope::new();
            scope.set("file", archive.file.to_value());
            scope.set("platform", archive.platform.to_value());
            if let Some(ref tag) = archive.tag {
               scope.set("tag", Value::string(&**tag));
            }
            Value::Scope(scope)
         },

         Self::DockerBuild(ref build) => {
            let scope = Scope::new();
            scope.set("platform", build.platform.to_value());
            scope.set("context", build.context.to_value());
            if let Some(ref dockerfile) = build.dockerfile {
               scope.set("dockerfile", Value::File(dockerfile.clone()));
            }
            if let Some(ref target) = build.target {
               scope.set("target", Value::string(&**target));
            }
            if let Some(ref args) = build.args {
               scope.set("args", Value::Scope(args.clone()));
            }
            Value::Scope(scope)
         },
      }
   }
}

impl PartialEq for ThunkImage {
   fn eq(&self, other: &Self) -> bool {
      self.to_value() == other.to_value()
   }
}

impl FromValue for ThunkImage {
   fn from_value(value: &Value) -> Result<Self> {
      if let Value::Thunk(ref thunk) = *value.unannotated() {
         return Ok(Self::Thunk(thunk.clone()));
      }

      let shape = Fields::new(value, "thunk image", &[])?;

      if shape.has("repository") {
         return ImageRef::from_value(value).map(Self::Ref);
      }

      if shape.has("context") {
         let fields = Fields::new(value, "docker build", &["platform", "context"])?;

         return Ok(Self::DockerBuild(ImageDockerBuild {
            platform:   fields.require("platform")?,
            context:    fields.require("context")?,
            dockerfile: fields.get("dockerfile")?,
            target:     fields.get("target")?,
            args:       fields.get("args")?,
         }));
      }

      if shape.has("file") {
         let fields = Fields::new(value, "image archive", &["file", "platform"])?;

         return Ok(Self::Archive(ImageArchive {
            file:     fields.require("file")?,
            platform: fields.require("platform")?,
            tag:      fields.get("tag")?,
         }));
      }

      Err(Error::decode(value, "thunk image"))
   }
}
