//! Path values.
//!
//! Paths are always slash-separated and lexically cleaned. Directory paths
//! render with a trailing slash and file paths without, and both render
//! explicitly relative (`./foo`) unless absolute.

mod cache;
mod fs;
mod host;

use std::{
   fmt,
   sync::Arc,
};

use bass_util::slash;

pub use self::{
   cache::CachePath,
   fs::FsPath,
   host::HostPath,
};
use crate::{
   Error,
   Result,
   Value,
};

/// A directory path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirPath {
   path: Arc<str>,
}

impl DirPath {
   #[must_use]
   pub fn new(path: &str) -> Self {
      Self {
         path: Arc::from(slash::clean(path)),
      }
   }

   /// The cleaned path, without a trailing slash. `.` for the current
   /// directory.
   #[must_use]
   pub fn path(&self) -> &str {
      &self.path
   }

   /// The rendered form: explicitly relative with a trailing slash.
   #[must_use]
   pub fn slash(&self) -> String {
      if &*self.path == "/" {
         return "/".to_owned();
      }

      slash::clarify(&format!("{path}/", path = self.path))
   }

   #[must_use]
   pub fn name(&self) -> String {
      slash::basename(&self.path)
   }

   #[must_use]
   pub fn is_absolute(&self) -> bool {
      self.path.starts_with('/')
   }

   /// The child path relative to this directory.
   #[must_use]
   pub fn join(&self, child: &FileOrDir) -> FileOrDir {
      let joined = slash::join([&*self.path, child.path()]);

      match *child {
         FileOrDir::File(_) => FileOrDir::File(FilePath::new(&joined)),
         FileOrDir::Dir(_) => FileOrDir::Dir(DirPath::new(&joined)),
      }
   }
}

impl fmt::Display for DirPath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      writer.write_str(&self.slash())
   }
}

/// A file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePath {
   path: Arc<str>,
}

impl FilePath {
   #[must_use]
   pub fn new(path: &str) -> Self {
      Self {
         path: Arc::from(slash::clean(path)),
      }
   }

   #[must_use]
   pub fn path(&self) -> &str {
      &self.path
   }

   #[must_use]
   pub fn slash(&self) -> String {
      slash::clarify(&self.path)
   }

   #[must_use]
   pub fn name(&self) -> String {
      slash::basename(&self.path)
   }

   /// The directory containing this file.
   #[must_use]
   pub fn dir(&self) -> DirPath {
      DirPath::new(&slash::dirname(&self.path))
   }
}

impl fmt::Display for FilePath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      writer.write_str(&self.slash())
   }
}

/// A command looked up in `$PATH`, written `.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandPath {
   name: Arc<str>,
}

impl CommandPath {
   #[must_use]
   pub fn new(name: &str) -> Self {
      Self {
         name: Arc::from(name),
      }
   }

   #[must_use]
   pub fn name(&self) -> &str {
      &self.name
   }
}

impl fmt::Display for CommandPath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, ".{name}", name = self.name)
   }
}

/// The subpath half of every rooted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileOrDir {
   File(FilePath),
   Dir(DirPath),
}

impl FileOrDir {
   /// The root of a path hierarchy, `./`.
   #[must_use]
   pub fn root() -> Self {
      Self::Dir(DirPath::new("."))
   }

   /// Parses `foo/` as a directory and anything else as a file.
   #[must_use]
   pub fn parse(path: &str) -> Self {
      if path.ends_with('/') || path == "." || path == ".." {
         Self::Dir(DirPath::new(path))
      } else {
         Self::File(FilePath::new(path))
      }
   }

   #[must_use]
   pub fn path(&self) -> &str {
      match *self {
         Self::File(ref file) => file.path(),
         Self::Dir(ref dir) => dir.path(),
      }
   }

   #[must_use]
   pub fn slash(&self) -> String {
      match *self {
         Self::File(ref file) => file.slash(),
         Self::Dir(ref dir) => dir.slash(),
      }
   }

   #[must_use]
   pub fn name(&self) -> String {
      match *self {
         Self::File(ref file) => file.name(),
         Self::Dir(ref dir) => dir.name(),
      }
   }

   #[must_use]
   pub fn is_dir(&self) -> bool {
      matches!(*self, Self::Dir(_))
   }

   /// Extends a directory with a child path. Files cannot be extended.
   pub fn extend(&self, child: &Self) -> Result<Self> {
      match *self {
         Self::Dir(ref dir) => Ok(dir.join(child)),
         Self::File(_) => {
            Err(Error::Extend {
               parent: self.to_value(),
               child:  child.to_value(),
            })
         },
      }
   }

   #[must_use]
   pub fn to_value(&self) -> Value {
      match *self {
         Self::File(ref file) => Value::File(file.clone()),
         Self::Dir(ref dir) => Value::Dir(dir.clone()),
      }
   }

   /// The rendered subpath without its leading `./`, for display after a
   /// root.
   pub(crate) fn trimmed(&self) -> String {
      let slash = self.slash();

      match slash.strip_prefix("./") {
         Some(rest) => rest.to_owned(),
         None => slash,
      }
   }
}

impl fmt::Display for FileOrDir {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      writer.write_str(&self.slash())
   }
}

/// An unevaluated path extension, as in `foo/bar`: the parent is evaluated
/// and then extended with the child.
#[derive(Debug, Clone)]
pub struct ExtendPath {
   pub parent: Value,
   pub child:  FileOrDir,
}

impl Value {
   /// Extends a path-like value with a child subpath.
   pub fn extend_path(&self, child: &FileOrDir) -> Result<Value> {
      let extend_error = || {
         Error::Extend {
            parent: self.clone(),
            child:  child.to_value(),
         }
      };

      Ok(match *self.unannotated() {
         Value::Dir(ref dir) => dir.join(child).to_value(),

         Value::HostPath(ref host) => {
            Value::HostPath(Arc::new(HostPath {
               context_dir: host.context_dir.clone(),
               path:        host.path.extend(child)?,
            }))
         },

         Value::FsPath(ref fs) => Value::FsPath(Arc::new(fs.with_path(fs.path.extend(child)?))),

         Value::CachePath(ref cache) => {
            Value::CachePath(Arc::new(CachePath {
               id:   cache.id.clone(),
               path: cache.path.extend(child)?,
            }))
         },

         Value::ThunkPath(ref thunk_path) => {
            Value::ThunkPath(Arc::new(crate::ThunkPath {
               thunk: thunk_path.thunk.clone(),
               path:  thunk_path.path.extend(child)?,
            }))
         },

         Value::Thunk(ref thunk) => {
            Value::ThunkPath(Arc::new(crate::ThunkPath {
               thunk: thunk.clone(),
               path:  FileOrDir::root().extend(child)?,
            }))
         },

         _ => return Err(extend_error()),
      })
   }

   /// Whether this is any kind of path.
   #[must_use]
   pub fn is_path(&self) -> bool {
      matches!(
         *self.unannotated(),
         Value::Dir(_)
            | Value::File(_)
            | Value::Command(_)
            | Value::HostPath(_)
            | Value::FsPath(_)
            | Value::CachePath(_)
            | Value::ThunkPath(_)
      )
   }
}
