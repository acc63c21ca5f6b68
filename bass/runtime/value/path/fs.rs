use std::{
   collections::BTreeMap,
   fmt,
   sync::Arc,
};

use bytes::Bytes;

use super::FileOrDir;
use crate::{
   Error,
   Result,
   hash,
};

/// A path into an in-memory filesystem.
///
/// The filesystem is identified by the SHA-256 of its sorted entries, so two
/// filesystems with the same contents are interchangeable.
#[derive(Debug, Clone)]
pub struct FsPath {
   pub id:    Arc<str>,
   pub files: Arc<BTreeMap<String, Bytes>>,
   pub path:  FileOrDir,
}

impl FsPath {
   /// The root directory of a filesystem holding the given files, keyed by
   /// their cleaned relative paths.
   #[must_use]
   pub fn new(files: BTreeMap<String, Bytes>) -> Self {
      let mut content = Vec::new();
      for (name, data) in &files {
         content.extend_from_slice(name.as_bytes());
         content.push(0);
         content.extend_from_slice(data);
      }

      Self {
         id:    Arc::from(hash::sha256(&content)),
         files: Arc::new(files),
         path:  FileOrDir::root(),
      }
   }

   #[must_use]
   pub fn with_path(&self, path: FileOrDir) -> Self {
      Self {
         id: self.id.clone(),
         files: self.files.clone(),
         path,
      }
   }

   /// The content of the file this path points to.
   pub fn read(&self) -> Result<Bytes> {
      match self.path {
         FileOrDir::File(ref file) => {
            self.files.get(file.path()).cloned().ok_or_else(|| {
               Error::Host(bass_error::error!("file not found in filesystem: {file}"))
            })
         },

         FileOrDir::Dir(ref dir) => {
            Err(Error::Host(bass_error::error!("cannot read directory {dir}")))
         },
      }
   }

   /// The files under this path, relative to it.
   #[must_use]
   pub fn entries(&self) -> Vec<(String, Bytes)> {
      let prefix = match self.path {
         FileOrDir::Dir(ref dir) if dir.path() == "." => String::new(),
         ref path => format!("{path}/", path = path.path()),
      };

      self
         .files
         .iter()
         .filter_map(|(name, data)| {
            name
               .strip_prefix(&prefix)
               .map(|relative| (relative.to_owned(), data.clone()))
         })
         .collect()
   }
}

impl PartialEq for FsPath {
   fn eq(&self, other: &Self) -> bool {
      self.id == other.id && self.path == other.path
   }
}

impl fmt::Display for FsPath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "<fs>/{path}", path = self.path.trimmed())
   }
}
