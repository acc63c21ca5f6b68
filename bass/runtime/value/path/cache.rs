use std::{
   fmt,
   sync::Arc,
};

use super::FileOrDir;
use crate::hash;

/// A path within a cache volume shared between runs, identified by `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePath {
   pub id:   Arc<str>,
   pub path: FileOrDir,
}

impl CachePath {
   #[must_use]
   pub fn new(id: &str, path: FileOrDir) -> Self {
      Self {
         id: Arc::from(id),
         path,
      }
   }

   #[must_use]
   pub fn hash(&self) -> String {
      hash::short(self.id.as_bytes())
   }
}

impl fmt::Display for CachePath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(
         writer,
         "<cache: {id}>/{path}",
         id = self.id,
         path = self.path.trimmed(),
      )
   }
}
