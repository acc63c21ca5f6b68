use std::{
   fmt,
   path::PathBuf,
   sync::Arc,
};

use bass_util::slash;

use super::FileOrDir;
use crate::{
   Error,
   Result,
   hash,
};

/// A path on the host, relative to a context directory (usually the
/// directory of the script being run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPath {
   pub context_dir: Arc<str>,
   pub path:        FileOrDir,
}

impl HostPath {
   #[must_use]
   pub fn new(context_dir: &str, path: FileOrDir) -> Self {
      Self {
         context_dir: Arc::from(context_dir),
         path,
      }
   }

   /// A short hash of the context directory. Paths under the same context
   /// share a mount root.
   #[must_use]
   pub fn hash(&self) -> String {
      hash::short(self.context_dir.as_bytes())
   }

   /// The path on the host filesystem. Fails if the subpath climbs out of
   /// the context directory.
   pub fn host_path(&self) -> Result<PathBuf> {
      let context_dir = slash::clean(&self.context_dir);
      let joined = slash::clean(&format!("{context_dir}/{path}", path = self.path.path()));

      let inside = joined == context_dir
         || context_dir == "/"
         || joined.starts_with(&format!("{context_dir}/"));

      if !inside {
         return Err(Error::HostPathEscape {
            context_dir,
            attempted: joined,
         });
      }

      Ok(PathBuf::from(joined))
   }
}

impl fmt::Display for HostPath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(
         writer,
         "<host: {context}>/{path}",
         context = self.context_dir,
         path = self.path.trimmed(),
      )
   }
}
