//! The interface to the container runtimes that run thunks.
//!
//! No runtime ships with the core. Embedders provide them through a
//! [`RuntimePool`], and the evaluator selects one per thunk by platform.

use std::{
   fmt,
   sync::Arc,
   time::Duration,
};

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::{
   Error,
   EvalCtx,
   Result,
   Scope,
   Thunk,
   ThunkPath,
   Value,
   thunk::{
      ImageRef,
      Platform,
   },
};

/// Where a runtime writes output.
pub type Writer<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// Options for pruning runtime caches. Runtimes honor them on a best-effort
/// basis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOpts {
   /// Prune everything.
   pub all:           bool,
   /// Keep data used within this long.
   pub keep_duration: Option<Duration>,
   /// Keep at most this many bytes.
   pub keep_bytes:    Option<u64>,
}

#[async_trait]
pub trait Runtime: Send + Sync {
   /// Resolves an image reference to a digest.
   async fn resolve(&self, ctx: &EvalCtx, image: &ImageRef) -> Result<ImageRef>;

   /// Runs a thunk to completion, failing if it exits non-zero.
   async fn run(&self, ctx: &EvalCtx, thunk: &Thunk) -> Result<()>;

   /// Runs a thunk and writes its stdout.
   async fn read(&self, ctx: &EvalCtx, thunk: &Thunk, writer: Writer<'_>) -> Result<()>;

   /// Writes the thunk's image as a tarball.
   async fn export(&self, ctx: &EvalCtx, thunk: &Thunk, writer: Writer<'_>) -> Result<()>;

   /// Writes a path produced by a thunk as a tarball.
   async fn export_path(&self, ctx: &EvalCtx, path: &ThunkPath, writer: Writer<'_>) -> Result<()>;

   /// Pushes the thunk's image to a registry.
   async fn publish(&self, ctx: &EvalCtx, thunk: &Thunk, image: &ImageRef) -> Result<ImageRef>;

   async fn prune(&self, ctx: &EvalCtx, opts: &PruneOpts) -> Result<()>;

   /// Evaluates a thunk as a Bass module and returns its scope.
   async fn load(&self, _ctx: &EvalCtx, thunk: &Thunk) -> Result<Scope> {
      Err(Error::Host(bass_error::error!(
         "runtime cannot load modules: {thunk}"
      )))
   }

   fn close(&self) -> Result<()> {
      Ok(())
   }
}

/// The set of runtimes available to evaluation.
pub trait RuntimePool: Send + Sync {
   /// The runtime for a platform. Thunks without a platform have none.
   fn select(&self, platform: Option<&Platform>) -> Result<Arc<dyn Runtime>>;

   fn all(&self) -> Vec<Arc<dyn Runtime>>;

   fn close(&self) -> Result<()> {
      let errors = self
         .all()
         .iter()
         .filter_map(|runtime| runtime.close().err())
         .collect();

      Error::collect(errors).map_or(Ok(()), Err)
   }
}

/// A pool with a fixed list of runtimes, each serving the platforms its
/// own platform matches.
#[derive(Clone, Default)]
pub struct StaticPool {
   runtimes: Vec<(Platform, Arc<dyn Runtime>)>,
}

impl StaticPool {
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   #[must_use]
   pub fn with(mut self, platform: Platform, runtime: Arc<dyn Runtime>) -> Self {
      self.runtimes.push((platform, runtime));
      self
   }

   #[must_use]
   pub fn is_empty(&self) -> bool {
      self.runtimes.is_empty()
   }
}

impl RuntimePool for StaticPool {
   fn select(&self, platform: Option<&Platform>) -> Result<Arc<dyn Runtime>> {
      let Some(platform) = platform else {
         return Err(Error::NoRuntime {
            platform: Value::Null,
         });
      };

      self
         .runtimes
         .iter()
         .find(|&&(ref supported, _)| supported.matches(platform))
         .map(|&(_, ref runtime)| runtime.clone())
         .ok_or_else(|| {
            Error::NoRuntime {
               platform: platform.to_value(),
            }
         })
   }

   fn all(&self) -> Vec<Arc<dyn Runtime>> {
      self.runtimes.iter().map(|&(_, ref runtime)| runtime.clone()).collect()
   }
}

impl fmt::Debug for StaticPool {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      writer
         .debug_list()
         .entries(self.runtimes.iter().map(|&(ref platform, _)| platform.to_string()))
         .finish()
   }
}


#[cfg(test)]
mod tests {
   use super::{
      fake::*,
      *,
   };

   #[test]
   fn selection_by_platform() {
      let (_, pool) = pool();

      assert!(pool.select(Some(&linux())).is_ok());

      let arm = Platform {
         os:   "linux".to_owned(),
         arch: Some("arm64".to_owned()),
      };
      assert!(pool.select(Some(&arm)).is_ok());

      let windows = Platform {
         os:   "windows".to_owned(),
         arch: None,
      };
      assert!(matches!(
         pool.select(Some(&windows)),
         Err(Error::NoRuntime { .. })
      ));

      assert!(matches!(
         pool.select(None),
         Err(Error::NoRuntime {
            platform: Value::Null
         })
      ));
   }

   #[tokio::test]
   async fn loading_is_optional() {
      struct Minimal;

      #[async_trait]
      impl Runtime for Minimal {
         async fn resolve(&self, _: &EvalCtx, image: &ImageRef) -> Result<ImageRef> {
            Ok(image.clone())
         }

         async fn run(&self, _: &EvalCtx, _: &Thunk) -> Result<()> {
            Ok(())
         }

         async fn read(&self, _: &EvalCtx, _: &Thunk, _: Writer<'_>) -> Result<()> {
            Ok(())
         }

         async fn export(&self, _: &EvalCtx, _: &Thunk, _: Writer<'_>) -> Result<()> {
            Ok(())
         }

         async fn export_path(&self, _: &EvalCtx, _: &ThunkPath, _: Writer<'_>) -> Result<()> {
            Ok(())
         }

         async fn publish(&self, _: &EvalCtx, _: &Thunk, image: &ImageRef) -> Result<ImageRef> {
            Ok(image.clone())
         }

         async fn prune(&self, _: &EvalCtx, _: &PruneOpts) -> Result<()> {
            Ok(())
         }
      }

      let thunk = Thunk::new(crate::thunk::ThunkCmd::Command(crate::CommandPath::new("go")));
      assert!(Minimal.load(&EvalCtx::new(), &thunk).await.is_err());
   }
}
