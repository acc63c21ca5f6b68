use std::{
   future::Future,
   sync::{
      Arc,
      Mutex,
      MutexGuard,
      PoisonError,
   },
};

use tokio::task::JoinSet;

use crate::{
   Error,
   Result,
};

/// Tracks tasks started with `start` so they can be waited on together.
#[derive(Clone, Default)]
pub struct Runs(Arc<Mutex<JoinSet<Result<()>>>>);

impl Runs {
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   fn lock(&self) -> MutexGuard<'_, JoinSet<Result<()>>> {
      self.0.lock().unwrap_or_else(PoisonError::into_inner)
   }

   /// Spawns a tracked task.
   pub fn go(&self, task: impl Future<Output = Result<()>> + Send + 'static) {
      self.lock().spawn(task);
   }

   /// Waits for every tracked task, including ones started while waiting,
   /// and reports all failures together.
   pub async fn wait(&self) -> Result<()> {
      let mut errors = Vec::new();

      loop {
         let mut tasks = std::mem::take(&mut *self.lock());
         if tasks.is_empty() {
            break;
         }

         while let Some(joined) = tasks.join_next().await {
            match joined {
               Ok(Ok(())) => {},
               Ok(Err(error)) => errors.push(error),
               Err(error) => {
                  errors.push(Error::Host(bass_error::error!("run panicked or was aborted: {error}")));
               },
            }
         }
      }

      Error::collect(errors).map_or(Ok(()), Err)
   }
}

#[cfg(test)]
mod tests {
   use std::sync::atomic::{
      AtomicUsize,
      Ordering,
   };

   use super::*;

   #[tokio::test]
   async fn waits_for_nested_runs() {
      let runs = Runs::new();
      let count = Arc::new(AtomicUsize::new(0));

      let nested = runs.clone();
      let counter = count.clone();
      runs.go(async move {
         let counter = counter.clone();
         nested.go(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
         });
         Ok(())
      });

      runs.wait().await.unwrap();
      assert_eq!(count.load(Ordering::SeqCst), 1);
   }

   #[tokio::test]
   async fn aggregates_errors() {
      let runs = Runs::new();
      runs.go(async { Err(Error::message("first")) });
      runs.go(async { Ok(()) });
      runs.go(async { Err(Error::message("second")) });

      let error = runs.wait().await.unwrap_err();
      let Error::Aggregate(errors) = error else {
         panic!("expected an aggregate error");
      };
      assert_eq!(errors.len(), 2);
   }
}
