use std::{
   fmt,
   io,
   sync::{
      Arc,
      Mutex,
      MutexGuard,
      PoisonError,
   },
};

use tokio_util::sync::{
   CancellationToken,
   WaitForCancellationFuture,
};

use crate::{
   Custodian,
   Error,
   Result,
   Runs,
   SharedTrace,
   runtime::{
      Runtime,
      RuntimePool,
   },
   thunk::Platform,
};

/// A shared, line-oriented writer for diagnostics such as `dump` and `doc`.
#[derive(Clone)]
pub struct Output(Arc<Mutex<Box<dyn io::Write + Send>>>);

impl Output {
   #[must_use]
   pub fn new(writer: impl io::Write + Send + 'static) -> Self {
      Self(Arc::new(Mutex::new(Box::new(writer))))
   }

   #[must_use]
   pub fn stderr() -> Self {
      Self::new(io::stderr())
   }

   fn lock(&self) -> MutexGuard<'_, Box<dyn io::Write + Send>> {
      self.0.lock().unwrap_or_else(PoisonError::into_inner)
   }

   pub fn write_str(&self, content: &str) -> Result<()> {
      let mut writer = self.lock();
      writer.write_all(content.as_bytes())?;
      writer.flush()?;
      Ok(())
   }

   pub fn write_line(&self, line: &str) -> Result<()> {
      self.write_str(&format!("{line}\n"))
   }
}

impl fmt::Debug for Output {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      writer.write_str("Output")
   }
}

/// An in-memory writer whose contents can be read back.
#[derive(Debug, Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
   #[must_use]
   pub fn contents(&self) -> String {
      String::from_utf8_lossy(&self.0.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
   }
}

impl io::Write for Capture {
   fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
      self
         .0
         .lock()
         .unwrap_or_else(PoisonError::into_inner)
         .extend_from_slice(buffer);
      Ok(buffer.len())
   }

   fn flush(&mut self) -> io::Result<()> {
      Ok(())
   }
}

/// The ambient state of one thread of evaluation.
///
/// Cloning shares everything. [`EvalCtx::fork`] is for starting concurrent
/// work: the fork gets its own trace, a child cancellation token and a child
/// custodian, and shares the rest.
#[derive(Clone)]
pub struct EvalCtx {
   trace:     Option<SharedTrace>,
   cancel:    CancellationToken,
   custodian: Custodian,
   pool:      Option<Arc<dyn RuntimePool>>,
   runs:      Runs,
   stderr:    Output,
}

impl EvalCtx {
   /// A context with a fresh trace, no runtime pool, and diagnostics going
   /// to the process stderr.
   #[must_use]
   pub fn new() -> Self {
      Self {
         trace:     Some(SharedTrace::new()),
         cancel:    CancellationToken::new(),
         custodian: Custodian::new(),
         pool:      None,
         runs:      Runs::new(),
         stderr:    Output::stderr(),
      }
   }

   #[must_use]
   pub fn with_pool(self, pool: Arc<dyn RuntimePool>) -> Self {
      Self {
         pool: Some(pool),
         ..self
      }
   }

   #[must_use]
   pub fn with_stderr(self, stderr: Output) -> Self {
      Self { stderr, ..self }
   }

   /// A context that does not record a trace.
   #[must_use]
   pub fn untraced(self) -> Self {
      Self {
         trace: None,
         ..self
      }
   }

   #[must_use]
   pub fn fork(&self) -> Self {
      Self {
         trace:     self.trace.as_ref().map(SharedTrace::fork),
         cancel:    self.cancel.child_token(),
         custodian: self.custodian.fork(),
         pool:      self.pool.clone(),
         runs:      self.runs.clone(),
         stderr:    self.stderr.clone(),
      }
   }

   #[must_use]
   pub fn trace(&self) -> Option<&SharedTrace> {
      self.trace.as_ref()
   }

   pub fn cancel(&self) {
      self.cancel.cancel();
   }

   #[must_use]
   pub fn is_cancelled(&self) -> bool {
      self.cancel.is_cancelled()
   }

   /// Completes once the context is cancelled.
   pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
      self.cancel.cancelled()
   }

   #[must_use]
   pub fn custodian(&self) -> &Custodian {
      &self.custodian
   }

   #[must_use]
   pub fn runs(&self) -> &Runs {
      &self.runs
   }

   #[must_use]
   pub fn stderr(&self) -> &Output {
      &self.stderr
   }

   pub fn pool(&self) -> Result<&Arc<dyn RuntimePool>> {
      self.pool.as_ref().ok_or(Error::NoRuntimePool)
   }

   /// The runtime for a thunk's platform.
   pub fn runtime(&self, platform: Option<&Platform>) -> Result<Arc<dyn Runtime>> {
      self.pool()?.select(platform)
   }
}

impl Default for EvalCtx {
   fn default() -> Self {
      Self::new()
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::runtime::fake;

   #[test]
   fn forks_share_cancellation_downwards() {
      let ctx = EvalCtx::new();
      let fork = ctx.fork();

      fork.cancel();
      assert!(fork.is_cancelled());
      assert!(!ctx.is_cancelled());

      let fork = ctx.fork();
      ctx.cancel();
      assert!(fork.is_cancelled());
   }

   #[test]
   fn runtimes_need_a_pool() {
      let ctx = EvalCtx::new();
      assert!(matches!(ctx.runtime(Some(&fake::linux())), Err(Error::NoRuntimePool)));

      let (_, pool) = fake::pool();
      let ctx = ctx.with_pool(pool);
      assert!(ctx.runtime(Some(&fake::linux())).is_ok());
   }

   #[test]
   fn captured_output() {
      let capture = Capture::default();
      let ctx = EvalCtx::new().with_stderr(Output::new(capture.clone()));

      ctx.stderr().write_line("hello").unwrap();
      assert_eq!(capture.contents(), "hello\n");
   }
}
