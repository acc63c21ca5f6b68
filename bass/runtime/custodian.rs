use std::{
   fmt,
   sync::{
      Arc,
      Mutex,
      MutexGuard,
      PoisonError,
   },
};

use crate::{
   Error,
   Result,
};

type Closer = Box<dyn FnOnce() -> Result<()> + Send>;

#[derive(Default)]
struct State {
   closers: Vec<Closer>,
   closed:  bool,
}

/// Owns the resources opened during evaluation and releases them together.
///
/// Resources close in the reverse of the order they were registered in.
/// Registering with a closed custodian closes the resource immediately.
#[derive(Clone, Default)]
pub struct Custodian(Arc<Mutex<State>>);

impl Custodian {
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   fn lock(&self) -> MutexGuard<'_, State> {
      self.0.lock().unwrap_or_else(PoisonError::into_inner)
   }

   pub fn register(&self, close: impl FnOnce() -> Result<()> + Send + 'static) {
      let mut state = self.lock();

      if state.closed {
         drop(state);

         if let Err(error) = close() {
            tracing::warn!(%error, "closing resource registered after close");
         }

         return;
      }

      state.closers.push(Box::new(close));
   }

   /// A child custodian that is closed along with this one.
   #[must_use]
   pub fn fork(&self) -> Self {
      let child = Self::new();

      let registered = child.clone();
      self.register(move || registered.close());

      child
   }

   /// Closes every registered resource, newest first, and reports all
   /// failures together. Closing twice does nothing.
   pub fn close(&self) -> Result<()> {
      let closers = {
         let mut state = self.lock();
         state.closed = true;
         std::mem::take(&mut state.closers)
      };

      let errors = closers
         .into_iter()
         .rev()
         .filter_map(|close| close().err())
         .collect();

      Error::collect(errors).map_or(Ok(()), Err)
   }
}

impl fmt::Debug for Custodian {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      let state = self.lock();

      writer
         .debug_struct("Custodian")
         .field("resources", &state.closers.len())
         .field("closed", &state.closed)
         .finish()
   }
}
