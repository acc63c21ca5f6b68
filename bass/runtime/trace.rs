use std::sync::{
   Arc,
   Mutex,
   MutexGuard,
   PoisonError,
};

use crate::Annotate;

/// How many frames a trace remembers. Older frames are overwritten.
pub const TRACE_SIZE: usize = 1000;

/// A frame is the annotated form being evaluated.
pub type Frame = Arc<Annotate>;

/// The call stack of a single thread of evaluation, kept as a ring buffer.
///
/// The trampoline loses the host stack, so forms record themselves here on
/// the way in and their continuations pop them on the way out. On error the
/// frames are left in place for [`write_error`](crate::write_error).
#[derive(Clone)]
pub struct Trace {
   frames: Vec<Option<Frame>>,
   depth:  usize,
}

impl Default for Trace {
   fn default() -> Self {
      Self {
         frames: vec![None; TRACE_SIZE],
         depth:  0,
      }
   }
}

impl Trace {
   pub fn record(&mut self, frame: Frame) {
      self.frames[self.depth % TRACE_SIZE] = Some(frame);
      self.depth += 1;
   }

   pub fn pop(&mut self, count: usize) {
      for _ in 0..count {
         if self.depth == 0 {
            break;
         }

         self.depth -= 1;
         self.frames[self.depth % TRACE_SIZE] = None;
      }
   }

   #[must_use]
   pub fn depth(&self) -> usize {
      self.depth
   }

   #[must_use]
   pub fn is_empty(&self) -> bool {
      self.depth == 0
   }

   /// The live frames, oldest first.
   #[must_use]
   pub fn frames(&self) -> Vec<Frame> {
      let start = if self.depth > TRACE_SIZE {
         self.depth % TRACE_SIZE
      } else {
         0
      };

      (0..TRACE_SIZE.min(self.depth))
         .filter_map(|offset| self.frames[(start + offset) % TRACE_SIZE].clone())
         .collect()
   }

   /// The frame `offset` calls up from the most recent one.
   #[must_use]
   pub fn caller(&self, offset: usize) -> Option<Frame> {
      if offset >= self.depth.min(TRACE_SIZE) {
         return None;
      }

      self.frames[(self.depth - 1 - offset) % TRACE_SIZE].clone()
   }

   pub fn reset(&mut self) {
      self.depth = 0;
      self.frames.fill(None);
   }
}

/// A [`Trace`] shared between the evaluator and the continuations it
/// creates.
#[derive(Clone, Default)]
pub struct SharedTrace(Arc<Mutex<Trace>>);

impl SharedTrace {
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   fn lock(&self) -> MutexGuard<'_, Trace> {
      self.0.lock().unwrap_or_else(PoisonError::into_inner)
   }

   pub fn record(&self, frame: Frame) {
      self.lock().record(frame);
   }

   pub fn pop(&self, count: usize) {
      self.lock().pop(count);
   }

   #[must_use]
   pub fn frames(&self) -> Vec<Frame> {
      self.lock().frames()
   }

   #[must_use]
   pub fn caller(&self, offset: usize) -> Option<Frame> {
      self.lock().caller(offset)
   }

   #[must_use]
   pub fn is_empty(&self) -> bool {
      self.lock().is_empty()
   }

   pub fn reset(&self) {
      self.lock().reset();
   }

   /// An independent trace starting from a snapshot of this one.
   #[must_use]
   pub fn fork(&self) -> Self {
      Self(Arc::new(Mutex::new(self.lock().clone())))
   }
}
