use std::{
   fmt,
   future::Future,
   pin::Pin,
   sync::Arc,
};

use crate::{
   EvalCtx,
   Error,
   Result,
   SharedTrace,
   Value,
};

/// One step of evaluation, driven by [`trampoline`].
pub enum Step {
   /// Evaluation finished.
   Done(Value),
   /// More work to do. Running it returns the next step.
   Next(Box<dyn FnOnce() -> Step + Send>),
   /// Suspended on host work, such as a runtime call or a pipe read.
   Await(Pin<Box<dyn Future<Output = Step> + Send>>),
   /// Evaluation failed. The trace is left as it was for reporting.
   Fail(Error),
}

impl Step {
   #[must_use]
   pub fn next(next: impl FnOnce() -> Step + Send + 'static) -> Self {
      Self::Next(Box::new(next))
   }

   #[must_use]
   pub fn wait(future: impl Future<Output = Step> + Send + 'static) -> Self {
      Self::Await(Box::pin(future))
   }
}

impl fmt::Debug for Step {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      match *self {
         Self::Done(ref value) => write!(writer, "Done({value})"),
         Self::Next(_) => writer.write_str("Next"),
         Self::Await(_) => writer.write_str("Await"),
         Self::Fail(ref error) => write!(writer, "Fail({error})"),
      }
   }
}

type ContFn = Arc<dyn Fn(Value) -> Step + Send + Sync>;

/// A continuation: what to do with the result of an evaluation.
///
/// Continuations are never exposed to Bass code. A continuation may carry
/// a trace along with how many frames it should pop once it receives a
/// value, which is how the trace mirrors the logical call stack.
#[derive(Clone, Default)]
pub struct Cont {
   func:   Option<ContFn>,
   trace:  Option<SharedTrace>,
   traced: usize,
}

impl Cont {
   /// The continuation that finishes evaluation with its value.
   #[must_use]
   pub fn identity() -> Self {
      Self::default()
   }

   #[must_use]
   pub fn new(func: impl Fn(Value) -> Step + Send + Sync + 'static) -> Self {
      Self {
         func:   Some(Arc::new(func)),
         trace:  None,
         traced: 0,
      }
   }

   /// A copy that pops one more frame off `trace` when it receives a value.
   #[must_use]
   pub fn traced(&self, trace: &SharedTrace) -> Self {
      Self {
         func:   self.func.clone(),
         trace:  Some(trace.clone()),
         traced: self.traced + 1,
      }
   }

   /// Continues with a result. Values pop the traced frames and schedule
   /// the continuation; errors fail immediately.
   #[must_use]
   pub fn call(&self, result: Result<Value>) -> Step {
      match result {
         Ok(value) => self.ok(value),
         Err(error) => Step::Fail(error),
      }
   }

   #[must_use]
   pub fn ok(&self, value: Value) -> Step {
      if self.traced > 0
         && let Some(ref trace) = self.trace
      {
         trace.pop(self.traced);
      }

      match self.func {
         None => Step::Done(value),
         Some(ref func) => {
            let func = func.clone();
            Step::next(move || func(value))
         },
      }
   }

   #[must_use]
   pub fn fail(&self, error: Error) -> Step {
      Step::Fail(error)
   }
}

/// Runs steps until evaluation finishes or fails, checking for cancellation
/// between every step.
pub async fn trampoline(ctx: &EvalCtx, mut step: Step) -> Result<Value> {
   loop {
      if ctx.is_cancelled() {
         return Err(Error::Interrupted);
      }

      step = match step {
         Step::Done(value) => return Ok(value),
         Step::Fail(error) => return Err(error),
         Step::Next(next) => next(),

         Step::Await(future) => {
            tokio::select! {
               biased;

               () = ctx.cancelled() => return Err(Error::Interrupted),
               step = future => step,
            }
         },
      };
   }
}

#[cfg(test)]
mod tests {
   use std::sync::atomic::{
      AtomicUsize,
      Ordering,
   };

   use super::*;
   use crate::{
      Annotate,
      Position,
      Range,
   };

   #[tokio::test]
   async fn identity_finishes() {
      let ctx = EvalCtx::new();

      let value = trampoline(&ctx, Cont::identity().ok(Value::Int(1))).await;
      assert_eq!(value.unwrap(), Value::Int(1));
   }

   #[tokio::test]
   async fn deep_chains_keep_the_stack_flat() {
      fn count(remaining: usize, total: Arc<AtomicUsize>, cont: Cont) -> Step {
         if remaining == 0 {
            return cont.ok(Value::from(total.load(Ordering::SeqCst)));
         }

         Cont::new(move |_| {
            total.fetch_add(1, Ordering::SeqCst);
            count(remaining - 1, total.clone(), cont.clone())
         })
         .ok(Value::Null)
      }

      let ctx = EvalCtx::new();
      let total = Arc::new(AtomicUsize::new(0));

      let value = trampoline(&ctx, count(100_000, total, Cont::identity())).await;
      assert_eq!(value.unwrap(), Value::Int(100_000));
   }

   #[tokio::test]
   async fn traced_continuations_pop() {
      let trace = SharedTrace::new();
      let frame = Arc::new(Annotate::new(Value::Null, Range {
         file:  Arc::from("test.bass"),
         start: Position::default(),
         end:   Position::default(),
      }));

      trace.record(frame.clone());
      trace.record(frame);

      let cont = Cont::identity().traced(&trace).traced(&trace);
      let step = cont.ok(Value::Null);

      assert!(matches!(step, Step::Done(Value::Null)));
      assert!(trace.is_empty());
   }

   #[tokio::test]
   async fn errors_keep_the_trace() {
      let trace = SharedTrace::new();
      trace.record(Arc::new(Annotate::new(Value::Null, Range {
         file:  Arc::from("test.bass"),
         start: Position::default(),
         end:   Position::default(),
      })));

      let step = Cont::identity()
         .traced(&trace)
         .call(Err(Error::message("boom")));

      assert!(matches!(step, Step::Fail(_)));
      assert!(!trace.is_empty());
   }

   #[tokio::test]
   async fn cancellation_interrupts() {
      let ctx = EvalCtx::new();
      ctx.cancel();

      let result = trampoline(&ctx, Step::next(|| Step::Done(Value::Null))).await;
      assert!(matches!(result, Err(Error::Interrupted)));
   }

   #[tokio::test]
   async fn awaiting_races_cancellation() {
      let ctx = EvalCtx::new();
      let canceller = ctx.clone();

      let step = Step::wait(async move {
         canceller.cancel();
         std::future::pending::<Step>().await
      });

      assert!(matches!(
         trampoline(&ctx, step).await,
         Err(Error::Interrupted)
      ));
   }
}
