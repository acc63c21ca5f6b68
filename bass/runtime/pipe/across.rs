use std::{
   future::poll_fn,
   task::Poll,
};

use async_trait::async_trait;
use bass_util::clone;
use tokio::sync::{
   Mutex,
   mpsc::{
      self,
      error::TryRecvError,
   },
};
use tokio_util::sync::CancellationToken;

use super::{
   PipeSource,
   Source,
};
use crate::{
   Error,
   EvalCtx,
   Result,
   Value,
};

struct State {
   started:   bool,
   receivers: Vec<Option<mpsc::Receiver<Value>>>,
   latest:    Vec<Option<Value>>,
}

impl State {
   fn snapshot(&self) -> Value {
      Value::list(self.latest.iter().flatten().cloned())
   }
}

/// A source yielding the latest value of every input each time any of them
/// advances.
///
/// Each input is drained by its own task. The first snapshot waits for every
/// input to produce a value; later snapshots batch whatever arrived since
/// the previous one. The source ends once every input has ended.
pub struct Across {
   sources: Vec<Source>,
   state:   Mutex<State>,
   cancel:  CancellationToken,
}

impl Across {
   #[must_use]
   pub fn new(sources: Vec<Source>) -> Self {
      Self {
         state: Mutex::new(State {
            started:   false,
            receivers: Vec::new(),
            latest:    vec![None; sources.len()],
         }),
         sources,
         cancel: CancellationToken::new(),
      }
   }

   fn start(&self, ctx: &EvalCtx, state: &mut State) {
      state.started = true;

      for source in &self.sources {
         let (sender, receiver) = mpsc::channel(1);
         state.receivers.push(Some(receiver));

         clone!(source, ctx);
         let cancel = self.cancel.clone();

         tokio::spawn(async move {
            loop {
               let next = tokio::select! {
                  biased;

                  () = cancel.cancelled() => return,
                  next = source.next(&ctx) => next,
               };

               let value = match next {
                  Ok(value) => value,
                  Err(Error::EndOfSource) => return,
                  Err(error) => {
                     tracing::warn!(source = %source.name(), %error, "across input failed");
                     return;
                  },
               };

               tokio::select! {
                  biased;

                  () = cancel.cancelled() => return,
                  sent = sender.send(value) => {
                     if sent.is_err() {
                        return;
                     }
                  },
               }
            }
         });
      }
   }
}

#[async_trait]
impl PipeSource for Across {
   fn name(&self) -> String {
      let names = self.sources.iter().map(Source::name).collect::<Vec<_>>();
      format!("across: {names}", names = names.join(" "))
   }

   #[tracing::instrument(level = "trace", skip_all, fields(sources = self.sources.len()))]
   async fn next(&self, ctx: &EvalCtx) -> Result<Value> {
      if self.sources.is_empty() {
         return Err(Error::EndOfSource);
      }

      let mut state = self.state.lock().await;
      if !state.started {
         self.start(ctx, &mut state);
      }

      let state = &mut *state;

      let mut updated = false;
      for (receiver, latest) in state.receivers.iter_mut().zip(state.latest.iter_mut()) {
         if latest.is_some() {
            continue;
         }

         let Some(receiver) = receiver.as_mut() else {
            return Err(Error::EndOfSource);
         };

         let value = tokio::select! {
            biased;

            () = ctx.cancelled() => return Err(Error::Interrupted),
            value = receiver.recv() => value,
         };

         *latest = Some(value.ok_or(Error::EndOfSource)?);
         updated = true;
      }

      if updated {
         return Ok(state.snapshot());
      }

      for (slot, latest) in state.receivers.iter_mut().zip(state.latest.iter_mut()) {
         let Some(receiver) = slot.as_mut() else {
            continue;
         };

         match receiver.try_recv() {
            Ok(value) => {
               *latest = Some(value);
               updated = true;
            },
            Err(TryRecvError::Empty) => {},
            Err(TryRecvError::Disconnected) => *slot = None,
         }
      }

      if updated {
         return Ok(state.snapshot());
      }

      loop {
         if state.receivers.iter().all(Option::is_none) {
            tracing::trace!("every input ended");
            return Err(Error::EndOfSource);
         }

         let receivers = &mut state.receivers;
         let ready = poll_fn(|context| {
            for (index, slot) in receivers.iter_mut().enumerate() {
               if let Some(receiver) = slot.as_mut()
                  && let Poll::Ready(value) = receiver.poll_recv(context)
               {
                  return Poll::Ready((index, value));
               }
            }

            Poll::Pending
         });

         let (index, value) = tokio::select! {
            biased;

            () = ctx.cancelled() => return Err(Error::Interrupted),
            ready = ready => ready,
         };

         match value {
            Some(value) => {
               state.latest[index] = Some(value);
               return Ok(state.snapshot());
            },
            None => state.receivers[index] = None,
         }
      }
   }

   fn close(&self) -> Result<()> {
      self.cancel.cancel();

      let errors = self
         .sources
         .iter()
         .filter_map(|source| source.close().err())
         .collect();

      Error::collect(errors).map_or(Ok(()), Err)
   }
}

impl Drop for Across {
   fn drop(&mut self) {
      self.cancel.cancel();
   }
}
