//! Sources and sinks: streams of values flowing in and out of scripts.

mod across;
pub mod protocol;

use std::{
   collections::VecDeque,
   fmt,
   io,
   sync::{
      Arc,
      Mutex,
      MutexGuard,
      PoisonError,
   },
};

use async_trait::async_trait;
use tokio::io::{
   AsyncRead,
   AsyncReadExt as _,
};

pub use self::across::Across;
use crate::{
   Error,
   EvalCtx,
   Result,
   Value,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
   mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A stream of values.
#[async_trait]
pub trait PipeSource: Send + Sync {
   fn name(&self) -> String;

   /// The next value, or [`Error::EndOfSource`] once the stream is
   /// exhausted.
   async fn next(&self, ctx: &EvalCtx) -> Result<Value>;

   fn close(&self) -> Result<()> {
      Ok(())
   }
}

/// A destination for values.
pub trait PipeSink: Send + Sync {
   fn name(&self) -> String;

   fn emit(&self, value: &Value) -> Result<()>;
}

/// A shared handle to a [`PipeSource`].
#[derive(Clone)]
pub struct Source(Arc<dyn PipeSource>);

impl Source {
   #[must_use]
   pub fn new(source: impl PipeSource + 'static) -> Self {
      Self(Arc::new(source))
   }

   #[must_use]
   pub fn name(&self) -> String {
      self.0.name()
   }

   pub async fn next(&self, ctx: &EvalCtx) -> Result<Value> {
      self.0.next(ctx).await
   }

   pub fn close(&self) -> Result<()> {
      self.0.close()
   }

   #[must_use]
   pub fn ptr_eq(&self, other: &Self) -> bool {
      Arc::as_ptr(&self.0).cast::<()>() == Arc::as_ptr(&other.0).cast::<()>()
   }
}

impl fmt::Debug for Source {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "<source: {name}>", name = self.name())
   }
}

/// A shared handle to a [`PipeSink`].
#[derive(Clone)]
pub struct Sink(Arc<dyn PipeSink>);

impl Sink {
   #[must_use]
   pub fn new(sink: impl PipeSink + 'static) -> Self {
      Self(Arc::new(sink))
   }

   #[must_use]
   pub fn name(&self) -> String {
      self.0.name()
   }

   pub fn emit(&self, value: &Value) -> Result<()> {
      self.0.emit(value)
   }

   #[must_use]
   pub fn ptr_eq(&self, other: &Self) -> bool {
      Arc::as_ptr(&self.0).cast::<()>() == Arc::as_ptr(&other.0).cast::<()>()
   }
}

impl fmt::Debug for Sink {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "<sink: {name}>", name = self.name())
   }
}

/// A source yielding a fixed list of values.
pub struct StaticSource {
   name:   String,
   values: Mutex<VecDeque<Value>>,
}

impl StaticSource {
   #[must_use]
   pub fn new(name: &str, values: impl IntoIterator<Item = Value>) -> Self {
      Self {
         name:   name.to_owned(),
         values: Mutex::new(values.into_iter().collect()),
      }
   }
}

#[async_trait]
impl PipeSource for StaticSource {
   fn name(&self) -> String {
      self.name.clone()
   }

   async fn next(&self, _: &EvalCtx) -> Result<Value> {
      lock(&self.values).pop_front().ok_or(Error::EndOfSource)
   }
}

/// A sink collecting everything emitted to it.
#[derive(Default)]
pub struct InMemorySink {
   values: Mutex<Vec<Value>>,
}

impl InMemorySink {
   #[must_use]
   pub fn values(&self) -> Vec<Value> {
      lock(&self.values).clone()
   }

   /// A source replaying the values emitted so far.
   #[must_use]
   pub fn source(&self, name: &str) -> Source {
      Source::new(StaticSource::new(name, self.values()))
   }
}

impl PipeSink for InMemorySink {
   fn name(&self) -> String {
      "memory".to_owned()
   }

   fn emit(&self, value: &Value) -> Result<()> {
      lock(&self.values).push(value.clone());
      Ok(())
   }
}

/// A sink writing one JSON value per line.
pub struct JsonSink<W> {
   name:   String,
   writer: Mutex<W>,
}

impl<W: io::Write + Send> JsonSink<W> {
   #[must_use]
   pub fn new(name: &str, writer: W) -> Self {
      Self {
         name:   name.to_owned(),
         writer: Mutex::new(writer),
      }
   }
}

impl<W: io::Write + Send> PipeSink for JsonSink<W> {
   fn name(&self) -> String {
      self.name.clone()
   }

   fn emit(&self, value: &Value) -> Result<()> {
      let json = value.to_json()?;

      let mut writer = lock(&self.writer);
      serde_json::to_writer(&mut *writer, &json)?;
      writer.write_all(b"\n")?;
      writer.flush()?;

      Ok(())
   }
}

struct JsonReader<R> {
   reader: R,
   buffer: Vec<u8>,
   eof:    bool,
}

/// A source decoding a stream of JSON values as they arrive.
pub struct JsonSource<R> {
   name:  String,
   state: tokio::sync::Mutex<JsonReader<R>>,
}

impl<R: AsyncRead + Send + Unpin> JsonSource<R> {
   #[must_use]
   pub fn new(name: &str, reader: R) -> Self {
      Self {
         name:  name.to_owned(),
         state: tokio::sync::Mutex::new(JsonReader {
            reader,
            buffer: Vec::new(),
            eof: false,
         }),
      }
   }
}

#[async_trait]
impl<R: AsyncRead + Send + Unpin> PipeSource for JsonSource<R> {
   fn name(&self) -> String {
      self.name.clone()
   }

   async fn next(&self, _: &EvalCtx) -> Result<Value> {
      let mut state = self.state.lock().await;

      loop {
         let mut stream =
            serde_json::Deserializer::from_slice(&state.buffer).into_iter::<serde_json::Value>();

         match stream.next() {
            Some(Ok(json)) => {
               let consumed = stream.byte_offset();
               state.buffer.drain(..consumed);
               return Value::from_json(&json);
            },

            Some(Err(error)) if !error.is_eof() => return Err(error.into()),

            _ if state.eof => {
               if state.buffer.iter().all(u8::is_ascii_whitespace) {
                  return Err(Error::EndOfSource);
               }

               return Err(Error::Host(bass_error::error!(
                  "{name}: unexpected end of JSON stream",
                  name = self.name,
               )));
            },

            _ => {
               let state = &mut *state;
               let read = state.reader.read_buf(&mut state.buffer).await?;
               state.eof = read == 0;
            },
         }
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[tokio::test]
   async fn static_sources_end() {
      let ctx = EvalCtx::new();
      let source = Source::new(StaticSource::new("test", [Value::Int(1)]));

      assert_eq!(source.next(&ctx).await.unwrap(), Value::Int(1));
      assert!(matches!(source.next(&ctx).await, Err(Error::EndOfSource)));
      assert!(matches!(source.next(&ctx).await, Err(Error::EndOfSource)));
   }

   #[tokio::test]
   async fn in_memory_sinks_replay() {
      let ctx = EvalCtx::new();
      let sink = InMemorySink::default();

      sink.emit(&Value::Int(1)).unwrap();
      sink.emit(&Value::string("two")).unwrap();

      let source = sink.source("replay");
      assert_eq!(source.next(&ctx).await.unwrap(), Value::Int(1));
      assert_eq!(source.next(&ctx).await.unwrap(), Value::string("two"));
   }

   #[test]
   fn json_sinks_write_lines() {
      let sink = JsonSink::new("out", Vec::new());

      sink.emit(&Value::Int(1)).unwrap();
      sink.emit(&Value::list([Value::string("a")])).unwrap();

      let written = lock(&sink.writer).clone();
      assert_eq!(String::from_utf8(written).unwrap(), "1\n[\"a\"]\n");
   }

   #[tokio::test]
   async fn json_sources_stream() {
      let ctx = EvalCtx::new();
      let input: &[u8] = b"1 {\"a\": \n true}\n\"three\"\n";
      let source = JsonSource::new("stdin", input);

      assert_eq!(source.next(&ctx).await.unwrap(), Value::Int(1));

      let Value::Scope(scope) = source.next(&ctx).await.unwrap() else {
         panic!("expected a scope");
      };
      assert_eq!(scope.get(&"a".into()), Some(Value::Bool(true)));

      assert_eq!(source.next(&ctx).await.unwrap(), Value::string("three"));
      assert!(matches!(source.next(&ctx).await, Err(Error::EndOfSource)));
   }

   #[tokio::test]
   async fn truncated_json_fails() {
      let ctx = EvalCtx::new();
      let input: &[u8] = b"{\"a\": ";
      let source = JsonSource::new("stdin", input);

      assert!(matches!(source.next(&ctx).await, Err(Error::Host(_))));
   }
}
