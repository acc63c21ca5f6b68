use bytes::Bytes;

use super::define;
use crate::{
   Builtin,
   Error,
   EvalCtx,
   Readable,
   Result,
   Scope,
   Sink,
   Source,
   Symbol,
   Value,
   memo,
   pipe::{
      Across,
      StaticSource,
      protocol,
   },
};

/// The full content of something readable: a thunk's stdout, a file in a
/// thunk's output, a host file, or a file in an in-memory filesystem.
async fn read_all(ctx: &EvalCtx, readable: &Value) -> Result<Bytes> {
   match *readable.unannotated() {
      Value::Thunk(ref thunk) => {
         let runtime = ctx.runtime(thunk.platform())?;

         let mut output = Vec::new();
         runtime.read(ctx, thunk, &mut output).await?;

         Ok(Bytes::from(output))
      },

      Value::ThunkPath(ref path) => {
         memo::export_file(ctx, path)
            .await?
            .ok_or_else(|| Error::Host(bass_error::error!("no file at {path}")))
      },

      Value::HostPath(ref path) => Ok(Bytes::from(tokio::fs::read(path.host_path()?).await?)),

      Value::FsPath(ref path) => path.read(),

      _ => Err(Error::decode(readable, "readable")),
   }
}

pub(super) fn register(ground: &Scope) {
   define(
      ground,
      "list->source",
      Builtin::func("list->source", "[list]", |_, args| {
         let values = args.get::<Vec<Value>>(0)?;
         Ok(Value::Source(Source::new(StaticSource::new("list", values))))
      }),
      &[
         "creates a pipe source from a list of values",
         "The returned source yields each value and then ends.",
         "=> (list->source [1 2 3])",
      ],
   );

   define(
      ground,
      "emit",
      Builtin::func("emit", "[val sink]", |_, args| {
         let value = args.value(0)?;
         args.get::<Sink>(1)?.emit(value)?;
         Ok(Value::Null)
      }),
      &["sends a value to a pipe sink", "=> (emit \"hello, world!\" *stdout*)"],
   );

   define(
      ground,
      "next",
      Builtin::func_async("next", "[source & default]", |ctx, args| {
         async move {
            let source = args.get::<Source>(0)?;

            match source.next(&ctx).await {
               Err(Error::EndOfSource) if args.len() > 1 => args.get::<Value>(1),
               result => result,
            }
         }
      }),
      &[
         "receives the next value from a source",
         "If the source has ended, no value will be available. A default value may be provided, otherwise an error \
          is raised.",
         "=> (next (list->source [1]) :eof)",
         "=> (next *stdin* :eof)",
      ],
   );

   define(
      ground,
      "across",
      Builtin::func("across", "sources", |ctx, args| {
         let source = Source::new(Across::new(args.rest_as::<Source>(0)?));

         let closing = source.clone();
         ctx.custodian().register(move || closing.close());

         Ok(Value::Source(source))
      }),
      &[
         "returns a source that yields each value from all the given sources",
         "Values are yielded as a list of the latest value from each source, starting once every source has \
          produced one.",
         "=> (next (across (list->source [1]) (list->source [:a])))",
      ],
   );

   define(
      ground,
      "read",
      Builtin::func_async("read", "[readable protocol]", |ctx, args| {
         async move {
            let protocol = args.get::<Symbol>(1)?;
            let data = read_all(&ctx, &args.get::<Readable>(0)?.0).await?;

            tracing::debug!(%protocol, bytes = data.len(), "decoding output");

            Ok(Value::Source(protocol::decode(protocol.as_str(), data)?))
         }
      }),
      &[
         "reads a thunk's output, a file, or a filesystem path as a stream of values",
         "The protocol determines how the bytes are decoded: raw, lines, unix-table, json or tar.",
         "=> (next (read (mkfs ./file \"hello\") :raw))",
      ],
   );
}
