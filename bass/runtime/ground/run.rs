use std::sync::Arc;

use bass_util::clone;
use tokio::{
   io::AsyncWriteExt as _,
   sync::watch,
};

use super::define;
use crate::{
   Builtin,
   Call,
   Combiner,
   Cont,
   Error,
   EvalCtx,
   HostPath,
   Result,
   Scope,
   Step,
   Symbol,
   Thunk,
   Value,
   memo,
   thunk::ImageRef,
   trampoline,
};

type Outcome = Option<Result<Value>>;

/// Runs a started thunk and hands the result to its handler, publishing
/// whatever the handler returns.
async fn supervise(
   ctx: EvalCtx,
   scope: Scope,
   thunk: Arc<Thunk>,
   handler: Value,
   done: watch::Sender<Outcome>,
) -> Result<()> {
   let result = match ctx.runtime(thunk.platform()) {
      Ok(runtime) => runtime.run(&ctx, &thunk).await,
      Err(error) => Err(error),
   };

   let arg = match result {
      Ok(()) => Value::Null,
      Err(error) => {
         tracing::debug!(thunk = %thunk.name(), %error, "started thunk failed");
         Value::error(error)
      },
   };

   let handled = trampoline(&ctx, handler.apply(&ctx, vec![arg], &scope, Cont::identity())).await;
   done.send_replace(Some(handled.clone()));

   handled.map(|_| ())
}

/// A combiner that waits for a started thunk's handler and returns its
/// result.
fn waiter(thunk: &Thunk, done: watch::Receiver<Outcome>) -> Value {
   let name = format!("wait-{name}", name = thunk.name());

   Builtin::func_async(&name, "[]", move |_, _| {
      let mut done = done.clone();

      async move {
         let outcome = done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::Host(bass_error::error!("started thunk exited without a result")))?
            .clone();

         outcome.unwrap_or(Ok(Value::Null))
      }
   })
}

/// Runs the thunk behind `memo` if the result is not already stored.
async fn memoize(
   ctx: EvalCtx,
   scope: Scope,
   memos: Value,
   thunk: Arc<Thunk>,
   binding: Symbol,
   args: Vec<Value>,
) -> Result<Value> {
   let memos = memo::open(&ctx, &memos).await?;
   let input = Value::list(args.iter().cloned());

   let hit = memo::blocking({
      clone!(memos, thunk, binding, input);
      move || memos.retrieve(&thunk, &binding, &input)
   })
   .await?;

   if let Some(output) = hit {
      tracing::trace!(%binding, "memo hit");
      return Ok(output);
   }

   let runtime = ctx.runtime(thunk.platform())?;
   let module = runtime.load(&ctx, &thunk).await?;

   let Some(combiner) = module.get(&binding) else {
      return Err(Error::Unbound {
         symbol: binding,
         scope:  module,
      });
   };

   let output = trampoline(&ctx, combiner.apply(&ctx, args, &scope, Cont::identity())).await?;
   memo::blocking({
      clone!(output);
      move || memos.store(&thunk, &binding, &input, &output)
   })
   .await?;

   Ok(output)
}

pub(super) fn register(ground: &Scope) {
   define(
      ground,
      "load",
      Builtin::func_async("load", "[thunk]", |ctx, args| {
         async move {
            let thunk = args.get::<Arc<Thunk>>(0)?;
            let runtime = ctx.runtime(thunk.platform())?;

            Ok(Value::Scope(runtime.load(&ctx, &thunk).await?))
         }
      }),
      &[
         "load a thunk as a module",
         "This is the primitive mechanism for loading other Bass code.",
         "=> (load (.strings))",
      ],
   );

   define(
      ground,
      "resolve",
      Builtin::func_async("resolve", "[ref]", |ctx, args| {
         async move {
            let image = args.get::<ImageRef>(0)?;
            let runtime = ctx.runtime(Some(&image.platform))?;

            Ok(runtime.resolve(&ctx, &image).await?.to_value())
         }
      }),
      &[
         "resolve an image reference to its most exact form",
         "=> (resolve {:platform {:os \"linux\"} :repository \"golang\" :tag \"latest\"})",
      ],
   );

   define(
      ground,
      "run",
      Builtin::func_async("run", "[thunk]", |ctx, args| {
         async move {
            let thunk = args.get::<Arc<Thunk>>(0)?;
            let runtime = ctx.runtime(thunk.platform())?;

            runtime.run(&ctx, &thunk).await?;
            Ok(Value::Null)
         }
      }),
      &[
         "run a thunk",
         "Raises an error if the thunk's command fails (i.e. non-zero exit code). Returns null.",
         "=> (run (from (linux/alpine) ($ echo \"Hello, world!\")))",
      ],
   );

   define(
      ground,
      "succeeds?",
      Builtin::func_async("succeeds?", "[thunk]", |ctx, args| {
         async move {
            let thunk = args.get::<Arc<Thunk>>(0)?;
            let runtime = ctx.runtime(thunk.platform())?;

            match runtime.run(&ctx, &thunk).await {
               Ok(()) => Ok(Value::Bool(true)),
               Err(error) if error.is_interrupted() => Err(error),
               Err(error) => {
                  tracing::debug!(thunk = %thunk.name(), %error, "thunk did not succeed");
                  Ok(Value::Bool(false))
               },
            }
         }
      }),
      &[
         "returns true if the thunk successfully runs (i.e. 0 exit code)",
         "Returns false if it fails. Errors selecting a runtime are still raised.",
         "=> (succeeds? (from (linux/alpine) (.false)))",
      ],
   );

   define(
      ground,
      "start",
      Builtin::func_cont("start", "[thunk handler]", |Call { ctx, scope, args, cont }| {
         let thunk = attempt!(cont, args.get::<Arc<Thunk>>(0));
         let handler = attempt!(cont, args.get::<Combiner>(1)).0;

         let (done, waiting) = watch::channel(None);
         let waiter = waiter(&thunk, waiting);

         ctx.runs().go(supervise(ctx.fork(), scope, thunk, handler, done));

         cont.ok(waiter)
      }),
      &[
         "starts running a thunk asynchronously",
         "The handler is called exactly once with null if the thunk succeeds or with its error if it fails. \
          Returns a combiner that waits for the handler and returns its result.",
         "=> (def wait-echo (start ($ echo \"hi\") (fn [err] (if err (error err) :ok))))",
      ],
   );

   define(
      ground,
      "wait",
      Builtin::func_async("wait", "[]", |ctx, _| {
         async move {
            ctx.runs().wait().await?;
            Ok(Value::Null)
         }
      }),
      &["waits for every started thunk and raises any errors they returned", "=> (wait)"],
   );

   define(
      ground,
      "export",
      Builtin::func_async("export", "[thunk-or-path host-file]", |ctx, args| {
         async move {
            let target = args.get::<Arc<HostPath>>(1)?.host_path()?;
            let mut file = tokio::fs::File::create(&target).await?;

            match *args.value(0)?.unannotated() {
               Value::Thunk(ref thunk) => {
                  let runtime = ctx.runtime(thunk.platform())?;
                  runtime.export(&ctx, thunk, &mut file).await?;
               },

               Value::ThunkPath(ref path) => {
                  let runtime = ctx.runtime(path.thunk.platform())?;
                  runtime.export_path(&ctx, path, &mut file).await?;
               },

               ref other => return Err(Error::decode(other, "thunk or thunk path")),
            }

            file.flush().await?;
            tracing::debug!(target = %target.display(), "exported");

            Ok(Value::Null)
         }
      }),
      &[
         "writes a tarball of a thunk's image or a path it produced to a host file",
         "=> (export (.tests) *dir*/tests.tar)",
      ],
   );

   define(
      ground,
      "publish",
      Builtin::func_async("publish", "[thunk ref]", |ctx, args| {
         async move {
            let thunk = args.get::<Arc<Thunk>>(0)?;
            let image = args.get::<ImageRef>(1)?;
            let runtime = ctx.runtime(thunk.platform())?;

            Ok(runtime.publish(&ctx, &thunk, &image).await?.to_value())
         }
      }),
      &[
         "pushes a thunk's image to a registry and returns the fully qualified reference",
         "=> (publish (.app) {:platform {:os \"linux\"} :repository \"example/app\" :tag \"latest\"})",
      ],
   );

   define(
      ground,
      "memo",
      Builtin::func("memo", "[memos thunk binding]", |_, args| {
         let memos = args.get::<Value>(0)?;
         let thunk = args.get::<Arc<Thunk>>(1)?;
         let binding = args.get::<Symbol>(2)?;

         let name = format!("memo-{binding}");
         Ok(Builtin::func_cont(&name, "args", move |Call { ctx, scope, args, cont }| {
            let call = memoize(
               ctx,
               scope,
               memos.clone(),
               thunk.clone(),
               binding.clone(),
               args.rest(0).to_vec(),
            );

            Step::wait(async move { cont.call(call.await) })
         }))
      }),
      &[
         "caches calls to a binding of a module in a lockfile",
         "Returns a function that calls binding from the module loaded from thunk, storing each result in the \
          memos lockfile keyed by the thunk, binding, and arguments. Stored results are returned without loading \
          the module.",
         "=> (def resolve-cached (memo *memos* (.deps) :resolve))",
      ],
   );
}
