//! Evaluation and combiner dispatch.
//!
//! Everything here is written in continuation-passing style: instead of
//! returning a value, each function hands its result to a [`Cont`] and
//! returns the [`Step`] that does so. [`trampoline`] drives the steps.

use std::sync::Arc;

use crate::{
   Annotate,
   Cont,
   Error,
   EvalCtx,
   FileOrDir,
   Range,
   Result,
   Scope,
   Step,
   Symbol,
   Thunk,
   Value,
   thunk::ThunkCmd,
   trampoline,
};

/// Evaluates a form to completion.
pub async fn eval(ctx: &EvalCtx, scope: &Scope, form: &Value) -> Result<Value> {
   trampoline(ctx, form.eval(ctx, scope, Cont::identity())).await
}

/// Evaluates forms in order, returning the last result.
pub async fn eval_all(ctx: &EvalCtx, scope: &Scope, forms: &[Value]) -> Result<Value> {
   let mut result = Value::Null;

   for form in forms {
      result = eval(ctx, scope, form).await?;
   }

   Ok(result)
}

impl Value {
   pub fn eval(&self, ctx: &EvalCtx, scope: &Scope, cont: Cont) -> Step {
      match *self {
         Self::Symbol(ref symbol) => {
            match scope.get(symbol) {
               Some(value) => cont.ok(value),
               None => {
                  cont.fail(Error::Unbound {
                     symbol: symbol.clone(),
                     scope:  scope.clone(),
                  })
               },
            }
         },

         Self::Keyword(ref symbol) => cont.ok(Self::Symbol(symbol.clone())),

         Self::Pair(ref pair) => {
            let (args, call_ctx, call_scope) = (pair.d.clone(), ctx.clone(), scope.clone());

            pair.a.eval(
               ctx,
               scope,
               Cont::new(move |combiner| combiner.call(&call_ctx, &args, &call_scope, cont.clone())),
            )
         },

         Self::Cons(_) => eval_args(self, ctx, scope, cont),

         Self::Bind(ref forms) => eval_bind(forms, ctx, scope, cont),

         Self::Annotate(ref annotate) => eval_annotate(annotate, ctx, scope, cont),

         Self::ExtendPath(ref extend) => {
            let child = Self::list([extend.child.to_value()]);
            let (call_ctx, call_scope) = (ctx.clone(), scope.clone());

            extend.parent.eval(
               ctx,
               scope,
               Cont::new(move |parent| parent.call(&call_ctx, &child, &call_scope, cont.clone())),
            )
         },

         _ => cont.ok(self.clone()),
      }
   }

   /// Calls this value as a combiner with an unevaluated argument list.
   pub fn call(&self, ctx: &EvalCtx, args: &Value, scope: &Scope, cont: Cont) -> Step {
      match *self.unannotated() {
         Self::Operative(ref operative) => {
            let sub = Scope::with_parents([operative.scope.clone()]);
            let caller = Self::Scope(scope.clone());
            let (operative, op_ctx, op_scope) = (operative.clone(), ctx.clone(), sub.clone());

            operative.formals.clone().bind(
               ctx,
               &sub,
               args.clone(),
               Cont::new(move |_| {
                  let (operative, ctx, sub, cont) = (
                     operative.clone(),
                     op_ctx.clone(),
                     op_scope.clone(),
                     cont.clone(),
                  );

                  let eformal = operative.eformal.clone();
                  eformal.bind(
                     &op_ctx,
                     &op_scope,
                     caller.clone(),
                     Cont::new(move |_| operative.body.eval(&ctx, &sub, cont.clone())),
                  )
               }),
            )
         },

         Self::Applicative(ref applicative) => {
            let underlying = applicative.underlying.clone();
            let (call_ctx, call_scope) = (ctx.clone(), scope.clone());

            eval_args(
               args,
               ctx,
               scope,
               Cont::new(move |args| underlying.call(&call_ctx, &args, &call_scope, cont.clone())),
            )
         },

         Self::Builtin(ref builtin) => builtin.call(ctx, args, scope, cont),

         Self::Symbol(_)
         | Self::Keyword(_)
         | Self::Thunk(_)
         | Self::Dir(_)
         | Self::File(_)
         | Self::Command(_)
         | Self::HostPath(_)
         | Self::FsPath(_)
         | Self::CachePath(_)
         | Self::ThunkPath(_)
         | Self::Error(_) => {
            let combiner = self.clone();
            eval_args(
               args,
               ctx,
               scope,
               Cont::new(move |args| cont.call(combiner.apply_wrapped(&args))),
            )
         },

         _ => cont.fail(Error::decode(self, "combiner")),
      }
   }

   /// Calls this value with arguments that are already evaluated. An
   /// applicative passes them straight to its underlying combiner.
   pub fn apply(&self, ctx: &EvalCtx, args: Vec<Value>, scope: &Scope, cont: Cont) -> Step {
      let args = Self::list(args);

      match *self.unannotated() {
         Self::Applicative(ref applicative) => applicative.underlying.call(ctx, &args, scope, cont),
         Self::Operative(_) | Self::Builtin(_) => self.call(ctx, &args, scope, cont),
         _ => cont.call(self.apply_wrapped(&args)),
      }
   }

   /// Calls a value that is not itself a combiner but acts like one on
   /// evaluated arguments.
   fn apply_wrapped(&self, args: &Value) -> Result<Value> {
      let args = args
         .to_vec()
         .ok_or_else(|| Error::bad_syntax(format!("improper argument list: {args}")))?;

      match *self.unannotated() {
         Self::Symbol(ref symbol) | Self::Keyword(ref symbol) => lookup(symbol, &args),

         Self::Dir(_) | Self::CachePath(_) | Self::Thunk(_) => self.extend_one(&args),
         Self::HostPath(ref path) if path.path.is_dir() => self.extend_one(&args),
         Self::FsPath(ref path) if path.path.is_dir() => self.extend_one(&args),
         Self::ThunkPath(ref path) if path.path.is_dir() => self.extend_one(&args),

         Self::File(_) | Self::Command(_) | Self::HostPath(_) | Self::FsPath(_) | Self::ThunkPath(_) => {
            let cmd = self.decode::<ThunkCmd>()?;
            Ok(Self::from(Thunk::new(cmd).with_stdin(args)))
         },

         Self::Error(ref error) => Err((**error).clone()),

         _ => Err(Error::decode(self, "combiner")),
      }
   }

   fn extend_one(&self, args: &[Value]) -> Result<Value> {
      let [ref child] = *args else {
         return Err(Error::Arity {
            name:     Symbol::new(&self.to_string()),
            need:     1,
            have:     args.len(),
            variadic: false,
         });
      };

      self.extend_path(&child.decode::<FileOrDir>()?)
   }
}

/// `(:name scope default)`: looks a symbol up in a scope.
fn lookup(symbol: &Symbol, args: &[Value]) -> Result<Value> {
   let arity = || {
      Error::Arity {
         name:     symbol.clone(),
         need:     1,
         have:     args.len(),
         variadic: true,
      }
   };

   let (source, default) = match *args {
      [ref source] => (source, None),
      [ref source, ref default] => (source, Some(default)),
      _ => return Err(arity()),
   };

   let source = source.decode::<Scope>()?;

   match (source.get(symbol), default) {
      (Some(value), _) => Ok(value),
      (None, Some(default)) => Ok(default.clone()),
      (None, None) => {
         Err(Error::Unbound {
            symbol: symbol.clone(),
            scope:  source,
         })
      },
   }
}

/// Evaluates each element of an argument list left to right, producing a
/// list of `Pair` cells. A non-list tail is evaluated as a whole, which is
/// how `(f a & rest)` spreads `rest`.
pub(crate) fn eval_args(args: &Value, ctx: &EvalCtx, scope: &Scope, cont: Cont) -> Step {
   match *args {
      Value::Empty => cont.ok(Value::Empty),

      Value::Pair(ref pair) | Value::Cons(ref pair) => {
         let (rest, rest_ctx, rest_scope) = (pair.d.clone(), ctx.clone(), scope.clone());

         pair.a.eval(
            ctx,
            scope,
            Cont::new(move |first| {
               let cont = cont.clone();
               eval_args(
                  &rest,
                  &rest_ctx,
                  &rest_scope,
                  Cont::new(move |rest| cont.ok(Value::pair(first.clone(), rest))),
               )
            }),
         )
      },

      _ => args.eval(ctx, scope, cont),
   }
}

fn eval_bind(forms: &Arc<[Value]>, ctx: &EvalCtx, scope: &Scope, cont: Cont) -> Step {
   let built = Scope::with_parents([scope.clone()]);
   let list = Value::cons_list(forms.iter().cloned());

   let target = built.clone();
   eval_args(
      &list,
      ctx,
      &built,
      Cont::new(move |evaluated| {
         target.clear_parents();
         cont.call(build_scope(&target, &evaluated).map(|()| Value::Scope(target.clone())))
      }),
   )
}

/// Fills a scope from evaluated `{...}` contents: a symbol followed by a
/// value binds it, and a scope on its own becomes a parent.
fn build_scope(scope: &Scope, evaluated: &Value) -> Result<()> {
   let values = evaluated
      .to_vec()
      .ok_or_else(|| Error::bad_syntax(format!("malformed bind form: {evaluated}")))?;
   let mut values = values.into_iter();

   while let Some(key) = values.next() {
      if let Value::Scope(ref parent) = *key.unannotated() {
         scope.add_parent(parent.clone());
         continue;
      }

      let (symbol, meta) = match key {
         Value::Symbol(ref symbol) => (symbol.clone(), None),

         Value::Annotated(ref annotated) => {
            match annotated.value {
               Value::Symbol(ref symbol) => (symbol.clone(), Some(annotated.meta.clone())),
               _ => return Err(Error::bad_syntax(format!("bind key must be a symbol: {key}"))),
            }
         },

         _ => return Err(Error::bad_syntax(format!("bind key must be a symbol: {key}"))),
      };

      let value = values
         .next()
         .ok_or_else(|| Error::bad_syntax(format!("bind form has no value for {symbol}")))?;

      scope.set(symbol, match meta {
         Some(meta) => value.with_meta(meta),
         None => value,
      });
   }

   Ok(())
}

fn eval_annotate(annotate: &Arc<Annotate>, ctx: &EvalCtx, scope: &Scope, cont: Cont) -> Step {
   let next = if annotate.has_meta() {
      let (annotate, meta_ctx, meta_scope) = (annotate.clone(), ctx.clone(), scope.clone());
      Cont::new(move |value| apply_meta(&annotate, &meta_ctx, &meta_scope, value, cont.clone()))
   } else {
      cont
   };

   let next = match ctx.trace() {
      Some(trace) => {
         trace.record(annotate.clone());
         next.traced(trace)
      },
      None => next,
   };

   annotate.value.eval(ctx, scope, next)
}

/// The `{...}` form producing an annotation's metadata: its `^meta` binds
/// followed by the doc comment.
fn meta_form(annotate: &Annotate) -> Value {
   let mut forms = annotate.meta.as_deref().map(<[Value]>::to_vec).unwrap_or_default();

   if let Some(ref comment) = annotate.comment {
      forms.push(Value::keyword("doc"));
      forms.push(Value::String(comment.clone()));
   }

   Value::Bind(Arc::from(forms))
}

fn apply_meta(annotate: &Arc<Annotate>, ctx: &EvalCtx, scope: &Scope, value: Value, cont: Cont) -> Step {
   let (range, target) = (annotate.range.clone(), scope.clone());

   meta_form(annotate).eval(
      ctx,
      scope,
      Cont::new(move |meta| {
         let meta = match meta.decode::<Scope>() {
            Ok(meta) => meta,
            Err(error) => return cont.fail(error),
         };

         annotate_bindings(&range, &target, &value, &meta);
         cont.ok(value.with_meta(meta))
      }),
   )
}

/// Attaches metadata to whatever a form bound, so `(def foo ...)` with a
/// comment documents `foo`.
fn annotate_bindings(range: &Range, scope: &Scope, value: &Value, meta: &Scope) {
   let Ok(symbols) = value.bound_symbols() else {
      return;
   };

   for symbol in symbols {
      let Some(bound) = scope.get_local(&symbol) else {
         continue;
      };

      let binding_meta = range.to_meta();
      binding_meta.add_parent(meta.clone());

      tracing::trace!(%symbol, "annotating binding");
      scope.set(symbol, bound.with_meta(binding_meta));
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      CommandPath,
      DirPath,
      Operative,
      Position,
   };

   fn range() -> Range {
      Range {
         file:  Arc::from("test.bass"),
         start: Position { line: 2, column: 1 },
         end:   Position { line: 2, column: 9 },
      }
   }

   async fn run(scope: &Scope, form: &Value) -> Result<Value> {
      eval(&EvalCtx::new(), scope, form).await
   }

   #[tokio::test]
   async fn self_evaluating() {
      let scope = Scope::new();

      for value in [
         Value::Null,
         Value::Int(1),
         Value::string("hi"),
         Value::Empty,
         Value::Ignore,
         Value::Dir(DirPath::new("src")),
         Value::Scope(Scope::new()),
      ] {
         assert_eq!(run(&scope, &value).await.unwrap(), value);
      }
   }

   #[tokio::test]
   async fn symbols_and_keywords() {
      let scope = Scope::new();
      scope.set("a", Value::Int(1));

      assert_eq!(run(&scope, &Value::symbol("a")).await.unwrap(), Value::Int(1));
      assert_eq!(run(&scope, &Value::keyword("a")).await.unwrap(), Value::symbol("a"));
      assert!(matches!(
         run(&scope, &Value::symbol("b")).await,
         Err(Error::Unbound { .. })
      ));
   }

   #[tokio::test]
   async fn cons_forms_evaluate_to_lists() {
      let scope = Scope::new();
      scope.set("a", Value::Int(1));

      let form = Value::cons_list([Value::symbol("a"), Value::Int(2)]);
      assert_eq!(
         run(&scope, &form).await.unwrap(),
         Value::list([Value::Int(1), Value::Int(2)])
      );
   }

   #[tokio::test]
   async fn bind_forms_build_scopes() {
      let scope = Scope::new();
      scope.set("a", Value::Int(1));

      let parent = Scope::new();
      parent.set("inherited", Value::Bool(true));
      scope.set("parent", Value::Scope(parent));

      let form = Value::Bind(Arc::from([
         Value::keyword("x"),
         Value::symbol("a"),
         Value::symbol("parent"),
      ]));

      let built = run(&scope, &form).await.unwrap().decode::<Scope>().unwrap();
      assert_eq!(built.get(&"x".into()), Some(Value::Int(1)));
      assert_eq!(built.get(&"inherited".into()), Some(Value::Bool(true)));
      assert_eq!(built.get(&"a".into()), None);

      let odd = Value::Bind(Arc::from([Value::keyword("x")]));
      assert!(matches!(run(&scope, &odd).await, Err(Error::BadSyntax { .. })));
   }

   #[tokio::test]
   async fn operatives_see_the_caller() {
      let scope = Scope::new();
      scope.set("x", Value::Int(42));

      let operative = Value::Operative(Arc::new(Operative {
         formals: Value::cons_list([Value::symbol("form")]),
         eformal: Value::symbol("env"),
         body:    Value::cons_list([Value::symbol("form"), Value::symbol("env")]),
         scope:   Scope::new(),
      }));
      scope.set("quote-env", operative);

      let call = Value::list([Value::symbol("quote-env"), Value::symbol("x")]);
      let result = run(&scope, &call).await.unwrap().to_vec().unwrap();

      assert_eq!(result[0], Value::symbol("x"));
      assert!(result[1].decode::<Scope>().unwrap().ptr_eq(&scope));
   }

   #[tokio::test]
   async fn applicatives_evaluate_arguments() {
      let scope = Scope::new();
      scope.set("x", Value::Int(42));

      let identity = Value::wrap(Value::Operative(Arc::new(Operative {
         formals: Value::cons_list([Value::symbol("value")]),
         eformal: Value::Ignore,
         body:    Value::symbol("value"),
         scope:   Scope::new(),
      })));
      scope.set("id", identity);

      let call = Value::list([Value::symbol("id"), Value::symbol("x")]);
      assert_eq!(run(&scope, &call).await.unwrap(), Value::Int(42));
   }

   #[tokio::test]
   async fn symbols_call_as_lookups() {
      let scope = Scope::new();
      let source = Scope::new();
      source.set("present", Value::Int(1));
      scope.set("source", Value::Scope(source));

      let call = Value::list([Value::keyword("present"), Value::symbol("source")]);
      assert_eq!(run(&scope, &call).await.unwrap(), Value::Int(1));

      let call = Value::list([Value::keyword("absent"), Value::symbol("source"), Value::Int(2)]);
      assert_eq!(run(&scope, &call).await.unwrap(), Value::Int(2));

      let call = Value::list([Value::keyword("absent"), Value::symbol("source")]);
      assert!(matches!(run(&scope, &call).await, Err(Error::Unbound { .. })));

      let call = Value::list([Value::keyword("absent")]);
      assert!(matches!(
         run(&scope, &call).await,
         Err(Error::Arity { need: 1, have: 0, variadic: true, .. })
      ));
   }

   #[tokio::test]
   async fn paths_call_as_thunks_or_extend() {
      let scope = Scope::new();

      let call = Value::list([Value::Command(CommandPath::new("echo")), Value::string("hi")]);
      let thunk = run(&scope, &call).await.unwrap().decode::<Arc<Thunk>>().unwrap();
      assert_eq!(thunk.stdin, [Value::string("hi")]);

      let call = Value::list([Value::Dir(DirPath::new("src")), Value::File(crate::FilePath::new("main.rs"))]);
      assert_eq!(
         run(&scope, &call).await.unwrap(),
         Value::File(crate::FilePath::new("src/main.rs"))
      );

      let extend = Value::ExtendPath(Arc::new(crate::ExtendPath {
         parent: Value::from(Thunk::new(ThunkCmd::Command(CommandPath::new("go")))),
         child:  FileOrDir::parse("out/"),
      }));
      let path = run(&scope, &extend).await.unwrap();
      assert!(matches!(path, Value::ThunkPath(ref path) if path.path.is_dir()));
   }

   #[tokio::test]
   async fn errors_reraise_when_called() {
      let scope = Scope::new();
      scope.set("oops", Value::error(Error::message("boom")));

      let call = Value::list([Value::symbol("oops")]);
      let error = run(&scope, &call).await.unwrap_err();
      assert_eq!(error.to_string(), "boom");
   }

   #[tokio::test]
   async fn non_combiners_fail() {
      let call = Value::list([Value::Int(1)]);
      assert!(matches!(
         run(&Scope::new(), &call).await,
         Err(Error::Decode { dst: "combiner", .. })
      ));
   }

   #[tokio::test]
   async fn annotations_pop_their_frames() {
      let ctx = EvalCtx::new();
      let scope = Scope::new();
      scope.set("a", Value::Int(1));

      let form = Value::Annotate(Arc::new(Annotate::new(Value::symbol("a"), range())));
      assert_eq!(eval(&ctx, &scope, &form).await.unwrap(), Value::Int(1));
      assert!(ctx.trace().unwrap().is_empty());

      let form = Value::Annotate(Arc::new(Annotate::new(Value::symbol("nope"), range())));
      assert!(eval(&ctx, &scope, &form).await.is_err());
      assert_eq!(ctx.trace().unwrap().frames().len(), 1);
   }

   #[tokio::test]
   async fn comments_become_doc_metadata() {
      let scope = Scope::new();
      scope.set("answer", Value::Int(42));

      let form = Value::Annotate(Arc::new(Annotate {
         comment: Some(Arc::from("the answer")),
         meta: Some(Arc::from([Value::keyword("since"), Value::Int(1)])),
         ..Annotate::new(Value::keyword("answer"), range())
      }));

      let result = run(&scope, &form).await.unwrap();
      assert_eq!(result, Value::symbol("answer"));

      let meta = result.meta().unwrap();
      assert_eq!(meta.get(&"doc".into()), Some(Value::string("the answer")));
      assert_eq!(meta.get(&"since".into()), Some(Value::Int(1)));

      let bound = scope.get(&"answer".into()).unwrap();
      let meta = bound.meta().unwrap();
      assert_eq!(meta.get(&"doc".into()), Some(Value::string("the answer")));
      assert_eq!(meta.get(&"line".into()), Some(Value::Int(2)));
      assert_eq!(bound, Value::Int(42));
   }
}
