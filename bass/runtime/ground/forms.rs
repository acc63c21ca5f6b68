use std::{
   fmt::Write as _,
   sync::Arc,
};

use yansi::Paint as _;

use super::{
   define,
   predicates,
};
use crate::{
   Bindable,
   Builtin,
   Call,
   Combiner,
   Cont,
   Error,
   EvalCtx,
   Operative,
   Scope,
   Step,
   Symbol,
   Value,
   trampoline,
};

pub(super) fn register(ground: &Scope) {
   define(
      ground,
      "def",
      Builtin::op("def", "[binding value]", |Call { ctx, scope, args, cont }| {
         let binding = attempt!(cont, args.get::<Value>(0));
         let form = attempt!(cont, args.get::<Value>(1));

         let (bind_ctx, target) = (ctx.clone(), scope.clone());
         form.eval(
            &ctx,
            &scope,
            Cont::new(move |value| binding.bind(&bind_ctx, &target, value, cont.clone())),
         )
      }),
      &[
         "bind symbols to values in the current scope",
         "Supports destructuring assignment.",
         "=> (def abc \"it's easy as\")",
         "=> (def [a b c] [1 2 3])",
      ],
   );

   define(
      ground,
      "if",
      Builtin::op("if", "[cond yes no]", |Call { ctx, scope, args, cont }| {
         let cond = attempt!(cont, args.get::<Value>(0));
         let yes = attempt!(cont, args.get::<Value>(1));
         let no = attempt!(cont, args.get::<Value>(2));

         let (branch_ctx, branch_scope) = (ctx.clone(), scope.clone());
         cond.eval(
            &ctx,
            &scope,
            Cont::new(move |result| {
               let branch = if result.is_truthy() { &yes } else { &no };
               branch.eval(&branch_ctx, &branch_scope, cont.clone())
            }),
         )
      }),
      &[
         "if then else (branching logic)",
         "Evaluates the cond form. If the result is truthy (not false or null), evaluates the yes form. \
          Otherwise, evaluates the no form.",
         "=> (if false (error \"bam\") :phew)",
      ],
   );

   define(ground, "do", do_op(), &[
      "evaluate a sequence, returning the last value",
      "=> (do (def abc 123) (+ abc 1))",
   ]);

   define(
      ground,
      "op",
      Builtin::op("op", "[formals eformal & body]", |Call { scope, args, cont, .. }| {
         let formals = attempt!(cont, args.get::<Bindable>(0)).0;
         let eformal = attempt!(cont, args.get::<Bindable>(1)).0;

         let body = match *args.rest(2) {
            [] => Value::Null,
            [ref body] => body.clone(),
            ref body => Value::list(std::iter::once(do_op()).chain(body.iter().cloned())),
         };

         cont.ok(Value::Operative(Arc::new(Operative {
            formals,
            eformal,
            body,
            scope,
         })))
      }),
      &[
         "construct an operative",
         "An operative receives its arguments unevaluated, along with the caller's scope bound to eformal.",
         "=> (def quote-it (op [x] _ x))",
      ],
   );

   define(
      ground,
      "wrap",
      Builtin::func("wrap", "[comb]", |_, args| Ok(Value::wrap(args.get::<Combiner>(0)?.0))),
      &[
         "construct an applicative from a combiner (typically an operative)",
         "When called, an applicative evaluates its arguments before passing them along to the underlying \
          combiner.",
      ],
   );

   define(
      ground,
      "unwrap",
      Builtin::func("unwrap", "[app]", |_, args| {
         let app = args.value(0)?;

         match *app.unannotated() {
            Value::Applicative(ref applicative) => Ok(applicative.underlying.clone()),
            _ => Err(Error::decode(app, "applicative")),
         }
      }),
      &["returns an applicative's underlying combiner"],
   );

   define(
      ground,
      "eval",
      Builtin::func_cont("eval", "[form scope]", |Call { ctx, args, cont, .. }| {
         let form = attempt!(cont, args.get::<Value>(0));
         let scope = attempt!(cont, args.get::<Scope>(1));

         form.eval(&ctx, &scope, cont)
      }),
      &[
         "evaluate a value in a scope",
         "=> (eval :abc {:abc 123})",
      ],
   );

   define(
      ground,
      "make-scope",
      Builtin::func("make-scope", "parents", |_, args| {
         Ok(Value::Scope(Scope::with_parents(args.rest_as::<Scope>(0)?)))
      }),
      &[
         "construct a scope with the given parents",
         "=> (make-scope {:a 1} {:b 2})",
      ],
   );

   define(
      ground,
      "bind",
      Builtin::func_cont("bind", "[scope formals val]", |Call { ctx, args, cont, .. }| {
         let target = attempt!(cont, args.get::<Scope>(0));
         let formals = attempt!(cont, args.get::<Bindable>(1)).0;
         let value = attempt!(cont, args.get::<Value>(2));

         let ctx = ctx.fork();
         Step::wait(async move {
            let step = formals.bind(&ctx, &target, value, Cont::identity());
            let bound = trampoline(&ctx, step).await;

            if let Err(ref error) = bound {
               tracing::trace!(%error, "binding did not match");
            }

            cont.ok(Value::Bool(bound.is_ok()))
         })
      }),
      &[
         "attempts to bind values in the scope",
         "Returns true if the binding succeeded, otherwise false.",
         "=> (if (bind (current-scope) :abc 123) abc :mismatch)",
      ],
   );

   define(
      ground,
      "current-scope",
      Builtin::func_cont("current-scope", "[]", |Call { scope, cont, .. }| cont.ok(Value::Scope(scope))),
      &["returns the scope the call is evaluated in"],
   );

   define(
      ground,
      "cons",
      Builtin::func("cons", "[a d]", |_, args| Ok(Value::pair(args.get(0)?, args.get(1)?))),
      &["construct a pair from the given values", "=> (cons 1 [2 3])"],
   );

   define(
      ground,
      "quote",
      Builtin::op("quote", "[form]", |Call { args, cont, .. }| cont.call(args.get::<Value>(0))),
      &["returns the form unevaluated", "=> (quote (a b c))"],
   );

   define(
      ground,
      "meta",
      Builtin::func("meta", "[val]", |_, args| {
         Ok(args.value(0)?.meta().map_or(Value::Null, Value::Scope))
      }),
      &[
         "returns the meta attached to the value",
         "Returns null if the value has no metadata.",
         "=> (meta meta)",
      ],
   );

   define(
      ground,
      "with-meta",
      Builtin::func("with-meta", "[val meta]", |_, args| {
         Ok(args.value(0)?.with_meta(args.get::<Scope>(1)?))
      }),
      &[
         "returns val with the given scope as its metadata",
         "=> (meta (with-meta _ {:a 1}))",
      ],
   );

   define(
      ground,
      "doc",
      Builtin::op("doc", "symbols", |Call { ctx, scope, args, cont }| {
         let mut forms = args.rest(0).to_vec();
         if forms.is_empty() {
            forms = scope.local_symbols().into_iter().map(Value::Symbol).collect();
         }

         let separator = "-".repeat(50);
         attempt!(cont, ctx.stderr().write_line(&separator.dim().to_string()));

         print_docs(&ctx, &scope, Arc::from(forms), 0, cont)
      }),
      &[
         "print docs for symbols",
         "Prints the documentation for the given symbols resolved from the current scope.",
         "=> (doc doc)",
      ],
   );
}

fn do_op() -> Value {
   Builtin::op("do", "body", |Call { ctx, scope, args, cont }| {
      sequence(&ctx, &scope, Arc::from(args.rest(0)), 0, cont)
   })
}

/// Evaluates `body[index..]` in order, continuing with the last result.
fn sequence(ctx: &EvalCtx, scope: &Scope, body: Arc<[Value]>, index: usize, cont: Cont) -> Step {
   let Some(form) = body.get(index).cloned() else {
      return cont.ok(Value::Null);
   };

   if index + 1 == body.len() {
      return form.eval(ctx, scope, cont);
   }

   let (next_ctx, next_scope) = (ctx.clone(), scope.clone());
   form.eval(
      ctx,
      scope,
      Cont::new(move |_| sequence(&next_ctx, &next_scope, body.clone(), index + 1, cont.clone())),
   )
}

fn print_docs(ctx: &EvalCtx, scope: &Scope, forms: Arc<[Value]>, index: usize, cont: Cont) -> Step {
   let Some(form) = forms.get(index).cloned() else {
      return cont.ok(Value::Null);
   };

   let (next_ctx, next_scope) = (ctx.clone(), scope.clone());
   form.clone().eval(
      ctx,
      scope,
      Cont::new(move |value| {
         attempt!(cont, next_ctx.stderr().write_str(&binding_docs(&form, &value)));
         print_docs(&next_ctx, &next_scope, forms.clone(), index + 1, cont.clone())
      }),
   )
}

/// The form, the predicates its value satisfies, its arguments if it is a
/// combiner, and its `doc` metadata.
fn binding_docs(form: &Value, value: &Value) -> String {
   let mut docs = form.to_string().green().to_string();

   for predicate in predicates(value) {
      let _ = write!(docs, " {predicate}", predicate = predicate.yellow());
   }
   docs.push('\n');

   let doc = value
      .meta()
      .and_then(|meta| meta.get(&Symbol::new("doc")))
      .and_then(|doc| doc.decode::<String>().ok());

   let combiner = match *value.unannotated() {
      Value::Applicative(ref applicative) => applicative.underlying.clone(),
      ref other => other.clone(),
   };

   match *combiner.unannotated() {
      Value::Operative(ref operative) => {
         let _ = writeln!(docs, "args: {formals}", formals = operative.formals);
      },
      Value::Builtin(ref builtin) => {
         let _ = writeln!(docs, "args: {formals}", formals = builtin.formals());
      },
      _ => {},
   }

   if let Some(doc) = doc {
      let _ = writeln!(docs, "\n{doc}");
   }

   docs.push('\n');
   docs
}
