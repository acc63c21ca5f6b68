//! Destructuring assignment.

use std::sync::Arc;

use bass_util::clone;

use crate::{
   Cont,
   Error,
   EvalCtx,
   Pair,
   Range,
   Result,
   Scope,
   Step,
   Symbol,
   Value,
};

impl Value {
   /// Binds `value` to this binder in `scope`, continuing with the binder
   /// itself on success.
   ///
   /// Binding can evaluate: scope binder defaults are evaluated in `scope`
   /// when their key is absent, and path binders evaluate before comparing.
   pub fn bind(&self, ctx: &EvalCtx, scope: &Scope, value: Value, cont: Cont) -> Step {
      match *self {
         Self::Annotate(ref annotate) => annotate.value.bind(ctx, scope, value, cont),
         Self::Annotated(ref annotated) => annotated.value.bind(ctx, scope, value, cont),

         Self::Symbol(ref symbol) => {
            scope.set(symbol.clone(), value);
            cont.ok(self.clone())
         },

         Self::Ignore => cont.ok(self.clone()),

         Self::Null
         | Self::Bool(_)
         | Self::Int(_)
         | Self::String(_)
         | Self::Empty
         | Self::Dir(_)
         | Self::File(_)
         | Self::Command(_) => bind_const(self, self, &value, cont),

         Self::Keyword(ref symbol) => bind_const(self, &Self::Symbol(symbol.clone()), &value, cont),

         Self::Pair(ref pair) | Self::Cons(ref pair) => bind_list(self, pair, ctx, scope, &value, cont),

         Self::Bind(ref forms) => bind_scope(forms, ctx, scope, &value, cont),

         Self::ExtendPath(_) => {
            let binder = self.clone();
            self.eval(
               ctx,
               scope,
               Cont::new(move |path| bind_const(&binder, &path, &value, cont.clone())),
            )
         },

         _ => cont.fail(Error::CannotBind { have: self.clone() }),
      }
   }

   /// Calls `each` with every symbol this binder would bind, along with the
   /// range of the form it came from.
   pub fn each_binding(&self, each: &mut dyn FnMut(&Symbol, Option<&Range>) -> Result<()>) -> Result<()> {
      self.each_binding_at(None, each)
   }

   fn each_binding_at(
      &self,
      range: Option<&Range>,
      each: &mut dyn FnMut(&Symbol, Option<&Range>) -> Result<()>,
   ) -> Result<()> {
      match *self {
         Self::Annotate(ref annotate) => annotate.value.each_binding_at(Some(&annotate.range), each),
         Self::Annotated(ref annotated) => annotated.value.each_binding_at(range, each),

         Self::Symbol(ref symbol) => each(symbol, range),

         Self::Pair(ref pair) | Self::Cons(ref pair) => {
            pair.a.each_binding_at(range, each)?;
            pair.d.each_binding_at(range, each)
         },

         Self::Bind(ref forms) => {
            forms
               .iter()
               .skip(1)
               .step_by(2)
               .try_for_each(|binder| binder.each_binding_at(range, each))
         },

         Self::Ignore
         | Self::Null
         | Self::Bool(_)
         | Self::Int(_)
         | Self::String(_)
         | Self::Keyword(_)
         | Self::Empty
         | Self::Dir(_)
         | Self::File(_)
         | Self::Command(_)
         | Self::ExtendPath(_) => Ok(()),

         _ => Err(Error::CannotBind { have: self.clone() }),
      }
   }

   /// Every symbol this binder would bind.
   pub fn bound_symbols(&self) -> Result<Vec<Symbol>> {
      let mut symbols = Vec::new();
      self.each_binding(&mut |symbol, _| {
         symbols.push(symbol.clone());
         Ok(())
      })?;
      Ok(symbols)
   }
}

fn bind_const(binder: &Value, need: &Value, have: &Value, cont: Cont) -> Step {
   if need.equal(have) {
      cont.ok(binder.clone())
   } else {
      cont.fail(Error::BindMismatch {
         need: binder.clone(),
         have: have.clone(),
      })
   }
}

fn bind_list(binder: &Value, pair: &Arc<Pair>, ctx: &EvalCtx, scope: &Scope, value: &Value, cont: Cont) -> Step {
   let cell = match *value.unannotated() {
      Value::Pair(ref cell) | Value::Cons(ref cell) => cell.clone(),
      _ => {
         return cont.fail(Error::BindMismatch {
            need: binder.clone(),
            have: value.clone(),
         });
      },
   };

   let binder = binder.clone();
   let rest = pair.d.clone();
   let (next_ctx, next_scope) = (ctx.clone(), scope.clone());

   pair.a.bind(
      ctx,
      scope,
      cell.a.clone(),
      Cont::new(move |_| {
         clone!(cont, binder);
         rest.bind(
            &next_ctx,
            &next_scope,
            cell.d.clone(),
            Cont::new(move |_| cont.ok(binder.clone())),
         )
      }),
   )
}

/// A key in a scope binder: `:name` or `[:name default]`.
fn scope_key(key: &Value) -> Result<(Symbol, Option<Value>)> {
   match *key.unannotated() {
      Value::Keyword(ref symbol) => Ok((symbol.clone(), None)),

      Value::Cons(_) => {
         match key.to_vec().as_deref() {
            Some([name, default]) => {
               match *name.unannotated() {
                  Value::Keyword(ref symbol) => Ok((symbol.clone(), Some(default.clone()))),
                  _ => Err(Error::bad_syntax(format!("scope binder key must be a keyword: {name}"))),
               }
            },
            _ => Err(Error::bad_syntax(format!("scope binder default must be [:key default]: {key}"))),
         }
      },

      _ => Err(Error::bad_syntax(format!("scope binder key must be a keyword: {key}"))),
   }
}

fn bind_scope(forms: &Arc<[Value]>, ctx: &EvalCtx, scope: &Scope, value: &Value, cont: Cont) -> Step {
   let Value::Scope(ref source) = *value.unannotated() else {
      return cont.fail(Error::BindMismatch {
         need: Value::Bind(forms.clone()),
         have: value.clone(),
      });
   };

   if forms.len() % 2 != 0 {
      return cont.fail(Error::bad_syntax(format!(
         "scope binder has an odd number of forms: {binder}",
         binder = Value::Bind(forms.clone()),
      )));
   }

   bind_entries(forms.clone(), 0, ctx.clone(), scope.clone(), source.clone(), cont)
}

fn bind_entries(forms: Arc<[Value]>, index: usize, ctx: EvalCtx, scope: Scope, source: Scope, cont: Cont) -> Step {
   if index >= forms.len() {
      return cont.ok(Value::Bind(forms));
   }

   let (symbol, default) = match scope_key(&forms[index]) {
      Ok(key) => key,
      Err(error) => return cont.fail(error),
   };
   let binder = forms[index + 1].clone();

   let next = {
      let (ctx, scope, source) = (ctx.clone(), scope.clone(), source.clone());
      Cont::new(move |_| {
         bind_entries(
            forms.clone(),
            index + 2,
            ctx.clone(),
            scope.clone(),
            source.clone(),
            cont.clone(),
         )
      })
   };

   match (source.get(&symbol), default) {
      (Some(found), _) => binder.bind(&ctx, &scope, found, next),

      (None, Some(default)) => {
         let (bind_ctx, bind_scope) = (ctx.clone(), scope.clone());
         default.eval(
            &ctx,
            &scope,
            Cont::new(move |value| binder.bind(&bind_ctx, &bind_scope, value, next.clone())),
         )
      },

      (None, None) => next.fail(Error::Unbound { symbol, scope: source }),
   }
}
