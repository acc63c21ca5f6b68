//! Combiners implemented in Rust.

use std::{
   fmt,
   future::Future,
   pin::Pin,
   sync::Arc,
};

use crate::{
   Cont,
   Error,
   EvalCtx,
   FromValue,
   Result,
   Scope,
   Step,
   Symbol,
   Value,
};

/// The parameters of a builtin, parsed from a binding form such as
/// `[thunk & args]`. A bare symbol accepts any number of arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formals {
   pub required: Vec<Symbol>,
   pub rest:     Option<Symbol>,
}

impl Formals {
   #[must_use]
   pub fn parse(formals: &str) -> Self {
      let formals = formals.trim();

      let Some(inner) = formals
         .strip_prefix('[')
         .and_then(|inner| inner.strip_suffix(']'))
      else {
         return Self {
            required: Vec::new(),
            rest:     Some(Symbol::new(formals)),
         };
      };

      let mut words = inner.split_whitespace();
      let required = words
         .by_ref()
         .take_while(|&word| word != "&")
         .map(Symbol::new)
         .collect();

      Self {
         required,
         rest: words.next().map(Symbol::new),
      }
   }

   #[must_use]
   pub fn is_variadic(&self) -> bool {
      self.rest.is_some()
   }

   fn check(&self, name: &Symbol, have: usize) -> Result<()> {
      let need = self.required.len();

      if have == need || (self.is_variadic() && have > need) {
         return Ok(());
      }

      Err(Error::Arity {
         name: name.clone(),
         need,
         have,
         variadic: self.is_variadic(),
      })
   }

   /// The formals as a binding form.
   #[must_use]
   pub fn to_value(&self) -> Value {
      let required = self.required.iter().cloned().map(Value::Symbol);

      match self.rest {
         None => Value::cons_list(required),
         Some(ref rest) if self.required.is_empty() => Value::Symbol(rest.clone()),
         Some(ref rest) => {
            let mut list = Value::Symbol(rest.clone());
            for symbol in self.required.iter().rev() {
               list = Value::cons(Value::Symbol(symbol.clone()), list);
            }
            list
         },
      }
   }
}

impl fmt::Display for Formals {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "{formals}", formals = self.to_value())
   }
}

/// The arguments a builtin was called with, already checked against its
/// arity.
#[derive(Debug, Clone)]
pub struct Args {
   name:   Symbol,
   values: Vec<Value>,
}

impl Args {
   #[must_use]
   pub fn new(name: Symbol, values: Vec<Value>) -> Self {
      Self { name, values }
   }

   #[must_use]
   pub fn name(&self) -> &Symbol {
      &self.name
   }

   #[must_use]
   pub fn len(&self) -> usize {
      self.values.len()
   }

   #[must_use]
   pub fn is_empty(&self) -> bool {
      self.values.is_empty()
   }

   /// The raw argument at `index`.
   pub fn value(&self, index: usize) -> Result<&Value> {
      self.values.get(index).ok_or_else(|| {
         Error::Arity {
            name:     self.name.clone(),
            need:     index + 1,
            have:     self.values.len(),
            variadic: false,
         }
      })
   }

   /// Decodes the argument at `index`.
   pub fn get<T: FromValue>(&self, index: usize) -> Result<T> {
      self.value(index)?.decode()
   }

   /// Decodes the argument at `index` if it was given.
   pub fn opt<T: FromValue>(&self, index: usize) -> Result<Option<T>> {
      self.values.get(index).map(Value::decode).transpose()
   }

   /// Every argument from `index` on.
   #[must_use]
   pub fn rest(&self, index: usize) -> &[Value] {
      self.values.get(index..).unwrap_or_default()
   }

   /// Decodes every argument from `index` on.
   pub fn rest_as<T: FromValue>(&self, index: usize) -> Result<Vec<T>> {
      self.rest(index).iter().map(Value::decode).collect()
   }
}

/// Everything a continuation-passing builtin receives.
pub struct Call {
   pub ctx:   EvalCtx,
   pub scope: Scope,
   pub args:  Args,
   pub cont:  Cont,
}

type BoxFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

enum Func {
   Sync(Box<dyn Fn(&EvalCtx, &Args) -> Result<Value> + Send + Sync>),
   Cont(Box<dyn Fn(Call) -> Step + Send + Sync>),
   Async(Box<dyn Fn(EvalCtx, Args) -> BoxFuture + Send + Sync>),
}

/// A combiner implemented in Rust.
///
/// Builtins created with [`Builtin::op`] are operatives and receive their
/// arguments unevaluated. The `func` constructors wrap the builtin in an
/// applicative, so its arguments arrive evaluated.
pub struct Builtin {
   name:      Symbol,
   formals:   Formals,
   operative: bool,
   func:      Func,
}

impl Builtin {
   fn value(name: &str, formals: &str, operative: bool, func: Func) -> Value {
      let builtin = Value::Builtin(Arc::new(Self {
         name: Symbol::new(name),
         formals: Formals::parse(formals),
         operative,
         func,
      }));

      if operative {
         builtin
      } else {
         Value::wrap(builtin)
      }
   }

   /// An applicative returning a value directly.
   #[must_use]
   pub fn func(
      name: &str,
      formals: &str,
      func: impl Fn(&EvalCtx, &Args) -> Result<Value> + Send + Sync + 'static,
   ) -> Value {
      Self::value(name, formals, false, Func::Sync(Box::new(func)))
   }

   /// An applicative that continues evaluation itself.
   #[must_use]
   pub fn func_cont(name: &str, formals: &str, func: impl Fn(Call) -> Step + Send + Sync + 'static) -> Value {
      Self::value(name, formals, false, Func::Cont(Box::new(func)))
   }

   /// An applicative that awaits host work, such as a runtime.
   #[must_use]
   pub fn func_async<F>(name: &str, formals: &str, func: impl Fn(EvalCtx, Args) -> F + Send + Sync + 'static) -> Value
   where
      F: Future<Output = Result<Value>> + Send + 'static,
   {
      Self::value(
         name,
         formals,
         false,
         Func::Async(Box::new(move |ctx, args| Box::pin(func(ctx, args)))),
      )
   }

   /// An operative, receiving unevaluated arguments and the caller's
   /// scope.
   #[must_use]
   pub fn op(name: &str, formals: &str, func: impl Fn(Call) -> Step + Send + Sync + 'static) -> Value {
      Self::value(name, formals, true, Func::Cont(Box::new(func)))
   }

   #[must_use]
   pub fn name(&self) -> &Symbol {
      &self.name
   }

   #[must_use]
   pub fn formals(&self) -> &Formals {
      &self.formals
   }

   #[must_use]
   pub fn is_operative(&self) -> bool {
      self.operative
   }

   pub(crate) fn call(&self, ctx: &EvalCtx, args: &Value, scope: &Scope, cont: Cont) -> Step {
      let Some(values) = args.to_vec() else {
         return cont.fail(Error::bad_syntax(format!(
            "({name}) improper argument list: {args}",
            name = self.name
         )));
      };

      if let Err(error) = self.formals.check(&self.name, values.len()) {
         return cont.fail(error);
      }

      let args = Args::new(self.name.clone(), values);

      match self.func {
         Func::Sync(ref func) => cont.call(func(ctx, &args)),

         Func::Cont(ref func) => {
            func(Call {
               ctx: ctx.clone(),
               scope: scope.clone(),
               args,
               cont,
            })
         },

         Func::Async(ref func) => {
            let future = func(ctx.clone(), args);
            Step::wait(async move { cont.call(future.await) })
         },
      }
   }
}

impl fmt::Display for Builtin {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      let kind = if self.operative { "op" } else { "func" };
      write!(writer, "<builtin {kind}: ({name} {formals})>", name = self.name, formals = self.formals)
   }
}

impl fmt::Debug for Builtin {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Display::fmt(self, writer)
   }
}
