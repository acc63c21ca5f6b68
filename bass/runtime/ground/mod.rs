//! The ground scope: the builtins every Bass program starts from.

use std::sync::LazyLock;

use crate::{
   Scope,
   Value,
};

/// Unwraps a result inside a builtin, failing the continuation on error.
macro_rules! attempt {
   ($cont:expr, $result:expr) => {
      match $result {
         Ok(value) => value,
         Err(error) => return $cont.fail(error),
      }
   };
}

mod diag;
mod forms;
mod math;
mod pipes;
mod preds;
mod run;
mod text;
mod thunks;

pub use self::preds::predicates;

static GROUND: LazyLock<Scope> = LazyLock::new(|| {
   let ground = Scope::named("ground", []);

   forms::register(&ground);
   diag::register(&ground);
   preds::register(&ground);
   math::register(&ground);
   text::register(&ground);
   pipes::register(&ground);
   thunks::register(&ground);
   run::register(&ground);

   tracing::trace!(bindings = ground.local_symbols().len(), "initialized ground scope");

   ground
});

impl Scope {
   /// The shared scope holding every builtin.
   #[must_use]
   pub fn ground() -> Self {
      GROUND.clone()
   }

   /// A fresh scope for a program, with the ground scope as its only parent.
   #[must_use]
   pub fn standard() -> Self {
      Self::with_parents([Self::ground()])
   }
}

/// Binds a builtin under `name`. Each line of `doc` becomes a paragraph of
/// its `doc` metadata.
fn define(scope: &Scope, name: &str, builtin: Value, doc: &[&str]) {
   if doc.is_empty() {
      scope.set(name, builtin);
      return;
   }

   let meta = Scope::new();
   meta.set("doc", Value::string(doc.join("\n\n")));

   scope.set(name, builtin.with_meta(meta));
}


#[cfg(test)]
mod tests {
   use super::*;
   use crate::Symbol;

   #[test]
   fn standard_scopes_are_fresh() {
      let first = Scope::standard();
      first.set("mine", Value::Int(1));

      let second = Scope::standard();
      assert!(second.get(&Symbol::new("mine")).is_none());
      assert!(second.get(&Symbol::new("def")).is_some());
      assert!(Scope::ground().ptr_eq(&Scope::ground()));
   }

   #[test]
   fn builtins_carry_docs() {
      let cons = Scope::ground().get(&Symbol::new("cons")).unwrap();

      let doc = cons.meta().unwrap().get(&Symbol::new("doc")).unwrap();
      assert_eq!(doc, Value::string("construct a pair from the given values\n\n=> (cons 1 [2 3])"));
      assert!(cons.is_applicative());
   }
}
