use super::define;
use crate::{
   Builtin,
   Scope,
   Value,
};

struct Predicate {
   name:  &'static str,
   check: fn(&Value) -> bool,
   doc:   &'static [&'static str],
}

/// The builtin predicates, also used by `doc` to describe values.
const PREDICATES: &[Predicate] = &[
   Predicate {
      name:  "null?",
      check: |value| matches!(*value.unannotated(), Value::Null),
      doc:   &["returns true if the value is null", "=> (null? null)"],
   },
   Predicate {
      name:  "ignore?",
      check: |value| matches!(*value.unannotated(), Value::Ignore),
      doc:   &["returns true if the value is _ (\"ignore\")", "=> (ignore? _)"],
   },
   Predicate {
      name:  "boolean?",
      check: |value| matches!(*value.unannotated(), Value::Bool(_)),
      doc:   &["returns true if the value is true or false", "=> (boolean? false)"],
   },
   Predicate {
      name:  "number?",
      check: |value| matches!(*value.unannotated(), Value::Int(_)),
      doc:   &["returns true if the value is a number", "=> (number? 123)"],
   },
   Predicate {
      name:  "string?",
      check: |value| matches!(*value.unannotated(), Value::String(_)),
      doc:   &["returns true if the value is a string", "=> (string? \"abc\")"],
   },
   Predicate {
      name:  "symbol?",
      check: |value| matches!(*value.unannotated(), Value::Symbol(_)),
      doc:   &["returns true if the value is a symbol", "=> (symbol? :abc)"],
   },
   Predicate {
      name:  "scope?",
      check: |value| matches!(*value.unannotated(), Value::Scope(_)),
      doc:   &[
         "returns true if the value is a scope",
         "A scope is a mapping from symbols to values.",
         "=> (scope? {})",
      ],
   },
   Predicate {
      name:  "sink?",
      check: |value| matches!(*value.unannotated(), Value::Sink(_)),
      doc:   &[
         "returns true if the value is a sink",
         "A sink is a type that you can send values to using (emit).",
         "=> (sink? *stdout*)",
      ],
   },
   Predicate {
      name:  "source?",
      check: |value| matches!(*value.unannotated(), Value::Source(_)),
      doc:   &[
         "returns true if the value is a source",
         "A source is a type that you can read values from using (next).",
         "=> (source? *stdin*)",
      ],
   },
   Predicate {
      name:  "list?",
      check: Value::is_list,
      doc:   &[
         "returns true if the value is a linked list",
         "A linked list is a pair whose second value is another list or empty.",
         "=> (list? [])",
      ],
   },
   Predicate {
      name:  "pair?",
      check: |value| value.as_cell().is_some(),
      doc:   &["returns true if the value is a pair", "=> (pair? [1 & 2])"],
   },
   Predicate {
      name:  "applicative?",
      check: Value::is_applicative,
      doc:   &[
         "returns true if the value is an applicative",
         "An applicative is a combiner that wraps another combiner.",
         "=> (applicative? applicative?)",
      ],
   },
   Predicate {
      name:  "operative?",
      check: Value::is_operative,
      doc:   &[
         "returns true if the value is an operative",
         "An operative is a combiner that is given the caller's scope.",
         "=> (operative? op)",
      ],
   },
   Predicate {
      name:  "combiner?",
      check: Value::is_combiner,
      doc:   &[
         "returns true if the value is a combiner",
         "A combiner takes sequence of values as arguments and returns another value.",
         "=> (combiner? op)",
      ],
   },
   Predicate {
      name:  "path?",
      check: Value::is_path,
      doc:   &[
         "returns true if the value is a path",
         "A path is a reference to a file, directory, or command.",
         "=> (path? ./foo)",
      ],
   },
   Predicate {
      name:  "empty?",
      check: Value::is_empty,
      doc:   &[
         "returns true if the value is an empty list, a zero-length string, an empty scope, or null",
         "=> (empty? [])",
      ],
   },
   Predicate {
      name:  "thunk?",
      check: |value| matches!(*value.unannotated(), Value::Thunk(_)),
      doc:   &["returns true if the value is a valid thunk", "=> (thunk? (.yep))"],
   },
];

/// The names of every predicate the value satisfies.
#[must_use]
pub fn predicates(value: &Value) -> Vec<&'static str> {
   PREDICATES
      .iter()
      .filter(|predicate| (predicate.check)(value))
      .map(|predicate| predicate.name)
      .collect()
}

pub(super) fn register(ground: &Scope) {
   for predicate in PREDICATES {
      let check = predicate.check;

      define(
         ground,
         predicate.name,
         Builtin::func(predicate.name, "[val]", move |_, args| Ok(Value::Bool(check(args.value(0)?)))),
         predicate.doc,
      );
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::ground::test::{
      call,
      list,
      run,
   };

   async fn check(name: &str, value: Value) -> bool {
      match run(&call(name, [value])).await.unwrap() {
         Value::Bool(result) => result,
         other => panic!("{name} returned {other}"),
      }
   }

   #[tokio::test]
   async fn type_predicates() {
      assert!(check("null?", Value::Null).await);
      assert!(!check("null?", Value::Bool(false)).await);
      assert!(check("boolean?", Value::Bool(false)).await);
      assert!(check("number?", Value::Int(1)).await);
      assert!(!check("number?", Value::string("1")).await);
      assert!(check("symbol?", Value::keyword("abc")).await);
      assert!(check("scope?", Value::Scope(Scope::new())).await);
      assert!(check("list?", list([])).await);
      assert!(check("list?", list([Value::Int(1)])).await);
      assert!(!check("pair?", list([])).await);
      assert!(check("pair?", list([Value::Int(1)])).await);
   }

   #[tokio::test]
   async fn combiner_predicates() {
      assert!(check("applicative?", Value::symbol("applicative?")).await);
      assert!(!check("operative?", Value::symbol("applicative?")).await);
      assert!(check("operative?", Value::symbol("def")).await);
      assert!(check("combiner?", Value::symbol("def")).await);
      assert!(!check("combiner?", Value::Int(1)).await);
   }

   #[tokio::test]
   async fn emptiness() {
      assert!(check("empty?", list([])).await);
      assert!(check("empty?", Value::string("")).await);
      assert!(check("empty?", Value::Scope(Scope::new())).await);
      assert!(check("empty?", Value::Null).await);
      assert!(!check("empty?", Value::keyword("my-soul")).await);
   }

   #[test]
   fn describing_values() {
      assert_eq!(predicates(&Value::Int(1)), ["number?"]);
      assert_eq!(predicates(&Value::Empty), ["list?", "empty?"]);
   }
}
