use std::sync::Arc;

use bass_util::collect_vec;

use crate::Value;

/// A cons cell. `Value::Pair` cells evaluate as calls; `Value::Cons` cells
/// evaluate to a list of their evaluated elements.
#[derive(Debug, Clone)]
pub struct Pair {
   pub a: Value,
   pub d: Value,
}

impl Value {
   #[must_use]
   pub fn pair(a: Value, d: Value) -> Self {
      Self::Pair(Arc::new(Pair { a, d }))
   }

   #[must_use]
   pub fn cons(a: Value, d: Value) -> Self {
      Self::Cons(Arc::new(Pair { a, d }))
   }

   /// Builds a proper list out of `Pair` cells.
   #[must_use]
   pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
      Self::list_with_tail(values, Self::Empty)
   }

   #[must_use]
   pub fn list_with_tail(values: impl IntoIterator<Item = Value>, tail: Value) -> Self {
      collect_vec!(values);

      values
         .into_iter()
         .rev()
         .fold(tail, |rest, value| Self::pair(value, rest))
   }

   /// Builds a `[...]` form out of `Cons` cells.
   #[must_use]
   pub fn cons_list(values: impl IntoIterator<Item = Value>) -> Self {
      collect_vec!(values);

      values
         .into_iter()
         .rev()
         .fold(Self::Empty, |rest, value| Self::cons(value, rest))
   }

   /// The first and rest of a `Pair` or `Cons` cell, looking through
   /// metadata.
   #[must_use]
   pub fn as_cell(&self) -> Option<&Pair> {
      match *self.unannotated() {
         Self::Pair(ref pair) | Self::Cons(ref pair) => Some(pair),
         _ => None,
      }
   }

   /// Collects a proper list. Returns `None` for improper lists and
   /// non-lists.
   #[must_use]
   pub fn to_vec(&self) -> Option<Vec<Value>> {
      let mut values = Vec::new();
      let mut cursor = self.unannotated();

      loop {
         match *cursor {
            Self::Empty => return Some(values),

            Self::Pair(ref pair) | Self::Cons(ref pair) => {
               values.push(pair.a.clone());
               cursor = pair.d.unannotated();
            },

            _ => return None,
         }
      }
   }

   /// Whether this is `()` or a chain of cells ending in `()`.
   #[must_use]
   pub fn is_list(&self) -> bool {
      let mut cursor = self.unannotated();

      loop {
         match *cursor {
            Self::Empty => return true,
            Self::Pair(ref pair) | Self::Cons(ref pair) => cursor = pair.d.unannotated(),
            _ => return false,
         }
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn proper_lists() {
      let list = Value::list([Value::Int(1), Value::Int(2)]);

      assert!(list.is_list());
      assert_eq!(list.to_vec(), Some(vec![Value::Int(1), Value::Int(2)]));
      assert_eq!(list.to_string(), "(1 2)");
   }

   #[test]
   fn improper_lists() {
      let list = Value::list_with_tail([Value::Int(1)], Value::Int(2));

      assert!(!list.is_list());
      assert_eq!(list.to_vec(), None);
      assert_eq!(list.to_string(), "(1 & 2)");
   }

   #[test]
   fn cons_forms() {
      let form = Value::cons_list([Value::symbol("a"), Value::symbol("b")]);

      assert_eq!(form.to_string(), "[a b]");
      assert_eq!(form.to_vec().map(|values| values.len()), Some(2));
   }
}
