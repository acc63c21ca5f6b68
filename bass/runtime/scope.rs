use std::{
   fmt,
   sync::{
      Arc,
      PoisonError,
      RwLock,
      RwLockReadGuard,
      RwLockWriteGuard,
   },
};

use indexmap::{
   IndexMap,
   IndexSet,
};
use rustc_hash::FxBuildHasher;

use crate::{
   Symbol,
   Value,
};

#[derive(Default)]
struct State {
   name:     Option<Arc<str>>,
   parents:  Vec<Scope>,
   bindings: IndexMap<Symbol, Value, FxBuildHasher>,
}

/// A mutable, shared mapping from symbols to values with an ordered list of
/// parents.
///
/// Lookups search the local bindings first, then each parent depth-first.
/// Scopes may reference themselves through their parents or values; every
/// traversal guards against cycles.
#[derive(Clone, Default)]
pub struct Scope(Arc<RwLock<State>>);

impl Scope {
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   /// An empty child of the given parents.
   #[must_use]
   pub fn with_parents(parents: impl IntoIterator<Item = Scope>) -> Self {
      Self(Arc::new(RwLock::new(State {
         parents: parents.into_iter().collect(),
         ..State::default()
      })))
   }

   /// A scope that renders as `<scope: name>` instead of its bindings.
   #[must_use]
   pub fn named(name: &str, parents: impl IntoIterator<Item = Scope>) -> Self {
      let scope = Self::with_parents(parents);
      scope.write().name = Some(Arc::from(name));
      scope
   }

   fn read(&self) -> RwLockReadGuard<'_, State> {
      self.0.read().unwrap_or_else(PoisonError::into_inner)
   }

   fn write(&self) -> RwLockWriteGuard<'_, State> {
      self.0.write().unwrap_or_else(PoisonError::into_inner)
   }

   pub(crate) fn address(&self) -> usize {
      Arc::as_ptr(&self.0).addr()
   }

   #[must_use]
   pub fn ptr_eq(&self, other: &Self) -> bool {
      Arc::ptr_eq(&self.0, &other.0)
   }

   #[must_use]
   pub fn name(&self) -> Option<Arc<str>> {
      self.read().name.clone()
   }

   /// Binds a symbol locally, replacing any previous local binding.
   pub fn set(&self, symbol: impl Into<Symbol>, value: impl Into<Value>) {
      self.write().bindings.insert(symbol.into(), value.into());
   }

   /// Looks up a symbol locally, then in each parent depth-first.
   #[must_use]
   pub fn get(&self, symbol: &Symbol) -> Option<Value> {
      self.get_guarded(symbol, &mut Vec::new())
   }

   fn get_guarded(&self, symbol: &Symbol, visited: &mut Vec<usize>) -> Option<Value> {
      if visited.contains(&self.address()) {
         return None;
      }
      visited.push(self.address());

      let parents = {
         let state = self.read();

         if let Some(value) = state.bindings.get(symbol) {
            return Some(value.clone());
         }

         state.parents.clone()
      };

      parents
         .iter()
         .find_map(|parent| parent.get_guarded(symbol, visited))
   }

   /// Looks up a symbol in the local bindings only.
   #[must_use]
   pub fn get_local(&self, symbol: &Symbol) -> Option<Value> {
      self.read().bindings.get(symbol).cloned()
   }

   /// The symbols bound directly in this scope, in binding order.
   #[must_use]
   pub fn local_symbols(&self) -> Vec<Symbol> {
      self.read().bindings.keys().cloned().collect()
   }

   /// Every visible symbol: parents first, then local bindings, each once.
   #[must_use]
   pub fn symbols(&self) -> IndexSet<Symbol, FxBuildHasher> {
      let mut symbols = IndexSet::default();
      self.collect_symbols(&mut symbols, &mut Vec::new());
      symbols
   }

   fn collect_symbols(&self, symbols: &mut IndexSet<Symbol, FxBuildHasher>, visited: &mut Vec<usize>) {
      if visited.contains(&self.address()) {
         return;
      }
      visited.push(self.address());

      let (parents, locals) = {
         let state = self.read();
         (
            state.parents.clone(),
            state.bindings.keys().cloned().collect::<Vec<_>>(),
         )
      };

      for parent in &parents {
         parent.collect_symbols(symbols, visited);
      }

      symbols.extend(locals);
   }

   /// Every visible binding, in [`Scope::symbols`] order, with shadowed
   /// values resolved through [`Scope::get`].
   #[must_use]
   pub fn bindings(&self) -> Vec<(Symbol, Value)> {
      self
         .symbols()
         .into_iter()
         .filter_map(|symbol| self.get(&symbol).map(|value| (symbol, value)))
         .collect()
   }

   /// Calls `each` for every visible binding, stopping at the first error.
   pub fn each<E>(&self, mut each: impl FnMut(&Symbol, &Value) -> Result<(), E>) -> Result<(), E> {
      for (symbol, value) in self.bindings() {
         each(&symbol, &value)?;
      }

      Ok(())
   }

   #[must_use]
   pub fn is_empty(&self) -> bool {
      self.symbols().is_empty()
   }

   #[must_use]
   pub fn parents(&self) -> Vec<Scope> {
      self.read().parents.clone()
   }

   pub fn add_parent(&self, parent: Scope) {
      self.write().parents.push(parent);
   }

   pub fn clear_parents(&self) {
      self.write().parents.clear();
   }

   /// A new scope with the same parents and a copy of the local bindings.
   #[must_use]
   pub fn copy(&self) -> Self {
      let state = self.read();

      Self(Arc::new(RwLock::new(State {
         name:     state.name.clone(),
         parents:  state.parents.clone(),
         bindings: state.bindings.clone(),
      })))
   }

   /// Whether every visible binding of `self` is bound to an equal value in
   /// `other`.
   fn is_subset_of(&self, other: &Self, seen: &mut Vec<(usize, usize)>) -> bool {
      self.bindings().into_iter().all(|(symbol, value)| {
         other
            .get(&symbol)
            .is_some_and(|theirs| value.equal_guarded(&theirs, seen))
      })
   }

   pub(crate) fn equal_guarded(&self, other: &Self, seen: &mut Vec<(usize, usize)>) -> bool {
      let pair = (self.address(), other.address());

      if self.ptr_eq(other) || seen.contains(&pair) {
         return true;
      }
      seen.push(pair);

      self.is_subset_of(other, seen) && other.is_subset_of(self, seen)
   }
}

impl PartialEq for Scope {
   fn eq(&self, other: &Self) -> bool {
      self.equal_guarded(other, &mut Vec::new())
   }
}

impl fmt::Debug for Scope {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Display::fmt(&Value::Scope(self.clone()), writer)
   }
}

impl FromIterator<(Symbol, Value)> for Scope {
   fn from_iter<I: IntoIterator<Item = (Symbol, Value)>>(iter: I) -> Self {
      let scope = Self::new();
      for (symbol, value) in iter {
         scope.set(symbol, value);
      }
      scope
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn sym(name: &str) -> Symbol {
      Symbol::new(name)
   }

   #[test]
   fn lookup_order() {
      let first = Scope::new();
      first.set("a", Value::Int(1));
      first.set("b", Value::Int(1));

      let second = Scope::new();
      second.set("b", Value::Int(2));
      second.set("c", Value::Int(2));

      let child = Scope::with_parents([first, second]);
      child.set("c", Value::Int(3));

      assert_eq!(child.get(&sym("a")), Some(Value::Int(1)));
      assert_eq!(child.get(&sym("b")), Some(Value::Int(1)));
      assert_eq!(child.get(&sym("c")), Some(Value::Int(3)));
      assert_eq!(child.get(&sym("d")), None);
      assert_eq!(child.get_local(&sym("a")), None);
   }

   #[test]
   fn bindings_visit_parents_first() {
      let parent = Scope::new();
      parent.set("a", Value::Int(1));
      parent.set("b", Value::Int(1));

      let child = Scope::with_parents([parent]);
      child.set("c", Value::Int(2));
      child.set("a", Value::Int(2));

      assert_eq!(child.bindings(), [
         (sym("a"), Value::Int(2)),
         (sym("b"), Value::Int(1)),
         (sym("c"), Value::Int(2)),
      ]);
   }

   #[test]
   fn self_referential_parents() {
      let scope = Scope::new();
      scope.set("a", Value::Int(1));
      scope.add_parent(scope.clone());

      assert_eq!(scope.get(&sym("a")), Some(Value::Int(1)));
      assert_eq!(scope.get(&sym("missing")), None);
      assert_eq!(scope.bindings().len(), 1);
      assert_eq!(scope, scope.clone());
   }

   #[test]
   fn equality_is_mutual_subset() {
      let a = Scope::new();
      a.set("x", Value::Int(1));

      let b = Scope::with_parents([a.clone()]);
      assert_eq!(a, b);

      b.set("y", Value::Int(2));
      assert_ne!(a, b);

      let cyclic_a = Scope::new();
      cyclic_a.set("me", Value::Scope(cyclic_a.clone()));
      let cyclic_b = Scope::new();
      cyclic_b.set("me", Value::Scope(cyclic_b.clone()));
      assert_eq!(cyclic_a, cyclic_b);
   }

   #[test]
   fn copies_are_independent() {
      let scope = Scope::new();
      scope.set("a", Value::Int(1));

      let copy = scope.copy();
      copy.set("a", Value::Int(2));

      assert_eq!(scope.get(&sym("a")), Some(Value::Int(1)));
      assert_eq!(copy.get(&sym("a")), Some(Value::Int(2)));
   }
}
