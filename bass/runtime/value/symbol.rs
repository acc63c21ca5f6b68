use std::{
   fmt,
   sync::Arc,
};

/// An interned-by-value identifier.
///
/// Keywords (`:foo`) evaluate to the symbol of the same name, so they share
/// this type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Arc<str>);

impl Symbol {
   #[must_use]
   pub fn new(name: &str) -> Self {
      Self(Arc::from(name))
   }

   #[must_use]
   pub fn as_str(&self) -> &str {
      &self.0
   }

   /// The name used for this symbol as a JSON object key.
   #[must_use]
   pub fn json_key(&self) -> String {
      self.0.replace('-', "_")
   }

   #[must_use]
   pub fn from_json_key(key: &str) -> Self {
      Self::new(&key.replace('_', "-"))
   }
}

impl From<&str> for Symbol {
   fn from(name: &str) -> Self {
      Self::new(name)
   }
}

impl From<String> for Symbol {
   fn from(name: String) -> Self {
      Self(Arc::from(name))
   }
}

impl fmt::Display for Symbol {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      writer.write_str(&self.0)
   }
}

impl fmt::Debug for Symbol {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      writer.write_str(&self.0)
   }
}
