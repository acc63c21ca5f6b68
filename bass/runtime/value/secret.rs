use std::{
   fmt,
   sync::Arc,
};

use bytes::Bytes;

use crate::{
   Error,
   Result,
};

/// A named, sensitive byte string.
///
/// Rendering and serialization only ever reveal the name. Equality compares
/// the bytes. A secret decoded from its serialized form only has its name
/// and cannot be revealed.
#[derive(Clone)]
pub struct Secret {
   name:   Arc<str>,
   secret: Option<Bytes>,
}

impl Secret {
   #[must_use]
   pub fn new(name: &str, secret: impl Into<Bytes>) -> Self {
      Self {
         name:   Arc::from(name),
         secret: Some(secret.into()),
      }
   }

   /// A secret known only by name.
   #[must_use]
   pub fn redacted(name: &str) -> Self {
      Self {
         name:   Arc::from(name),
         secret: None,
      }
   }

   #[must_use]
   pub fn name(&self) -> &str {
      &self.name
   }

   /// The secret bytes. Only the command resolver should call this.
   pub fn reveal(&self) -> Result<&Bytes> {
      self.secret.as_ref().ok_or_else(|| Error::MissingSecret {
         name: self.name.clone(),
      })
   }
}

impl PartialEq for Secret {
   fn eq(&self, other: &Self) -> bool {
      self.secret == other.secret
   }
}

impl fmt::Display for Secret {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "<secret: {name}>", name = self.name)
   }
}

impl fmt::Debug for Secret {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Display::fmt(self, writer)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn never_renders_bytes() {
      let secret = Secret::new("token", "hunter2");

      assert_eq!(secret.to_string(), "<secret: token>");
      assert_eq!(format!("{secret:?}"), "<secret: token>");
   }

   #[test]
   fn equality_is_by_bytes() {
      assert_eq!(Secret::new("a", "x"), Secret::new("b", "x"));
      assert_ne!(Secret::new("a", "x"), Secret::new("a", "y"));
      assert_ne!(Secret::new("a", ""), Secret::redacted("a"));
   }

   #[test]
   fn redacted_secrets_cannot_be_revealed() {
      assert_eq!(&Secret::new("empty", "").reveal().unwrap()[..], b"");

      let error = Secret::redacted("token").reveal().unwrap_err();
      assert_eq!(error.to_string(), "missing secret: token");
   }
}
