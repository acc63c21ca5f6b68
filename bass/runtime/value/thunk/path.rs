use std::{
   fmt,
   sync::Arc,
};

use crate::{
   FileOrDir,
   Scope,
   Symbol,
   Thunk,
};

/// A path within the output directory of a thunk.
#[derive(Debug, Clone)]
pub struct ThunkPath {
   pub thunk: Arc<Thunk>,
   pub path:  FileOrDir,
}

impl PartialEq for ThunkPath {
   fn eq(&self, other: &Self) -> bool {
      self.path == other.path && self.thunk == other.thunk
   }
}

impl fmt::Display for ThunkPath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(
         writer,
         "{thunk}/{path}",
         thunk = self.thunk,
         path = self.path.trimmed(),
      )
   }
}

/// The address of a port on a started thunk, rendered through a format
/// like `$host:$port`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThunkAddr {
   pub thunk:  Arc<Thunk>,
   pub port:   String,
   pub format: String,
}

impl ThunkAddr {
   /// Substitutes `$name` references in the format with the string form of
   /// the matching binding in `info`.
   #[must_use]
   pub fn render(&self, info: &Scope) -> String {
      let mut rendered = String::new();
      let mut rest = self.format.as_str();

      while let Some(index) = rest.find('$') {
         rendered.push_str(&rest[..index]);
         rest = &rest[index + 1..];

         let end = rest
            .find(|char: char| !(char.is_alphanumeric() || char == '_' || char == '-'))
            .unwrap_or(rest.len());
         let (name, after) = rest.split_at(end);

         match info.get(&Symbol::new(name)) {
            Some(crate::Value::String(string)) => rendered.push_str(&string),
            Some(value) => rendered.push_str(&value.to_string()),
            None => {
               rendered.push('$');
               rendered.push_str(name);
            },
         }

         rest = after;
      }

      rendered.push_str(rest);
      rendered
   }
}

impl fmt::Display for ThunkAddr {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(
         writer,
         "<thunk {name} addr: {port}>",
         name = self.thunk.name(),
         port = self.port,
      )
   }
}
