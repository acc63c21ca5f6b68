use std::{
   fmt,
   sync::Arc,
};

use crate::{
   Scope,
   Value,
};

/// A one-based line and column in a source file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Position {
   pub line:   usize,
   pub column: usize,
}

impl fmt::Display for Position {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "{line}:{column}", line = self.line, column = self.column)
   }
}

/// Where a form was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
   pub file:  Arc<str>,
   pub start: Position,
   pub end:   Position,
}

impl fmt::Display for Range {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(
         writer,
         "{file}:{start}..{end}",
         file = self.file,
         start = self.start,
         end = self.end,
      )
   }
}

impl Range {
   /// The metadata attached to symbols bound by a form at this range.
   #[must_use]
   pub fn to_meta(&self) -> Scope {
      let meta = Scope::new();

      meta.set("file", Value::string(&*self.file));
      meta.set("line", Value::from(self.start.line));
      meta.set("column", Value::from(self.start.column));

      meta
   }
}

/// A form as read from source: the value plus where it came from, its
/// preceding comment and any `^meta` binds.
#[derive(Debug, Clone)]
pub struct Annotate {
   pub value:   Value,
   pub range:   Range,
   pub comment: Option<Arc<str>>,
   pub meta:    Option<Arc<[Value]>>,
}

impl Annotate {
   #[must_use]
   pub fn new(value: Value, range: Range) -> Self {
      Self {
         value,
         range,
         comment: None,
         meta: None,
      }
   }

   /// Whether evaluating this form produces metadata.
   #[must_use]
   pub fn has_meta(&self) -> bool {
      self.comment.is_some() || self.meta.as_ref().is_some_and(|meta| !meta.is_empty())
   }
}

/// A value carrying a metadata scope. Transparent to everything except
/// `meta`.
#[derive(Debug, Clone)]
pub struct Annotated {
   pub value: Value,
   pub meta:  Scope,
}

impl Value {
   /// Attaches metadata. Metadata already attached stays visible behind the
   /// new metadata.
   #[must_use]
   pub fn with_meta(&self, meta: Scope) -> Self {
      match *self {
         Self::Annotated(ref annotated) => {
            Self::Annotated(Arc::new(Annotated {
               value: annotated.value.clone(),
               meta:  Scope::with_parents([meta, annotated.meta.clone()]),
            }))
         },

         _ => {
            Self::Annotated(Arc::new(Annotated {
               value: self.clone(),
               meta,
            }))
         },
      }
   }
}
