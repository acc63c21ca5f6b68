//! The value algebra.

mod annotate;
mod combiner;
mod list;
pub mod path;
mod secret;
mod symbol;
pub mod thunk;

use std::{
   fmt::{
      self,
      Write as _,
   },
   sync::Arc,
};

pub use self::{
   annotate::{
      Annotate,
      Annotated,
      Position,
      Range,
   },
   combiner::{
      Applicative,
      Operative,
   },
   list::Pair,
   path::{
      CachePath,
      CommandPath,
      DirPath,
      ExtendPath,
      FileOrDir,
      FilePath,
      FsPath,
      HostPath,
   },
   secret::Secret,
   symbol::Symbol,
   thunk::{
      Thunk,
      ThunkAddr,
      ThunkPath,
   },
};
use crate::{
   Builtin,
   Error,
   Scope,
   pipe::{
      Sink,
      Source,
   },
};

/// A Bass value.
///
/// Everything is cheap to clone: compound variants share their contents
/// behind an [`Arc`].
#[derive(Clone)]
pub enum Value {
   Null,
   /// `_`, which binds nothing.
   Ignore,
   Bool(bool),
   Int(i64),
   String(Arc<str>),
   Symbol(Symbol),
   /// `:foo`, which evaluates to the symbol `foo`.
   Keyword(Symbol),
   /// `()`.
   Empty,
   /// `(a & d)`, which evaluates as a call.
   Pair(Arc<Pair>),
   /// `[a & d]`, which evaluates to a list.
   Cons(Arc<Pair>),
   /// `{...}`, which evaluates to a scope.
   Bind(Arc<[Value]>),
   Annotate(Arc<Annotate>),
   Annotated(Arc<Annotated>),
   Scope(Scope),
   Operative(Arc<Operative>),
   Applicative(Arc<Applicative>),
   Builtin(Arc<Builtin>),
   Dir(DirPath),
   File(FilePath),
   Command(CommandPath),
   ExtendPath(Arc<ExtendPath>),
   HostPath(Arc<HostPath>),
   FsPath(Arc<FsPath>),
   CachePath(Arc<CachePath>),
   Secret(Secret),
   Thunk(Arc<Thunk>),
   ThunkPath(Arc<ThunkPath>),
   ThunkAddr(Arc<ThunkAddr>),
   Source(Source),
   Sink(Sink),
   Error(Arc<Error>),
}

impl Value {
   #[must_use]
   pub fn string(string: impl Into<Arc<str>>) -> Self {
      Self::String(string.into())
   }

   #[must_use]
   pub fn symbol(name: &str) -> Self {
      Self::Symbol(Symbol::new(name))
   }

   #[must_use]
   pub fn keyword(name: &str) -> Self {
      Self::Keyword(Symbol::new(name))
   }

   #[must_use]
   pub fn error(error: Error) -> Self {
      Self::Error(Arc::new(error))
   }

   /// Looks through any metadata wrapping.
   #[must_use]
   pub fn unannotated(&self) -> &Self {
      let mut value = self;

      loop {
         match *value {
            Self::Annotated(ref annotated) => value = &annotated.value,
            Self::Annotate(ref annotate) => value = &annotate.value,
            _ => return value,
         }
      }
   }

   /// Everything except `false` and `null` is truthy.
   #[must_use]
   pub fn is_truthy(&self) -> bool {
      !matches!(*self.unannotated(), Self::Bool(false) | Self::Null)
   }

   /// Whether this is an empty string, list, scope or bind form, or `null`.
   #[must_use]
   pub fn is_empty(&self) -> bool {
      match *self.unannotated() {
         Self::Null | Self::Empty => true,
         Self::String(ref string) => string.is_empty(),
         Self::Scope(ref scope) => scope.is_empty(),
         Self::Bind(ref binds) => binds.is_empty(),
         _ => false,
      }
   }

   /// The metadata attached to this value, if any.
   #[must_use]
   pub fn meta(&self) -> Option<Scope> {
      match *self {
         Self::Annotated(ref annotated) => Some(annotated.meta.clone()),
         _ => None,
      }
   }

   /// Structural equality. Combiners, pipes and errors compare by identity.
   #[must_use]
   pub fn equal(&self, other: &Self) -> bool {
      self.equal_guarded(other, &mut Vec::new())
   }

   pub(crate) fn equal_guarded(&self, other: &Self, seen: &mut Vec<(usize, usize)>) -> bool {
      match (self.unannotated(), other.unannotated()) {
         (&Self::Null, &Self::Null)
         | (&Self::Ignore, &Self::Ignore)
         | (&Self::Empty, &Self::Empty) => true,

         (&Self::Bool(this), &Self::Bool(other)) => this == other,
         (&Self::Int(this), &Self::Int(other)) => this == other,
         (Self::String(this), Self::String(other)) => this == other,
         (Self::Symbol(this), Self::Symbol(other)) | (Self::Keyword(this), Self::Keyword(other)) => {
            this == other
         },

         (Self::Pair(this), Self::Pair(other)) | (Self::Cons(this), Self::Cons(other)) => {
            this.a.equal_guarded(&other.a, seen) && this.d.equal_guarded(&other.d, seen)
         },

         (Self::Bind(this), Self::Bind(other)) => {
            this.len() == other.len()
               && this
                  .iter()
                  .zip(other.iter())
                  .all(|(this, other)| this.equal_guarded(other, seen))
         },

         (Self::Scope(this), Self::Scope(other)) => this.equal_guarded(other, seen),

         (Self::Operative(this), Self::Operative(other)) => Arc::ptr_eq(this, other),
         (Self::Applicative(this), Self::Applicative(other)) => {
            this.underlying.equal_guarded(&other.underlying, seen)
         },
         (Self::Builtin(this), Self::Builtin(other)) => Arc::ptr_eq(this, other),

         (Self::Dir(this), Self::Dir(other)) => this == other,
         (Self::File(this), Self::File(other)) => this == other,
         (Self::Command(this), Self::Command(other)) => this == other,
         (Self::ExtendPath(this), Self::ExtendPath(other)) => {
            this.child == other.child && this.parent.equal_guarded(&other.parent, seen)
         },
         (Self::HostPath(this), Self::HostPath(other)) => this == other,
         (Self::FsPath(this), Self::FsPath(other)) => this == other,
         (Self::CachePath(this), Self::CachePath(other)) => this == other,
         (Self::Secret(this), Self::Secret(other)) => this == other,
         (Self::Thunk(this), Self::Thunk(other)) => this == other,
         (Self::ThunkPath(this), Self::ThunkPath(other)) => this == other,
         (Self::ThunkAddr(this), Self::ThunkAddr(other)) => this == other,

         (Self::Source(this), Self::Source(other)) => this.ptr_eq(other),
         (Self::Sink(this), Self::Sink(other)) => this.ptr_eq(other),
         (Self::Error(this), Self::Error(other)) => Arc::ptr_eq(this, other),

         _ => false,
      }
   }

   fn render(&self, writer: &mut dyn fmt::Write, printing: &mut Vec<usize>) -> fmt::Result {
      match *self {
         Self::Null => writer.write_str("null"),
         Self::Ignore => writer.write_char('_'),
         Self::Bool(boolean) => write!(writer, "{boolean}"),
         Self::Int(int) => write!(writer, "{int}"),
         Self::String(ref string) => write_quoted(writer, string),
         Self::Symbol(ref symbol) => write!(writer, "{symbol}"),
         Self::Keyword(ref symbol) => write!(writer, ":{symbol}"),
         Self::Empty => writer.write_str("()"),
         Self::Pair(ref pair) => render_cells(pair, '(', ')', writer, printing),
         Self::Cons(ref pair) => render_cells(pair, '[', ']', writer, printing),

         Self::Bind(ref binds) => {
            writer.write_char('{')?;
            for (index, value) in binds.iter().enumerate() {
               if index > 0 {
                  writer.write_char(' ')?;
               }
               value.render(writer, printing)?;
            }
            writer.write_char('}')
         },

         Self::Annotate(ref annotate) => annotate.value.render(writer, printing),
         Self::Annotated(ref annotated) => annotated.value.render(writer, printing),

         Self::Scope(ref scope) => {
            if let Some(name) = scope.name() {
               return write!(writer, "<scope: {name}>");
            }

            let address = scope.address();
            if printing.contains(&address) {
               return writer.write_str("{...}");
            }

            printing.push(address);
            writer.write_char('{')?;
            for (index, (symbol, value)) in scope.bindings().into_iter().enumerate() {
               if index > 0 {
                  writer.write_char(' ')?;
               }
               write!(writer, ":{symbol} ")?;
               value.render(writer, printing)?;
            }
            printing.pop();

            writer.write_char('}')
         },

         Self::Operative(ref operative) => {
            Self::list([
               Self::symbol("op"),
               operative.formals.clone(),
               operative.eformal.clone(),
               operative.body.clone(),
            ])
            .render(writer, printing)
         },

         Self::Applicative(ref applicative) => {
            writer.write_str("(wrap ")?;
            applicative.underlying.render(writer, printing)?;
            writer.write_char(')')
         },

         Self::Builtin(ref builtin) => write!(writer, "{builtin}"),
         Self::Dir(ref dir) => write!(writer, "{dir}"),
         Self::File(ref file) => write!(writer, "{file}"),
         Self::Command(ref command) => write!(writer, "{command}"),

         Self::ExtendPath(ref extend) => {
            extend.parent.render(writer, printing)?;
            write!(writer, "/{child}", child = extend.child.trimmed())
         },

         Self::HostPath(ref path) => write!(writer, "{path}"),
         Self::FsPath(ref path) => write!(writer, "{path}"),
         Self::CachePath(ref path) => write!(writer, "{path}"),
         Self::Secret(ref secret) => write!(writer, "{secret}"),
         Self::Thunk(ref thunk) => write!(writer, "{thunk}"),
         Self::ThunkPath(ref path) => write!(writer, "{path}"),
         Self::ThunkAddr(ref addr) => write!(writer, "{addr}"),
         Self::Source(ref source) => write!(writer, "<source: {name}>", name = source.name()),
         Self::Sink(ref sink) => write!(writer, "<sink: {name}>", name = sink.name()),
         Self::Error(ref error) => write!(writer, "<error: {error}>"),
      }
   }
}

fn render_cells(
   pair: &Pair,
   open: char,
   close: char,
   writer: &mut dyn fmt::Write,
   printing: &mut Vec<usize>,
) -> fmt::Result {
   writer.write_char(open)?;
   pair.a.render(writer, printing)?;

   let mut rest = &pair.d;
   loop {
      match *rest {
         Value::Empty => break,

         Value::Pair(ref next) | Value::Cons(ref next) => {
            writer.write_char(' ')?;
            next.a.render(writer, printing)?;
            rest = &next.d;
         },

         ref tail => {
            writer.write_str(" & ")?;
            tail.render(writer, printing)?;
            break;
         },
      }
   }

   writer.write_char(close)
}

fn write_quoted(writer: &mut dyn fmt::Write, string: &str) -> fmt::Result {
   writer.write_char('"')?;

   for char in string.chars() {
      match char {
         '"' => writer.write_str("\\\"")?,
         '\\' => writer.write_str("\\\\")?,
         '\n' => writer.write_str("\\n")?,
         '\t' => writer.write_str("\\t")?,
         '\r' => writer.write_str("\\r")?,
         char if char.is_control() => write!(writer, "\\x{code:02x}", code = u32::from(char))?,
         char => writer.write_char(char)?,
      }
   }

   writer.write_char('"')
}

impl fmt::Display for Value {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      self.render(writer, &mut Vec::new())
   }
}

impl fmt::Debug for Value {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      self.render(writer, &mut Vec::new())
   }
}

impl PartialEq for Value {
   fn eq(&self, other: &Self) -> bool {
      self.equal(other)
   }
}

impl From<bool> for Value {
   fn from(boolean: bool) -> Self {
      Self::Bool(boolean)
   }
}

impl From<i64> for Value {
   fn from(int: i64) -> Self {
      Self::Int(int)
   }
}

impl From<usize> for Value {
   fn from(int: usize) -> Self {
      Self::Int(i64::try_from(int).unwrap_or(i64::MAX))
   }
}

impl From<&str> for Value {
   fn from(string: &str) -> Self {
      Self::String(Arc::from(string))
   }
}

impl From<String> for Value {
   fn from(string: String) -> Self {
      Self::String(Arc::from(string))
   }
}

impl From<Symbol> for Value {
   fn from(symbol: Symbol) -> Self {
      Self::Symbol(symbol)
   }
}

impl From<Scope> for Value {
   fn from(scope: Scope) -> Self {
      Self::Scope(scope)
   }
}

impl From<Thunk> for Value {
   fn from(thunk: Thunk) -> Self {
      Self::Thunk(Arc::new(thunk))
   }
}

impl From<Error> for Value {
   fn from(error: Error) -> Self {
      Self::Error(Arc::new(error))
   }
}

impl<T: Into<Value>> From<Option<T>> for Value {
   fn from(option: Option<T>) -> Self {
      option.map_or(Self::Null, Into::into)
   }
}
