use std::{
   fmt::Write as _,
   result,
   sync::Arc,
};

use bass_util::into;

use crate::{
   Scope,
   Symbol,
   Value,
   value::Position,
};

/// A type alias for concise use of [`Error`].
pub type Result<T> = result::Result<T, Error>;

/// Every failure the evaluator can raise.
///
/// Errors are values too: [`Value::Error`] wraps one so user code can hold on
/// to it, and calling that value raises it again.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
   #[error("unbound symbol: {symbol}")]
   Unbound { symbol: Symbol, scope: Scope },

   #[error("mismatch: need {need}, have {have}")]
   BindMismatch { need: Value, have: Value },

   #[error("cannot bind to {have}")]
   CannotBind { have: Value },

   #[error("cannot decode {src} into {dst}{suffix}", suffix = missing_fields(.missing))]
   Decode {
      src:     Value,
      dst:     &'static str,
      missing: Vec<Symbol>,
   },

   #[error("cannot encode {value}")]
   Encode { value: Value },

   #[error(
      "({name}) arity mismatch: need {need}{plus} argument{s}, given {have}",
      plus = if_variadic(.variadic, "+", ""),
      s = plural(.need, .variadic),
   )]
   Arity {
      name:     Symbol,
      need:     usize,
      have:     usize,
      variadic: bool,
   },

   #[error("cannot extend {parent} with {child}")]
   Extend { parent: Value, child: Value },

   #[error("bad syntax: {reason}")]
   BadSyntax { reason: String },

   #[error("end of source")]
   EndOfSource,

   #[error("interrupted")]
   Interrupted,

   #[error("no runtime pool available")]
   NoRuntimePool,

   #[error("no runtime configured for platform {platform}")]
   NoRuntime { platform: Value },

   #[error("unknown protocol: {name}")]
   UnknownProtocol { name: String },

   #[error("missing secret: {name}")]
   MissingSecret { name: Arc<str> },

   #[error("host path {attempted} escapes context dir {context_dir}")]
   HostPathEscape {
      context_dir: String,
      attempted:   String,
   },

   #[error("{file}:{position}: {cause}")]
   Read {
      file:     Arc<str>,
      position: Position,
      cause:    String,
   },

   /// Raised by user code through `error` and `errorf`.
   #[error("{0}")]
   Message(Arc<str>),

   #[error("{}", aggregate(.0))]
   Aggregate(Vec<Error>),

   #[error(transparent)]
   Host(#[from] bass_error::Error),
}

fn missing_fields(missing: &[Symbol]) -> String {
   if missing.is_empty() {
      return String::new();
   }

   let mut suffix = String::from(" (missing");
   for field in missing {
      let _ = write!(suffix, " {field}");
   }
   suffix.push(')');

   suffix
}

fn if_variadic(variadic: &bool, yes: &'static str, no: &'static str) -> &'static str {
   if *variadic { yes } else { no }
}

fn plural(need: &usize, variadic: &bool) -> &'static str {
   if *need == 1 && !*variadic { "" } else { "s" }
}

fn aggregate(errors: &[Error]) -> String {
   match errors {
      [single] => single.to_string(),
      errors => {
         let mut message = format!("{count} errors occurred:", count = errors.len());
         for error in errors {
            let _ = write!(message, "\n\t* {error}");
         }
         message
      },
   }
}

impl Error {
   /// A decode failure with no further detail.
   #[must_use]
   pub fn decode(src: &Value, dst: &'static str) -> Self {
      Self::Decode {
         src: src.clone(),
         dst,
         missing: Vec::new(),
      }
   }

   #[must_use]
   pub fn bad_syntax(reason: impl Into<String>) -> Self {
      into!(reason);
      Self::BadSyntax { reason }
   }

   #[must_use]
   pub fn message(message: impl Into<Arc<str>>) -> Self {
      Self::Message(message.into())
   }

   /// Collapses a list of errors into one, or nothing if there are none.
   #[must_use]
   pub fn collect(mut errors: Vec<Self>) -> Option<Self> {
      match errors.len() {
         0 => None,
         1 => errors.pop(),
         _ => Some(Self::Aggregate(errors)),
      }
   }

   /// Whether this is, or aggregates, an interruption.
   #[must_use]
   pub fn is_interrupted(&self) -> bool {
      match *self {
         Self::Interrupted => true,
         Self::Aggregate(ref errors) => errors.iter().any(Self::is_interrupted),
         _ => false,
      }
   }
}

impl From<serde_json::Error> for Error {
   fn from(error: serde_json::Error) -> Self {
      Self::Host(bass_error::Error::new(error))
   }
}

impl From<std::io::Error> for Error {
   fn from(error: std::io::Error) -> Self {
      Self::Host(bass_error::Error::new(error))
   }
}
