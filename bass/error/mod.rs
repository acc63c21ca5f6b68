//! Error handling utilities.
//!
//! Host failures (IO, encoding, configuration) are carried as a chain of
//! contexts on top of [`anyhow::Error`], shared behind an [`Arc`] so they can
//! be cloned into first-class error values.

use std::{
   error,
   fmt::{
      self,
      Write as _,
   },
   io::{
      self,
      Write as _,
   },
   process,
   result,
   sync::Arc,
};

use derive_more::Deref;
use yansi::Paint as _;

#[doc(hidden)]
pub mod private {
   pub use anyhow;
}

/// A type alias for concise use of [`Error`].
pub type Result<T> = result::Result<T, Error>;

/// The error type. Stores an error chain that can be appended to with
/// [`Contextful`]. Can be formatted to show the chain with [`fmt::Debug`].
#[derive(Clone, Deref)]
pub struct Error(#[doc(hidden)] pub Arc<anyhow::Error>);

impl fmt::Display for Error {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Display::fmt(&*self.0, writer)
   }
}

impl error::Error for Error {
   fn source(&self) -> Option<&(dyn error::Error + 'static)> {
      self.0.source()
   }
}

impl fmt::Debug for Error {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut chain = self.0.chain().rev().peekable();

      while let Some(error) = chain.next() {
         let header = if chain.peek().is_none() {
            "error:"
         } else {
            "cause:"
         };

         let mut message = String::new();
         write!(message, "{error}")?;

         writeln!(
            writer,
            "{header} {message}",
            header = header.red().bold(),
            message = lowercase_first(&message),
         )?;
      }

      Ok(())
   }
}

impl Error {
   /// Creates an [`Error`] from any standard error.
   #[must_use]
   pub fn new(error: impl error::Error + Send + Sync + 'static) -> Self {
      Self(Arc::new(anyhow::Error::new(error)))
   }

   /// Returns the messages of the chain, outermost context first.
   pub fn messages(&self) -> impl Iterator<Item = String> + '_ {
      self.0.chain().map(ToString::to_string)
   }

   /// Attempts to downcast the root cause of the chain.
   #[must_use]
   pub fn root_cause<E: error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
      self.0.root_cause().downcast_ref::<E>()
   }
}

fn lowercase_first(message: &str) -> String {
   let mut chars = message.char_indices();

   if let Some((_, first)) = chars.next()
      && let Some((second_start, second)) = chars.next()
      && second.is_lowercase()
   {
      format!(
         "{first_lowercase}{rest}",
         first_lowercase = first.to_lowercase(),
         rest = &message[second_start..],
      )
   } else {
      message.to_owned()
   }
}

/// The termination type. Meant to be used as the return type of the main
/// function.
///
/// Can be created directly or from an [`Error`] with [`From`]. Will pretty
/// print the error.
#[derive(Clone)]
pub struct Termination(Option<Error>);

impl From<Error> for Termination {
   fn from(error: Error) -> Self {
      Self::error(error)
   }
}

impl<T> From<Result<T>> for Termination {
   fn from(result: Result<T>) -> Self {
      match result {
         Ok(_) => Self::success(),
         Err(error) => Self::error(error),
      }
   }
}

impl process::Termination for Termination {
   fn report(self) -> process::ExitCode {
      match self.0 {
         None => process::ExitCode::SUCCESS,

         Some(error) => {
            let _ = write!(io::stderr(), "{error:?}");
            process::ExitCode::FAILURE
         },
      }
   }
}

impl Termination {
   /// Creates a [`Termination`] from the provided [`Error`].
   #[must_use]
   pub fn error(error: Error) -> Self {
      Self(Some(error))
   }

   /// Creates a successful [`Termination`] that returns success.
   #[must_use]
   pub fn success() -> Self {
      Self(None)
   }
}

/// Creates an [`Error`] from the provided format arguments.
///
/// # Example
///
/// ```rs
/// read_lockfile().map_err(|error| error!("lockfile is unreadable: {error}"))
/// ```
#[macro_export]
macro_rules! error {
   ($($t:tt)*) => {
      $crate::Error(std::sync::Arc::new($crate::private::anyhow::anyhow!($($t)*)))
   };
}

/// A macro that boils down to:
///
/// ```rs
/// return Err(error!(arguments).into());
/// ```
#[macro_export]
macro_rules! bail {
   ($($t:tt)*) => {
      return Err($crate::error!($($t)*).into())
   };
}

/// The type of the context accepted by [`Contextful`].
pub trait Context: fmt::Display + Send + Sync + 'static {}

impl<T: fmt::Display + Send + Sync + 'static> Context for T {}

/// A trait to add context to [`Error`].
pub trait Contextful<T> {
   /// Appends the context to the error chain.
   fn context(self, context: impl Context) -> Result<T>;

   /// Appends the context to the error chain, lazily.
   fn with_context<C: Context>(self, context: impl FnOnce() -> C) -> Result<T>;
}

impl<T> Contextful<T> for Option<T> {
   fn context(self, context: impl Context) -> Result<T> {
      anyhow::Context::context(self, context).map_err(|error| Error(Arc::new(error)))
   }

   fn with_context<C: Context>(self, context: impl FnOnce() -> C) -> Result<T> {
      anyhow::Context::with_context(self, context).map_err(|error| Error(Arc::new(error)))
   }
}

impl<T, E: error::Error + Send + Sync + 'static> Contextful<T> for result::Result<T, E> {
   fn context(self, context: impl Context) -> Result<T> {
      anyhow::Context::context(self, context).map_err(|error| Error(Arc::new(error)))
   }

   fn with_context<C: Context>(self, context: impl FnOnce() -> C) -> Result<T> {
      anyhow::Context::with_context(self, context).map_err(|error| Error(Arc::new(error)))
   }
}

#[cfg(test)]
mod tests {
   use std::io;

   use super::*;

   #[test]
   fn context_chain() {
      yansi::disable();

      let result: result::Result<(), io::Error> =
         Err(io::Error::new(io::ErrorKind::NotFound, "No such file"));

      let error = result.context("failed to open lockfile").unwrap_err();

      assert_eq!(error.messages().collect::<Vec<_>>(), [
         "failed to open lockfile",
         "No such file",
      ]);

      assert_eq!(
         format!("{error:?}"),
         "cause: no such file\nerror: failed to open lockfile\n",
      );

      assert!(error.root_cause::<io::Error>().is_some());
   }

   #[test]
   fn bail_returns() {
      fn fails(count: usize) -> Result<()> {
         if count > 1 {
            bail!("too many: {count}");
         }

         Ok(())
      }

      assert!(fails(0).is_ok());
      assert_eq!(fails(2).unwrap_err().to_string(), "too many: 2");
   }

   #[test]
   fn option_context() {
      let missing: Option<u8> = None;

      let error = missing.with_context(|| "no runtime configured").unwrap_err();
      assert_eq!(error.to_string(), "no runtime configured");
   }
}
