use crate::{
   Scope,
   Value,
};

/// A user-defined combiner that receives its arguments unevaluated, along
/// with the caller's scope bound to `eformal`.
#[derive(Debug, Clone)]
pub struct Operative {
   pub formals: Value,
   pub eformal: Value,
   pub body:    Value,
   pub scope:   Scope,
}

/// A combiner that evaluates its arguments before passing them to the
/// underlying combiner.
#[derive(Debug, Clone)]
pub struct Applicative {
   pub underlying: Value,
}

impl Value {
   #[must_use]
   pub fn wrap(underlying: Value) -> Self {
      Self::Applicative(std::sync::Arc::new(Applicative { underlying }))
   }

   /// Whether calling this value does something other than fail.
   #[must_use]
   pub fn is_combiner(&self) -> bool {
      matches!(
         *self.unannotated(),
         Self::Operative(_)
            | Self::Applicative(_)
            | Self::Builtin(_)
            | Self::Symbol(_)
            | Self::Keyword(_)
            | Self::Thunk(_)
            | Self::Dir(_)
            | Self::File(_)
            | Self::Command(_)
            | Self::HostPath(_)
            | Self::FsPath(_)
            | Self::CachePath(_)
            | Self::ThunkPath(_)
            | Self::Error(_)
      )
   }

   #[must_use]
   pub fn is_applicative(&self) -> bool {
      matches!(*self.unannotated(), Self::Applicative(_))
   }

   #[must_use]
   pub fn is_operative(&self) -> bool {
      matches!(*self.unannotated(), Self::Operative(_) | Self::Builtin(_))
   }
}
