//! The Bass evaluator: values, scopes, continuation-passing evaluation, and
//! the ground scope of builtins, along with the interfaces to the container
//! runtimes that run thunks.

mod bind;
mod json;

mod error;
pub use error::{
   Error,
   Result,
};

pub mod value;
pub use value::{
   Annotate,
   Annotated,
   Applicative,
   CachePath,
   CommandPath,
   DirPath,
   ExtendPath,
   FileOrDir,
   FilePath,
   FsPath,
   HostPath,
   Operative,
   Pair,
   Position,
   Range,
   Secret,
   Symbol,
   Thunk,
   ThunkAddr,
   ThunkPath,
   Value,
   thunk,
};

mod scope;
pub use scope::Scope;

pub mod decode;
pub use decode::{
   Bindable,
   Combiner,
   FromValue,
   Readable,
};

pub mod hash;

mod trace;
pub use trace::{
   Frame,
   SharedTrace,
   TRACE_SIZE,
   Trace,
};

mod cont;
pub use cont::{
   Cont,
   Step,
   trampoline,
};

mod builtin;
pub use builtin::{
   Args,
   Builtin,
   Call,
   Formals,
};

mod eval;
pub use eval::{
   eval,
   eval_all,
};

mod context;
pub use context::{
   Capture,
   EvalCtx,
   Output,
};

mod custodian;
pub use custodian::Custodian;

mod runs;
pub use runs::Runs;

pub mod runtime;
pub use runtime::{
   Runtime,
   RuntimePool,
   StaticPool,
};

mod command;
pub use command::{
   Command,
   CommandMount,
   Starter,
};

pub mod pipe;
pub use pipe::{
   Sink,
   Source,
};

pub mod memo;
pub use memo::Memos;

pub mod config;
pub use config::{
   Config,
   cache_home,
};

mod report;
pub use report::{
   PRELUDE_FILE,
   write_error,
   write_trace,
};

mod ground;
pub use ground::predicates;
