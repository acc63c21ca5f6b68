//! Rendering errors along with the call trace that led to them.

use std::fmt::{
   self,
   Write as _,
};

use yansi::Paint as _;

use crate::{
   Error,
   EvalCtx,
   Frame,
   Result,
};

/// The file name the prelude is read as. Frames from it are elided.
pub const PRELUDE_FILE: &str = "root.bass";

/// Expressions longer than this are truncated.
const EXPR_LEN: usize = 40;

fn truncate(expr: &str) -> String {
   if expr.chars().count() <= EXPR_LEN {
      return expr.to_owned();
   }

   let mut truncated = expr.chars().take(EXPR_LEN - 3).collect::<String>();
   truncated.push_str("...");
   truncated
}

/// Writes frames oldest first, numbered so that `1.` is the most recent.
/// Consecutive prelude frames collapse into a single line.
pub fn write_trace(writer: &mut dyn fmt::Write, frames: &[Frame]) -> fmt::Result {
   writeln!(writer, "{error} call trace (oldest first):", error = "error!".yellow())?;
   writeln!(writer)?;

   let mut elided = 0_usize;

   for (index, frame) in frames.iter().enumerate() {
      if &*frame.range.file == PRELUDE_FILE {
         elided += 1;
         continue;
      }

      let number = frames.len() - index;

      if elided > 0 {
         let calls = if elided == 1 { "call" } else { "calls" };
         let line = format!("{number:>3}. ({elided} internal {calls} elided)", number = number + 1);
         writeln!(writer, "{line}", line = line.dim())?;
         elided = 0;
      }

      let prefix = format!(
         "{number:>3}. {file}:{line}",
         file = frame.range.file,
         line = frame.range.start.line,
      );

      if let Some(ref comment) = frame.comment {
         for line in comment.lines() {
            let line = format!("{prefix}\t; {line}");
            writeln!(writer, "{line}", line = line.dim())?;
         }
      }

      writeln!(writer, "{prefix}\t{expr}", expr = truncate(&frame.value.to_string()))?;
   }

   Ok(())
}

/// Writes an error to the context's stderr, preceded by the trace of the
/// evaluation that raised it. The trace is reset afterwards.
///
/// Interruptions are reported without a trace.
pub fn write_error(ctx: &EvalCtx, error: &Error) -> Result<()> {
   let mut report = String::new();

   if let Some(trace) = ctx.trace()
      && !trace.is_empty()
      && !error.is_interrupted()
   {
      write_trace(&mut report, &trace.frames()).map_err(|_| Error::message("failed to render trace"))?;
      trace.reset();
      report.push('\n');
   }

   let message = error.to_string();
   writeln!(report, "{message}", message = message.red()).map_err(|_| Error::message("failed to render error"))?;

   ctx.stderr().write_str(&report)
}
