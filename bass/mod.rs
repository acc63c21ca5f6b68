//! Bass scripts: reading, evaluating, and the pieces they are made of.

use std::{
   path::Path,
   sync::Arc,
};

pub use bass_error as error;
use bass_error::Contextful as _;
pub use bass_runtime as runtime;
pub use bass_syntax as syntax;
use runtime::{
   EvalCtx,
   FileOrDir,
   HostPath,
   Result,
   Scope,
   Value,
};
use tokio::fs;

/// Reads a source and evaluates its forms in order, returning the value of
/// the last one.
pub async fn eval_source(ctx: &EvalCtx, scope: &Scope, file: &str, source: &str) -> Result<Value> {
   let forms = syntax::read(file, source)?;

   tracing::debug!(file, forms = forms.len(), "evaluating");

   runtime::eval_all(ctx, scope, &forms).await
}

/// Reads and evaluates a script, with `*dir*` bound in the scope to the
/// directory the script lives in.
pub async fn eval_file(ctx: &EvalCtx, scope: &Scope, path: &Path) -> Result<Value> {
   let source = fs::read_to_string(path)
      .await
      .with_context(|| format!("failed to read '{path}'", path = path.display()))?;

   let dir = match path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
   };

   let dir = fs::canonicalize(dir)
      .await
      .with_context(|| format!("failed to resolve '{dir}'", dir = dir.display()))?;

   scope.set(
      "*dir*",
      Value::HostPath(Arc::new(HostPath::new(&dir.to_string_lossy(), FileOrDir::root()))),
   );

   eval_source(ctx, scope, &path.display().to_string(), source.as_str()).await
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::runtime::{
      Capture,
      Error,
      Output,
      PRELUDE_FILE,
      Symbol,
   };

   async fn eval(scope: &Scope, source: &str) -> Result<Value> {
      eval_source(&EvalCtx::new(), scope, "test.bass", source).await
   }

   fn get(scope: &Scope, name: &str) -> Option<Value> {
      scope.get(&Symbol::new(name))
   }

   #[tokio::test]
   async fn destructuring_lists() {
      let scope = Scope::standard();

      eval(&scope, "(def [a b c] [1 2 3])").await.unwrap();
      assert_eq!(get(&scope, "a"), Some(Value::Int(1)));
      assert_eq!(get(&scope, "b"), Some(Value::Int(2)));
      assert_eq!(get(&scope, "c"), Some(Value::Int(3)));

      let result = eval(&scope, "(def [a b c] [1 2])").await;
      let Err(Error::BindMismatch { need, have }) = result else {
         panic!("expected a bind mismatch, got {result:?}");
      };
      assert_eq!(need, Value::cons_list([Value::symbol("c")]));
      assert_eq!(have, Value::Empty);
   }

   #[tokio::test]
   async fn pair_tails() {
      let scope = Scope::standard();

      eval(&scope, "(def (a & d) [1 2 3])").await.unwrap();
      assert_eq!(get(&scope, "a"), Some(Value::Int(1)));
      assert_eq!(get(&scope, "d"), Some(Value::list([Value::Int(2), Value::Int(3)])));
   }

   #[tokio::test]
   async fn scope_binder_defaults() {
      let scope = Scope::standard();

      eval(&scope, "(def default-sym \"hi\")\n(def {[:foo default-sym] x} {})")
         .await
         .unwrap();
      assert_eq!(get(&scope, "x"), Some(Value::string("hi")));
   }

   #[tokio::test]
   async fn keyword_access() {
      let scope = Scope::standard();

      let result = eval(&scope, "(def s {:a {:b 42}})\ns:a:b").await.unwrap();
      assert_eq!(result, Value::Int(42));
   }

   #[tokio::test]
   async fn comments_document_definitions() {
      let scope = Scope::standard();

      eval(&scope, "; the answer\n;\n; to everything\n(def answer 42)")
         .await
         .unwrap();

      let meta = get(&scope, "answer").and_then(|answer| answer.meta()).unwrap();
      assert_eq!(
         meta.get(&Symbol::new("doc")),
         Some(Value::string("the answer\n\nto everything"))
      );
      assert_eq!(meta.get(&Symbol::new("line")), Some(Value::Int(4)));
   }

   #[tokio::test]
   async fn prelude_frames_are_elided() {
      let stderr = Capture::default();
      let ctx = EvalCtx::new().with_stderr(Output::new(stderr.clone()));
      let scope = Scope::standard();

      eval_source(
         &ctx,
         &scope,
         PRELUDE_FILE,
         "(def apply1 (wrap (op [f] _ (f))))\n(def apply2 (wrap (op [f] _ (apply1 f))))\n(def apply3 \
          (wrap (op [f] _ (apply2 f))))",
      )
      .await
      .unwrap();

      let error = eval_source(
         &ctx,
         &scope,
         "script.bass",
         "(def boom (wrap (op [] _ (error \"boom\"))))\n(apply3 boom)",
      )
      .await
      .unwrap_err();

      runtime::write_error(&ctx, &error).unwrap();

      let report = stderr.contents();
      assert!(report.contains("(3 internal calls elided)"), "{report}");
      assert!(report.contains("script.bass:1"), "{report}");
      assert!(report.contains("boom"), "{report}");
   }

   #[tokio::test]
   async fn files_know_their_directory() {
      let dir = tempfile::tempdir().unwrap();
      std::fs::write(dir.path().join("data.txt"), "hello").unwrap();

      let script = dir.path().join("script.bass");
      std::fs::write(&script, "(def data *dir*/data.txt)\n(def nested *dir*/sub/)").unwrap();

      let scope = Scope::standard();
      eval_file(&EvalCtx::new(), &scope, &script).await.unwrap();

      let Some(Value::HostPath(data)) = get(&scope, "data") else {
         panic!("expected a host path");
      };
      assert_eq!(std::fs::read_to_string(data.host_path().unwrap()).unwrap(), "hello");

      assert!(matches!(get(&scope, "nested"), Some(Value::HostPath(_))));
   }

   #[tokio::test]
   async fn read_errors_carry_positions() {
      let error = eval(&Scope::standard(), "(def x\n  \"oops").await.unwrap_err();

      assert_eq!(error.to_string(), "test.bass:2:3: unterminated string");
   }

   #[tokio::test]
   async fn missing_files() {
      let dir = tempfile::tempdir().unwrap();

      let result = eval_file(&EvalCtx::new(), &Scope::standard(), &dir.path().join("nope.bass")).await;
      assert!(matches!(result, Err(Error::Host(_))));
   }
}
