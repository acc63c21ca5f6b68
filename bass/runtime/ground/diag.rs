use bass_error::Contextful as _;
use chrono::{
   DateTime,
   SecondsFormat,
   Utc,
};

use super::define;
use crate::{
   Builtin,
   Error,
   Result,
   Scope,
   Value,
};

/// Strings render as their contents, everything else as it prints.
fn plain(value: &Value) -> String {
   match *value.unannotated() {
      Value::String(ref string) => string.to_string(),
      ref other => other.to_string(),
   }
}

/// Formats `args` into `format`, supporting the `%s`, `%v`, `%d`, `%q` and
/// `%%` verbs. Missing arguments render as `%!s(MISSING)`.
fn sprintf(format: &str, args: &[Value]) -> String {
   let mut formatted = String::with_capacity(format.len());
   let mut args = args.iter();
   let mut chars = format.chars();

   while let Some(char) = chars.next() {
      if char != '%' {
         formatted.push(char);
         continue;
      }

      let Some(verb) = chars.next() else {
         formatted.push_str("%!(NOVERB)");
         break;
      };

      if verb == '%' {
         formatted.push('%');
         continue;
      }

      let Some(arg) = args.next() else {
         formatted.push_str(&format!("%!{verb}(MISSING)"));
         continue;
      };

      match verb {
         'q' => formatted.push_str(&Value::string(plain(arg)).to_string()),
         _ => formatted.push_str(&plain(arg)),
      }
   }

   formatted
}

/// The current time truncated to a multiple of `seconds` since the Unix
/// epoch, in RFC 3339 form.
fn now(seconds: i64) -> Result<String> {
   let now = Utc::now().timestamp();
   let truncated = if seconds > 0 { now - now.rem_euclid(seconds) } else { now };

   let time = DateTime::<Utc>::from_timestamp(truncated, 0).context("current time is out of range")?;
   Ok(time.to_rfc3339_opts(SecondsFormat::Secs, true))
}

pub(super) fn register(ground: &Scope) {
   define(
      ground,
      "dump",
      Builtin::func("dump", "[val]", |ctx, args| {
         let value = args.value(0)?;

         let dumped = match value.to_json() {
            Ok(json) => serde_json::to_string_pretty(&json)?,
            Err(_) => value.to_string(),
         };
         ctx.stderr().write_line(&dumped)?;

         Ok(value.clone())
      }),
      &[
         "encodes a value as JSON to stderr",
         "Returns the given value.",
         "=> (dump {:foo-bar \"baz\"})",
      ],
   );

   define(
      ground,
      "json",
      Builtin::func("json", "[val]", |_, args| {
         let json = args.value(0)?.to_json()?;
         Ok(Value::string(serde_json::to_string(&json)?))
      }),
      &["returns a string containing val encoded as JSON", "=> (json {:foo-bar \"baz\"})"],
   );

   define(
      ground,
      "log",
      Builtin::func("log", "[val]", |_, args| {
         let value = args.value(0)?;
         tracing::info!("{message}", message = plain(value));
         Ok(value.clone())
      }),
      &[
         "logs a string message or arbitrary value to stderr",
         "Returns the given value.",
         "=> (log \"hello, world!\")",
      ],
   );

   define(
      ground,
      "logf",
      Builtin::func("logf", "[fmt & args]", |_, args| {
         let message = sprintf(&args.get::<String>(0)?, args.rest(1));
         tracing::info!("{message}");
         Ok(Value::Null)
      }),
      &[
         "logs a message formatted with the given values",
         "=> (logf \"%d days until 2022\" 0)",
      ],
   );

   define(
      ground,
      "error",
      Builtin::func("error", "[msg]", |_, args| Err(Error::message(args.get::<String>(0)?))),
      &["errors with the given message", "=> (error \"oh no!\")"],
   );

   define(
      ground,
      "errorf",
      Builtin::func("errorf", "[fmt & args]", |_, args| {
         Err(Error::message(sprintf(&args.get::<String>(0)?, args.rest(1))))
      }),
      &[
         "errors with a message formatted with the given values",
         "=> (errorf \"uh oh: %s\" \"it broke\")",
      ],
   );

   define(
      ground,
      "now",
      Builtin::func("now", "[seconds]", |_, args| Ok(Value::string(now(args.get::<i64>(0)?)?))),
      &[
         "returns the current UTC time truncated to the given seconds",
         "Typically used to influence caching for thunks whose result may change over time.",
         "=> (now 60)",
      ],
   );
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      Capture,
      EvalCtx,
      Output,
      eval,
      ground::test::{
         call,
         run,
      },
   };

   #[test]
   fn formatting() {
      let args = [Value::string("world"), Value::Int(42), Value::keyword("sym")];

      assert_eq!(sprintf("hello, %s! %d %v", &args), "hello, world! 42 :sym");
      assert_eq!(sprintf("%q", &args), "\"world\"");
      assert_eq!(sprintf("100%%", &[]), "100%");
      assert_eq!(sprintf("%s and %s", &args[..1]), "world and %!s(MISSING)");
   }

   #[test]
   fn truncated_time() {
      let rendered = now(60).unwrap();
      let parsed = DateTime::parse_from_rfc3339(&rendered).unwrap();

      assert!(rendered.ends_with('Z'), "{rendered}");
      assert_eq!(parsed.timestamp() % 60, 0);
   }

   #[tokio::test]
   async fn raising_errors() {
      let error = run(&call("error", [Value::string("oh no!")])).await.unwrap_err();
      assert_eq!(error.to_string(), "oh no!");

      let error = run(&call("errorf", [Value::string("uh oh: %s"), Value::string("it broke")]))
         .await
         .unwrap_err();
      assert_eq!(error.to_string(), "uh oh: it broke");
   }

   #[tokio::test]
   async fn encoding_json() {
      let scope = Scope::new();
      scope.set("foo-bar", Value::string("baz"));

      let json = run(&call("json", [Value::Scope(scope)])).await.unwrap();
      assert_eq!(json, Value::string(r#"{"foo_bar":"baz"}"#));
   }

   #[tokio::test]
   async fn dumping_returns_the_value() {
      let capture = Capture::default();
      let ctx = EvalCtx::new().with_stderr(Output::new(capture.clone()));

      let result = eval(&ctx, &Scope::standard(), &call("dump", [Value::Int(42)]))
         .await
         .unwrap();
      assert_eq!(result, Value::Int(42));
      assert_eq!(capture.contents(), "42\n");

      let result = eval(&ctx, &Scope::standard(), &call("log", [Value::string("hi")]))
         .await
         .unwrap();
      assert_eq!(result, Value::string("hi"));
   }
}
