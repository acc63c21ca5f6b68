use std::{
   collections::BTreeMap,
   sync::Arc,
};

use bytes::Bytes;

use super::define;
use crate::{
   Args,
   Builtin,
   Error,
   FileOrDir,
   FilePath,
   FsPath,
   Result,
   Scope,
   Secret,
   Symbol,
   Thunk,
   ThunkAddr,
   Value,
   thunk::{
      MountSource,
      ThunkCmd,
      ThunkDir,
      ThunkImage,
   },
};

/// Defines a builtin that returns a modified copy of its first argument.
fn builder(
   ground: &Scope,
   name: &'static str,
   formals: &str,
   build: impl Fn(&Thunk, &Args) -> Result<Thunk> + Send + Sync + 'static,
   doc: &[&str],
) {
   define(
      ground,
      name,
      Builtin::func(name, formals, move |_, args| {
         let thunk = args.get::<Arc<Thunk>>(0)?;
         Ok(Value::from(build(&thunk, args)?))
      }),
      doc,
   );
}

/// Alternating file paths and contents, keyed by their cleaned paths.
fn filesystem(pairs: &[Value]) -> Result<BTreeMap<String, Bytes>> {
   if pairs.len() % 2 != 0 {
      return Err(Error::bad_syntax(format!(
         "(mkfs) odd pairing: {count} values",
         count = pairs.len()
      )));
   }

   pairs
      .chunks_exact(2)
      .map(|pair| {
         let file = pair[0].decode::<FilePath>()?;
         let content = pair[1].decode::<String>()?;
         Ok((file.path().to_owned(), Bytes::from(content)))
      })
      .collect()
}

pub(super) fn register(ground: &Scope) {
   builder(
      ground,
      "with-image",
      "[thunk image]",
      |thunk, args| Ok(thunk.with_image(args.get::<ThunkImage>(1)?)),
      &[
         "returns thunk with the base image set to image",
         "Image is either a thunk? or an image ref. Recurses when thunk's image is another thunk, setting the \
          deepest ref or unset image.",
         "=> (with-image ($ go test ./...) (linux/golang))",
      ],
   );

   builder(
      ground,
      "with-dir",
      "[thunk dir]",
      |thunk, args| Ok(thunk.with_dir(args.get::<ThunkDir>(1)?)),
      &["returns thunk with the working directory set to dir", "=> (with-dir (.tests) ./src/)"],
   );

   builder(
      ground,
      "with-args",
      "[thunk args]",
      |thunk, args| Ok(thunk.with_args(args.get::<Vec<Value>>(1)?)),
      &["returns thunk with args set to args", "=> (with-args (.go) [\"test\" \"./...\"])"],
   );

   builder(
      ground,
      "with-stdin",
      "[thunk vals]",
      |thunk, args| Ok(thunk.with_stdin(args.get::<Vec<Value>>(1)?)),
      &["returns thunk with stdin set to vals", "=> (with-stdin ($ jq \".a\") [{:a 1} {:a 2}])"],
   );

   builder(
      ground,
      "with-env",
      "[thunk env]",
      |thunk, args| Ok(thunk.with_env(args.get::<Scope>(1)?)),
      &["returns thunk with env set to the given env", "=> (with-env ($ jq \".a\") {:SECRET \"shh\"})"],
   );

   builder(
      ground,
      "with-insecure",
      "[thunk bool]",
      |thunk, args| Ok(thunk.with_insecure(args.get::<bool>(1)?)),
      &[
         "returns thunk with the insecure flag set to bool",
         "The insecure flag determines whether the thunk runs with elevated privileges.",
         "=> (with-insecure (.boom) true)",
      ],
   );

   builder(
      ground,
      "with-label",
      "[thunk name val]",
      |thunk, args| Ok(thunk.with_label(args.get::<Symbol>(1)?.as_str(), args.get::<Value>(2)?)),
      &[
         "returns thunk with the label set to val",
         "Labels are typically used to control caching. Two thunks that differ only in labels will evaluate \
          separately and produce independent results.",
         "=> (with-label ($ sleep 10) :at (now 10))",
      ],
   );

   builder(
      ground,
      "with-mount",
      "[thunk source target]",
      |thunk, args| Ok(thunk.with_mount(args.get::<MountSource>(1)?, args.get::<FileOrDir>(2)?)),
      &[
         "returns thunk with a mount from source to the target path",
         "=> (with-mount ($ find ./inputs/) *dir*/inputs/ ./inputs/)",
      ],
   );

   builder(
      ground,
      "with-port",
      "[thunk name port]",
      |thunk, args| Ok(thunk.with_port(args.get::<Symbol>(1)?.as_str(), args.get::<i64>(2)?)),
      &["returns thunk with a named port exposed", "=> (with-port (.http-server) :http 8080)"],
   );

   builder(
      ground,
      "with-tls",
      "[thunk cert key]",
      |thunk, args| Ok(thunk.with_tls(args.get::<FilePath>(1)?, args.get::<FilePath>(2)?)),
      &[
         "returns thunk with paths where its TLS certificate and key should be written",
         "=> (with-tls (.server) ./ca.crt ./ca.key)",
      ],
   );

   builder(
      ground,
      "with-cmd",
      "[thunk cmd]",
      |thunk, args| Ok(thunk.with_cmd(args.get::<ThunkCmd>(1)?)),
      &["returns thunk with cmd set to the given command", "=> (with-cmd (.foo) .bar)"],
   );

   builder(
      ground,
      "wrap-cmd",
      "[thunk cmd & prepend-args]",
      |thunk, args| {
         let wrapped = thunk.wrap_cmd(args.get::<ThunkCmd>(1)?);

         let mut prepended = args.rest(2).to_vec();
         prepended.extend(wrapped.args.iter().cloned());

         Ok(wrapped.with_args(prepended))
      },
      &[
         "prepend a command and args to a thunk's command",
         "Replaces the thunk's command and sets its args to prepend-args followed by the original command and \
          args.",
         "=> (wrap-cmd ($ go test \"./...\") .strace \"-f\")",
      ],
   );

   define(
      ground,
      "thunk-cmd",
      Builtin::func("thunk-cmd", "[thunk]", |_, args| Ok(args.get::<Arc<Thunk>>(0)?.cmd.to_value())),
      &["returns the thunk's command", "=> (thunk-cmd (.foo))"],
   );

   define(
      ground,
      "thunk-args",
      Builtin::func("thunk-args", "[thunk]", |_, args| {
         Ok(Value::list(args.get::<Arc<Thunk>>(0)?.args.iter().cloned()))
      }),
      &["returns the thunk's args", "=> (thunk-args ($ foo \"bar\" baz))"],
   );

   define(
      ground,
      "thunk-name",
      Builtin::func("thunk-name", "[thunk]", |_, args| Ok(Value::string(args.get::<Arc<Thunk>>(0)?.name()))),
      &[
         "returns the name of the thunk",
         "The name is derived from a hash of the thunk, so equal thunks have equal names.",
         "=> (thunk-name (.foo))",
      ],
   );

   define(
      ground,
      "addr",
      Builtin::func("addr", "[thunk port fmt]", |_, args| {
         Ok(Value::ThunkAddr(Arc::new(ThunkAddr {
            thunk:  args.get::<Arc<Thunk>>(0)?,
            port:   args.get::<Symbol>(1)?.as_str().to_owned(),
            format: args.get::<String>(2)?,
         })))
      }),
      &[
         "returns an address of a port exposed by the thunk",
         "The format is rendered once the thunk is running, substituting $host and $port.",
         "=> (addr (.http-server) :http \"http://$host:$port\")",
      ],
   );

   define(
      ground,
      "mask",
      Builtin::func("mask", "[secret name]", |_, args| {
         let secret = args.get::<String>(0)?;
         let name = args.get::<Symbol>(1)?;

         Ok(Value::Secret(Secret::new(name.as_str(), Bytes::from(secret))))
      }),
      &[
         "shrouds a string in secrecy",
         "Prevents the string from being revealed when the value is displayed, and prevents it from being \
          stored in a thunk's canonical form.",
         "=> (mask \"super secret\" :github-token)",
      ],
   );

   define(
      ground,
      "mkfs",
      Builtin::func("mkfs", "file-content-kv", |_, args| {
         let files = filesystem(args.rest(0))?;
         Ok(Value::FsPath(Arc::new(FsPath::new(files))))
      }),
      &[
         "returns a dir path backed by an in-memory filesystem",
         "Takes alternating file paths and their content, which must be a text string.",
         "=> (mkfs ./file \"hello\" ./sub/file \"hello from sub\")",
      ],
   );
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      CommandPath,
      ground::test::{
         call,
         list,
         run,
         run_in,
      },
      thunk::ThunkPort,
   };

   fn command(name: &str) -> Value {
      Value::Command(CommandPath::new(name))
   }

   fn with_thunk(name: &str) -> (Scope, Thunk) {
      let thunk = Thunk::new(ThunkCmd::Command(CommandPath::new(name))).with_args(vec![Value::string("arg")]);

      let scope = Scope::standard();
      scope.set("thunk", Value::from(thunk.clone()));

      (scope, thunk)
   }

   async fn built(scope: &Scope, name: &str, args: impl IntoIterator<Item = Value>) -> Thunk {
      let form = call(name, std::iter::once(Value::symbol("thunk")).chain(args));

      match run_in(scope, &form).await.unwrap() {
         Value::Thunk(thunk) => (*thunk).clone(),
         other => panic!("{name} returned {other}"),
      }
   }

   #[tokio::test]
   async fn builders_copy() {
      let (scope, original) = with_thunk("echo");

      let stdin = built(&scope, "with-stdin", [list([Value::Int(1)])]).await;
      assert_eq!(stdin.stdin, [Value::Int(1)]);

      let insecure = built(&scope, "with-insecure", [Value::Bool(true)]).await;
      assert!(insecure.insecure);

      let labeled = built(&scope, "with-label", [Value::keyword("at"), Value::Int(10)]).await;
      assert_eq!(labeled.labels.unwrap().get(&Symbol::new("at")), Some(Value::Int(10)));

      let ported = built(&scope, "with-port", [Value::keyword("http"), Value::Int(8080)]).await;
      assert_eq!(ported.ports, [ThunkPort {
         name: "http".to_owned(),
         port: 8080,
      }]);

      let dir = built(&scope, "with-dir", [Value::Dir(crate::DirPath::new("src"))]).await;
      assert_eq!(dir.dir, Some(ThunkDir::Dir(crate::DirPath::new("src"))));

      // The thunk in scope is untouched.
      let Some(Value::Thunk(current)) = scope.get(&Symbol::new("thunk")) else {
         panic!("thunk went missing");
      };
      assert_eq!(*current, original);
      assert_ne!(stdin.name(), original.name());
   }

   #[tokio::test]
   async fn commands_and_args() {
      let (scope, original) = with_thunk("go");

      let replaced = built(&scope, "with-cmd", [command("gotestsum")]).await;
      assert_eq!(replaced.cmd, ThunkCmd::Command(CommandPath::new("gotestsum")));
      assert_eq!(replaced.args, original.args);

      let wrapped = built(&scope, "wrap-cmd", [command("strace"), Value::string("-f")]).await;
      assert_eq!(wrapped.cmd, ThunkCmd::Command(CommandPath::new("strace")));
      assert_eq!(wrapped.args, [Value::string("-f"), command("go"), Value::string("arg")]);

      let cmd = run_in(&scope, &call("thunk-cmd", [Value::symbol("thunk")])).await.unwrap();
      assert_eq!(cmd, command("go"));

      let args = run_in(&scope, &call("thunk-args", [Value::symbol("thunk")])).await.unwrap();
      assert_eq!(args, Value::list([Value::string("arg")]));

      let name = run_in(&scope, &call("thunk-name", [Value::symbol("thunk")])).await.unwrap();
      assert_eq!(name, Value::string(original.name()));
   }

   #[tokio::test]
   async fn addresses() {
      let (scope, original) = with_thunk("server");

      let form = call("addr", [
         Value::symbol("thunk"),
         Value::keyword("http"),
         Value::string("http://$host:$port"),
      ]);
      let Value::ThunkAddr(addr) = run_in(&scope, &form).await.unwrap() else {
         panic!("expected an address");
      };

      assert_eq!(*addr.thunk, original);
      assert_eq!(addr.port, "http");
      assert_eq!(addr.format, "http://$host:$port");
   }

   #[tokio::test]
   async fn masking_secrets() {
      let masked = run(&call("mask", [Value::string("shh"), Value::keyword("token")]))
         .await
         .unwrap();

      let Value::Secret(secret) = masked else {
         panic!("expected a secret");
      };
      assert_eq!(secret.name(), "token");
      assert_eq!(&secret.reveal().unwrap()[..], b"shh");
   }

   #[tokio::test]
   async fn in_memory_filesystems() {
      let form = call("mkfs", [
         Value::File(FilePath::new("./file")),
         Value::string("hello"),
         Value::File(FilePath::new("sub/file")),
         Value::string("from sub"),
      ]);

      let Value::FsPath(fs) = run(&form).await.unwrap() else {
         panic!("expected an fs path");
      };
      assert!(fs.path.is_dir());
      assert_eq!(fs.files.keys().collect::<Vec<_>>(), ["file", "sub/file"]);

      let again = run(&form).await.unwrap();
      assert_eq!(again, Value::FsPath(fs));

      let odd = call("mkfs", [Value::File(FilePath::new("file"))]);
      assert!(matches!(run(&odd).await, Err(Error::BadSyntax { .. })));
   }
}
