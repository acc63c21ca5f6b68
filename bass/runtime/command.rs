//! Lowering thunks into the concrete commands a runtime executes.

use std::{
   collections::BTreeMap,
   sync::Arc,
};

use async_trait::async_trait;
use rustc_hash::FxHashSet;

use crate::{
   DirPath,
   Error,
   EvalCtx,
   FileOrDir,
   Result,
   Scope,
   Secret,
   Thunk,
   ThunkAddr,
   Value,
   thunk::{
      MountSource,
      ThunkMount,
   },
};

/// Starts services a command refers to through [`ThunkAddr`] values.
#[async_trait]
pub trait Starter: Send + Sync {
   /// Starts the thunk, waits for its ports, and returns the address info of
   /// each port by name.
   async fn start(&self, ctx: &EvalCtx, thunk: &Thunk) -> Result<BTreeMap<String, Scope>>;
}

/// Something to mount into the command's container.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMount {
   pub source: MountSource,
   pub target: String,
}

/// A thunk with every logical path resolved to where it lives in the
/// container, plus the mounts that put it there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
   /// The command followed by its arguments.
   pub args:       Vec<String>,
   /// Every stdin value, JSON-encoded one per line.
   pub stdin:      Vec<u8>,
   /// `NAME=value` pairs, sorted.
   pub env:        Vec<String>,
   pub dir:        Option<String>,
   pub mounts:     Vec<CommandMount>,
   /// Secrets to expose as environment variables without writing them into
   /// `env`.
   pub secret_env: Vec<(String, Secret)>,
   /// Thunks started to satisfy addresses.
   pub services:   Vec<Arc<Thunk>>,
}

impl Command {
   /// Resolves a thunk. Addresses of other thunks are only resolvable with a
   /// starter.
   #[tracing::instrument(level = "debug", skip_all, fields(thunk = %thunk.name()))]
   pub async fn new(ctx: &EvalCtx, starter: Option<&dyn Starter>, thunk: &Thunk) -> Result<Self> {
      let mut addrs = Vec::new();
      for value in thunk.args.iter().chain(&thunk.stdin) {
         collect_addrs(value, &mut addrs);
      }
      if let Some(ref env) = thunk.env {
         for (_, value) in env.bindings() {
            collect_addrs(&value, &mut addrs);
         }
      }

      let mut started = Vec::with_capacity(addrs.len());
      let mut services = Vec::new();
      for addr in addrs {
         let starter = starter.ok_or_else(|| {
            Error::Host(bass_error::error!("cannot resolve {addr} without a service starter"))
         })?;

         let ports = starter.start(ctx, &addr.thunk).await?;
         let info = ports.get(&addr.port).ok_or_else(|| {
            Error::Host(bass_error::error!(
               "no info for port '{port}' of {thunk}",
               port = addr.port,
               thunk = addr.thunk,
            ))
         })?;

         tracing::debug!(thunk = %addr.thunk.name(), port = %addr.port, "started service");

         started.push((addr.clone(), addr.render(info)));
         if !services.contains(&addr.thunk) {
            services.push(addr.thunk.clone());
         }
      }

      let mut command = Resolver {
         depth: 0,
         mounts: Vec::new(),
         mounted: FxHashSet::default(),
         addrs: &started,
      }
      .resolve(thunk)?;

      command.services = services;
      Ok(command)
   }
}

fn collect_addrs(value: &Value, addrs: &mut Vec<Arc<ThunkAddr>>) {
   match *value.unannotated() {
      Value::ThunkAddr(ref addr) => {
         if !addrs.contains(addr) {
            addrs.push(addr.clone());
         }
      },

      Value::Pair(ref pair) | Value::Cons(ref pair) => {
         collect_addrs(&pair.a, addrs);
         collect_addrs(&pair.d, addrs);
      },

      Value::Scope(ref scope) => {
         for (_, value) in scope.bindings() {
            collect_addrs(&value, addrs);
         }
      },

      _ => {},
   }
}

struct Resolver<'a> {
   /// How many directories deep the working directory is.
   depth:   usize,
   mounts:  Vec<CommandMount>,
   mounted: FxHashSet<String>,
   addrs:   &'a [(Arc<ThunkAddr>, String)],
}

impl Resolver<'_> {
   fn resolve(mut self, thunk: &Thunk) -> Result<Command> {
      let mut command = Command::default();

      if let Some(ref dir) = thunk.dir {
         let cwd = self.value(&dir.to_value())?;
         self.depth = depth(&cwd);
         command.dir = Some(cwd);
      }

      command.args.push(self.string(&thunk.cmd.to_value())?);
      for (index, arg) in thunk.args.iter().enumerate() {
         let arg = self.string(arg).map_err(|error| {
            Error::Host(bass_error::error!("resolve arg {index}: {error}"))
         })?;
         command.args.push(arg);
      }

      if let Some(ref env) = thunk.env {
         for (name, value) in env.bindings() {
            match *value.unannotated() {
               // Tombstone.
               Value::Null => {},

               Value::Secret(ref secret) => {
                  secret.reveal()?;
                  command.secret_env.push((name.json_key(), secret.clone()));
               },

               _ => {
                  let resolved = self.string(&value).map_err(|error| {
                     Error::Host(bass_error::error!("resolve env {name}: {error}"))
                  })?;
                  command.env.push(format!("{name}={resolved}", name = name.json_key()));
               },
            }
         }

         command.env.sort();
      }

      for value in &thunk.stdin {
         let resolved = self.deep(value)?;
         serde_json::to_writer(&mut command.stdin, &resolved.to_json()?)?;
         command.stdin.push(b'\n');
      }

      command.mounts = self.mounts;
      command.mounts.extend(thunk.mounts.iter().map(|&ThunkMount { ref source, ref target }| {
         CommandMount {
            source: source.clone(),
            target: target.slash(),
         }
      }));

      Ok(command)
   }

   /// Resolves a value to a string. A list concatenates its resolved
   /// elements, as in `[--out= ./dir/]`.
   fn string(&mut self, value: &Value) -> Result<String> {
      match value.to_vec() {
         Some(values) if !matches!(*value.unannotated(), Value::Empty) => {
            values.iter().try_fold(String::new(), |mut concat, value| {
               concat.push_str(&self.value(value)?);
               Ok(concat)
            })
         },
         _ => self.value(value),
      }
   }

   fn value(&mut self, value: &Value) -> Result<String> {
      match *value.unannotated() {
         Value::String(ref string) => Ok(string.to_string()),
         Value::File(ref file) => Ok(file.slash()),
         Value::Dir(ref dir) => Ok(dir.slash()),
         Value::Command(ref command) => Ok(command.name().to_owned()),

         Value::ThunkPath(ref path) => {
            let target = DirPath::new(&path.thunk.hash()?).join(&path.path);
            Ok(self.mount(MountSource::ThunkPath(path.clone()), &target))
         },

         Value::HostPath(ref path) => {
            let target = DirPath::new(&path.hash()).join(&path.path);
            Ok(self.mount(MountSource::Host(path.clone()), &target))
         },

         Value::CachePath(ref path) => {
            let target = DirPath::new(&path.hash()).join(&path.path);
            Ok(self.mount(MountSource::Cache(path.clone()), &target))
         },

         Value::FsPath(ref path) => {
            let target = DirPath::new(&path.id).join(&path.path);
            Ok(self.mount(MountSource::Fs(path.clone()), &target))
         },

         Value::Secret(ref secret) => Ok(String::from_utf8_lossy(secret.reveal()?).into_owned()),

         Value::ThunkAddr(ref addr) => {
            self
               .addrs
               .iter()
               .find(|&&(ref started, _)| started == addr)
               .map(|&(_, ref rendered)| rendered.clone())
               .ok_or_else(|| Error::Host(bass_error::error!("address was not started: {addr}")))
         },

         _ => Err(Error::decode(value, "string")),
      }
   }

   /// Resolves every path nested in a value, for stdin.
   fn deep(&mut self, value: &Value) -> Result<Value> {
      match *value.unannotated() {
         Value::Pair(_) | Value::Cons(_) if value.is_list() => {
            let values = value.to_vec().unwrap_or_default();
            let resolved = values.iter().map(|value| self.deep(value)).collect::<Result<Vec<_>>>()?;
            Ok(Value::list(resolved))
         },

         Value::Scope(ref scope) => {
            let resolved = Scope::new();
            for (symbol, value) in scope.bindings() {
               resolved.set(symbol, self.deep(&value)?);
            }
            Ok(Value::Scope(resolved))
         },

         Value::File(_)
         | Value::Dir(_)
         | Value::Command(_)
         | Value::ThunkPath(_)
         | Value::HostPath(_)
         | Value::CachePath(_)
         | Value::FsPath(_)
         | Value::Secret(_)
         | Value::ThunkAddr(_) => Ok(Value::string(self.value(value)?)),

         _ => Ok(value.clone()),
      }
   }

   /// Records a mount unless its target is already mounted, and returns
   /// the target relative to the working directory.
   fn mount(&mut self, source: MountSource, target: &FileOrDir) -> String {
      let slash = target.slash();

      if self.mounted.insert(slash.clone()) {
         self.mounts.push(CommandMount {
            source,
            target: slash,
         });
      }

      self.relative(target)
   }

   fn relative(&self, target: &FileOrDir) -> String {
      if self.depth == 0 {
         return target.slash();
      }

      let mut relative = "../".repeat(self.depth);
      relative.push_str(target.path());
      if target.is_dir() {
         relative.push('/');
      }

      relative
   }
}

/// The number of directories a relative working directory descends into.
/// Absolute working directories are not rewritten against.
fn depth(cwd: &str) -> usize {
   if cwd.starts_with('/') {
      return 0;
   }

   cwd.split('/')
      .filter(|component| !component.is_empty() && *component != ".")
      .count()
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      CommandPath,
      FilePath,
      HostPath,
      ThunkPath,
      thunk::{
         ThunkCmd,
         ThunkDir,
      },
   };

   fn go() -> Thunk {
      Thunk::new(ThunkCmd::Command(CommandPath::new("go")))
   }

   async fn resolve(thunk: &Thunk) -> Result<Command> {
      Command::new(&EvalCtx::new(), None, thunk).await
   }

   #[tokio::test]
   async fn plain_commands() {
      let thunk = go()
         .with_args(vec![
            Value::string("build"),
            Value::File(FilePath::new("main.go")),
         ])
         .with_stdin(vec![Value::Int(1), Value::string("two")]);

      let command = resolve(&thunk).await.unwrap();
      assert_eq!(command.args, ["go", "build", "./main.go"]);
      assert_eq!(command.stdin, b"1\n\"two\"\n");
      assert_eq!(command.dir, None);
      assert!(command.mounts.is_empty());
   }

   #[tokio::test]
   async fn working_dirs_rewrite_mounted_paths() {
      let base = Arc::new(go().with_args(vec![Value::string("generate")]));
      let host = Arc::new(HostPath::new("/src/project", FileOrDir::parse("pkg/")));
      let dir = Arc::new(ThunkPath {
         thunk: base.clone(),
         path:  FileOrDir::parse("sub/"),
      });

      let thunk = go()
         .with_args(vec![Value::string("test"), Value::HostPath(host.clone())])
         .with_dir(ThunkDir::ThunkPath(dir.clone()));

      let command = resolve(&thunk).await.unwrap();
      let context = host.hash();
      let producer = base.hash().unwrap();

      assert_eq!(command.args, [
         "go".to_owned(),
         "test".to_owned(),
         format!("../../{context}/pkg/"),
      ]);
      assert_eq!(command.dir, Some(format!("./{producer}/sub/")));
      assert_eq!(command.mounts, [
         CommandMount {
            source: MountSource::ThunkPath(dir),
            target: format!("./{producer}/sub/"),
         },
         CommandMount {
            source: MountSource::Host(host),
            target: format!("./{context}/pkg/"),
         },
      ]);
   }

   #[tokio::test]
   async fn mounts_are_deduplicated() {
      let host = Arc::new(HostPath::new("/src", FileOrDir::parse("a")));
      let thunk = go().with_args(vec![
         Value::HostPath(host.clone()),
         Value::list([Value::string("--file="), Value::HostPath(host.clone())]),
      ]);

      let command = resolve(&thunk).await.unwrap();
      let target = format!("./{hash}/a", hash = host.hash());

      assert_eq!(command.args, ["go".to_owned(), target.clone(), format!("--file={target}")]);
      assert_eq!(command.mounts.len(), 1);
   }

   #[tokio::test]
   async fn env_is_sorted_and_secrets_kept_apart() {
      let env = Scope::new();
      env.set("ZED", Value::string("last"));
      env.set("go-flags", Value::string("-v"));
      env.set("removed", Value::Null);
      env.set("TOKEN", Value::Secret(Secret::new("token", "shh")));

      let command = resolve(&go().with_env(env)).await.unwrap();

      assert_eq!(command.env, ["ZED=last", "go_flags=-v"]);
      assert_eq!(command.secret_env.len(), 1);
      assert_eq!(command.secret_env[0].0, "TOKEN");
   }

   #[tokio::test]
   async fn decoded_secrets_do_not_resolve() {
      let thunk = go().with_args(vec![Value::Secret(Secret::new("token", "hunter2"))]);
      assert_eq!(resolve(&thunk).await.unwrap().args, ["go", "hunter2"]);

      let decoded = Value::from_json(&Value::Thunk(Arc::new(thunk)).to_json().unwrap()).unwrap();
      let Value::Thunk(decoded) = decoded else {
         panic!("expected a thunk, got {decoded}");
      };

      let error = resolve(&decoded).await.unwrap_err();
      assert!(error.to_string().contains("missing secret: token"), "{error}");

      let env = Scope::new();
      env.set("TOKEN", Value::Secret(Secret::redacted("token")));
      assert!(matches!(
         resolve(&go().with_env(env)).await,
         Err(Error::MissingSecret { .. })
      ));
   }

   #[tokio::test]
   async fn stdin_paths_resolve_deeply() {
      let scope = Scope::new();
      scope.set("src", Value::Dir(DirPath::new("src")));

      let thunk = go().with_stdin(vec![Value::Scope(scope)]);
      let command = resolve(&thunk).await.unwrap();

      assert_eq!(command.stdin, b"{\"src\":\"./src/\"}\n");
   }

   #[tokio::test]
   async fn addresses_need_a_starter() {
      struct Ports;

      #[async_trait]
      impl Starter for Ports {
         async fn start(&self, _: &EvalCtx, _: &Thunk) -> Result<BTreeMap<String, Scope>> {
            let info = Scope::new();
            info.set("host", Value::string("10.0.0.2"));
            info.set("port", Value::Int(6379));
            Ok(BTreeMap::from([("redis".to_owned(), info)]))
         }
      }

      let addr = Value::ThunkAddr(Arc::new(ThunkAddr {
         thunk:  Arc::new(Thunk::new(ThunkCmd::Command(CommandPath::new("redis-server")))),
         port:   "redis".to_owned(),
         format: "redis://$host:$port".to_owned(),
      }));
      let thunk = go().with_args(vec![addr]);

      assert!(resolve(&thunk).await.is_err());

      let command = Command::new(&EvalCtx::new(), Some(&Ports), &thunk).await.unwrap();
      assert_eq!(command.args, ["go", "redis://10.0.0.2:6379"]);
      assert_eq!(command.services.len(), 1);
   }

   #[test]
   fn working_dir_depth() {
      assert_eq!(depth("./"), 0);
      assert_eq!(depth("./abc/sub/"), 2);
      assert_eq!(depth("/abs/dir/"), 0);
   }
}
