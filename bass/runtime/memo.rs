//! Memoized results, persisted in a `bass.lock` file.
//!
//! The lockfile maps `<sha256 of thunk>:<binding>` to the inputs and
//! outputs of calls to that binding of the module the thunk loads. The
//! thunk itself is kept under `modules` so the file can be audited and
//! reloaded.

use std::{
   collections::BTreeMap,
   fmt,
   fs,
   io::{
      self,
      Read as _,
      Write as _,
   },
   path::{
      Path,
      PathBuf,
   },
   sync::{
      Arc,
      PoisonError,
      RwLock,
   },
};

use bass_error::Contextful as _;
use bass_util::slash;
use serde::{
   Deserialize,
   Serialize,
};
use serde_json::Value as Json;

use crate::{
   DirPath,
   Error,
   EvalCtx,
   FileOrDir,
   FilePath,
   FsPath,
   HostPath,
   Result,
   Symbol,
   Thunk,
   ThunkPath,
   Value,
   config::LOCKFILE_NAME,
   pipe::protocol,
};

/// A store of memoized calls.
pub trait Memos: Send + Sync {
   fn store(&self, thunk: &Thunk, binding: &Symbol, input: &Value, output: &Value) -> Result<()>;

   fn retrieve(&self, thunk: &Thunk, binding: &Symbol, input: &Value) -> Result<Option<Value>>;

   fn remove(&self, thunk: &Thunk, binding: &Symbol, input: &Value) -> Result<()>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Content {
   #[serde(default)]
   data:    BTreeMap<String, Entries>,
   #[serde(default)]
   modules: BTreeMap<String, Json>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Entries {
   #[serde(default)]
   memos: Vec<Memory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Memory {
   #[serde(default, deserialize_with = "present")]
   input:  Option<Json>,
   #[serde(default, deserialize_with = "present")]
   output: Option<Json>,
}

/// Reads a field that is there, keeping an explicit `null` as a value. Only
/// a missing field leaves [`None`].
fn present<'de, D: serde::Deserializer<'de>>(
   deserializer: D,
) -> std::result::Result<Option<Json>, D::Error> {
   Json::deserialize(deserializer).map(Some)
}

fn key(thunk: &Thunk, binding: &Symbol) -> Result<String> {
   Ok(format!("{sha}:{binding}", sha = thunk.sha256()?))
}

impl Content {
   /// Parses lockfile content, dropping entries missing an input or output.
   fn parse(bytes: &[u8]) -> Result<Self> {
      if bytes.iter().all(u8::is_ascii_whitespace) {
         return Ok(Self::default());
      }

      let mut content = serde_json::from_slice::<Self>(bytes)?;

      for entries in content.data.values_mut() {
         entries.memos.retain(|memory| {
            let valid = memory.input.is_some() && memory.output.is_some();
            if !valid {
               tracing::warn!(input = ?memory.input, "dropping corrupt memo");
            }
            valid
         });
      }
      content.data.retain(|_, entries| !entries.memos.is_empty());

      Ok(content)
   }

   fn retrieve(&self, thunk: &Thunk, binding: &Symbol, input: &Value) -> Result<Option<Value>> {
      let Some(entries) = self.data.get(&key(thunk, binding)?) else {
         return Ok(None);
      };

      let input = input.to_json()?;
      entries
         .memos
         .iter()
         .find(|memory| memory.input.as_ref() == Some(&input))
         .and_then(|memory| memory.output.as_ref())
         .map(Value::from_json)
         .transpose()
   }

   fn store(&mut self, thunk: &Thunk, binding: &Symbol, input: &Value, output: &Value) -> Result<()> {
      let (input, output) = (Some(input.to_json()?), Some(output.to_json()?));
      let entries = self.data.entry(key(thunk, binding)?).or_default();

      match entries.memos.iter_mut().find(|memory| memory.input == input) {
         Some(memory) => memory.output = output,
         None => entries.memos.push(Memory { input, output }),
      }

      self.modules.insert(thunk.sha256()?, thunk.to_json()?);
      Ok(())
   }

   fn remove(&mut self, thunk: &Thunk, binding: &Symbol, input: &Value) -> Result<()> {
      let key = key(thunk, binding)?;
      let input = Some(input.to_json()?);

      if let Some(entries) = self.data.get_mut(&key) {
         entries.memos.retain(|memory| memory.input != input);

         if entries.memos.is_empty() {
            self.data.remove(&key);
         }
      }

      let sha = thunk.sha256()?;
      let prefix = format!("{sha}:");
      if !self.data.keys().any(|key| key.starts_with(&prefix)) {
         self.modules.remove(&sha);
      }

      Ok(())
   }
}

/// Serializes lockfile access within the process. The OS lock only
/// excludes other processes.
static LOCAL: RwLock<()> = RwLock::new(());

/// A writable lockfile on the host.
#[derive(Debug, Clone)]
pub struct Lockfile {
   path: PathBuf,
}

impl Lockfile {
   #[must_use]
   pub fn new(path: impl Into<PathBuf>) -> Self {
      Self { path: path.into() }
   }

   #[must_use]
   pub fn path(&self) -> &Path {
      &self.path
   }

   fn load(&self) -> Result<Option<Content>> {
      let _guard = LOCAL.read().unwrap_or_else(PoisonError::into_inner);

      let mut file = match fs::File::open(&self.path) {
         Ok(file) => file,
         Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
         Err(error) => return Err(error.into()),
      };

      file
         .lock_shared()
         .with_context(|| format!("failed to lock {path}", path = self.path.display()))?;

      let mut bytes = Vec::new();
      file.read_to_end(&mut bytes)?;

      Content::parse(&bytes).map(Some)
   }

   /// Opens and exclusively locks the file currently at the path. A writer
   /// that replaced the file while this one waited for the lock leaves the
   /// lock on a stale file, so the open is retried until they agree.
   fn lock_current(&self) -> Result<fs::File> {
      loop {
         let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .with_context(|| format!("failed to open {path}", path = self.path.display()))?;

         file
            .lock()
            .with_context(|| format!("failed to lock {path}", path = self.path.display()))?;

         if is_current(&file, &self.path)? {
            return Ok(file);
         }
      }
   }

   /// Rewrites the lockfile under an exclusive lock. The new content is
   /// written next to it and renamed over it.
   fn update(&self, update: impl FnOnce(&mut Content) -> Result<()>) -> Result<()> {
      let _guard = LOCAL.write().unwrap_or_else(PoisonError::into_inner);

      let mut file = self.lock_current()?;

      let mut bytes = Vec::new();
      file.read_to_end(&mut bytes)?;

      let mut content = Content::parse(&bytes)
         .map_err(|error| Error::Host(bass_error::error!("{path}: {error}", path = self.path.display())))?;
      update(&mut content)?;

      let mut rendered = serde_json::to_vec_pretty(&content)?;
      rendered.push(b'\n');

      let dir = match self.path.parent() {
         Some(parent) if !parent.as_os_str().is_empty() => parent,
         _ => Path::new("."),
      };

      let mut temp = tempfile::NamedTempFile::new_in(dir)
         .with_context(|| format!("failed to create a file in {dir}", dir = dir.display()))?;
      temp.write_all(&rendered)?;
      temp.as_file().set_permissions(file.metadata()?.permissions())?;
      temp.as_file().sync_all()?;

      temp
         .persist(&self.path)
         .map_err(|error| error.error)
         .with_context(|| format!("failed to replace {path}", path = self.path.display()))?;

      Ok(())
   }
}

/// Whether the open file is still the one at the path.
#[cfg(unix)]
fn is_current(file: &fs::File, path: &Path) -> io::Result<bool> {
   use std::os::unix::fs::MetadataExt as _;

   let open = file.metadata()?;
   match fs::metadata(path) {
      Ok(current) => Ok(open.dev() == current.dev() && open.ino() == current.ino()),
      Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
      Err(error) => Err(error),
   }
}

#[cfg(not(unix))]
fn is_current(_: &fs::File, path: &Path) -> io::Result<bool> {
   Ok(path.exists())
}

/// Runs memo operations on the blocking pool, as lockfiles wait on OS
/// locks.
pub(crate) async fn blocking<T: Send + 'static>(
   operation: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
   tokio::task::spawn_blocking(operation)
      .await
      .map_err(|error| Error::Host(bass_error::error!("memo task failed: {error}")))?
}

impl Memos for Lockfile {
   #[tracing::instrument(level = "debug", skip_all, fields(path = %self.path.display(), %binding))]
   fn store(&self, thunk: &Thunk, binding: &Symbol, input: &Value, output: &Value) -> Result<()> {
      self.update(|content| content.store(thunk, binding, input, output))
   }

   #[tracing::instrument(level = "trace", skip_all, fields(path = %self.path.display(), %binding))]
   fn retrieve(&self, thunk: &Thunk, binding: &Symbol, input: &Value) -> Result<Option<Value>> {
      match self.load()? {
         Some(content) => content.retrieve(thunk, binding, input),
         None => Ok(None),
      }
   }

   #[tracing::instrument(level = "debug", skip_all, fields(path = %self.path.display(), %binding))]
   fn remove(&self, thunk: &Thunk, binding: &Symbol, input: &Value) -> Result<()> {
      if !self.path.exists() {
         return Ok(());
      }

      self.update(|content| content.remove(thunk, binding, input))
   }
}

/// A lockfile that was not written by this host, such as one produced by a
/// thunk. Stores and removals succeed without persisting.
#[derive(Clone)]
pub struct ReadOnly(Arc<Content>);

impl ReadOnly {
   pub fn parse(bytes: &[u8]) -> Result<Self> {
      Content::parse(bytes).map(|content| Self(Arc::new(content)))
   }
}

impl fmt::Debug for ReadOnly {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      writer.debug_tuple("ReadOnly").field(&self.0.data.len()).finish()
   }
}

impl Memos for ReadOnly {
   fn store(&self, _: &Thunk, _: &Symbol, _: &Value, _: &Value) -> Result<()> {
      Ok(())
   }

   fn retrieve(&self, thunk: &Thunk, binding: &Symbol, input: &Value) -> Result<Option<Value>> {
      self.0.retrieve(thunk, binding, input)
   }

   fn remove(&self, _: &Thunk, _: &Symbol, _: &Value) -> Result<()> {
      Ok(())
   }
}

/// Remembers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl Memos for Noop {
   fn store(&self, _: &Thunk, _: &Symbol, _: &Value, _: &Value) -> Result<()> {
      Ok(())
   }

   fn retrieve(&self, _: &Thunk, _: &Symbol, _: &Value) -> Result<Option<Value>> {
      Ok(None)
   }

   fn remove(&self, _: &Thunk, _: &Symbol, _: &Value) -> Result<()> {
      Ok(())
   }
}

/// Opens the memos at a path.
///
/// A host file is opened as a writable lockfile, created on first store. A
/// directory is searched upwards for a `bass.lock`, falling back to
/// [`Noop`]. Filesystem and thunk paths are read-only.
pub async fn open(ctx: &EvalCtx, path: &Value) -> Result<Arc<dyn Memos>> {
   match *path.unannotated() {
      Value::HostPath(ref host) => open_host(host),
      Value::FsPath(ref fs) => open_fs(fs),
      Value::ThunkPath(ref thunk_path) => open_thunk_path(ctx, thunk_path).await,
      _ => Err(Error::decode(path, "memos path")),
   }
}

fn open_host(host: &HostPath) -> Result<Arc<dyn Memos>> {
   let path = host.host_path()?;

   if !host.path.is_dir() {
      return Ok(Arc::new(Lockfile::new(path)));
   }

   Ok(path
      .ancestors()
      .map(|dir| dir.join(LOCKFILE_NAME))
      .find(|candidate| candidate.exists())
      .map_or_else(|| Arc::new(Noop) as Arc<dyn Memos>, |found| Arc::new(Lockfile::new(found))))
}

/// The lockfile candidates for a directory: its own, then each parent's.
fn candidates(dir: &DirPath) -> Vec<FileOrDir> {
   let mut candidates = Vec::new();
   let mut current = dir.path().to_owned();

   loop {
      candidates.push(FileOrDir::File(FilePath::new(&slash::join([&*current, LOCKFILE_NAME]))));

      let parent = slash::dirname(&current);
      if parent == current || current == "." || current == "/" {
         return candidates;
      }
      current = parent;
   }
}

fn open_fs(fs: &FsPath) -> Result<Arc<dyn Memos>> {
   match fs.path {
      FileOrDir::File(_) => Ok(Arc::new(ReadOnly::parse(&fs.read()?)?)),

      FileOrDir::Dir(ref dir) => {
         for candidate in candidates(dir) {
            let candidate = fs.with_path(candidate);
            if let Ok(bytes) = candidate.read() {
               return Ok(Arc::new(ReadOnly::parse(&bytes)?));
            }
         }

         Ok(Arc::new(Noop))
      },
   }
}

pub(crate) async fn export_file(ctx: &EvalCtx, path: &ThunkPath) -> Result<Option<bytes::Bytes>> {
   let runtime = ctx.runtime(path.thunk.platform())?;

   let mut archive = Vec::new();
   runtime.export_path(ctx, path, &mut archive).await?;

   Ok(protocol::entries(&archive)?
      .into_iter()
      .find(protocol::TarEntry::is_file)
      .map(|entry| entry.data))
}

async fn open_thunk_path(ctx: &EvalCtx, path: &ThunkPath) -> Result<Arc<dyn Memos>> {
   match path.path {
      FileOrDir::File(_) => {
         let bytes = export_file(ctx, path)
            .await?
            .ok_or_else(|| Error::Host(bass_error::error!("no lockfile at {path}")))?;

         Ok(Arc::new(ReadOnly::parse(&bytes)?))
      },

      FileOrDir::Dir(ref dir) => {
         for candidate in candidates(dir) {
            let candidate = ThunkPath {
               thunk: path.thunk.clone(),
               path:  candidate,
            };

            if let Some(bytes) = export_file(ctx, &candidate).await? {
               return Ok(Arc::new(ReadOnly::parse(&bytes)?));
            }
         }

         Ok(Arc::new(Noop))
      },
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      CommandPath,
      thunk::ThunkCmd,
   };

   fn thunk(name: &str) -> Thunk {
      Thunk::new(ThunkCmd::Command(CommandPath::new(name)))
   }

   fn binding() -> Symbol {
      Symbol::new("resolve")
   }

   #[test]
   fn lockfile_round_trip() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join(LOCKFILE_NAME);

      let (first, second) = (thunk("git"), thunk("docker"));
      let input = Value::list([Value::string("main")]);
      let other_input = Value::list([Value::string("dev")]);

      {
         let memos = Lockfile::new(&path);
         memos.store(&first, &binding(), &input, &Value::string("abc")).unwrap();
         memos.store(&first, &binding(), &other_input, &Value::string("def")).unwrap();
         memos.store(&second, &binding(), &input, &Value::Int(1)).unwrap();
      }

      let memos = Lockfile::new(&path);
      assert_eq!(
         memos.retrieve(&first, &binding(), &input).unwrap(),
         Some(Value::string("abc"))
      );
      assert_eq!(
         memos.retrieve(&second, &binding(), &input).unwrap(),
         Some(Value::Int(1))
      );
      assert_eq!(memos.retrieve(&second, &binding(), &other_input).unwrap(), None);

      memos.remove(&first, &binding(), &input).unwrap();
      assert_eq!(memos.retrieve(&first, &binding(), &input).unwrap(), None);
      assert_eq!(
         memos.retrieve(&first, &binding(), &other_input).unwrap(),
         Some(Value::string("def"))
      );
      assert!(memos.retrieve(&second, &binding(), &input).unwrap().is_some());
   }

   #[test]
   fn stores_replace_outputs() {
      let dir = tempfile::tempdir().unwrap();
      let memos = Lockfile::new(dir.path().join(LOCKFILE_NAME));
      let input = Value::list([Value::Int(1)]);

      memos.store(&thunk("git"), &binding(), &input, &Value::Int(1)).unwrap();
      memos.store(&thunk("git"), &binding(), &input, &Value::Int(2)).unwrap();

      assert_eq!(
         memos.retrieve(&thunk("git"), &binding(), &input).unwrap(),
         Some(Value::Int(2))
      );
   }

   #[test]
   fn lockfile_layout() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join(LOCKFILE_NAME);
      let memos = Lockfile::new(&path);

      let git = thunk("git");
      memos.store(&git, &binding(), &Value::Int(1), &Value::Int(2)).unwrap();

      let written = fs::read_to_string(&path).unwrap();
      let json: Json = serde_json::from_str(&written).unwrap();
      let key = format!("{sha}:resolve", sha = git.sha256().unwrap());

      assert_eq!(json["data"][&key]["memos"][0]["output"], Json::from(2));
      assert_eq!(json["modules"][&git.sha256().unwrap()], git.to_json().unwrap());
      assert!(written.contains("\n  \"data\""));

      memos.remove(&git, &binding(), &Value::Int(1)).unwrap();
      let json: Json = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
      assert!(json["modules"].as_object().unwrap().is_empty());
   }

   #[test]
   fn corrupt_entries_are_dropped() {
      let git = thunk("git");
      let key = format!("{sha}:resolve", sha = git.sha256().unwrap());

      let content = serde_json::json!({
         "data": {
            key.clone(): {
               "memos": [
                  { "output": 1 },
                  { "input": [2], "output": 3 },
                  { "input": [6] },
               ],
            },
         },
      });

      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join(LOCKFILE_NAME);
      fs::write(&path, serde_json::to_vec(&content).unwrap()).unwrap();

      let memos = Lockfile::new(&path);
      let input = Value::list([Value::Int(2)]);
      assert_eq!(memos.retrieve(&git, &binding(), &input).unwrap(), Some(Value::Int(3)));

      memos.store(&git, &binding(), &Value::list([Value::Int(4)]), &Value::Int(5)).unwrap();
      let json: Json = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
      assert_eq!(json["data"][&key]["memos"].as_array().unwrap().len(), 2);
   }

   #[test]
   fn null_outputs_are_remembered() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join(LOCKFILE_NAME);
      let input = Value::list([Value::string("main")]);

      Lockfile::new(&path)
         .store(&thunk("git"), &binding(), &input, &Value::Null)
         .unwrap();

      let memos = Lockfile::new(&path);
      assert_eq!(
         memos.retrieve(&thunk("git"), &binding(), &input).unwrap(),
         Some(Value::Null)
      );
   }

   #[test]
   fn rewrites_replace_the_file() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join(LOCKFILE_NAME);
      let memos = Lockfile::new(&path);

      memos.store(&thunk("git"), &binding(), &Value::Int(1), &Value::Int(2)).unwrap();
      memos.store(&thunk("git"), &binding(), &Value::Int(3), &Value::Int(4)).unwrap();

      let entries = fs::read_dir(dir.path())
         .unwrap()
         .map(|entry| entry.unwrap().file_name())
         .collect::<Vec<_>>();
      assert_eq!(entries, [LOCKFILE_NAME]);

      assert_eq!(
         memos.retrieve(&thunk("git"), &binding(), &Value::Int(1)).unwrap(),
         Some(Value::Int(2))
      );
   }

   #[tokio::test]
   async fn blocking_operations() {
      let dir = tempfile::tempdir().unwrap();
      let memos = Arc::new(Lockfile::new(dir.path().join(LOCKFILE_NAME)));

      blocking({
         let memos = memos.clone();
         move || memos.store(&thunk("git"), &binding(), &Value::Int(1), &Value::Null)
      })
      .await
      .unwrap();

      let hit = blocking(move || memos.retrieve(&thunk("git"), &binding(), &Value::Int(1)))
         .await
         .unwrap();
      assert_eq!(hit, Some(Value::Null));
   }

   #[test]
   fn read_only_memos_do_not_persist() {
      let git = thunk("git");
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join(LOCKFILE_NAME);

      Lockfile::new(&path)
         .store(&git, &binding(), &Value::Int(1), &Value::Int(2))
         .unwrap();

      let memos = ReadOnly::parse(&fs::read(&path).unwrap()).unwrap();
      assert_eq!(memos.retrieve(&git, &binding(), &Value::Int(1)).unwrap(), Some(Value::Int(2)));

      memos.store(&git, &binding(), &Value::Int(3), &Value::Int(4)).unwrap();
      assert_eq!(memos.retrieve(&git, &binding(), &Value::Int(3)).unwrap(), None);
   }

   #[tokio::test]
   async fn opening_searches_upwards() {
      let dir = tempfile::tempdir().unwrap();
      let root = dir.path().to_str().unwrap();
      fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();

      let ctx = EvalCtx::new();
      let nested = Value::HostPath(Arc::new(HostPath::new(root, FileOrDir::parse("sub/deeper/"))));

      let git = thunk("git");
      let memos = open(&ctx, &nested).await.unwrap();
      memos.store(&git, &binding(), &Value::Int(1), &Value::Int(2)).unwrap();
      assert!(!dir.path().join("sub/deeper").join(LOCKFILE_NAME).exists());

      Lockfile::new(dir.path().join(LOCKFILE_NAME))
         .store(&git, &binding(), &Value::Int(1), &Value::Int(2))
         .unwrap();

      let memos = open(&ctx, &nested).await.unwrap();
      assert_eq!(memos.retrieve(&git, &binding(), &Value::Int(1)).unwrap(), Some(Value::Int(2)));
   }

   #[tokio::test]
   async fn opening_filesystems() {
      let git = thunk("git");
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join(LOCKFILE_NAME);
      Lockfile::new(&path)
         .store(&git, &binding(), &Value::Int(1), &Value::Int(2))
         .unwrap();

      let fs = FsPath::new(BTreeMap::from([(
         LOCKFILE_NAME.to_owned(),
         bytes::Bytes::from(fs::read(&path).unwrap()),
      )]));
      let nested = Value::FsPath(Arc::new(fs.with_path(FileOrDir::parse("a/b/"))));

      let memos = open(&EvalCtx::new(), &nested).await.unwrap();
      assert_eq!(memos.retrieve(&git, &binding(), &Value::Int(1)).unwrap(), Some(Value::Int(2)));
   }

   #[tokio::test]
   async fn opening_thunk_paths() {
      let (runtime, pool) = crate::runtime::fake::pool();
      let ctx = EvalCtx::new().with_pool(pool);

      let git = thunk("git");
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join(LOCKFILE_NAME);
      Lockfile::new(&path)
         .store(&git, &binding(), &Value::Int(1), &Value::Int(2))
         .unwrap();
      runtime.file("bass.lock", &fs::read_to_string(&path).unwrap());

      let producer = Arc::new(thunk("generate").with_image(crate::thunk::ThunkImage::Ref(crate::thunk::ImageRef {
         platform:   crate::runtime::fake::linux(),
         repository: "alpine".to_owned(),
         tag:        None,
         digest:     None,
      })));
      let lockfile = Value::ThunkPath(Arc::new(ThunkPath {
         thunk: producer,
         path:  FileOrDir::parse("sub/"),
      }));

      let memos = open(&ctx, &lockfile).await.unwrap();
      assert_eq!(memos.retrieve(&git, &binding(), &Value::Int(1)).unwrap(), Some(Value::Int(2)));
   }
}
