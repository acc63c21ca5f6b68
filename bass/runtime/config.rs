//! User configuration.

use std::{
   collections::BTreeMap,
   env,
   fs,
   io,
   path::{
      Path,
      PathBuf,
   },
};

use bass_error::Contextful as _;
use serde::{
   Deserialize,
   Serialize,
};

use crate::{
   Result,
   thunk::Platform,
};

/// The file memoized results are written to.
pub const LOCKFILE_NAME: &str = "bass.lock";

/// Overrides the cache directory.
pub const CACHE_HOME_ENV: &str = "BASS_CACHE_HOME";

/// The configuration read from `<config dir>/bass/config.toml`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
   #[serde(default)]
   pub runtimes: Vec<RuntimeConfig>,
}

/// A runtime to serve thunks for a platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeConfig {
   pub platform: Platform,

   /// The name of the runtime driver, e.g. `buildkit`.
   pub runtime: String,

   /// Named addresses the runtime listens on or connects to.
   #[serde(default)]
   pub addrs: BTreeMap<String, String>,

   /// Driver-specific configuration, passed through untouched.
   #[serde(default)]
   pub config: toml::Table,
}

impl Config {
   /// The default location of the configuration file, if the platform has a
   /// configuration directory.
   #[must_use]
   pub fn path() -> Option<PathBuf> {
      dirs::config_dir().map(|dir| dir.join("bass").join("config.toml"))
   }

   /// Loads the configuration from its default location.
   pub fn load() -> Result<Self> {
      match Self::path() {
         Some(path) => Self::read(&path),
         None => Ok(Self::default()),
      }
   }

   /// Reads the configuration at `path`. A missing file is the default
   /// configuration.
   pub fn read(path: &Path) -> Result<Self> {
      let content = match fs::read_to_string(path) {
         Err(error) if error.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
         },

         result => {
            result.with_context(|| format!("failed to read config from '{path}'", path = path.display()))?
         },
      };

      let config = toml::from_str::<Self>(&content)
         .with_context(|| format!("failed to parse config at '{path}'", path = path.display()))?;

      Ok(config)
   }

   /// The runtimes configured for a platform, in configuration order.
   pub fn runtimes_for<'a>(&'a self, platform: &'a Platform) -> impl Iterator<Item = &'a RuntimeConfig> + 'a {
      self
         .runtimes
         .iter()
         .filter(move |runtime| runtime.platform.matches(platform))
   }
}

/// The directory for cached state: `$BASS_CACHE_HOME`, or `bass` under the
/// platform cache directory.
pub fn cache_home() -> Result<PathBuf> {
   if let Some(home) = env::var_os(CACHE_HOME_ENV).filter(|home| !home.is_empty()) {
      return Ok(PathBuf::from(home));
   }

   let cache = dirs::cache_dir().context("no cache directory for this platform")?;
   Ok(cache.join("bass"))
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn missing_config_is_default() {
      let dir = tempfile::tempdir().unwrap();

      let config = Config::read(&dir.path().join("config.toml")).unwrap();
      assert_eq!(config, Config::default());
   }

   #[test]
   fn reading_runtimes() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("config.toml");

      fs::write(
         &path,
         r#"
[[runtimes]]
platform = { os = "linux" }
runtime = "buildkit"
addrs = { buildkit = "unix:///run/buildkit/buildkitd.sock" }

[runtimes.config]
debug = true

[[runtimes]]
platform = { os = "linux", arch = "arm64" }
runtime = "command"
"#,
      )
      .unwrap();

      let config = Config::read(&path).unwrap();
      assert_eq!(config.runtimes.len(), 2);
      assert_eq!(config.runtimes[0].runtime, "buildkit");
      assert_eq!(
         config.runtimes[0].addrs.get("buildkit").map(String::as_str),
         Some("unix:///run/buildkit/buildkitd.sock")
      );
      assert_eq!(config.runtimes[0].config.get("debug"), Some(&toml::Value::Boolean(true)));
      assert_eq!(config.runtimes[1].platform.arch.as_deref(), Some("arm64"));

      let amd64 = Platform {
         os:   "linux".to_owned(),
         arch: Some("amd64".to_owned()),
      };
      let names = config
         .runtimes_for(&amd64)
         .map(|runtime| runtime.runtime.as_str())
         .collect::<Vec<_>>();
      assert_eq!(names, ["buildkit"]);
   }

   #[test]
   fn malformed_config_names_the_file() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("config.toml");
      fs::write(&path, "[[runtimes]]\nplatform = 1\n").unwrap();

      let error = Config::read(&path).unwrap_err();
      assert!(error.to_string().contains("config.toml"), "{error}");
   }
}
