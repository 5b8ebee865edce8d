//! Layered configuration for `tamp`.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults.
//! 2. The user's configuration file, `config.{toml,yaml,json}` in the
//!    platform configuration directory (e.g. `~/.config/tamp/` on Linux).
//! 3. A file passed explicitly (format chosen by extension).
//! 4. Environment variables prefixed with `TAMP_`, with `__` separating
//!    sections from keys: `TAMP_ENGINE__WORKERS=4`.
//!
//! ```toml
//! [transform]
//! preset = "tiffcp"
//! timeout_secs = 600
//!
//! [engine]
//! workers = 4
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tamp_inplace::{CommandTemplate, InPlaceTransform, Preset, SelfTest};

const ENV_PREFIX: &str = "TAMP_";
const USER_CONFIG_STEM: &str = "config";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transform: TransformConfig,
    pub engine: EngineConfig,
}

/// What to run on each file, and on which files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// A ready-made program setup. `command` and `extensions` override its parts.
    pub preset: Option<Preset>,
    /// Program and arguments, each an `upon` template over `input` and `output`.
    pub command: Option<Vec<String>>,
    /// File extensions to transform, without the dot. Required with a custom `command`.
    pub extensions: Option<Vec<String>>,
    /// Kill the program after this many seconds and retry the file.
    pub timeout_secs: Option<u64>,
    /// Run the preset's version check before touching any file. When disabled
    /// the program only has to be installed.
    pub self_test: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            preset: None,
            command: None,
            extensions: None,
            timeout_secs: None,
            self_test: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Worker threads; one per available CPU when unset.
    pub workers: Option<NonZeroUsize>,
    pub recursive: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { workers: None, recursive: true }
    }
}

impl Config {
    /// Loads and merges every source.
    ///
    /// The result is not validated, so that callers can layer further
    /// overrides on top first; call [`validate`](Self::validate) afterwards.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::layered(user_config_dir().as_deref(), explicit)
    }

    fn layered(user_dir: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(dir) = user_dir {
            let stem = dir.join(USER_CONFIG_STEM);
            // Missing files are skipped by the providers.
            figment = figment
                .merge(Toml::file(stem.with_extension("toml")))
                .merge(Yaml::file(stem.with_extension("yaml")))
                .merge(Json::file(stem.with_extension("json")));
        }
        if let Some(path) = explicit {
            figment = Self::merge_file(figment, path)?;
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        tracing::debug!(?config, "Loaded configuration");
        Ok(config)
    }

    fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
        if !path.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let extension = path.extension().map(|ext| ext.to_string_lossy().to_lowercase());
        Ok(match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.transform.validate()
    }
}

impl TransformConfig {
    pub fn validate(&self) -> Result<()> {
        if self.preset.is_none() && self.command.is_none() {
            exn::bail!(ErrorKind::Invalid("set either transform.preset or transform.command".to_string()));
        }
        if self.command.as_ref().is_some_and(Vec::is_empty) {
            exn::bail!(ErrorKind::Invalid("transform.command is empty".to_string()));
        }
        match &self.extensions {
            Some(extensions) if extensions.iter().all(|ext| ext.trim().trim_matches('.').is_empty()) => {
                exn::bail!(ErrorKind::Invalid("transform.extensions is empty".to_string()));
            },
            None if self.preset.is_none() => {
                exn::bail!(ErrorKind::Invalid("a custom transform.command needs transform.extensions".to_string()));
            },
            _ => {},
        }
        if self.timeout_secs == Some(0) {
            exn::bail!(ErrorKind::Invalid("transform.timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Builds the transform described by this section. Call [`validate`](Self::validate) first.
    pub fn build(&self) -> Result<InPlaceTransform> {
        let command = match (&self.command, self.preset) {
            (Some(argv), _) => argv.clone(),
            (None, Some(preset)) => preset.command(),
            (None, None) => exn::bail!(ErrorKind::Invalid("no command to run".to_string())),
        };
        let extensions: Vec<String> = match (&self.extensions, self.preset) {
            (Some(extensions), _) => extensions.clone(),
            (None, Some(preset)) => preset.extensions().iter().map(ToString::to_string).collect(),
            (None, None) => Vec::new(),
        };
        // A preset's version check only applies to the preset's own program.
        let self_test = match self.preset {
            Some(preset) if self.self_test && self.command.is_none() => {
                preset.self_test().or_raise(|| ErrorKind::Transform)?
            },
            _ => SelfTest::Presence,
        };
        let template = CommandTemplate::new(command).or_raise(|| ErrorKind::Transform)?;
        let transform = InPlaceTransform::new(template, extensions)
            .or_raise(|| ErrorKind::Transform)?
            .with_self_test(self_test)
            .with_timeout(self.timeout());
        Ok(transform)
    }
}

/// Where the user configuration file is looked up, if the platform has one.
pub fn user_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "tamp").map(|dirs| dirs.config_dir().to_path_buf())
}
