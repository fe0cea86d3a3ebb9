//! Layered configuration: a file in the user's config directory wins over the
//! copy compiled into the binary.

use std::fs;
use std::path::{Path, PathBuf};

use outlay_import::registry::DEFAULT_PARSERS_TOML;
use outlay_import::rules::DEFAULT_RULES_TOML;
use outlay_import::{ParsersFile, RulesFile};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PARSERS_FILE: &str = "parsers.toml";
pub const BUILTIN_RULES_FILE: &str = "rules.toml";
pub const USER_RULES_FILE: &str = "categorization_rules.toml";
pub const SETTINGS_FILE: &str = "settings.toml";
pub const DATABASE_FILE: &str = "outlay.db";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {name}: {source}")]
    Toml {
        name: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Config file '{name}' not found in {} or the packaged defaults", searched.display())]
    NotFound { name: String, searched: PathBuf },
    #[error("Could not determine a home directory; pass --config-dir")]
    NoHomeDirectory,
}

fn default_true() -> bool {
    true
}

/// Optional `settings.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub use_builtin_rules: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_path: None,
            use_builtin_rules: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl ConfigLoader {
    /// Per-user directories, e.g. `~/.config/outlay` and `~/.local/share/outlay` on Linux.
    pub fn from_user_dirs() -> Result<Self, ConfigError> {
        let dirs = directories::ProjectDirs::from("com", "outlay", "Outlay").ok_or(ConfigError::NoHomeDirectory)?;
        Ok(ConfigLoader {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_dir().to_path_buf(),
        })
    }

    /// Config and data both live under `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        ConfigLoader {
            config_dir: dir.clone(),
            data_dir: dir,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn packaged(name: &str) -> Option<&'static str> {
        match name {
            PARSERS_FILE => Some(DEFAULT_PARSERS_TOML),
            BUILTIN_RULES_FILE => Some(DEFAULT_RULES_TOML),
            _ => None,
        }
    }

    fn read_user(&self, name: &str) -> Result<Option<String>, ConfigError> {
        let path = self.config_dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        tracing::debug!(path = %path.display(), "loading user config");
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| ConfigError::Io { path, source })
    }

    /// Raw text of `name`: user file, then packaged default.
    pub fn load(&self, name: &str) -> Result<String, ConfigError> {
        if let Some(text) = self.read_user(name)? {
            return Ok(text);
        }
        Self::packaged(name)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::NotFound {
                name: name.to_string(),
                searched: self.config_dir.clone(),
            })
    }

    fn parse<T: DeserializeOwned>(name: &str, text: &str) -> Result<T, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Toml {
            name: name.to_string(),
            source,
        })
    }

    pub fn load_parsers(&self) -> Result<ParsersFile, ConfigError> {
        Self::parse(PARSERS_FILE, &self.load(PARSERS_FILE)?)
    }

    pub fn load_builtin_rules(&self) -> Result<RulesFile, ConfigError> {
        Self::parse(BUILTIN_RULES_FILE, &self.load(BUILTIN_RULES_FILE)?)
    }

    /// The user's own rules; none configured yet is an empty list.
    pub fn load_user_rules(&self) -> Result<RulesFile, ConfigError> {
        match self.read_user(USER_RULES_FILE)? {
            Some(text) => Self::parse(USER_RULES_FILE, &text),
            None => Ok(RulesFile::default()),
        }
    }

    pub fn load_settings(&self) -> Result<Settings, ConfigError> {
        match self.read_user(SETTINGS_FILE)? {
            Some(text) => Self::parse(SETTINGS_FILE, &text),
            None => Ok(Settings::default()),
        }
    }

    pub fn database_path(&self, settings: &Settings) -> PathBuf {
        settings
            .database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DATABASE_FILE))
    }
}
