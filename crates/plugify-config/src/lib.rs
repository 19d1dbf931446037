//! Generator configuration stored as TOML
//!
//! Resolution order for the file location:
//! 1. `PLUGIFY_GEN_CONFIG` when set and non-empty
//! 2. a pointer file `.plugify_gen_config_path` next to the default location
//! 3. `<config dir>/plugify-gen/plugify-gen.toml`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ENV: &str = "PLUGIFY_GEN_CONFIG";
pub const POINTER_FILE: &str = ".plugify_gen_config_path";
const CONFIG_DIR: &str = "plugify-gen";
const CONFIG_FILE: &str = "plugify-gen.toml";

/// Every key accepted by `get`/`set`, in display order
pub const KEYS: &[&str] = &[
    "pointer-width",
    "export-attribute",
    "import-attribute",
    "import-marker",
    "output-dir",
    "schema",
    "description",
    "author",
    "website",
    "license",
    "entry",
    "language",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown config key: {key}. Supported keys: {}", KEYS.join(", "))]
    UnknownKey { key: String },

    #[error("Invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer_width: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_marker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

fn default_path() -> PathBuf {
    dirs::config_dir().map_or_else(
        || PathBuf::from(".config").join(CONFIG_DIR).join(CONFIG_FILE),
        |c| c.join(CONFIG_DIR).join(CONFIG_FILE),
    )
}

/// Apply the env override and pointer file on top of `default`
pub fn resolve_path(env_override: Option<&str>, default: PathBuf) -> PathBuf {
    if let Some(env_path) = env_override {
        let trimmed = env_path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    if let Some(parent) = default.parent() {
        if let Ok(contents) = fs::read_to_string(parent.join(POINTER_FILE)) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                return PathBuf::from(trimmed);
            }
        }
    }

    default
}

impl Config {
    pub fn path() -> PathBuf {
        resolve_path(std::env::var(CONFIG_ENV).ok().as_deref(), default_path())
    }

    /// Pointer file consulted for the default location
    pub fn pointer_path() -> PathBuf {
        default_path()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(POINTER_FILE)
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(&Self::path())
    }

    /// Missing files load as an empty config
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to_path(&Self::path())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(width) = self.pointer_width {
            check_pointer_width(&width.to_string())?;
        }
        if let Some(marker) = &self.import_marker {
            check_non_empty("import-marker", marker)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "pointer-width" => self.pointer_width.map(|w| w.to_string()),
            "export-attribute" => self.export_attribute.clone(),
            "import-attribute" => self.import_attribute.clone(),
            "import-marker" => self.import_marker.clone(),
            "output-dir" => self.output_dir.clone(),
            "schema" => self.schema.clone(),
            "description" => self.description.clone(),
            "author" => self.author.clone(),
            "website" => self.website.clone(),
            "license" => self.license.clone(),
            "entry" => self.entry.clone(),
            "language" => self.language.clone(),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: String) -> Result<(), ConfigError> {
        match key {
            "pointer-width" => self.pointer_width = Some(check_pointer_width(&value)?),
            "export-attribute" => {
                check_non_empty(key, &value)?;
                self.export_attribute = Some(value);
            }
            "import-attribute" => {
                check_non_empty(key, &value)?;
                self.import_attribute = Some(value);
            }
            "import-marker" => {
                check_non_empty(key, &value)?;
                self.import_marker = Some(value);
            }
            "output-dir" => self.output_dir = Some(value),
            "schema" => self.schema = Some(value),
            "description" => self.description = Some(value),
            "author" => self.author = Some(value),
            "website" => self.website = Some(value),
            "license" => self.license = Some(value),
            "entry" => self.entry = Some(value),
            "language" => self.language = Some(value),
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.values_iter().is_empty()
    }

    pub fn values_iter(&self) -> Vec<(&'static str, String)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }
}

fn check_pointer_width(value: &str) -> Result<u8, ConfigError> {
    match value.trim() {
        "32" => Ok(32),
        "64" => Ok(64),
        _ => Err(ConfigError::InvalidValue {
            key: "pointer-width".to_string(),
            value: value.to_string(),
            reason: "expected 32 or 64".to_string(),
        }),
    }
}

fn check_non_empty(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}
