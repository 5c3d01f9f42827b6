// Remembered upload settings
//
// The last target and image are stored so repeated uploads only need the
// flags that change. TOML file in $XDG_CONFIG_HOME/nota/settings.toml.
// Passwords are never written.

use crate::error::{OtaError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Values carried between runs. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Settings {
    const FILE_NAME: &'static str = "settings.toml";

    /// Default settings file (`$XDG_CONFIG_HOME/nota/settings.toml`)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(xdg_config)
        } else if let Some(dir) = dirs::config_dir() {
            dir
        } else {
            return Err(OtaError::Settings(
                "Cannot determine config directory (HOME not set)".to_string(),
            ));
        };

        Ok(config_dir.join("nota").join(Self::FILE_NAME))
    }

    /// Load settings; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| OtaError::Settings(format!("{}: {}", path.display(), e)))
    }

    /// Save settings (atomic write)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let text = toml::to_string_pretty(self)
            .map_err(|e| OtaError::Settings(format!("serialize: {}", e)))?;

        let temp_file = path.with_extension("tmp");
        fs::write(&temp_file, format!("# nota remembered settings\n{}", text))?;
        fs::rename(&temp_file, path)?;

        Ok(())
    }

    /// Overlay `newer` on top of `self`; present fields in `newer` win.
    pub fn merged(&self, newer: &Settings) -> Settings {
        Settings {
            host: newer.host.clone().or_else(|| self.host.clone()),
            port: newer.port.or(self.port),
            file: newer.file.clone().or_else(|| self.file.clone()),
        }
    }
}
