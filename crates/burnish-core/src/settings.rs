//! Persistent user settings loaded from a TOML configuration file.
//!
//! Settings live at `<config dir>/burnish/config.toml`. A missing file means
//! defaults; an unreadable or invalid file is reported.

use crate::copy::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings load/validation errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid TOML for this schema.
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field value is outside its permitted range.
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// User-tunable defaults for imaging operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Copy block size in bytes.
    pub block_size: usize,

    /// Skip interactive confirmation prompts.
    pub auto_confirm: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            auto_confirm: false,
        }
    }
}

impl Settings {
    /// Default location of the settings file, when a config dir exists.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join("burnish").join("config.toml"))
    }

    /// Load settings from the default location.
    ///
    /// Missing file yields defaults. An invalid file also yields defaults,
    /// with a warning, so a corrupt config never blocks imaging.
    #[must_use]
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(e) => {
                tracing::warn!("ignoring settings at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Load and validate settings from a specific file.
    ///
    /// # Errors
    ///
    /// [`SettingsError`] when the file is unreadable, unparsable, or fails
    /// validation.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check field ranges.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(SettingsError::Invalid(format!(
                "block_size must be between {MIN_BLOCK_SIZE} and {MAX_BLOCK_SIZE}, got {}",
                self.block_size
            )));
        }
        Ok(())
    }
}
