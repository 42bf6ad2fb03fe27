//! Application settings management
//!
//! Stores prompt text and subsystem commands in a plain JSON file next to the
//! preference store.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::auth::{CommandSpec, PromptRequest};
use crate::error::{BioauthError, Result};

/// Settings file name inside the data directory
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Commands backing the external-command subsystem
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubsystemSettings {
    /// Capability probe; absent means always available
    pub probe_command: Option<CommandSpec>,
    /// Prompt command; absent means no subsystem is configured
    pub prompt_command: Option<CommandSpec>,
}

impl SubsystemSettings {
    /// Whether a prompt command has been configured
    pub fn is_configured(&self) -> bool {
        self.prompt_command.is_some()
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Settings file version
    pub version: u32,
    /// Text shown on the biometric prompt
    #[serde(default)]
    pub prompt: PromptRequest,
    /// External-command subsystem configuration
    #[serde(default)]
    pub subsystem: SubsystemSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            prompt: PromptRequest::default(),
            subsystem: SubsystemSettings::default(),
        }
    }
}

/// Get the default data directory
pub fn default_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("org", "bioauth", "bioauth")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(BioauthError::DataDirUnavailable)
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: Settings,
}

impl SettingsManager {
    /// Load settings from `data_dir`, falling back to defaults
    pub fn new(data_dir: &Path) -> Self {
        let settings_file = data_dir.join(SETTINGS_FILE_NAME);
        let settings = match Self::load_from_file(&settings_file) {
            Ok(settings) => settings,
            Err(e) => {
                debug!("Ignoring unreadable settings file: {}", e);
                Settings::default()
            }
        };

        Self {
            settings_file,
            settings,
        }
    }

    /// Load settings from file
    fn load_from_file(path: &Path) -> Result<Settings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.settings_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(&self.settings)?;

        // Write atomically using temp file
        let temp_path = self.settings_file.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.settings_file).await?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    /// Get current settings
    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Get mutable settings
    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Update settings and save
    pub async fn update(&mut self, settings: Settings) -> Result<()> {
        self.settings = settings;
        self.save().await
    }

    /// Path of the settings file
    pub fn path(&self) -> &Path {
        &self.settings_file
    }
}
