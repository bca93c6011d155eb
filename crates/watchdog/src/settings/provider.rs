use std::{env, fs, path};

use tracing::{debug, info};

use super::types::Settings;
use crate::error::ConfigError;

/// Directory under the config home holding the settings file
pub const APP_DIR: &str = "tunnel-watchdog";

/// Source of [`Settings`] for the engine.
///
/// Callers decide the fallback policy on error; the monitor loop keeps
/// its last known-good settings.
pub trait SettingsProvider: Send + Sync {
    /// Load the current settings
    fn load(&self) -> Result<Settings, ConfigError>;

    /// Persist settings
    fn save(&self, settings: &Settings) -> Result<(), ConfigError>;

    /// Load settings for a hot reload
    fn reload(&self) -> Result<Settings, ConfigError> {
        self.load()
    }
}

/// On-disk encoding, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Toml,
    Json,
}

/// Ensure the path ends in `.json` or `.toml`, defaulting to toml
fn normalize_settings_path(path: &path::Path) -> (path::PathBuf, SettingsFormat) {
    let mut path = path.to_path_buf();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => (path, SettingsFormat::Json),
        Some("toml") => (path, SettingsFormat::Toml),
        _ => {
            path.set_extension("toml");
            (path, SettingsFormat::Toml)
        }
    }
}

/// Get default settings path ($XDG_CONFIG_HOME/tunnel-watchdog/settings.toml
/// or $HOME/.config/...)
pub fn default_settings_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Some(config_home) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::PathUnavailable);
    };

    Ok(path.join(APP_DIR).join("settings.toml"))
}

/// Settings stored in a TOML or JSON file
#[derive(Debug, Clone)]
pub struct FileSettingsProvider {
    path: path::PathBuf,
    format: SettingsFormat,
}

impl FileSettingsProvider {
    /// Open the settings file, creating it with defaults if it does not exist.
    ///
    /// Fails when no path can be determined or the file cannot be created;
    /// this is the only fatal settings error.
    ///
    /// ```no_run
    /// use watchdog::settings::{FileSettingsProvider, SettingsProvider};
    ///
    /// let provider = FileSettingsProvider::open(None::<&std::path::Path>)?;
    /// println!("{}", provider.load()?);
    /// # Ok::<(), watchdog::ConfigError>(())
    /// ```
    pub fn open(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let requested = match optional_path {
            Some(path) => path.as_ref().to_path_buf(),
            None => default_settings_path()?,
        };
        let (path, format) = normalize_settings_path(&requested);
        let provider = Self { path, format };

        if provider.path.exists() {
            debug!(path = %provider.path.display(), "Using existing settings file");
        } else {
            info!(path = %provider.path.display(), "Settings file missing, writing defaults");
            provider.save(&Settings::default())?;
        }

        Ok(provider)
    }

    pub fn path(&self) -> &path::Path {
        &self.path
    }

    pub fn format(&self) -> SettingsFormat {
        self.format
    }

    fn parse(&self, raw: &str) -> Result<Settings, ConfigError> {
        let parsed = match self.format {
            SettingsFormat::Toml => toml::from_str(raw).map_err(|e| e.to_string()),
            SettingsFormat::Json => serde_json::from_str(raw).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse { path: self.path.clone(), message })
    }

    fn render(&self, settings: &Settings) -> Result<String, ConfigError> {
        match self.format {
            SettingsFormat::Toml => {
                toml::to_string_pretty(settings).map_err(|e| ConfigError::Serialize(e.to_string()))
            }
            SettingsFormat::Json => serde_json::to_string_pretty(settings)
                .map_err(|e| ConfigError::Serialize(e.to_string())),
        }
    }
}

impl SettingsProvider for FileSettingsProvider {
    fn load(&self) -> Result<Settings, ConfigError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "Settings file disappeared, recreating defaults");
            let settings = Settings::default();
            self.save(&settings)?;
            return Ok(settings);
        }

        let raw = fs::read_to_string(&self.path)
            .map_err(|source| ConfigError::Read { path: self.path.clone(), source })?;
        self.parse(&raw)?.validated()
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let rendered = self.render(settings)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::Write { path: self.path.clone(), source })?;
        }

        fs::write(&self.path, rendered)
            .map_err(|source| ConfigError::Write { path: self.path.clone(), source })
    }
}
