/// Settings module - configuration schema and its persistence
pub mod provider;
pub mod types;

pub use provider::{FileSettingsProvider, SettingsFormat, SettingsProvider, default_settings_path};
pub use types::Settings;
