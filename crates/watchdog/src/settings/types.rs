//! Settings data model and validation.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::error::ConfigError;
use crate::recovery::{RecoveryAction, RecoveryCategory};

pub const DEFAULT_TARGET_URL: &str = "https://example.com";
pub const DEFAULT_CHECK_INTERVAL: u64 = 30;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 2;
pub const DEFAULT_PROBE_TIMEOUT: u64 = 10;
pub const DEFAULT_RETRY_DELAY: u64 = 2;
pub const DEFAULT_COMMAND_TIMEOUT: u64 = 120;

/// Upper bound on the delay between failed probe attempts
pub const MAX_RETRY_DELAY: u64 = 60;

/// Watchdog settings as persisted by a [`SettingsProvider`](super::SettingsProvider).
///
/// Missing fields take their defaults and unknown fields are ignored, so
/// settings files written by older versions keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// URL whose health is monitored
    pub target_url: String,

    /// Seconds between the start of two checks
    pub check_interval: u64,

    /// Consecutive failed checks before remediation runs
    #[serde(alias = "retries")]
    pub failure_threshold: u32,

    /// Attempts per check before it counts as failed
    pub probe_attempts: u32,

    /// Per-attempt timeout in seconds
    pub probe_timeout: u64,

    /// Seconds to wait between failed attempts
    pub retry_delay: u64,

    /// Seconds a single recovery command may run before it is killed
    pub command_timeout: u64,

    /// Endpoint used to tell "network down" apart from "target down"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectivity_url: Option<String>,

    /// Send transitions to the notifier
    pub notify: bool,

    /// Commands run when the target is down but the network works
    pub on_site_fail: Vec<String>,

    /// Commands run when the network itself is unreachable
    pub on_wifi_fail: Vec<String>,

    /// Commands run when the target becomes healthy again
    pub on_recovery: Vec<String>,

    /// Legacy catch-all failure commands
    pub on_fail: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.into(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            probe_attempts: DEFAULT_PROBE_ATTEMPTS,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connectivity_url: None,
            notify: true,
            on_site_fail: Vec::new(),
            on_wifi_fail: Vec::new(),
            on_recovery: Vec::new(),
            on_fail: Vec::new(),
        }
    }
}

impl Settings {
    /// Validate and normalize freshly loaded settings.
    ///
    /// Out-of-range numbers are clamped (with a warning) so the loop can
    /// never spin without delay. A missing or non-http(s) URL is rejected.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.target_url = self.target_url.trim().to_string();
        validate_url("target_url", &self.target_url)?;

        self.connectivity_url = self
            .connectivity_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        if let Some(url) = &self.connectivity_url {
            validate_url("connectivity_url", url)?;
        }

        clamp_min("check_interval", &mut self.check_interval, 1);
        clamp_min("failure_threshold", &mut self.failure_threshold, 1);
        clamp_min("probe_attempts", &mut self.probe_attempts, 1);
        clamp_min("probe_timeout", &mut self.probe_timeout, 1);
        clamp_min("command_timeout", &mut self.command_timeout, 1);

        if self.retry_delay > MAX_RETRY_DELAY {
            warn!(
                field = "retry_delay",
                value = self.retry_delay,
                max = MAX_RETRY_DELAY,
                "Setting above maximum, clamping"
            );
            self.retry_delay = MAX_RETRY_DELAY;
        }

        for list in [&mut self.on_site_fail, &mut self.on_wifi_fail, &mut self.on_recovery, &mut self.on_fail] {
            list.retain(|command| !command.trim().is_empty());
        }

        Ok(self)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay.min(MAX_RETRY_DELAY))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout.max(1))
    }

    /// Command list configured for a category, before the legacy fallback
    pub fn commands(&self, category: RecoveryCategory) -> &[String] {
        match category {
            RecoveryCategory::SiteDown => &self.on_site_fail,
            RecoveryCategory::WifiDown => &self.on_wifi_fail,
            RecoveryCategory::Recovery => &self.on_recovery,
        }
    }

    /// Commands to run for a category.
    ///
    /// Failure categories use the legacy `on_fail` list only while both
    /// `on_site_fail` and `on_wifi_fail` are empty.
    pub fn recovery_actions(&self, category: RecoveryCategory) -> Vec<RecoveryAction> {
        let commands: &[String] = match category {
            RecoveryCategory::SiteDown | RecoveryCategory::WifiDown => {
                if self.on_site_fail.is_empty() && self.on_wifi_fail.is_empty() {
                    &self.on_fail
                } else {
                    self.commands(category)
                }
            }
            RecoveryCategory::Recovery => &self.on_recovery,
        };

        commands.iter().map(|command| RecoveryAction::new(category, command.clone())).collect()
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must not be empty")));
    }

    let url = Url::parse(value).map_err(|e| ConfigError::Invalid(format!("{field} `{value}`: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!("{field} must use http or https, got `{other}`"))),
    }
}

fn clamp_min<T>(field: &str, value: &mut T, min: T)
where
    T: PartialOrd + Copy + fmt::Display,
{
    if *value < min {
        warn!(field, value = %value, min = %min, "Setting below minimum, clamping");
        *value = min;
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "{:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };
        let write_commands = |f: &mut fmt::Formatter<'_>, label: &str, commands: &[String]| -> fmt::Result {
            if commands.is_empty() {
                writeln!(f, "    {label}: (none)")
            } else {
                writeln!(f, "    {label}:")?;
                commands.iter().try_for_each(|command| writeln!(f, "      - {command}"))
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Watchdog Settings:")?;
        write_title_1(f, "Probe")?;
        write_2(f, "Target URL", &self.target_url)?;
        write_2(f, "Connectivity URL", &self.connectivity_url.as_deref().unwrap_or("(disabled)"))?;
        write_2(f, "Check Interval", &format!("{}s", self.check_interval))?;
        write_2(f, "Attempts", &self.probe_attempts)?;
        write_2(f, "Attempt Timeout", &format!("{}s", self.probe_timeout))?;
        write_2(f, "Retry Delay", &format!("{}s", self.retry_delay))?;
        write_title_1(f, "Remediation")?;
        write_2(f, "Failure Threshold", &self.failure_threshold)?;
        write_2(f, "Command Timeout", &format!("{}s", self.command_timeout))?;
        write_2(f, "Notifications", &self.notify)?;
        write_commands(f, "on_site_fail", &self.on_site_fail)?;
        write_commands(f, "on_wifi_fail", &self.on_wifi_fail)?;
        write_commands(f, "on_recovery", &self.on_recovery)?;
        write_commands(f, "on_fail", &self.on_fail)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.target_url, "https://example.com");
        assert_eq!(settings.check_interval, 30);
        assert_eq!(settings.failure_threshold, 3);
        assert!(settings.on_site_fail.is_empty());
        assert!(settings.on_wifi_fail.is_empty());
        assert!(settings.on_recovery.is_empty());
        assert!(settings.on_fail.is_empty());
    }

    #[test]
    fn test_missing_and_unknown_fields() {
        let settings: Settings = serde_json::from_str(
            r#"{ "target_url": "https://x.test", "theme": "dark", "on_recovery": ["echo up"] }"#,
        )
        .unwrap();

        assert_eq!(settings.target_url, "https://x.test");
        assert_eq!(settings.check_interval, DEFAULT_CHECK_INTERVAL);
        assert_eq!(settings.failure_threshold, DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(settings.on_recovery, vec!["echo up".to_string()]);
    }

    #[test]
    fn test_retries_alias() {
        let settings: Settings = toml::from_str("target_url = \"https://x.test\"\nretries = 5\n").unwrap();
        assert_eq!(settings.failure_threshold, 5);
    }

    #[test]
    fn test_validated_clamps_zero_values() {
        let settings = Settings {
            check_interval: 0,
            failure_threshold: 0,
            probe_attempts: 0,
            probe_timeout: 0,
            command_timeout: 0,
            retry_delay: 3600,
            ..Settings::default()
        }
        .validated()
        .unwrap();

        assert_eq!(settings.check_interval, 1);
        assert_eq!(settings.failure_threshold, 1);
        assert_eq!(settings.probe_attempts, 1);
        assert_eq!(settings.probe_timeout, 1);
        assert_eq!(settings.command_timeout, 1);
        assert_eq!(settings.retry_delay, MAX_RETRY_DELAY);
    }

    #[test]
    fn test_validated_rejects_bad_urls() {
        let empty = Settings { target_url: "  ".into(), ..Settings::default() };
        assert!(matches!(empty.validated(), Err(ConfigError::Invalid(_))));

        let ftp = Settings { target_url: "ftp://example.com".into(), ..Settings::default() };
        assert!(matches!(ftp.validated(), Err(ConfigError::Invalid(_))));

        let garbage = Settings { target_url: "not a url".into(), ..Settings::default() };
        assert!(garbage.validated().is_err());

        let bad_connectivity =
            Settings { connectivity_url: Some("gopher://1.1.1.1".into()), ..Settings::default() };
        assert!(bad_connectivity.validated().is_err());
    }

    #[test]
    fn test_validated_normalizes() {
        let settings = Settings {
            target_url: " https://x.test ".into(),
            connectivity_url: Some("".into()),
            on_site_fail: vec!["".into(), "systemctl restart cloudflared".into()],
            ..Settings::default()
        }
        .validated()
        .unwrap();

        assert_eq!(settings.target_url, "https://x.test");
        assert_eq!(settings.connectivity_url, None);
        assert_eq!(settings.on_site_fail, vec!["systemctl restart cloudflared".to_string()]);
    }

    #[test]
    fn test_recovery_actions_fallback() {
        let settings = Settings {
            on_site_fail: vec!["restart tunnel".into()],
            on_fail: vec!["legacy".into()],
            ..Settings::default()
        };

        let site: Vec<_> = settings
            .recovery_actions(RecoveryCategory::SiteDown)
            .into_iter()
            .map(|a| a.command)
            .collect();
        assert_eq!(site, vec!["restart tunnel"]);

        // a site list is configured, so the legacy list stays unused
        assert!(settings.recovery_actions(RecoveryCategory::WifiDown).is_empty());
        assert!(settings.recovery_actions(RecoveryCategory::Recovery).is_empty());

        let legacy_only = Settings { on_fail: vec!["legacy".into()], ..Settings::default() };
        let wifi = legacy_only.recovery_actions(RecoveryCategory::WifiDown);
        assert_eq!(wifi.len(), 1);
        assert_eq!(wifi[0].command, "legacy");
        assert_eq!(wifi[0].category, RecoveryCategory::WifiDown);
        assert_eq!(legacy_only.recovery_actions(RecoveryCategory::SiteDown)[0].command, "legacy");
    }

    #[test]
    fn test_recovery_never_falls_back_to_on_fail() {
        let settings = Settings { on_fail: vec!["legacy".into()], ..Settings::default() };
        assert!(settings.recovery_actions(RecoveryCategory::Recovery).is_empty());
    }

    #[test]
    fn test_display_lists_commands() {
        let settings = Settings { on_recovery: vec!["echo up".into()], ..Settings::default() };
        let rendered = settings.to_string();

        assert!(rendered.contains("Target URL: https://example.com"));
        assert!(rendered.contains("on_recovery:\n      - echo up"));
        assert!(rendered.contains("on_fail: (none)"));
    }
}
