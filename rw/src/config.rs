//! Roomwatch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main roomwatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Portal session configuration
    pub portal: PortalConfig,

    /// Polling loop configuration
    #[serde(rename = "loop")]
    pub poll: LoopConfig,

    /// Notification configuration
    pub sms: SmsConfig,

    /// Log destinations
    pub logs: LogsConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that required environment variables are set so the daemon
    /// fails fast with clear error messages instead of mid-cycle.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.portal.reg_no_env).is_err() {
            return Err(eyre::eyre!(
                "Portal registration number not found. Set the {} environment variable.",
                self.portal.reg_no_env
            ));
        }
        if std::env::var(&self.portal.password_env).is_err() {
            return Err(eyre::eyre!(
                "Portal password not found. Set the {} environment variable.",
                self.portal.password_env
            ));
        }

        match self.sms.backend.as_str() {
            "console" => {}
            "twilio" => {
                if self.sms.recipient.is_empty() {
                    return Err(eyre::eyre!("sms.recipient must be set when the twilio backend is selected"));
                }
                for var in [
                    smsgate::twilio::ENV_ACCOUNT_SID,
                    smsgate::twilio::ENV_AUTH_TOKEN,
                    smsgate::twilio::ENV_FROM_NUMBER,
                ] {
                    if std::env::var(var).is_err() {
                        return Err(eyre::eyre!(
                            "Twilio credentials not found. Set the {} environment variable.",
                            var
                        ));
                    }
                }
            }
            other => {
                return Err(eyre::eyre!("Unknown sms backend '{}'. Valid: console, twilio", other));
            }
        }

        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .roomwatch.yml
        let local_config = PathBuf::from(".roomwatch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/roomwatch/roomwatch.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("roomwatch").join("roomwatch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Portal session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Portal root URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the login page relative to the root
    #[serde(rename = "login-path")]
    pub login_path: String,

    /// Path of the room booking page
    #[serde(rename = "booking-path")]
    pub booking_path: String,

    /// Query string appended to the booking page to select the session
    #[serde(rename = "session-query")]
    pub session_query: String,

    /// Name of the registration number input on the login form
    #[serde(rename = "reg-no-field")]
    pub reg_no_field: String,

    /// Name of the password input on the login form
    #[serde(rename = "password-field")]
    pub password_field: String,

    /// Environment variable holding the registration number
    #[serde(rename = "reg-no-env")]
    pub reg_no_env: String,

    /// Environment variable holding the portal password
    #[serde(rename = "password-env")]
    pub password_env: String,

    /// Delay between page loads in milliseconds
    #[serde(rename = "click-delay-ms")]
    pub click_delay_ms: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://smis.uonbi.ac.ke".to_string(),
            login_path: "/".to_string(),
            booking_path: "/hamis/bookroom.php".to_string(),
            session_query: "session=in".to_string(),
            reg_no_field: "regNo".to_string(),
            password_field: "smisPass".to_string(),
            reg_no_env: "SMIS_REG_NO".to_string(),
            password_env: "SMIS_PASS".to_string(),
            click_delay_ms: 5000,
        }
    }
}

impl PortalConfig {
    /// Delay between page loads
    pub fn click_delay(&self) -> Duration {
        Duration::from_millis(self.click_delay_ms)
    }

    /// Booking page path with the session query appended
    pub fn session_path(&self) -> String {
        if self.session_query.is_empty() {
            self.booking_path.clone()
        } else {
            format!("{}?{}", self.booking_path, self.session_query)
        }
    }
}

/// Polling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Seconds between cycles
    #[serde(rename = "interval-secs")]
    pub interval_secs: u64,

    /// Swallow unhandled task errors instead of exiting
    #[serde(rename = "suppress-errors")]
    pub suppress_errors: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            suppress_errors: false,
        }
    }
}

impl LoopConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    /// Backend name (console, twilio)
    pub backend: String,

    /// Recipient phone number (E.164)
    pub recipient: String,

    /// Message body sent when the booking opens
    pub body: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            backend: "console".to_string(),
            recipient: String::new(),
            body: "Room booking is open. Go book your room now!".to_string(),
        }
    }
}

/// Log destinations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Directory for log files (default: platform data dir)
    pub dir: Option<PathBuf>,

    /// Message log file name
    #[serde(rename = "message-log")]
    pub message_log: String,

    /// Error log file name
    #[serde(rename = "error-log")]
    pub error_log: String,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: Option<String>,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            message_log: "messages.log".to_string(),
            error_log: "roomwatch.error.log".to_string(),
            level: None,
        }
    }
}

impl LogsConfig {
    /// Resolved log directory
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("roomwatch")
                .join("logs")
        })
    }

    pub fn message_log_path(&self) -> PathBuf {
        self.dir().join(&self.message_log)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.dir().join(&self.error_log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.portal.reg_no_field, "regNo");
        assert_eq!(config.poll.interval_secs, 600);
        assert_eq!(config.sms.backend, "console");
        assert!(!config.poll.suppress_errors);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
portal:
  base-url: https://portal.example.ac.ke
  booking-path: /rooms/book.php
  session-query: "session=in&AcademicYear=2025/2026"
  click-delay-ms: 1000

loop:
  interval-secs: 120
  suppress-errors: true

sms:
  backend: twilio
  recipient: "+254700000000"
  body: "It is open"

logs:
  error-log: errors.log
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.portal.base_url, "https://portal.example.ac.ke");
        assert_eq!(config.portal.click_delay_ms, 1000);
        assert_eq!(config.poll.interval_secs, 120);
        assert!(config.poll.suppress_errors);
        assert_eq!(config.sms.backend, "twilio");
        assert_eq!(config.sms.recipient, "+254700000000");
        assert_eq!(config.logs.error_log, "errors.log");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
loop:
  interval-secs: 60
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.poll.interval_secs, 60);

        // Defaults for unspecified
        assert_eq!(config.portal.base_url, "https://smis.uonbi.ac.ke");
        assert_eq!(config.sms.backend, "console");
        assert_eq!(config.logs.message_log, "messages.log");
    }

    #[test]
    fn test_session_path_composition() {
        let mut portal = PortalConfig::default();
        assert_eq!(portal.session_path(), "/hamis/bookroom.php?session=in");

        portal.session_query = String::new();
        assert_eq!(portal.session_path(), "/hamis/bookroom.php");
    }

    #[test]
    fn test_logs_paths_use_configured_dir() {
        let config = LogsConfig {
            dir: Some(PathBuf::from("/tmp/rwlogs")),
            ..Default::default()
        };

        assert_eq!(config.message_log_path(), PathBuf::from("/tmp/rwlogs/messages.log"));
        assert_eq!(config.error_log_path(), PathBuf::from("/tmp/rwlogs/roomwatch.error.log"));
    }

    #[test]
    #[serial_test::serial]
    fn test_validate_rejects_unknown_backend() {
        // SAFETY: test runs serially; no other thread reads these vars
        unsafe {
            std::env::set_var("SMIS_REG_NO", "X75/1234/2020");
            std::env::set_var("SMIS_PASS", "hunter2");
        }

        let mut config = Config::default();
        config.sms.backend = "carrier-pigeon".to_string();
        assert!(config.validate().is_err());

        config.sms.backend = "console".to_string();
        assert!(config.validate().is_ok());

        unsafe {
            std::env::remove_var("SMIS_REG_NO");
            std::env::remove_var("SMIS_PASS");
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_validate_requires_portal_credentials() {
        // SAFETY: test runs serially; no other thread reads these vars
        unsafe {
            std::env::remove_var("SMIS_REG_NO");
            std::env::remove_var("SMIS_PASS");
        }

        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SMIS_REG_NO"));
    }

    #[test]
    #[serial_test::serial]
    fn test_validate_twilio_needs_recipient_and_credentials() {
        // SAFETY: test runs serially; no other thread reads these vars
        unsafe {
            std::env::set_var("SMIS_REG_NO", "X75/1234/2020");
            std::env::set_var("SMIS_PASS", "hunter2");
            std::env::remove_var(smsgate::twilio::ENV_ACCOUNT_SID);
        }

        let mut config = Config::default();
        config.sms.backend = "twilio".to_string();

        // No recipient
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("recipient"));

        // Recipient but no credentials
        config.sms.recipient = "+254700000000".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TWILIO_ACCOUNT_SID"));

        unsafe {
            std::env::remove_var("SMIS_REG_NO");
            std::env::remove_var("SMIS_PASS");
        }
    }
}
