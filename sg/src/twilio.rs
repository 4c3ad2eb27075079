//! Twilio Messages API backend
//!
//! Sends through the `2010-04-01` Messages endpoint with basic auth and maps
//! the JSON response onto [`MessageRecord`]. Credentials come from the
//! environment so config files never hold secrets.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::backend::SmsBackend;
use crate::error::SmsError;
use crate::record::{MessageRecord, MessageStatus};

/// Environment variable holding the account SID
pub const ENV_ACCOUNT_SID: &str = "TWILIO_ACCOUNT_SID";

/// Environment variable holding the auth token
pub const ENV_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";

/// Environment variable holding the sending phone number
pub const ENV_FROM_NUMBER: &str = "TWILIO_FROM_NUMBER";

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Live SMS backend talking to the Twilio REST API
#[derive(Debug)]
pub struct TwilioBackend {
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
    http: Client,
}

impl TwilioBackend {
    /// Create a backend from the `TWILIO_*` environment variables
    pub fn from_env() -> Result<Self, SmsError> {
        let account_sid = std::env::var(ENV_ACCOUNT_SID).map_err(|_| SmsError::MissingEnv(ENV_ACCOUNT_SID))?;
        let auth_token = std::env::var(ENV_AUTH_TOKEN).map_err(|_| SmsError::MissingEnv(ENV_AUTH_TOKEN))?;
        let from_number = std::env::var(ENV_FROM_NUMBER).map_err(|_| SmsError::MissingEnv(ENV_FROM_NUMBER))?;

        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            account_sid,
            auth_token,
            from_number,
            base_url: DEFAULT_BASE_URL.to_string(),
            http,
        })
    }

    /// Point the backend at a different API host (used by tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.base_url, self.account_sid)
    }
}

#[async_trait]
impl SmsBackend for TwilioBackend {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send(&self, to: &str, body: &str) -> Result<MessageRecord, SmsError> {
        let url = self.messages_url();
        debug!(%to, from = %self.from_number, "sending message via Twilio");

        let params = [("To", to), ("From", self.from_number.as_str()), ("Body", body)];

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            // Error payloads carry {code, message, status}
            let detail: TwilioErrorBody = serde_json::from_str(&text).unwrap_or_default();
            return Err(SmsError::Api {
                status: status.as_u16(),
                code: detail.code,
                message: detail
                    .message
                    .unwrap_or_else(|| format!("Twilio returned status {}", status)),
            });
        }

        let message: TwilioMessage =
            serde_json::from_str(&text).map_err(|e| SmsError::InvalidResponse(e.to_string()))?;
        Ok(message.into_record())
    }
}

/// Error payload returned on non-2xx responses
#[derive(Debug, Default, Deserialize)]
struct TwilioErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

/// Wire shape of a message resource
///
/// Dates arrive RFC 2822 formatted ("Thu, 24 Aug 2023 05:32:00 +0000"),
/// which chrono's serde integration does not handle directly.
#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
    status: MessageStatus,
    #[serde(default)]
    date_created: Option<String>,
    #[serde(default)]
    date_sent: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
}

impl TwilioMessage {
    fn into_record(self) -> MessageRecord {
        MessageRecord {
            sid: self.sid,
            status: self.status,
            date_created: self.date_created.as_deref().and_then(parse_rfc2822),
            date_sent: self.date_sent.as_deref().and_then(parse_rfc2822),
            error_code: self.error_code,
            error_message: self.error_message,
        }
    }
}

fn parse_rfc2822(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_url_includes_account_sid() {
        let backend = TwilioBackend {
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            from_number: "+15005550006".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: Client::new(),
        };

        assert_eq!(
            backend.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[test]
    fn test_parse_queued_response() {
        let json = r#"{
            "sid": "SMabc123",
            "status": "queued",
            "date_created": "Thu, 24 Aug 2023 05:32:00 +0000",
            "date_sent": null,
            "error_code": null,
            "error_message": null,
            "to": "+254700000000",
            "from": "+15005550006"
        }"#;

        let message: TwilioMessage = serde_json::from_str(json).unwrap();
        let record = message.into_record();

        assert_eq!(record.sid, "SMabc123");
        assert_eq!(record.status, MessageStatus::Queued);
        assert!(record.date_created.is_some());
        assert!(record.date_sent.is_none());
        assert!(record.error_code.is_none());
    }

    #[test]
    fn test_parse_failed_response_keeps_error_fields() {
        let json = r#"{
            "sid": "SMdef456",
            "status": "failed",
            "date_created": "Thu, 24 Aug 2023 05:32:00 +0000",
            "date_sent": "Thu, 24 Aug 2023 05:32:03 +0000",
            "error_code": 30008,
            "error_message": "Unknown error"
        }"#;

        let record = serde_json::from_str::<TwilioMessage>(json).unwrap().into_record();

        assert!(record.is_failure());
        assert_eq!(record.error_code, Some(30008));
        assert_eq!(record.error_message.as_deref(), Some("Unknown error"));
        assert!(record.date_sent.is_some());
    }

    #[test]
    fn test_error_body_parses_twilio_shape() {
        let json = r#"{"code": 21211, "message": "Invalid 'To' phone number", "status": 400}"#;
        let body: TwilioErrorBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.code, Some(21211));
        assert!(body.message.unwrap().contains("Invalid"));
    }

    #[test]
    fn test_rfc2822_parsing() {
        let parsed = parse_rfc2822("Thu, 24 Aug 2023 05:32:00 +0000").unwrap();
        assert_eq!(parsed.timezone(), chrono::Utc);
        assert!(parse_rfc2822("not a date").is_none());
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_requires_credentials() {
        // SAFETY: test runs serially; no other thread reads these vars
        unsafe {
            std::env::remove_var(ENV_ACCOUNT_SID);
            std::env::remove_var(ENV_AUTH_TOKEN);
            std::env::remove_var(ENV_FROM_NUMBER);
        }

        let err = TwilioBackend::from_env().unwrap_err();
        assert!(matches!(err, SmsError::MissingEnv(ENV_ACCOUNT_SID)));
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_reads_all_three_vars() {
        // SAFETY: test runs serially; no other thread reads these vars
        unsafe {
            std::env::set_var(ENV_ACCOUNT_SID, "AC999");
            std::env::set_var(ENV_AUTH_TOKEN, "secret");
            std::env::set_var(ENV_FROM_NUMBER, "+15005550006");
        }

        let backend = TwilioBackend::from_env().unwrap();
        assert_eq!(backend.account_sid, "AC999");
        assert_eq!(backend.from_number, "+15005550006");

        unsafe {
            std::env::remove_var(ENV_ACCOUNT_SID);
            std::env::remove_var(ENV_AUTH_TOKEN);
            std::env::remove_var(ENV_FROM_NUMBER);
        }
    }
}
