//! Message delivery records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery lifecycle status reported by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Accepted,
    Sending,
    Sent,
    Delivered,
    Undelivered,
    Failed,
    /// Any status string this crate does not know about
    #[serde(untagged)]
    Other(String),
}

impl MessageStatus {
    /// Statuses that mean the message will not arrive
    pub fn is_failure(&self) -> bool {
        matches!(self, MessageStatus::Failed | MessageStatus::Undelivered)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::Queued => write!(f, "queued"),
            MessageStatus::Accepted => write!(f, "accepted"),
            MessageStatus::Sending => write!(f, "sending"),
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Undelivered => write!(f, "undelivered"),
            MessageStatus::Failed => write!(f, "failed"),
            MessageStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// The result of one send attempt
///
/// Mirrors what SMS providers return: an identifier, a status, creation and
/// send timestamps, and the error fields populated when delivery went wrong.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Provider-assigned message identifier
    pub sid: String,

    /// Delivery status at the time the provider answered
    pub status: MessageStatus,

    /// When the provider created the message resource
    pub date_created: Option<DateTime<Utc>>,

    /// When the message was handed to the carrier (None until sent)
    pub date_sent: Option<DateTime<Utc>>,

    /// Provider error code, set on failures
    pub error_code: Option<i64>,

    /// Human-readable error description, set on failures
    pub error_message: Option<String>,
}

impl MessageRecord {
    /// Whether this record describes a failed delivery
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_failure_classification() {
        assert!(MessageStatus::Failed.is_failure());
        assert!(MessageStatus::Undelivered.is_failure());
        assert!(!MessageStatus::Queued.is_failure());
        assert!(!MessageStatus::Delivered.is_failure());
        assert!(!MessageStatus::Other("weird".to_string()).is_failure());
    }

    #[test]
    fn test_status_roundtrip_known() {
        let status: MessageStatus = serde_json::from_str("\"delivered\"").unwrap();
        assert_eq!(status, MessageStatus::Delivered);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"delivered\"");
    }

    #[test]
    fn test_status_unknown_falls_through() {
        let status: MessageStatus = serde_json::from_str("\"partially_delivered\"").unwrap();
        assert_eq!(status, MessageStatus::Other("partially_delivered".to_string()));
        assert_eq!(status.to_string(), "partially_delivered");
    }

    #[test]
    fn test_record_failure_mirrors_status() {
        let record = MessageRecord {
            sid: "SM123".to_string(),
            status: MessageStatus::Failed,
            date_created: Some(Utc::now()),
            date_sent: None,
            error_code: Some(30008),
            error_message: Some("Unknown error".to_string()),
        };
        assert!(record.is_failure());
    }
}
