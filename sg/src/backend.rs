//! SMS backend trait and the console test backend

use async_trait::async_trait;
use chrono::Utc;

use crate::error::SmsError;
use crate::record::{MessageRecord, MessageStatus};

/// A transport capable of delivering an SMS to a recipient
///
/// Implementations return one [`MessageRecord`] per send attempt; transport
/// and API failures surface as [`SmsError`].
#[async_trait]
pub trait SmsBackend: Send + Sync {
    /// Short backend name for logs and CLI output
    fn name(&self) -> &str;

    /// Deliver `body` to `to`, returning the provider's view of the send
    async fn send(&self, to: &str, body: &str) -> Result<MessageRecord, SmsError>;
}

/// Backend that prints messages to stdout instead of sending them
///
/// The default when nothing is configured, and the test double.
#[derive(Debug, Default)]
pub struct ConsoleBackend;

#[async_trait]
impl SmsBackend for ConsoleBackend {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, to: &str, body: &str) -> Result<MessageRecord, SmsError> {
        println!("to: {}, body: {}", to, body);

        let now = Utc::now();
        Ok(MessageRecord {
            sid: uuid::Uuid::now_v7().to_string(),
            status: MessageStatus::Delivered,
            date_created: Some(now),
            date_sent: Some(now),
            error_code: None,
            error_message: None,
        })
    }
}
