//! Messenger facade and the message log sink
//!
//! Every send that produces a record leaves exactly one entry in the message
//! log, keyed by outcome: ordinary records at info level with their dates,
//! failed records at error level with their error code and message.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::backend::{ConsoleBackend, SmsBackend};
use crate::error::SmsError;
use crate::record::MessageRecord;

/// Append-only log of delivery outcomes, one JSON line per record
pub struct MessageLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl MessageLog {
    /// Create a log that writes to `path`; the file is opened on first use
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
        }
    }

    /// Record one delivery outcome
    ///
    /// Write failures are downgraded to warnings so a full disk cannot turn
    /// a delivered message into a reported error.
    pub fn record(&mut self, record: &MessageRecord) {
        if record.is_failure() {
            error!(
                sid = %record.sid,
                status = %record.status,
                error_code = ?record.error_code,
                error_message = ?record.error_message,
                "message delivery failed"
            );
        } else {
            info!(
                sid = %record.sid,
                status = %record.status,
                date_created = ?record.date_created,
                date_sent = ?record.date_sent,
                "message sent"
            );
        }

        if let Err(e) = self.append(record) {
            warn!(path = ?self.path, error = %e, "failed to append to message log");
        }
    }

    fn append(&mut self, record: &MessageRecord) -> eyre::Result<()> {
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
                debug!(path = ?self.path, "opened message log");
                self.writer.insert(BufWriter::new(file))
            }
        };

        let entry = if record.is_failure() {
            serde_json::json!({
                "at": Utc::now(),
                "level": "error",
                "sid": &record.sid,
                "status": &record.status,
                "error_code": record.error_code,
                "error_message": &record.error_message,
            })
        } else {
            serde_json::json!({
                "at": Utc::now(),
                "level": "info",
                "sid": &record.sid,
                "status": &record.status,
                "date_created": record.date_created,
                "date_sent": record.date_sent,
            })
        };

        writeln!(writer, "{}", entry)?;
        writer.flush()?;
        Ok(())
    }
}

/// Sends messages through a selected backend and logs every outcome
pub struct Messenger {
    backend: Box<dyn SmsBackend>,
    log: MessageLog,
}

impl Messenger {
    /// Create a messenger over an explicit backend
    pub fn new(backend: Box<dyn SmsBackend>, log: MessageLog) -> Self {
        Self { backend, log }
    }

    /// Messenger that prints to the console, for local runs and tests
    pub fn console(log: MessageLog) -> Self {
        Self::new(Box::new(ConsoleBackend), log)
    }

    /// Name of the backend in use
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Send `body` to `to` and record the outcome
    pub async fn send_message(&mut self, to: &str, body: &str) -> Result<MessageRecord, SmsError> {
        let record = self.backend.send(to, body).await?;
        self.log.record(&record);
        Ok(record)
    }
}
