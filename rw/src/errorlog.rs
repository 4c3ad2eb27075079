//! Error log sink
//!
//! The event loop's exception handler: one timestamped entry per routed
//! error, appended to the configured error log. The handler must never take
//! down the loop it guards, so write failures go to stderr and stop there.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::error;

/// Append-only error log
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Record one routed task error
    pub fn append(&self, err: &eyre::Report) {
        error!(error = %err, "periodic task failed");

        if let Err(write_err) = self.write_entry(err) {
            eprintln!(
                "roomwatch: failed to write error log {}: {}",
                self.path.display(),
                write_err
            );
        }
    }

    fn write_entry(&self, err: &eyre::Report) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(
            file,
            "[{}] ERROR: {:#}\n",
            Utc::now().format("%Y/%m/%d %H:%M:%S"),
            err
        )
    }

    /// Path this log writes to
    pub fn path(&self) -> &Path {
        &self.path
    }
}
