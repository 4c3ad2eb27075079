//! CLI argument parsing for smsgate

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sg")]
#[command(author, version, about = "Send SMS messages with pluggable backends", long_about = None)]
pub struct Cli {
    /// Path to the message log file (defaults to the platform data dir)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single message and print the delivery record
    Send {
        /// Recipient phone number (E.164, e.g. +254700000000)
        #[arg(short, long, required = true)]
        to: String,

        /// Message body
        #[arg(short, long, required = true)]
        body: String,

        /// Backend to send through
        #[arg(long, value_enum, default_value = "console")]
        backend: BackendKind,
    },
}

/// Which backend the CLI should construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Print to stdout, fabricate a delivered record
    Console,
    /// Twilio Messages API (needs TWILIO_* environment variables)
    Twilio,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_parses_required_args() {
        let cli = Cli::try_parse_from(["sg", "send", "--to", "+254700000000", "--body", "hi"]).unwrap();
        let Command::Send { to, body, backend } = cli.command;
        assert_eq!(to, "+254700000000");
        assert_eq!(body, "hi");
        assert_eq!(backend, BackendKind::Console);
    }

    #[test]
    fn test_backend_flag() {
        let cli = Cli::try_parse_from(["sg", "send", "-t", "+1", "-b", "x", "--backend", "twilio"]).unwrap();
        let Command::Send { backend, .. } = cli.command;
        assert_eq!(backend, BackendKind::Twilio);
    }

    #[test]
    fn test_send_requires_recipient() {
        assert!(Cli::try_parse_from(["sg", "send", "--body", "hi"]).is_err());
    }
}
