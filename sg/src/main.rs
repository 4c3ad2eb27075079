use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::path::PathBuf;

use smsgate::cli::{BackendKind, Cli, Command};
use smsgate::{ConsoleBackend, MessageLog, Messenger, SmsBackend, TwilioBackend};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smsgate")
        .join("messages.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let log_path = cli.log_file.clone().unwrap_or_else(default_log_path);

    match cli.command {
        Command::Send { to, body, backend } => {
            let backend: Box<dyn SmsBackend> = match backend {
                BackendKind::Console => Box::new(ConsoleBackend),
                BackendKind::Twilio => Box::new(TwilioBackend::from_env().context("Twilio backend unavailable")?),
            };

            info!("sending via {} backend", backend.name());
            let mut messenger = Messenger::new(backend, MessageLog::new(&log_path));
            let record = messenger.send_message(&to, &body).await?;

            if record.is_failure() {
                println!("{} Delivery failed: {}", "✗".red(), record.sid.cyan());
                if let Some(code) = record.error_code {
                    println!("  Error code: {}", code);
                }
                if let Some(message) = &record.error_message {
                    println!("  Error: {}", message);
                }
                std::process::exit(1);
            }

            println!("{} Message {}: {}", "✓".green(), record.status, record.sid.cyan());
            if let Some(created) = record.date_created {
                println!("  Created: {}", created);
            }
            if let Some(sent) = record.date_sent {
                println!("  Sent: {}", sent);
            }
        }
    }

    Ok(())
}
