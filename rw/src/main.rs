//! Roomwatch - portal room-booking watcher
//!
//! CLI entry point for the polling daemon and one-shot checks.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{info, warn};

use roomwatch::checker::{BookingChecker, CheckOutcome};
use roomwatch::cli::{Cli, Command, DaemonCommand, OutputFormat};
use roomwatch::config::Config;
use roomwatch::daemon::DaemonManager;
use roomwatch::errorlog::ErrorLog;
use roomwatch::eventloop::EventLoop;
use smsgate::{ConsoleBackend, MessageLog, Messenger, SmsBackend, TwilioBackend};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, log_dir: Option<&Path>) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level_str = cli_log_level.or(config_log_level);
    let level = if let Some(s) = level_str {
        match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        }
    } else {
        tracing::Level::INFO
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match log_dir {
        // Daemon mode: write to a file under the logs directory
        Some(dir) => {
            fs::create_dir_all(dir).context("Failed to create log directory")?;
            let log_file = fs::File::create(dir.join("roomwatch.log")).context("Failed to create log file")?;

            tracing_subscriber::fmt()
                .with_writer(log_file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        // Interactive commands log to stderr
        None => {
            tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(filter).init();
        }
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Only the daemon body logs to a file; everything else goes to stderr
    let log_dir = match cli.command {
        Some(Command::RunDaemon) => Some(config.logs.dir()),
        _ => None,
    };
    setup_logging(cli.log_level.as_deref(), config.logs.level.as_deref(), log_dir.as_deref())
        .context("Failed to setup logging")?;

    // Dispatch command
    match cli.command {
        Some(Command::Daemon { command }) => match command {
            DaemonCommand::Start { foreground } => cmd_start(&config, foreground).await,
            DaemonCommand::Stop => cmd_stop().await,
            DaemonCommand::Status { format } => cmd_status(format).await,
        },
        Some(Command::RunDaemon) => cmd_run_daemon(&config).await,
        Some(Command::Logs { follow, lines }) => cmd_logs(&config, follow, lines).await,
        // Default: a single foreground check
        Some(Command::Check) | None => cmd_check(&config).await,
    }
}

/// Start the daemon
async fn cmd_start(config: &Config, foreground: bool) -> Result<()> {
    let daemon = DaemonManager::new();

    if daemon.is_running() {
        if let Some(pid) = daemon.running_pid() {
            println!("Roomwatch is already running (PID: {})", pid);
        } else {
            println!("Roomwatch is already running");
        }
        return Ok(());
    }

    if foreground {
        println!("Starting roomwatch in foreground mode...");
        run_daemon(config).await
    } else {
        let pid = daemon.start()?;
        println!("Roomwatch started (PID: {})", pid);
        Ok(())
    }
}

/// Stop the daemon
async fn cmd_stop() -> Result<()> {
    let daemon = DaemonManager::new();

    if !daemon.is_running() {
        println!("Roomwatch is not running");
        return Ok(());
    }

    let pid = daemon.running_pid();
    daemon.stop()?;
    if let Some(pid) = pid {
        println!("Roomwatch stopped (was PID: {})", pid);
    } else {
        println!("Roomwatch stopped");
    }
    Ok(())
}

/// Show daemon status
async fn cmd_status(format: OutputFormat) -> Result<()> {
    let daemon = DaemonManager::new();
    let status = daemon.status();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": status.running,
                "pid": status.pid,
                "pid_file": status.pid_file.to_string_lossy()
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Roomwatch Status");
            println!("----------------");
            if status.running {
                println!("Status: running");
                if let Some(pid) = status.pid {
                    println!("PID: {}", pid);
                }
            } else {
                println!("Status: stopped");
            }
            println!("PID file: {}", status.pid_file.display());
        }
    }

    Ok(())
}

/// Run a single booking check in the foreground
async fn cmd_check(config: &Config) -> Result<()> {
    config.validate()?;

    let messenger = build_messenger(config)?;
    let mut checker = BookingChecker::new(config.portal.clone(), config.sms.clone(), messenger)?;

    println!("Checking {} ...", config.portal.base_url);
    match checker.check_once().await? {
        CheckOutcome::NotOpen => {
            println!("Room booking is not open yet.");
        }
        CheckOutcome::Notified(record) => {
            println!("Room booking is open! Sent notification {} ({})", record.sid, record.status);
        }
    }
    Ok(())
}

/// Run as the daemon process (internal command)
async fn cmd_run_daemon(config: &Config) -> Result<()> {
    let daemon = DaemonManager::new();
    daemon.register_self()?;

    run_daemon(config).await
}

/// Show the error log
async fn cmd_logs(config: &Config, follow: bool, lines: usize) -> Result<()> {
    let log_path = config.logs.error_log_path();

    if !log_path.exists() {
        println!("No error log found at: {}", log_path.display());
        println!("The daemon may not have been started yet.");
        return Ok(());
    }

    if follow {
        println!("Following log file: {} (Ctrl+C to stop)", log_path.display());
        println!();

        // Use tail -f for following
        let mut child = std::process::Command::new("tail")
            .args(["-f", "-n", &lines.to_string()])
            .arg(&log_path)
            .spawn()
            .context("Failed to run tail -f")?;

        child.wait()?;
    } else {
        // Read last N lines
        let file = fs::File::open(&log_path).context("Failed to open log file")?;
        let reader = BufReader::new(file);
        let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

        let start = if all_lines.len() > lines { all_lines.len() - lines } else { 0 };

        for line in &all_lines[start..] {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Build the messenger selected by the config
fn build_messenger(config: &Config) -> Result<Messenger> {
    let log = MessageLog::new(config.logs.message_log_path());
    let backend: Box<dyn SmsBackend> = match config.sms.backend.as_str() {
        "twilio" => Box::new(TwilioBackend::from_env().context("Twilio backend unavailable")?),
        _ => Box::new(ConsoleBackend),
    };
    Ok(Messenger::new(backend, log))
}

/// Run the daemon main loop
async fn run_daemon(config: &Config) -> Result<()> {
    info!("Daemon starting...");

    // Fail fast with clear error messages before the loop begins
    config.validate()?;

    let mut event_loop = EventLoop::new(config.poll.interval());
    if config.poll.suppress_errors {
        event_loop = event_loop.suppress_errors(true);
    }

    // Route task errors to the error log instead of exiting
    let error_log = ErrorLog::new(config.logs.error_log_path());
    event_loop.set_exception_handler(move |err| error_log.append(err));

    // One-time setup: make sure the log directory is in place
    let logs_dir = config.logs.dir();
    event_loop.schedule_set_up(move || async move {
        fs::create_dir_all(&logs_dir).context("Failed to create log directory")?;
        Ok(())
    });

    // The booking checker is the daemon's one periodic task
    let messenger = build_messenger(config)?;
    info!(backend = messenger.backend_name(), "Messenger initialized");

    let checker = BookingChecker::new(config.portal.clone(), config.sms.clone(), messenger)?;
    checker.schedule(&mut event_loop);

    // Translate signals into a cooperative stop at the cycle boundary
    let handle = event_loop.handle();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        handle.signal_stop();
        info!("Stop signaled; exiting at the next cycle boundary");
    });

    info!(
        interval_secs = config.poll.interval_secs,
        portal = %config.portal.base_url,
        "Daemon running. Press Ctrl+C to stop."
    );

    event_loop.run().await?;

    info!("Daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let sigint = signal(SignalKind::interrupt());
        let sigterm = signal(SignalKind::terminate());

        match (sigint, sigterm) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => warn!("SIGINT received"),
                    _ = sigterm.recv() => warn!("SIGTERM received"),
                }
            }
            _ => {
                warn!("Failed to install signal handlers, falling back to ctrl_c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
