use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quotabar_core::config::{Command, Config, Settings};
use quotabar_core::usage::{
    describe_quota, format_status_line, parse_transcript_at, run_and_parse, AcquireOptions,
    ParseOutcome, ReferenceClock,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);
    settings.validate();

    let output = Output {
        json: cli.json,
        detail: cli.detail,
    };

    match cli.command() {
        Command::Fetch => {
            let outcome = run_and_parse(&AcquireOptions::from_settings(&settings)).await;
            output.print(&outcome)?;
            if !outcome.is_ok() {
                std::process::exit(1);
            }
        }
        Command::Parse { file } => {
            let raw = read_transcript(file.as_deref())?;
            let mut clock = ReferenceClock::system();
            if let Some(zone) = settings.zone() {
                clock = clock.with_zone(zone);
            }
            let outcome = parse_transcript_at(&raw, &clock);
            output.print(&outcome)?;
            if !outcome.is_ok() {
                std::process::exit(1);
            }
        }
        Command::Watch => watch(&settings, &output).await?,
    }

    Ok(())
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("quotabar=debug,quotabar_core=debug")
    } else {
        EnvFilter::new("quotabar=info,quotabar_core=info")
    };

    // stdout carries the status line
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Fetch at the poll interval until Ctrl+C; one capture at a time.
async fn watch(settings: &Settings, output: &Output) -> Result<()> {
    let options = AcquireOptions::from_settings(settings);
    let interval = Duration::from_secs(settings.poll_interval_secs);
    tracing::info!(
        "Watching usage every {}s (Ctrl+C to stop)",
        settings.poll_interval_secs
    );

    loop {
        tokio::select! {
            outcome = run_and_parse(&options) => output.print(&outcome)?,
            _ = tokio::signal::ctrl_c() => break,
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::debug!("Watch stopped");
    Ok(())
}

fn read_transcript(file: Option<&Path>) -> Result<String> {
    let bytes = match file {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read transcript: {:?}", path))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read transcript from stdin")?;
            buf
        }
    };
    // Raw PTY captures may split multi-byte characters
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// How outcomes are written to stdout
struct Output {
    json: bool,
    detail: bool,
}

impl Output {
    fn print(&self, outcome: &ParseOutcome) -> Result<()> {
        println!("{}", self.render(outcome)?);
        Ok(())
    }

    fn render(&self, outcome: &ParseOutcome) -> Result<String> {
        if self.json {
            return serde_json::to_string(outcome).context("Failed to serialize outcome");
        }

        match outcome {
            ParseOutcome::Ok {
                account, quotas, ..
            } => {
                let mut lines = vec![format_status_line(quotas)];
                if self.detail {
                    lines.extend(quotas.iter().map(describe_quota));
                    if account.email.is_empty() {
                        lines.push(format!("account: {}", account.account_type));
                    } else {
                        lines.push(format!("account: {} ({})", account.email, account.account_type));
                    }
                }
                Ok(lines.join("\n"))
            }
            _ => Ok(outcome.error_message().unwrap_or_default().to_string()),
        }
    }
}
