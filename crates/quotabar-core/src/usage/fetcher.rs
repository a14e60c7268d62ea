//! Run `claude /usage` in a PTY and capture its transcript.
//!
//! The command keeps drawing interactive chrome after the usage figures are
//! on screen, so capture ends on whichever comes first:
//!
//! 1. the child exits
//! 2. a grace period passes after the first percentage appears, re-armed
//!    only when a quota category not seen before shows up
//! 3. the hard timeout fires

use std::io::Read;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::thread;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use portable_pty::{native_pty_system, Child, CommandBuilder, PtySize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use super::account::detect_trust_prompt;
use super::normalize::{normalize_transcript, strip_ansi};
use super::parser::parse_lines;
use super::path_env::{augmented_path, resolve_executable};
use super::patterns::{categories_in, has_percent};
use super::time::ReferenceClock;
use super::types::{NoDataReason, ParseOutcome, QuotaCategory};
use crate::config::Settings;

/// How long to keep reading after the child exits, for output still in flight
const EXIT_DRAIN: Duration = Duration::from_millis(200);

/// Bytes of earlier output rescanned with each chunk, so labels and escape
/// sequences split across reads are still recognized
const SCAN_OVERLAP: usize = 1024;

/// Options for one `/usage` capture
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Executable name or path (e.g. "claude")
    pub executable: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Working directory for the child
    pub working_dir: PathBuf,
    /// Quiet period after the usage figures appear before capture ends
    pub grace: Duration,
    /// Absolute ceiling on capture time
    pub timeout: Duration,
    /// PTY rows
    pub rows: u16,
    /// PTY columns
    pub cols: u16,
    /// Calendar for deadlines without a zone (`None` = host local)
    pub zone: Option<Tz>,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            executable: "claude".to_string(),
            args: vec!["/usage".to_string()],
            working_dir: dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
            grace: Duration::from_millis(1500),
            timeout: Duration::from_secs(20),
            rows: 50,
            cols: 200,
            zone: None,
        }
    }
}

impl AcquireOptions {
    /// Build capture options from validated settings
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        let working_dir = settings
            .working_dir
            .clone()
            .unwrap_or_else(|| defaults.working_dir.clone());
        Self {
            executable: settings.executable.clone(),
            args: settings.args.clone(),
            working_dir,
            grace: Duration::from_millis(settings.fetch.grace_ms),
            timeout: Duration::from_secs(settings.fetch.timeout_secs),
            zone: settings.zone(),
            ..defaults
        }
    }
}

/// Acquisition failures, each with a different remedy
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The executable could not be found on the augmented search path
    #[error("`{executable}` was not found. Set the Claude executable path in the quotabar config.")]
    MissingExecutable { executable: String },

    /// The command did not settle before the hard timeout
    #[error("Timed out after {}s waiting for /usage output", .elapsed.as_secs())]
    Timeout { elapsed: Duration, partial: String },

    /// The PTY could not be opened or the child could not be started
    #[error("Failed to run `{executable}`: {message}")]
    Spawn { executable: String, message: String },
}

impl AcquireError {
    fn reason(&self) -> NoDataReason {
        match self {
            AcquireError::MissingExecutable { .. } => NoDataReason::MissingExecutable,
            AcquireError::Timeout { .. } => NoDataReason::Timeout,
            AcquireError::Spawn { .. } => NoDataReason::SpawnFailed,
        }
    }
}

impl From<AcquireError> for ParseOutcome {
    fn from(err: AcquireError) -> Self {
        ParseOutcome::NoData {
            reason: err.reason(),
            message: err.to_string(),
        }
    }
}

/// What ended the capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The child exited on its own
    Exited,
    /// The grace period after the usage figures elapsed
    Grace,
    /// The hard timeout fired
    Timeout,
}

/// Single-fire completion latch: the first `settle` wins, later calls are no-ops
#[derive(Debug, Default)]
pub struct SettleLatch {
    settled: Option<Settled>,
}

impl SettleLatch {
    /// Record `reason` if nothing has settled yet; returns whether it took effect
    pub fn settle(&mut self, reason: Settled) -> bool {
        if self.settled.is_some() {
            return false;
        }
        self.settled = Some(reason);
        true
    }

    pub fn get(&self) -> Option<Settled> {
        self.settled
    }
}

/// A captured transcript
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Raw PTY output (ANSI sequences included)
    pub raw: String,
    pub settled: Settled,
    pub elapsed: Duration,
}

/// Hook for the one-shot "trust this folder" action.
///
/// The capture only reports that Claude Code is waiting on the prompt; the
/// implementor owns whatever state change marks the folder trusted.
pub trait WorkspaceTrust: Send + Sync {
    fn mark_trusted(&self, dir: &Path);
}

/// Default hook: logs the prompt and leaves trust to the user
pub struct LogOnlyTrust;

impl WorkspaceTrust for LogOnlyTrust {
    fn mark_trusted(&self, dir: &Path) {
        warn!(
            "Claude Code is asking whether to trust {}; run `claude` there once to accept",
            dir.display()
        );
    }
}

/// Capture, then parse, folding acquisition failures into `NoData`.
pub async fn run_and_parse(options: &AcquireOptions) -> ParseOutcome {
    run_and_parse_with_trust(options, &LogOnlyTrust).await
}

/// [`run_and_parse`] with a custom workspace-trust hook
pub async fn run_and_parse_with_trust(
    options: &AcquireOptions,
    trust: &dyn WorkspaceTrust,
) -> ParseOutcome {
    let captured = capture_transcript(options).await;

    let mut clock = ReferenceClock::system();
    if let Some(zone) = options.zone {
        clock = clock.with_zone(zone);
    }

    match captured {
        Ok(transcript) => {
            let lines = normalize_transcript(&transcript.raw);
            let outcome = parse_lines(&lines, &clock);
            trust_fallback(outcome, &lines, options, trust)
        }
        Err(AcquireError::Timeout { elapsed, partial }) => {
            // A login screen never shows a percentage, so it always ends here
            let lines = normalize_transcript(&partial);
            match parse_lines(&lines, &clock) {
                outcome @ (ParseOutcome::Ok { .. } | ParseOutcome::NotAuthenticated { .. }) => {
                    debug!("Usage fetch: timed out after {:?}, partial output is usable", elapsed);
                    outcome
                }
                _ => {
                    let timed_out = AcquireError::Timeout {
                        elapsed,
                        partial: String::new(),
                    };
                    warn!("Usage fetch failed: {}", timed_out);
                    trust_fallback(timed_out.into(), &lines, options, trust)
                }
            }
        }
        Err(err) => {
            warn!("Usage fetch failed: {}", err);
            err.into()
        }
    }
}

/// Replace an empty outcome with a trust message when the prompt is showing
fn trust_fallback(
    outcome: ParseOutcome,
    lines: &[String],
    options: &AcquireOptions,
    trust: &dyn WorkspaceTrust,
) -> ParseOutcome {
    if outcome.is_ok() || !detect_trust_prompt(lines) {
        return outcome;
    }
    trust.mark_trusted(&options.working_dir);
    let reason = match outcome {
        ParseOutcome::NoData { reason, .. } => reason,
        _ => NoDataReason::NoQuotas,
    };
    ParseOutcome::NoData {
        reason,
        message: format!(
            "Claude Code is waiting for {} to be trusted. Retry once the folder is trusted.",
            options.working_dir.display()
        ),
    }
}

/// Run the configured command in a PTY until it settles.
pub async fn capture_transcript(options: &AcquireOptions) -> Result<Transcript, AcquireError> {
    let search_path = augmented_path();
    let program = resolve_executable(&options.executable, &search_path).ok_or_else(|| {
        AcquireError::MissingExecutable {
            executable: options.executable.clone(),
        }
    })?;

    let spawn_err = |e: anyhow::Error| AcquireError::Spawn {
        executable: options.executable.clone(),
        message: format!("{:#}", e),
    };

    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: options.rows,
            cols: options.cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(spawn_err)?;

    let mut cmd = CommandBuilder::new(&program);
    cmd.args(&options.args);
    cmd.cwd(&options.working_dir);
    cmd.env("PATH", &search_path);
    cmd.env("TERM", "xterm-256color");

    let child = pair.slave.spawn_command(cmd).map_err(spawn_err)?;
    // The reader only sees EOF once every slave handle is closed
    drop(pair.slave);

    info!(
        "Usage fetch: spawned {} (pid {:?})",
        program.display(),
        child.process_id()
    );

    let mut killer = child.clone_killer();
    let reader = pair.master.try_clone_reader().map_err(spawn_err)?;
    let chunk_rx = spawn_reader(reader);
    let exit_rx = spawn_waiter(child);

    let start = Instant::now();
    let (buffer, settled) = collect_until_settled(chunk_rx, exit_rx, options.grace, options.timeout).await;
    let elapsed = start.elapsed();

    if settled != Settled::Exited {
        if let Err(e) = killer.kill() {
            debug!("Usage fetch: kill after {:?} failed: {}", settled, e);
        }
    }
    drop(pair.master);

    let raw = String::from_utf8_lossy(&buffer).into_owned();
    info!(
        "Usage fetch: settled by {:?} after {:.1}s ({} bytes)",
        settled,
        elapsed.as_secs_f32(),
        raw.len()
    );

    match settled {
        Settled::Timeout => Err(AcquireError::Timeout {
            elapsed,
            partial: raw,
        }),
        _ => Ok(Transcript {
            raw,
            settled,
            elapsed,
        }),
    }
}

/// Forward PTY output chunks until EOF or a read error
fn spawn_reader(mut reader: Box<dyn Read + Send>) -> mpsc::UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // EIO is the normal end of a PTY whose child has gone away
                    debug!("PTY read ended: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Wait for the child on a blocking thread and report its exit code
fn spawn_waiter(mut child: Box<dyn Child + Send + Sync>) -> oneshot::Receiver<Option<u32>> {
    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        let code = match child.wait() {
            Ok(status) => Some(status.exit_code()),
            Err(e) => {
                debug!("Usage fetch: wait failed: {}", e);
                None
            }
        };
        let _ = tx.send(code);
    });
    rx
}

/// Accumulate output until exit, grace or timeout, whichever fires first.
async fn collect_until_settled(
    mut chunk_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut exit_rx: oneshot::Receiver<Option<u32>>,
    grace: Duration,
    timeout: Duration,
) -> (Vec<u8>, Settled) {
    let mut latch = SettleLatch::default();
    let mut buffer: Vec<u8> = Vec::new();
    let mut percent_seen = false;
    let mut categories: Vec<QuotaCategory> = Vec::new();
    let mut grace_timer: Option<Pin<Box<Sleep>>> = None;
    let mut drain_timer: Option<Pin<Box<Sleep>>> = None;
    let mut reader_open = true;
    let mut exited = false;

    let hard_timeout = tokio::time::sleep(timeout);
    tokio::pin!(hard_timeout);

    let settled = loop {
        if let Some(settled) = latch.get() {
            break settled;
        }

        tokio::select! {
            chunk = chunk_rx.recv(), if reader_open => match chunk {
                Some(bytes) => {
                    let scan_from = buffer.len().saturating_sub(SCAN_OVERLAP);
                    buffer.extend_from_slice(&bytes);
                    let text = strip_ansi(&String::from_utf8_lossy(&buffer[scan_from..]));

                    let mut rearm = false;
                    for category in categories_in(&text) {
                        if !categories.contains(&category) {
                            categories.push(category);
                            rearm = percent_seen;
                        }
                    }
                    if !percent_seen && has_percent(&text) {
                        debug!("Usage fetch: usage figures visible, grace period started");
                        percent_seen = true;
                        rearm = true;
                    }
                    if rearm {
                        grace_timer = Some(Box::pin(tokio::time::sleep(grace)));
                    }
                }
                None => {
                    reader_open = false;
                    if exited {
                        latch.settle(Settled::Exited);
                    }
                }
            },
            code = &mut exit_rx, if !exited => {
                exited = true;
                debug!("Usage fetch: child exited with {:?}", code.ok().flatten());
                if reader_open {
                    drain_timer = Some(Box::pin(tokio::time::sleep(EXIT_DRAIN)));
                } else {
                    latch.settle(Settled::Exited);
                }
            },
            _ = wait_timer(&mut drain_timer) => {
                latch.settle(Settled::Exited);
            },
            _ = wait_timer(&mut grace_timer) => {
                latch.settle(Settled::Grace);
            },
            _ = &mut hard_timeout => {
                warn!("Usage fetch: hard timeout after {:?}", timeout);
                latch.settle(Settled::Timeout);
            },
        }
    };

    // Keep anything the reader already queued
    while let Ok(bytes) = chunk_rx.try_recv() {
        buffer.extend_from_slice(&bytes);
    }

    (buffer, settled)
}

/// Wait on an optional timer; an unset timer never fires
async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
