use anyhow::{Context, Result};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Claude Code usage quotas for status bars")]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Print one line per quota after the status line
    #[arg(long, global = true)]
    pub detail: bool,

    /// Claude executable name or path
    #[arg(short = 'e', long, global = true)]
    pub executable: Option<String>,

    /// IANA zone for reset times that name none (e.g. "America/Toronto")
    #[arg(short = 'z', long, global = true)]
    pub zone: Option<String>,

    /// Poll interval in seconds (watch mode)
    #[arg(short = 'i', long)]
    pub poll_interval: Option<u64>,

    /// Hard timeout for one capture in seconds
    #[arg(short = 't', long, global = true)]
    pub timeout: Option<u64>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run `claude /usage` once and print the result (default)
    Fetch,
    /// Parse a saved transcript instead of running Claude Code
    Parse {
        /// Transcript file (stdin when omitted)
        file: Option<PathBuf>,
    },
    /// Fetch repeatedly at the poll interval
    Watch,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Subcommand to run, `Fetch` when none was given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Fetch)
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Claude executable name or path
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Arguments passed to the executable
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Working directory for the capture (home directory when unset)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Poll interval in seconds for watch mode
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// IANA zone for reset times that name none (host local when unset)
    #[serde(default)]
    pub timezone: Option<String>,

    /// Capture timing
    #[serde(default)]
    pub fetch: FetchSettings,
}

fn default_executable() -> String {
    "claude".to_string()
}

fn default_args() -> Vec<String> {
    vec!["/usage".to_string()]
}

fn default_poll_interval() -> u64 {
    300
}

/// Capture timing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Quiet period after the usage figures appear (milliseconds)
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Hard timeout for one capture (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_grace_ms() -> u64 {
    1500
}

fn default_timeout_secs() -> u64 {
    20
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            args: default_args(),
            working_dir: None,
            poll_interval_secs: default_poll_interval(),
            timezone: None,
            fetch: FetchSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {:?}", p))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", p));
            }
        }

        // Try default config locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("quotabar/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/quotabar/config.toml")),
            dirs::home_dir().map(|p| p.join(".quotabar.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path));
            }
        }

        // Return defaults if no config file found
        Ok(Self::default())
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(executable) = &cli.executable {
            self.executable = executable.clone();
        }
        if let Some(zone) = &cli.zone {
            self.timezone = Some(zone.clone());
        }
        if let Some(poll_interval) = cli.poll_interval {
            self.poll_interval_secs = poll_interval;
        }
        if let Some(timeout) = cli.timeout {
            self.fetch.timeout_secs = timeout;
        }
    }

    /// Validate and normalize settings values
    ///
    /// Keeps polling from spawning Claude Code back to back and keeps the
    /// grace period shorter than the hard timeout.
    pub fn validate(&mut self) {
        const MIN_POLL_INTERVAL_SECS: u64 = 60;
        const MIN_TIMEOUT_SECS: u64 = 1;

        if self.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            self.poll_interval_secs = MIN_POLL_INTERVAL_SECS;
        }
        if self.fetch.timeout_secs < MIN_TIMEOUT_SECS {
            self.fetch.timeout_secs = MIN_TIMEOUT_SECS;
        }
        let timeout_ms = self.fetch.timeout_secs * 1000;
        if self.fetch.grace_ms >= timeout_ms {
            self.fetch.grace_ms = timeout_ms / 2;
        }
        if self.executable.trim().is_empty() {
            self.executable = default_executable();
        }
    }

    /// Configured zone, ignoring names chrono-tz does not know
    pub fn zone(&self) -> Option<Tz> {
        let name = self.timezone.as_deref()?;
        match name.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                tracing::warn!("Unknown timezone {:?} in settings, using local time", name);
                None
            }
        }
    }
}
