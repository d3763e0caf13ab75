//! Command-line arguments for the cpuglyph daemon.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::Level;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "cpuglyph",
    version,
    about = "Shows CPU load as a tray glyph, switches power profiles and watches for package upgrades"
)]
pub struct Args {
    /// Config file (TOML). Defaults to <app data>/cpuglyph/config.toml
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Sampling interval in milliseconds; overrides the config file at startup
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Run one update check immediately after startup
    #[arg(long)]
    pub check_now: bool,

    /// Print the available power profiles and exit
    #[arg(long)]
    pub list_profiles: bool,
}
