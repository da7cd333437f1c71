//! Command-line interface for the conc daemon.
use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use tracing::level_filters::LevelFilter;

/// Wrapper around `LevelFilter` so clap can parse the single-letter log
/// levels `T`, `D`, `I`, `W`, `E` and `C`.
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for an `EnvFilter` directive.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let level = match value.trim() {
            "T" => LevelFilter::TRACE,
            "D" => LevelFilter::DEBUG,
            "I" => LevelFilter::INFO,
            "W" => LevelFilter::WARN,
            "E" => LevelFilter::ERROR,
            // tracing has no level above error; critical collapses into it
            "C" => LevelFilter::ERROR,
            _ => {
                return Err(format!(
                    "invalid log level '{value}' (expected one of T, D, I, W, E, C)"
                ));
            }
        };

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for the conc daemon.
#[derive(Parser)]
#[command(name = "concd", version, author)]
#[command(about = "Project-oriented process supervision daemon", long_about = None)]
pub struct Cli {
    /// Force daemon mode (defaults to true when stdout is not a TTY).
    #[arg(short = 'd', long = "daemon")]
    pub daemon: bool,

    /// Log verbosity as a single letter.
    #[arg(short = 'l', long = "log-level", value_name = "T|D|I|W|E|C")]
    pub log_level: Option<LogLevelArg>,

    /// Change into this directory before starting.
    #[arg(short = 'w', long = "work-dir", value_name = "PATH")]
    pub work_dir: Option<PathBuf>,
}
