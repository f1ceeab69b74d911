//! Build, test and publish workflow for the `s3transfer-fork` package.
//!
//! Each workflow step is a sequence of external commands, described as [`runner::Invocation`]s
//! and executed by a [`runner::Runner`].

use strum::{Display, EnumString};

pub mod devpi;
pub mod docker;
pub mod package;
pub mod runner;
pub mod wheel;

/// Verbosity of log output.
///
/// The names follow the levels of the Python tooling this workflow wraps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Critical | LogLevel::Error => Self::ERROR,
            LogLevel::Warning => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
        }
    }
}

/// Install a global log subscriber printing events at `level` and above.
///
/// Does nothing if a subscriber is already installed.
pub fn init_logging(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(level))
        .try_init()
        .ok();
}
