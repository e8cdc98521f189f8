/*
 * SPDX-FileCopyrightText: 2025 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use crate::cli::{completion, key, tim};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
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
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Level and message only.
    Short,
    /// Timestamp, level, and message.
    Medium,
    /// Timestamp, level, source location, and message.
    Long,
}

/// Set up the global tracing subscriber. All log output goes to stderr so that
/// stdout only contains command output.
pub fn init_logging(log_level: LogLevel, log_format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::from(log_level));

    match log_format {
        LogFormat::Short => builder.without_time().with_target(false).compact().init(),
        LogFormat::Medium => builder.with_target(false).init(),
        LogFormat::Long => builder.with_file(true).with_line_number(true).init(),
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Tim(tim::TimCli),
    Key(key::KeyCli),
    Completion(completion::CompletionCli),
}

#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Lowest log message severity to output.
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Output format for log messages.
    #[arg(long, global = true, value_name = "FORMAT", default_value = "short")]
    pub log_format: LogFormat,
}

pub fn main(logging_initialized: &AtomicBool) -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level, cli.log_format);
    logging_initialized.store(true, Ordering::SeqCst);

    match cli.command {
        Command::Tim(c) => tim::tim_main(&c),
        Command::Key(c) => key::key_main(&c),
        Command::Completion(c) => completion::completion_main(&c),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_global_log_options() {
        let cli = Cli::try_parse_from([
            "timtool",
            "tim",
            "list",
            "-i",
            "flash.bin",
            "--log-level",
            "trace",
            "--log-format",
            "long",
        ])
        .unwrap();

        assert_eq!(cli.log_level, LogLevel::Trace);
        assert_eq!(cli.log_format, LogFormat::Long);
        assert!(matches!(cli.command, Command::Tim(_)));
    }
}
