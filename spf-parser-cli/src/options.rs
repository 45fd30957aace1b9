use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::{info, LevelFilter};

/// Verbosity threshold accepted on the command line; `log::LevelFilter`
/// itself does not implement `ValueEnum`.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// CLI for validating ISO-10303-21 (SPF/IFC) instance files.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Options {
    /// The log level
    #[arg(short, value_enum, long, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// The SPF file to validate
    pub input_file: PathBuf,

    /// Print progress dots while the entity population is processed
    #[arg(long)]
    pub progress: bool,

    /// Emit diagnostics as a JSON array on stdout
    #[arg(long, conflicts_with = "progress")]
    pub json: bool,

    /// Parse and validate only the HEADER section
    #[arg(long, visible_alias = "header-only")]
    pub only_header: bool,
}

impl Options {
    /// Dumps the options to the log.
    pub fn dump_to_log(&self) {
        info!("log_level: {:?}", self.log_level);
        info!("input_file: {:?}", self.input_file);
        info!("progress: {}", self.progress);
        info!("json: {}", self.json);
        info!("only_header: {}", self.only_header);
    }
}
