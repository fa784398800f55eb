mod logging_config;
mod printer_config;
pub mod config;

use clap::Parser;

pub use config::{Config, ConfigError};
pub use logging_config::LoggingConfig;
pub use printer_config::PrinterConfig;

/// Application startup arguments
#[derive(Debug, Parser)]
#[command(name = "printscp", version, about = "DICOM Basic Grayscale Print SCP")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "printscp.toml")]
    pub config: String,

    /// Printer to serve, from the [printers] table
    #[arg(short, long)]
    pub printer: Option<String>,

    /// Verbose mode, log debug messages
    #[arg(short, long)]
    pub verbose: bool,

    /// Debug mode, log everything
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    /// Log filter implied by the verbosity flags, if any
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.debug {
            Some("trace")
        } else if self.verbose {
            Some("debug")
        } else {
            None
        }
    }
}
