use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter, overridden by `RUST_LOG` and the command line
    pub level: String,
    pub log_to_file: bool,
    pub log_file_path: String,
    /// Directory receiving one DIMSE log per association
    pub dimse_log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_file_path: "printscp.log".to_string(),
            dimse_log_dir: None,
        }
    }
}
