use std::collections::BTreeMap;
use std::path::Path;

use dimse::DimseConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::config::logging_config::LoggingConfig;
use crate::config::printer_config::PrinterConfig;
use crate::storage::StorageConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid [scp] section: {0}")]
    Scp(String),

    #[error("Invalid printer '{name}': {reason}")]
    InvalidPrinter { name: String, reason: String },

    #[error("Unknown printer '{0}'")]
    UnknownPrinter(String),

    #[error("Several printers configured and no default_printer given")]
    AmbiguousPrinter,

    #[error("Invalid [storage] section: {0}")]
    InvalidStorage(String),
}

/// Full service configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scp: DimseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Printer used when none is named on the command line
    #[serde(default)]
    pub default_printer: Option<String>,
    #[serde(default)]
    pub printers: BTreeMap<String, PrinterConfig>,
}

impl Config {
    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scp
            .validate()
            .map_err(|e| ConfigError::Scp(e.to_string()))?;

        for (name, printer) in &self.printers {
            printer.validate(name)?;
        }

        if let Some(name) = &self.default_printer {
            if !self.printers.contains_key(name) {
                return Err(ConfigError::UnknownPrinter(name.clone()));
            }
        }

        match self.storage.backend.as_str() {
            "filesystem" | "memory" => Ok(()),
            other => Err(ConfigError::InvalidStorage(format!(
                "unknown backend '{}'",
                other
            ))),
        }
    }

    /// Look up a printer by name
    ///
    /// Without a name the default printer is used, or the only configured
    /// one. With no printers at all the built-in defaults apply.
    pub fn printer(&self, name: Option<&str>) -> Result<(String, PrinterConfig), ConfigError> {
        let name = match name.or(self.default_printer.as_deref()) {
            Some(name) => name.to_string(),
            None => match self.printers.len() {
                0 => return Ok((self.scp.local_aet.clone(), PrinterConfig::default())),
                1 => self.printers.keys().next().cloned().unwrap_or_default(),
                _ => return Err(ConfigError::AmbiguousPrinter),
            },
        };
        self.printers
            .get(&name)
            .cloned()
            .map(|printer| (name.clone(), printer))
            .ok_or(ConfigError::UnknownPrinter(name))
    }
}
