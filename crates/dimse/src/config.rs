//! Configuration types for DIMSE services

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::types::{transfer_syntax, BlockingMode};
use crate::DEFAULT_DIMSE_PORT;

/// Configuration for the DIMSE service provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimseConfig {
    /// Local Application Entity Title
    #[serde(default = "default_local_aet")]
    pub local_aet: String,

    /// Bind address for SCP listener
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Port for SCP listener (0 picks an ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum PDU size in bytes we are willing to receive
    #[serde(default = "default_max_pdu")]
    pub max_pdu: u32,

    /// ACSE timeout in milliseconds, bounds reading the association request
    #[serde(default = "default_acse_timeout")]
    pub acse_timeout_ms: u64,

    /// Whether command reception blocks or gives up after `dimse_timeout_ms`
    #[serde(default)]
    pub blocking_mode: BlockingMode,

    /// DIMSE timeout in milliseconds, used in non-blocking mode
    #[serde(default)]
    pub dimse_timeout_ms: Option<u64>,

    /// Accepted transfer syntaxes (in order of preference)
    #[serde(default = "default_transfer_syntaxes")]
    pub preferred_transfer_syntaxes: Vec<String>,

    /// Accept only this transfer syntax, overriding the preference list
    #[serde(default)]
    pub forced_transfer_syntax: Option<String>,

    /// Maximum number of concurrent associations
    #[serde(default = "default_max_associations")]
    pub max_associations: u32,

    /// Called AE titles this SCP services, empty means any
    #[serde(default)]
    pub called_ae_titles: Vec<String>,

    /// Refuse every association request
    #[serde(default)]
    pub refuse_associations: bool,

    /// Refuse requests that carry no Implementation Class UID
    #[serde(default)]
    pub require_implementation_class_uid: bool,

    /// Honour the private shutdown SOP class
    #[serde(default)]
    pub allow_shutdown: bool,

    /// Strict PDU decoding
    #[serde(default = "default_true")]
    pub strict: bool,
}

impl Default for DimseConfig {
    fn default() -> Self {
        Self {
            local_aet: default_local_aet(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            max_pdu: default_max_pdu(),
            acse_timeout_ms: default_acse_timeout(),
            blocking_mode: BlockingMode::Blocking,
            dimse_timeout_ms: None,
            preferred_transfer_syntaxes: default_transfer_syntaxes(),
            forced_transfer_syntax: None,
            max_associations: default_max_associations(),
            called_ae_titles: Vec::new(),
            refuse_associations: false,
            require_implementation_class_uid: false,
            allow_shutdown: false,
            strict: true,
        }
    }
}

impl DimseConfig {
    /// Get ACSE timeout as Duration
    pub fn acse_timeout(&self) -> Duration {
        Duration::from_millis(self.acse_timeout_ms)
    }

    /// Get DIMSE timeout as Duration, `None` when waiting without limit
    pub fn dimse_timeout(&self) -> Option<Duration> {
        match self.blocking_mode {
            BlockingMode::Blocking => None,
            BlockingMode::NonBlocking => self.dimse_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Transfer syntaxes offered during negotiation, in preference order
    pub fn transfer_syntaxes(&self) -> Vec<String> {
        match &self.forced_transfer_syntax {
            Some(ts) => vec![ts.clone()],
            None => self.preferred_transfer_syntaxes.clone(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        // Validate AE title
        if self.local_aet.is_empty() || self.local_aet.len() > 16 {
            return Err(crate::error::DimseError::config(
                "Local AE title must be 1-16 characters",
            ));
        }

        for aet in &self.called_ae_titles {
            if aet.is_empty() || aet.len() > 16 {
                return Err(crate::error::DimseError::config(format!(
                    "Called AE title '{}' must be 1-16 characters",
                    aet
                )));
            }
        }

        // Validate PDU size
        if self.max_pdu < 16384 || self.max_pdu > 131072 {
            return Err(crate::error::DimseError::config(
                "Max PDU size must be between 16384 and 131072 bytes",
            ));
        }

        if self.max_associations == 0 {
            return Err(crate::error::DimseError::config(
                "Max associations must be greater than 0",
            ));
        }

        if self.transfer_syntaxes().is_empty() {
            return Err(crate::error::DimseError::config(
                "At least one transfer syntax must be accepted",
            ));
        }

        if self.blocking_mode == BlockingMode::NonBlocking && self.dimse_timeout_ms.is_none() {
            return Err(crate::error::DimseError::config(
                "Non-blocking mode requires dimse_timeout_ms",
            ));
        }

        Ok(())
    }
}

// Default value functions
fn default_local_aet() -> String {
    "PRINT_SCP".to_string()
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    DEFAULT_DIMSE_PORT
}

fn default_max_pdu() -> u32 {
    16384
}

fn default_acse_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_transfer_syntaxes() -> Vec<String> {
    vec![
        transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
        transfer_syntax::EXPLICIT_VR_BIG_ENDIAN.to_string(),
        transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
    ]
}

fn default_max_associations() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DimseConfig::default();
        assert_eq!(config.local_aet, "PRINT_SCP");
        assert_eq!(config.port, DEFAULT_DIMSE_PORT);
        assert_eq!(config.max_pdu, 16384);
        assert_eq!(config.blocking_mode, BlockingMode::Blocking);
        assert_eq!(config.dimse_timeout(), None);
        assert_eq!(
            config.transfer_syntaxes()[0],
            transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN
        );
    }

    #[test]
    fn test_forced_transfer_syntax() {
        let config = DimseConfig {
            forced_transfer_syntax: Some(transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN.to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.transfer_syntaxes(),
            vec![transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN.to_string()]
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = DimseConfig::default();
        assert!(config.validate().is_ok());

        // Test invalid AE title
        config.local_aet = "".to_string();
        assert!(config.validate().is_err());

        config.local_aet = "A".repeat(17);
        assert!(config.validate().is_err());

        config.local_aet = "PRINT_SCP".to_string();
        config.max_pdu = 1024;
        assert!(config.validate().is_err());

        config.max_pdu = 16384;
        config.blocking_mode = BlockingMode::NonBlocking;
        assert!(config.validate().is_err());

        config.dimse_timeout_ms = Some(5_000);
        assert!(config.validate().is_ok());
        assert_eq!(config.dimse_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_config_from_toml() {
        let config: DimseConfig = toml::from_str(
            r#"
            local_aet = "FILM_SCP"
            port = 10400
            blocking_mode = "nonblocking"
            dimse_timeout_ms = 15000
            max_associations = 2
            called_ae_titles = ["FILM_SCP"]
            "#,
        )
        .expect("TOML parse error");

        assert_eq!(config.local_aet, "FILM_SCP");
        assert_eq!(config.port, 10400);
        assert_eq!(config.max_associations, 2);
        assert_eq!(config.dimse_timeout(), Some(Duration::from_millis(15000)));
        assert!(config.strict);
        assert!(config.validate().is_ok());
    }
}
