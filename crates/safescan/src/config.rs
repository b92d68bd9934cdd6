//! Configuration management for safescan.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::qr::{ErrorCorrection, QrMode, QrOptions};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "safescan";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "safescan.db";

/// Longest token lifetime accepted, one year.
pub const MAX_TOKEN_TTL_HOURS: u32 = 24 * 366;

/// Prefix of environment overrides. Nested keys use `__`, as in
/// `SAFESCAN_SERVICE__BASE_URL`.
const ENV_PREFIX: &str = "SAFESCAN_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SAFESCAN_`)
/// 2. TOML config file at `~/.config/safescan/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Resolution service client configuration.
    pub service: ServiceConfig,
    /// Lookup endpoint configuration.
    pub server: ServerConfig,
    /// QR code configuration.
    pub qr: QrConfig,
    /// Responder view configuration.
    pub display: DisplayConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/safescan/safescan.db`
    pub database_path: Option<PathBuf>,
}

/// Resolution service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Remote lookup endpoint. Without it lookups use the local store.
    pub base_url: Option<String>,
    /// Publishable key sent as the `apikey` header.
    pub api_key: Option<String>,
    /// User the local profile is published under.
    pub user_id: String,
    /// Lifetime of issued tokens in hours.
    pub token_ttl_hours: u32,
    /// Request timeout in seconds. No timeout when unset.
    pub timeout_secs: Option<u64>,
}

/// Lookup endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_address: String,
    /// Route serving lookups.
    pub endpoint_path: String,
    /// Reject requests without the configured `service.api_key`.
    pub require_api_key: bool,
}

/// QR code configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    /// Emergency view page that links point at.
    pub view_url: String,
    /// Minimum rendered size in pixels.
    pub size: u32,
    /// Redundancy level.
    pub error_correction: ErrorCorrection,
    /// Content placed in the barcode.
    pub mode: QrMode,
}

/// Responder view configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Ambulance number shown on the emergency view.
    pub ambulance_number: String,
    /// Police number shown on the emergency view.
    pub police_number: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            user_id: "local".to_string(),
            token_ttl_hours: 24,
            timeout_secs: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8787".to_string(),
            endpoint_path: "/get-emergency-profile".to_string(),
            require_api_key: false,
        }
    }
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            view_url: "https://safescan.app/emergency".to_string(),
            size: 200,
            error_correction: ErrorCorrection::M,
            mode: QrMode::Linked,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            ambulance_number: "108".to_string(),
            police_number: "100".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `SAFESCAN_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.qr.size == 0 {
            return Err(Error::config("qr.size must be greater than 0"));
        }

        if self.service.token_ttl_hours == 0 {
            return Err(Error::config("service.token_ttl_hours must be greater than 0"));
        }

        if self.service.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            return Err(Error::config(format!(
                "service.token_ttl_hours must be at most {MAX_TOKEN_TTL_HOURS}"
            )));
        }

        if self.service.user_id.trim().is_empty() {
            return Err(Error::config("service.user_id cannot be empty"));
        }

        if Url::parse(&self.qr.view_url).is_err() {
            return Err(Error::config(format!(
                "invalid qr.view_url: {}",
                self.qr.view_url
            )));
        }

        if let Some(base_url) = &self.service.base_url {
            if Url::parse(base_url).is_err() {
                return Err(Error::config(format!("invalid service.base_url: {base_url}")));
            }
        }

        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(Error::config(format!(
                "invalid server.bind_address: {}",
                self.server.bind_address
            )));
        }

        if !self.server.endpoint_path.starts_with('/') {
            return Err(Error::config(format!(
                "server.endpoint_path must start with '/': {}",
                self.server.endpoint_path
            )));
        }

        if self.server.require_api_key && self.service.api_key.is_none() {
            return Err(Error::config(
                "server.require_api_key is set but service.api_key is missing",
            ));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// The parsed emergency view URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse.
    pub fn view_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.qr.view_url)?)
    }

    /// The parsed resolution service URL, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse.
    pub fn service_url(&self) -> Result<Option<Url>> {
        Ok(self
            .service
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()?)
    }

    /// Get the token lifetime as a Duration.
    #[must_use]
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.service.token_ttl_hours))
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.service.timeout_secs.map(Duration::from_secs)
    }

    /// QR rendering options from the configuration.
    #[must_use]
    pub fn qr_options(&self) -> QrOptions {
        QrOptions {
            size: self.qr.size,
            error_correction: self.qr.error_correction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert!(config.service.base_url.is_none());
        assert_eq!(config.service.user_id, "local");
        assert_eq!(config.service.token_ttl_hours, 24);
        assert!(config.service.timeout_secs.is_none());
        assert_eq!(config.server.bind_address, "127.0.0.1:8787");
        assert_eq!(config.server.endpoint_path, "/get-emergency-profile");
        assert!(!config.server.require_api_key);
        assert_eq!(config.qr.size, 200);
        assert_eq!(config.qr.error_correction, ErrorCorrection::M);
        assert_eq!(config.qr.mode, QrMode::Linked);
        assert_eq!(config.display.ambulance_number, "108");
        assert_eq!(config.display.police_number, "100");
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_qr_size() {
        let mut config = Config::default();
        config.qr.size = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("qr.size"));
    }

    #[test]
    fn test_validate_zero_ttl() {
        let mut config = Config::default();
        config.service.token_ttl_hours = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("token_ttl_hours"));
    }

    #[test]
    fn test_validate_ttl_upper_bound() {
        let mut config = Config::default();
        config.service.token_ttl_hours = MAX_TOKEN_TTL_HOURS;
        assert!(config.validate().is_ok());

        config.service.token_ttl_hours = u32::MAX;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("at most"));
    }

    #[test]
    fn test_validate_bad_urls() {
        let mut config = Config::default();
        config.qr.view_url = "not a url".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("view_url"));

        let mut config = Config::default();
        config.service.base_url = Some("::nope".to_string());
        assert!(config.validate().unwrap_err().to_string().contains("base_url"));
    }

    #[test]
    fn test_validate_bind_address() {
        let mut config = Config::default();
        config.server.bind_address = "localhost".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("bind_address"));
    }

    #[test]
    fn test_validate_endpoint_path() {
        let mut config = Config::default();
        config.server.endpoint_path = "lookup".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("endpoint_path"));
    }

    #[test]
    fn test_validate_require_api_key_without_key() {
        let mut config = Config::default();
        config.server.require_api_key = true;
        assert!(config.validate().is_err());

        config.service.api_key = Some("pk".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("safescan.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_durations() {
        let mut config = Config::default();
        assert_eq!(config.token_ttl(), chrono::Duration::hours(24));
        assert!(config.request_timeout().is_none());

        config.service.timeout_secs = Some(5);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parsed_urls() {
        let mut config = Config::default();
        assert_eq!(
            config.view_url().unwrap().as_str(),
            "https://safescan.app/emergency"
        );
        assert!(config.service_url().unwrap().is_none());

        config.service.base_url = Some("http://127.0.0.1:8787/get-emergency-profile".into());
        assert_eq!(config.service_url().unwrap().unwrap().port(), Some(8787));
    }

    #[test]
    fn test_qr_options() {
        let mut config = Config::default();
        config.qr.error_correction = ErrorCorrection::H;
        let options = config.qr_options();
        assert_eq!(options.size, 200);
        assert_eq!(options.error_correction, ErrorCorrection::H);
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("safescan"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_default_data_dir() {
        let path = Config::default_data_dir();
        assert!(path.to_string_lossy().contains("safescan"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config.qr, QrConfig::default());
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[service]
user_id = "jane"
token_ttl_hours = 48

[qr]
mode = "direct"
error_correction = "H"

[display]
ambulance_number = "911"
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.service.user_id, "jane");
        assert_eq!(config.service.token_ttl_hours, 48);
        assert_eq!(config.qr.mode, QrMode::Direct);
        assert_eq!(config.qr.error_correction, ErrorCorrection::H);
        assert_eq!(config.display.ambulance_number, "911");
        assert_eq!(config.display.police_number, "100");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[qr]\nsize = 0").unwrap();

        let err = Config::load_from(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("token_ttl_hours"));
        assert!(json.contains("\"mode\":\"linked\""));
    }

    #[test]
    fn test_service_config_deserialize() {
        let json = r#"{"base_url": "http://x.test/lookup", "timeout_secs": 3}"#;
        let service: ServiceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(service.base_url.as_deref(), Some("http://x.test/lookup"));
        assert_eq!(service.timeout_secs, Some(3));
        assert_eq!(service.user_id, "local");
    }
}
