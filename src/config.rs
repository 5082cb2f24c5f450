//! # Configuration Management
//!
//! Loads service configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__HOST, APP_UPLOAD__MAX_UPLOAD_BYTES, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impls)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration.
///
/// ## Sections:
/// - **server**: where the HTTP listener binds
/// - **upload**: limits applied before any audio stage runs
/// - **transcoder**: the external decoder used for non-WAV uploads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub transcoder: TranscoderConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Upload boundary settings.
///
/// ## Fields:
/// - `max_upload_bytes`: uploads larger than this are rejected with 413
/// - `field_name`: multipart form field carrying the audio file
/// - `require_filename`: reject parts without a filename in their content disposition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_upload_bytes: usize,
    pub field_name: String,
    pub require_filename: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 25 * 1024 * 1024,
            field_name: "file".to_string(),
            require_filename: false,
        }
    }
}

/// External transcoder settings.
///
/// `program` must accept ffmpeg-style arguments. Setting `enabled = false`
/// makes every non-WAV upload fail with "transcoder unavailable". Read once
/// at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    pub enabled: bool,
    pub program: String,
    pub timeout_secs: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "ffmpeg".to_string(),
            timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_TRANSCODER__PROGRAM=/opt/ffmpeg/bin/ffmpeg`: Use a specific decoder
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    ///
    /// Section and key are joined with a double underscore since keys
    /// contain single underscores.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.upload.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.upload.field_name.trim().is_empty() {
            return Err(anyhow::anyhow!("Upload field name cannot be empty"));
        }

        if self.transcoder.program.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcoder program cannot be empty"));
        }

        if self.transcoder.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Transcoder timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Apply a partial JSON update (used by `PUT /api/v1/config`).
    ///
    /// Upload limits apply to the next request. Server and transcoder
    /// settings are stored but only take effect after a restart.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = u16::try_from(port)
                    .map_err(|_| anyhow::anyhow!("Server port {} is out of range", port))?;
            }
        }

        if let Some(upload) = partial_config.get("upload") {
            if let Some(max) = upload.get("max_upload_bytes").and_then(|v| v.as_u64()) {
                self.upload.max_upload_bytes = max as usize;
            }
            if let Some(field) = upload.get("field_name").and_then(|v| v.as_str()) {
                self.upload.field_name = field.to_string();
            }
            if let Some(require) = upload.get("require_filename").and_then(|v| v.as_bool()) {
                self.upload.require_filename = require;
            }
        }

        if let Some(transcoder) = partial_config.get("transcoder") {
            if let Some(enabled) = transcoder.get("enabled").and_then(|v| v.as_bool()) {
                self.transcoder.enabled = enabled;
            }
            if let Some(program) = transcoder.get("program").and_then(|v| v.as_str()) {
                self.transcoder.program = program.to_string();
            }
            if let Some(timeout) = transcoder.get("timeout_secs").and_then(|v| v.as_u64()) {
                self.transcoder.timeout_secs = timeout;
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.upload.field_name, "file");
        assert_eq!(config.transcoder.program, "ffmpeg");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.upload.max_upload_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.transcoder.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"upload": {"max_upload_bytes": 1024}, "transcoder": {"enabled": false}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.upload.max_upload_bytes, 1024);
        assert!(!config.transcoder.enabled);
        // untouched sections keep their values
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.upload.field_name, "file");
    }

    #[test]
    fn test_env_override_joins_section_and_key_with_double_underscore() {
        std::env::set_var("APP_UPLOAD__MAX_UPLOAD_BYTES", "2048");
        let loaded = AppConfig::load();
        std::env::remove_var("APP_UPLOAD__MAX_UPLOAD_BYTES");

        let config = loaded.unwrap();
        assert_eq!(config.upload.max_upload_bytes, 2048);
        assert_eq!(config.upload.field_name, "file");
    }

    #[test]
    fn test_config_update_rejects_invalid_values() {
        let mut config = AppConfig::default();
        assert!(config.update_from_json(r#"{"upload": {"field_name": " "}}"#).is_err());

        let mut config = AppConfig::default();
        assert!(config.update_from_json(r#"{"server": {"port": 70000}}"#).is_err());

        let mut config = AppConfig::default();
        assert!(config.update_from_json("not json").is_err());
    }
}
