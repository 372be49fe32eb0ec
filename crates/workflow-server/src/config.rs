// workflow-server/src/config.rs
// ============================================================================
// Module: Server Configuration
// Description: TOML-backed configuration for the workflow-server binary.
// Purpose: Resolve bind address, persistence backend, credential master key,
//          audit sink, and rate limit ceilings with fail-closed defaults.
// Dependencies: serde, toml, workflow-core::limits
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file. Every section has a
//! `#[serde(default)]` so a missing file still produces a usable
//! (loopback-bound, in-memory) config, while an explicit bad value fails
//! closed at load time rather than at first use.

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use workflow_core::limits::DEFAULT_INTERNAL_RATE_LIMIT_PER_MINUTE;
use workflow_core::limits::DEFAULT_PUBLIC_RATE_LIMIT_PER_MINUTE;

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "workflow-server.toml";
/// Environment variable used to override the config path.
const CONFIG_ENV_VAR: &str = "WORKFLOW_SERVER_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;

/// Top-level workflow-server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP bind/body-size settings.
    #[serde(default)]
    pub http: HttpConfig,
    /// Run/version/workflow persistence backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Credential store settings (master key, backend).
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Audit sink selection.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Internal and public rate limit ceilings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            store: StoreConfig::default(),
            credentials: CredentialsConfig::default(),
            audit: AuditConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from disk using the default resolution rules: an
    /// explicit `path`, else `WORKFLOW_SERVER_CONFIG`, else
    /// `workflow-server.toml` in the current directory. A missing default
    /// file is not an error; an explicit path or env override that is
    /// missing or invalid is.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when an explicitly named file cannot be read
    /// or parsed, or when validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path.is_some();
        let resolved = resolve_path(path)?;
        if !explicit && !resolved.exists() {
            let mut config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.validate()?;
        self.store.validate()?;
        self.credentials.validate()?;
        self.audit.validate()?;
        self.rate_limit.validate()?;
        Ok(())
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Bind address, e.g. `127.0.0.1:8080`.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind: default_bind(), max_body_bytes: default_max_body_bytes() }
    }
}

impl HttpConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind.parse::<std::net::SocketAddr>().map_err(|_| ConfigError::Invalid("http.bind is not a valid socket address".to_string()))?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("http.max_body_bytes must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Run/version/workflow persistence backend selection.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when `type = "sqlite"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { store_type: StoreType::default(), path: None }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("store.path is only valid when type = \"sqlite\"".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                if self.path.is_none() {
                    return Err(ConfigError::Invalid("store.path is required when type = \"sqlite\"".to_string()));
                }
                Ok(())
            }
        }
    }
}

/// Persistence backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory, for development and tests. Durable for the process lifetime
    /// only via an in-memory `SQLite` connection.
    #[default]
    Memory,
    /// File-backed `SQLite` database.
    Sqlite,
}

/// Credential store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Hex-encoded 32-byte master key. Generated at startup (and logged once,
    /// at warn level via the audit sink) when absent — fine for a single
    /// dev process, unusable across restarts.
    #[serde(default)]
    pub master_key_hex: Option<String>,
    /// Backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when `type = "sqlite"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self { master_key_hex: None, store_type: StoreType::default(), path: None }
    }
}

impl CredentialsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(hex_key) = &self.master_key_hex {
            let bytes = hex_decode(hex_key).ok_or_else(|| ConfigError::Invalid("credentials.master_key_hex must be hex".to_string()))?;
            if bytes.len() != 32 {
                return Err(ConfigError::Invalid("credentials.master_key_hex must decode to 32 bytes".to_string()));
            }
        }
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("credentials.path is only valid when type = \"sqlite\"".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                if self.path.is_none() {
                    return Err(ConfigError::Invalid("credentials.path is required when type = \"sqlite\"".to_string()));
                }
                Ok(())
            }
        }
    }

    /// Decodes the configured master key, if any.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `master_key_hex` is set but malformed; this
    /// should not happen after [`CredentialsConfig::validate`] has already
    /// run, but callers that skip validation still get a safe error instead
    /// of a panic.
    pub fn decode_master_key(&self) -> Result<Option<[u8; 32]>, ConfigError> {
        let Some(hex_key) = &self.master_key_hex else {
            return Ok(None);
        };
        let bytes =
            hex_decode(hex_key).ok_or_else(|| ConfigError::Invalid("credentials.master_key_hex must be hex".to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ConfigError::Invalid("credentials.master_key_hex must decode to 32 bytes".to_string()))?;
        Ok(Some(array))
    }
}

/// Audit sink configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Sink selection.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Log file path when `sink = "file"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { sink: AuditSinkKind::default(), path: None }
    }
}

impl AuditConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sink == AuditSinkKind::File && self.path.is_none() {
            return Err(ConfigError::Invalid("audit.path is required when sink = \"file\"".to_string()));
        }
        Ok(())
    }
}

/// Audit sink backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// Write one JSON line per event to stderr.
    #[default]
    Stderr,
    /// Append one JSON line per event to a file.
    File,
    /// Discard every event.
    Noop,
}

/// Rate limit ceilings for internal and public endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per minute for authenticated/internal callers.
    #[serde(default = "default_internal_rate_limit")]
    pub internal_per_minute: u32,
    /// Requests per minute for anonymous public-gate callers.
    #[serde(default = "default_public_rate_limit")]
    pub public_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            internal_per_minute: default_internal_rate_limit(),
            public_per_minute: default_public_rate_limit(),
        }
    }
}

impl RateLimitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.internal_per_minute == 0 {
            return Err(ConfigError::Invalid("rate_limit.internal_per_minute must be greater than zero".to_string()));
        }
        if self.public_per_minute == 0 {
            return Err(ConfigError::Invalid("rate_limit.public_per_minute must be greater than zero".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from an explicit argument or environment default.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Decodes a hex string to bytes, rejecting anything non-hex or odd-length.
fn hex_decode(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(value.len() / 2);
    let chars: Vec<char> = value.chars().collect();
    for pair in chars.chunks(2) {
        let byte_str: String = pair.iter().collect();
        bytes.push(u8::from_str_radix(&byte_str, 16).ok()?);
    }
    Some(bytes)
}

const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

const fn default_internal_rate_limit() -> u32 {
    DEFAULT_INTERNAL_RATE_LIMIT_PER_MINUTE
}

const fn default_public_rate_limit() -> u32 {
    DEFAULT_PUBLIC_RATE_LIMIT_PER_MINUTE
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sqlite_store_without_path_is_rejected() {
        let mut config = ServerConfig::default();
        config.store.store_type = StoreType::Sqlite;
        assert!(matches!(config.store.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_master_key_is_rejected() {
        let mut config = CredentialsConfig::default();
        config.master_key_hex = Some("not-hex".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn short_master_key_is_rejected() {
        let mut config = CredentialsConfig::default();
        config.master_key_hex = Some("aabb".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn valid_master_key_decodes_to_32_bytes() {
        let mut config = CredentialsConfig::default();
        config.master_key_hex = Some("00".repeat(32));
        let decoded = config.decode_master_key().unwrap().unwrap();
        assert_eq!(decoded, [0u8; 32]);
    }

    #[test]
    fn file_sink_without_path_is_rejected() {
        let mut config = AuditConfig::default();
        config.sink = AuditSinkKind::File;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_missing_default_path_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let original = env::current_dir().unwrap();
        env::set_current_dir(dir.path()).unwrap();
        let config = ServerConfig::load(None);
        env::set_current_dir(original).unwrap();
        assert!(config.is_ok());
    }

    #[test]
    fn load_explicit_missing_path_is_an_error() {
        let result = ServerConfig::load(Some(Path::new("/nonexistent/workflow-server.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
