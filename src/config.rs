//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults.

use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use log::{info, warn};

pub use crate::metadata::config::{MetadataBackend, MetadataConfig};
pub use crate::storage::config::{StorageBackend, StorageConfig};

/// Default configuration file, overridable with `UPLOAD_CONFIG`
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Upload protocol limits
    pub upload: UploadConfig,
    /// Byte storage configuration
    pub storage: StorageConfig,
    /// Metadata configuration
    pub metadata: MetadataConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9710,
            workers: 4,
        }
    }
}

/// Limits and naming of the upload protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Route the upload endpoints are mounted on
    pub base_path: String,
    /// Query parameter carrying the session locator
    pub locator_param: String,
    /// Ceiling on the declared total size
    #[serde(deserialize_with = "deserialize_size")]
    pub max_upload_size: u64,
    /// Ceiling on a single chunk
    #[serde(deserialize_with = "deserialize_size")]
    pub max_chunk_size: u64,
    /// Regex patterns; a declared mime type must match at least one
    pub allow_mime: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_path: "/upload".to_string(),
            locator_param: "upload_id".to_string(),
            max_upload_size: 5 * 1024 * 1024 * 1024, // 5GB
            max_chunk_size: 16 * 1024 * 1024,        // 16MB
            allow_mime: vec!["/".to_string()],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

/// Parse a byte size such as `1024`, `512kb`, `16MB` or `1.5 GB` (binary units)
pub fn parse_size(value: &str) -> Result<u64, String> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| format!("Invalid size: {:?}", value))?;
    let multiplier: u64 = match unit.trim().to_lowercase().as_str() {
        "" | "b" => 1,
        "kb" | "k" => 1 << 10,
        "mb" | "m" => 1 << 20,
        "gb" | "g" => 1 << 30,
        "tb" | "t" => 1 << 40,
        "pb" | "p" => 1 << 50,
        other => return Err(format!("Unknown size unit {:?} in {:?}", other, value)),
    };
    Ok((number * multiplier as f64).floor() as u64)
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Bytes(u64),
        Text(String),
    }

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Bytes(bytes) => Ok(bytes),
        SizeValue::Text(text) => parse_size(&text).map_err(serde::de::Error::custom),
    }
}

impl AppConfig {
    /// Load configuration from `UPLOAD_CONFIG` or `config.yaml`, use defaults if not found
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("UPLOAD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load a specific file, falling back to defaults when it does not exist
    pub fn load_from(config_path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = config_path.as_ref();
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            warn!("Config file {} not found, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Apply environment overrides of the storage layers
    pub fn apply_env(&mut self) {
        self.storage.apply_env();
        self.metadata.apply_env();
    }
}
