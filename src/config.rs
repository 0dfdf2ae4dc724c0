// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! by the key management core. Configuration is loaded once at startup;
//! a missing or malformed master key is fatal and must stop the process
//! before any provider is constructed.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `KMS_MASTER_KEY` | 32-byte master encryption key, hex encoded | Required |
//! | `DATA_DIR` | Directory holding the key database | `/data` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable holding the hex-encoded master key.
///
/// Every private key in the database is sealed under this key. Changing it
/// makes all previously stored private keys unreadable.
pub const MASTER_KEY_ENV: &str = "KMS_MASTER_KEY";

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// File name of the redb database inside the data directory.
pub const DATABASE_FILE: &str = "keys.redb";

/// Length of the master key in bytes (AES-256).
pub const MASTER_KEY_LEN: usize = 32;

/// Fatal configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("KMS_MASTER_KEY is not set")]
    MissingMasterKey,

    #[error("KMS_MASTER_KEY is malformed: {0}")]
    MalformedMasterKey(String),

    #[error("LOG_FORMAT must be `json` or `pretty`, got {0:?}")]
    InvalidLogFormat(String),
}

/// Immutable 32-byte master key.
///
/// `Debug` never prints the key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey([u8; MASTER_KEY_LEN]);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string (an optional `0x` prefix is accepted).
    pub fn from_hex(value: &str) -> Result<Self, ConfigError> {
        let trimmed = value.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = alloy::hex::decode(trimmed)
            .map_err(|e| ConfigError::MalformedMasterKey(format!("not hex: {e}")))?;
        let bytes: [u8; MASTER_KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            ConfigError::MalformedMasterKey(format!(
                "expected {MASTER_KEY_LEN} bytes, got {}",
                b.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidLogFormat(value.to_string())),
        }
    }
}

/// Startup configuration for the key management core.
#[derive(Debug, Clone)]
pub struct KmsConfig {
    pub data_dir: PathBuf,
    pub master_key: MasterKey,
    pub log_format: LogFormat,
}

impl KmsConfig {
    pub fn new(data_dir: impl AsRef<Path>, master_key: MasterKey) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            master_key,
            log_format: LogFormat::default(),
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let master_key = match lookup(MASTER_KEY_ENV) {
            Some(value) if !value.trim().is_empty() => MasterKey::from_hex(&value)?,
            _ => return Err(ConfigError::MissingMasterKey),
        };

        let data_dir = lookup(DATA_DIR_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        let log_format = match lookup(LOG_FORMAT_ENV) {
            Some(value) => LogFormat::parse(&value)?,
            None => LogFormat::default(),
        };

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            master_key,
            log_format,
        })
    }

    /// Path of the redb database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}
