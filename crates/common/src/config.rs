//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Default attachment size cap: 50 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Default bound on a single store operation, in seconds
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum accepted attachment size in bytes
    pub max_upload_bytes: u64,

    /// Bound on a single store operation, in seconds
    pub store_timeout_secs: u64,

    /// Database connection URL; absent when running purely in memory
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            store_timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
            database_url: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let max_upload_bytes = env::var("NEOFAB_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let store_timeout_secs = env::var("NEOFAB_STORE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_STORE_TIMEOUT_SECS);

        let database_url = env::var("DATABASE_URL").ok();

        Ok(Self {
            max_upload_bytes,
            store_timeout_secs,
            database_url,
        })
    }
}
