use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::RateLimitConfig;

const ENV_BACKEND_URL: &str = "JOURNAL_BACKEND_URL";
const ENV_ANON_KEY: &str = "JOURNAL_ANON_KEY";
const ENV_DB_PATH: &str = "JOURNAL_DB_PATH";
const ENV_REDUCED_MOTION: &str = "JOURNAL_REDUCED_MOTION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            requests_per_second: 10,
            burst_size: 10,
        }
    }
}

impl BackendConfig {
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: self.requests_per_second,
            burst_size: self.burst_size,
        }
    }
}

/// Timing constants for the account switch and trade sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncTiming {
    pub fade_out_ms: u64,
    pub settle_ms: u64,
    pub retry_base_ms: u64,
    pub max_retries: u32,
    pub fetch_limit: u32,
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            fade_out_ms: 150,
            settle_ms: 50,
            retry_base_ms: 100,
            max_retries: 3,
            fetch_limit: 500,
        }
    }
}

impl SyncTiming {
    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub backend: BackendConfig,
    pub sync: SyncTiming,
    /// Local SQLite store; when set it is used instead of the hosted backend
    pub database_path: Option<PathBuf>,
    pub reduced_motion: bool,
}

impl JournalConfig {
    /// Read a JSON config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let mut config = Self::from_json(&raw)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("parse config json")
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_BACKEND_URL) {
            self.backend.url = url;
        }
        if let Some(key) = lookup(ENV_ANON_KEY) {
            self.backend.anon_key = key;
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup(ENV_REDUCED_MOTION) {
            self.reduced_motion = parse_flag(&flag)
                .with_context(|| format!("{} must be a boolean, got {:?}", ENV_REDUCED_MOTION, flag))?;
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
