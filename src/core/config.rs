//! Application configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling `dotenvy::dotenv()`.

use crate::core::history::DEFAULT_MAX_HISTORY;
use crate::core::reconciler::{DEFAULT_MAX_TABLES, ReconcilePolicy};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SITE_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_BACKUP_DEBOUNCE_MS: u64 = 2000;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Address the HTTP server binds to
    pub site_addr: String,

    /// Base URL of the mutation source (AI backend)
    /// Example: http://localhost:8080
    pub ai_backend_url: Option<String>,

    pub max_tables: usize,
    pub max_history: usize,

    /// Whether delete/replace proposals may be applied
    pub allow_destructive: bool,

    /// Directory for file backups; in-memory backups when unset
    pub backup_dir: Option<PathBuf>,

    pub backup_debounce_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Unparsable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            site_addr: non_empty("SITE_ADDR").unwrap_or_else(|| DEFAULT_SITE_ADDR.to_string()),
            ai_backend_url: non_empty("AI_BACKEND_URL"),
            max_tables: parse_or(non_empty("MAX_TABLES"), DEFAULT_MAX_TABLES),
            max_history: parse_or(non_empty("MAX_HISTORY"), DEFAULT_MAX_HISTORY),
            allow_destructive: non_empty("ALLOW_DESTRUCTIVE")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(false),
            backup_dir: non_empty("BACKUP_DIR").map(PathBuf::from),
            backup_debounce_ms: parse_or(non_empty("BACKUP_DEBOUNCE_MS"), DEFAULT_BACKUP_DEBOUNCE_MS),
        }
    }

    pub fn has_ai_backend(&self) -> bool {
        self.ai_backend_url.is_some()
    }

    pub fn has_backup_dir(&self) -> bool {
        self.backup_dir.is_some()
    }

    pub fn reconcile_policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            max_tables: self.max_tables,
            allow_destructive: self.allow_destructive,
        }
    }

    pub fn backup_debounce(&self) -> Duration {
        Duration::from_millis(self.backup_debounce_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Accepts `1/0`, `true/false`, `yes/no`, `on/off` in any case
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    match value {
        Some(raw) => match raw.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(value = %raw, "invalid numeric setting, using default");
                default
            }
        },
        None => default,
    }
}
