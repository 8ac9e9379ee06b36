//! Process configuration parsed from environment variables

use crate::error::{ProxyError, Result};
use std::path::PathBuf;
use std::time::Duration;
use symbol_cache::SymbolCacheConfig;
use url::Url;

/// Configuration for the symbol proxy
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cache: SymbolCacheConfig,
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            cache: SymbolCacheConfig::default(),
            json_logs: false,
        }
    }
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let port = lookup("PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let storage_root = lookup("SYMBOL_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache.storage_root);

        let upstream_url = match lookup("SYMBOL_UPSTREAM_URL") {
            Some(raw) => validate_upstream_url(&raw)?,
            None => defaults.cache.upstream_url,
        };

        let timeout = lookup("UPSTREAM_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache.timeout);

        let connect_timeout = lookup("UPSTREAM_CONNECT_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache.connect_timeout);

        let user_agent = lookup("UPSTREAM_USER_AGENT")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.cache.user_agent);

        let json_logs = lookup("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

        Ok(Self {
            port,
            cache: SymbolCacheConfig {
                storage_root,
                upstream_url,
                timeout,
                connect_timeout,
                user_agent,
            },
            json_logs,
        })
    }
}

/// Require an absolute http(s) URL; strip any trailing `/`
fn validate_upstream_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim())
        .map_err(|e| ProxyError::Config(format!("invalid SYMBOL_UPSTREAM_URL {:?}: {}", raw, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ProxyError::Config(format!(
                "SYMBOL_UPSTREAM_URL must be http or https, got {}",
                other
            )))
        }
    }

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}
