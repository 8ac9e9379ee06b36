//! Cache types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const DEFAULT_UPSTREAM_URL: &str = "https://msdl.microsoft.com/download/symbols";
const DEFAULT_USER_AGENT: &str = "Microsoft-Symbol-Server/10.0.0.0";

/// Configuration for the symbol cache
#[derive(Debug, Clone)]
pub struct SymbolCacheConfig {
    /// Directory under which `name/hash/name` files are stored
    pub storage_root: PathBuf,
    /// Base address of the upstream symbol server
    pub upstream_url: String,
    /// Upper bound on a whole upstream request, body included
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for SymbolCacheConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./symbols"),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Where a served symbol came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOrigin {
    Hit,
    Fetched,
}

/// An open, fully written symbol file ready to be streamed
#[derive(Debug)]
pub struct CachedSymbol {
    pub file: File,
    pub len: u64,
    pub path: PathBuf,
    pub origin: CacheOrigin,
}

impl CachedSymbol {
    /// Read the whole file into memory
    pub async fn into_bytes(mut self) -> std::io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.len as usize);
        self.file.read_to_end(&mut data).await?;
        Ok(data)
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Upstream downloads actually started
    pub fetches: u64,
    pub fetch_failures: u64,
    /// Misses that joined a download already in flight
    pub coalesced: u64,
}
