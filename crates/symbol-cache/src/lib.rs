//! Pass-through cache for debug symbol files
//!
//! Serves symbol files from a local storage root laid out as
//! `root/{name}/{hash}/{name}`, downloading missing files from an upstream
//! symbol server on first request. Concurrent misses for the same key share a
//! single upstream download, and files only appear at their final path once
//! fully written.

mod cache;
mod error;
mod fetcher;
mod key;
mod store;
mod types;

pub use cache::SymbolCache;
pub use error::{FetchError, ServeError, SymbolCacheError};
pub use fetcher::{FetchOutcome, UpstreamFetcher};
pub use key::{SymbolKey, SymbolPaths, UpstreamLocation};
pub use store::LocalStore;
pub use types::{CacheOrigin, CacheStats, CachedSymbol, SymbolCacheConfig};
