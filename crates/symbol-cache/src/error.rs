//! Error types for the symbol cache

use thiserror::Error;

/// Why an upstream fetch did not produce a complete file.
///
/// These kinds are only used for diagnostics; callers of
/// [`SymbolCache::serve`](crate::SymbolCache::serve) see a single
/// [`ServeError::NotFound`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("upstream returned 404")]
    UpstreamNotFound,

    #[error("upstream returned status {0}")]
    UpstreamError(u16),

    #[error("local write error: {0}")]
    LocalWrite(String),

    #[error("fetch task aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// Short stable label used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::UpstreamUnreachable(_) => "upstream_unreachable",
            FetchError::UpstreamNotFound => "upstream_not_found",
            FetchError::UpstreamError(_) => "upstream_error",
            FetchError::LocalWrite(_) => "local_write",
            FetchError::Aborted(_) => "aborted",
        }
    }

    pub(crate) fn local_write(err: std::io::Error) -> Self {
        FetchError::LocalWrite(err.to_string())
    }
}

/// Outcome of a failed `serve` as seen by the request layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServeError {
    #[error("invalid symbol key: {0}")]
    InvalidKey(String),

    #[error("symbol not found")]
    NotFound,
}

/// Errors raised while constructing or initializing the cache
#[derive(Error, Debug)]
pub enum SymbolCacheError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SymbolCacheError>;
