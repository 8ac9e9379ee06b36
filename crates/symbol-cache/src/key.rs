//! Symbol key validation and path resolution

use crate::error::ServeError;
use std::fmt;
use std::path::PathBuf;

/// Longest token accepted as a single path segment
const MAX_SEGMENT_LEN: usize = 255;

/// A validated (name, hash) pair identifying one symbol file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolKey {
    name: String,
    hash: String,
}

/// Relative locations of a symbol file, locally and upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolPaths {
    /// `name/hash/name` with the platform separator
    pub local: PathBuf,
    /// `name/hash/name` with `/`
    pub upstream: String,
}

/// An upstream base address paired with a resolved relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamLocation {
    pub base_url: String,
    pub relative_path: String,
}

impl SymbolKey {
    /// Validate `name` and `hash` as single path segments
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Result<Self, ServeError> {
        let name = name.into();
        let hash = hash.into();
        validate_segment("name", &name)?;
        validate_segment("hash", &hash)?;
        Ok(Self { name, hash })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Resolve the key into its local and upstream relative paths
    pub fn resolve(&self) -> SymbolPaths {
        let local = PathBuf::from(&self.name).join(&self.hash).join(&self.name);
        let upstream = format!("{}/{}/{}", self.name, self.hash, self.name);
        SymbolPaths { local, upstream }
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.hash)
    }
}

impl UpstreamLocation {
    pub fn new(base_url: &str, paths: &SymbolPaths) -> Self {
        Self {
            base_url: base_url.to_string(),
            relative_path: paths.upstream.clone(),
        }
    }

    /// Full request URL, joined with exactly one `/`
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.relative_path.trim_start_matches('/')
        )
    }
}

fn validate_segment(field: &str, value: &str) -> Result<(), ServeError> {
    if value.is_empty() {
        return Err(ServeError::InvalidKey(format!("{} is empty", field)));
    }
    if value.len() > MAX_SEGMENT_LEN {
        return Err(ServeError::InvalidKey(format!("{} is too long", field)));
    }
    if value == "." || value == ".." {
        return Err(ServeError::InvalidKey(format!(
            "{} is a relative path component",
            field
        )));
    }
    if value
        .chars()
        .any(|c| c == '/' || c == '\\' || c == ':' || c.is_control())
    {
        return Err(ServeError::InvalidKey(format!(
            "{} contains a separator, drive prefix or control character",
            field
        )));
    }
    Ok(())
}
