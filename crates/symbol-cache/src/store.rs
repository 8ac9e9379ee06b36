//! Local storage root for cached symbol files

use crate::key::SymbolPaths;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, File};
use tracing::{debug, info, warn};

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directory tree holding `name/hash/name` files
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the storage root exists
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!(storage_root = ?self.root, "Symbol store initialized");
        Ok(())
    }

    /// Absolute destination for a resolved key
    pub fn path_for(&self, paths: &SymbolPaths) -> PathBuf {
        self.root.join(&paths.local)
    }

    /// Whether a regular file is present at `path`.
    ///
    /// Any error (missing, permission denied) counts as absent.
    pub async fn exists(&self, path: &Path) -> bool {
        match fs::metadata(path).await {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(path = ?path, error = %e, "Existence check failed, treating as absent");
                }
                false
            }
        }
    }

    /// Open a present file for reading, returning it with its length
    pub async fn open(&self, path: &Path) -> io::Result<(File, u64)> {
        let file = File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// A unique hidden sibling of `dest` to write into before renaming.
    ///
    /// The name is short and independent of the file name, so it fits even
    /// when `dest` uses the longest accepted segment.
    pub fn staging_path(dest: &Path) -> PathBuf {
        let seq = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        dest.with_file_name(format!(".{}.{}.part", std::process::id(), seq))
    }

    /// Remove a file if present. Failures are logged, never returned.
    pub async fn discard(path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => debug!(path = ?path, "Removed partial file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?path, error = %e, "Failed to remove partial file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SymbolKey;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_creates_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("symbols");
        let store = LocalStore::new(root.clone());

        store.init().await.unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_exists_checks_regular_file() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());
        let paths = SymbolKey::new("foo.pdb", "ABC").unwrap().resolve();
        let dest = store.path_for(&paths);

        assert!(!store.exists(&dest).await);
        // Probing does not create anything
        assert!(!dir.path().join("foo.pdb").exists());

        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"pdb").unwrap();
        assert!(store.exists(&dest).await);
    }

    #[tokio::test]
    async fn test_directory_is_not_a_hit() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());
        let paths = SymbolKey::new("foo.pdb", "ABC").unwrap().resolve();
        let dest = store.path_for(&paths);

        std::fs::create_dir_all(&dest).unwrap();
        assert!(!store.exists(&dest).await);
    }

    #[tokio::test]
    async fn test_open_reports_length() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());
        let path = dir.path().join("file.pdb");
        std::fs::write(&path, b"0123456789").unwrap();

        let (_file, len) = store.open(&path).await.unwrap();
        assert_eq!(len, 10);
    }

    #[test]
    fn test_staging_path_is_unique_sibling() {
        let dest = Path::new("/cache/foo.pdb/ABC/foo.pdb");
        let a = LocalStore::staging_path(dest);
        let b = LocalStore::staging_path(dest);

        assert_ne!(a, b);
        assert_eq!(a.parent(), dest.parent());
        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with('.'));
        assert!(name.ends_with(".part"));
        assert!(!name.contains("foo.pdb"));
    }

    #[test]
    fn test_staging_name_fits_longest_segment() {
        let long_name = format!("{}.pdb", "a".repeat(251));
        let dest = Path::new("/cache").join(&long_name).join("ABC").join(&long_name);
        let staging = LocalStore::staging_path(&dest);

        assert!(staging.file_name().unwrap().len() < 64);
    }

    #[tokio::test]
    async fn test_discard_missing_file_is_quiet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.pdb");
        LocalStore::discard(&path).await;

        std::fs::write(&path, b"partial").unwrap();
        LocalStore::discard(&path).await;
        assert!(!path.exists());
    }
}
