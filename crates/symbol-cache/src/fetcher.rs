//! Upstream symbol server downloads

use crate::error::FetchError;
use crate::store::LocalStore;
use crate::types::SymbolCacheConfig;
use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Successful download summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    pub bytes_written: u64,
}

/// HTTP client for downloading symbol files into the local store
#[derive(Debug, Clone)]
pub struct UpstreamFetcher {
    client: Client,
}

impl UpstreamFetcher {
    /// Create a fetcher with the timeouts and user agent from `config`
    pub fn new(config: &SymbolCacheConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }

    /// Download `url` into `dest`, creating parent directories.
    ///
    /// The body is written to a staging file next to `dest` and renamed into
    /// place only after it has been fully written and synced, so `dest`
    /// never holds a partial file written by this call.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<FetchOutcome, FetchError> {
        debug!(url = %url, "Fetching symbol from upstream");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url = %url, "Upstream does not have symbol");
            return Err(FetchError::UpstreamNotFound);
        }
        if !status.is_success() {
            warn!(status = %status, url = %url, "Upstream returned error status");
            return Err(FetchError::UpstreamError(status.as_u16()));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(FetchError::local_write)?;
        }

        let staging = LocalStore::staging_path(dest);
        let written = match write_body(response, &staging).await {
            Ok(written) => written,
            Err(e) => {
                LocalStore::discard(&staging).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&staging, dest).await {
            LocalStore::discard(&staging).await;
            return Err(FetchError::local_write(e));
        }

        debug!(url = %url, size = written, dest = ?dest, "Stored symbol");
        Ok(FetchOutcome {
            bytes_written: written,
        })
    }
}

/// Stream the response body into `path`, returning the byte count
async fn write_body(response: Response, path: &Path) -> Result<u64, FetchError> {
    let mut file = File::create(path).await.map_err(FetchError::local_write)?;
    let mut written: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        // A body shorter than its Content-Length surfaces here as a stream error
        let chunk = chunk.map_err(|e| {
            FetchError::UpstreamUnreachable(format!("body interrupted: {}", e))
        })?;
        file.write_all(&chunk)
            .await
            .map_err(FetchError::local_write)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(FetchError::local_write)?;
    file.sync_all().await.map_err(FetchError::local_write)?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_fetcher(timeout: Duration) -> UpstreamFetcher {
        let config = SymbolCacheConfig {
            timeout,
            ..SymbolCacheConfig::default()
        };
        UpstreamFetcher::new(&config).unwrap()
    }

    fn leftover_files(dir: &Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_fetch_writes_body_and_creates_parents() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/foo.pdb/ABC/foo.pdb"))
            .and(header("user-agent", "Microsoft-Symbol-Server/10.0.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MSF 7.00".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("foo.pdb").join("ABC").join("foo.pdb");
        let url = format!("{}/foo.pdb/ABC/foo.pdb", mock_server.uri());

        let outcome = test_fetcher(Duration::from_secs(5))
            .fetch(&url, &dest)
            .await
            .unwrap();

        assert_eq!(outcome.bytes_written, 8);
        assert_eq!(std::fs::read(&dest).unwrap(), b"MSF 7.00");
        // Only the final file remains, no staging leftovers
        assert_eq!(leftover_files(dest.parent().unwrap()), vec!["foo.pdb"]);
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("bar.pdb").join("000").join("bar.pdb");
        let url = format!("{}/bar.pdb/000/bar.pdb", mock_server.uri());

        let err = test_fetcher(Duration::from_secs(5))
            .fetch(&url, &dest)
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::UpstreamNotFound);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_server_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("foo.pdb");
        let url = format!("{}/foo.pdb/ABC/foo.pdb", mock_server.uri());

        let err = test_fetcher(Duration::from_secs(5))
            .fetch(&url, &dest)
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::UpstreamError(503));
    }

    #[tokio::test]
    async fn test_fetch_unreachable() {
        // Nothing listens on the discard port locally
        let dir = tempdir().unwrap();
        let dest = dir.path().join("foo.pdb");

        let err = test_fetcher(Duration::from_secs(5))
            .fetch("http://127.0.0.1:9/foo.pdb/ABC/foo.pdb", &dest)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "upstream_unreachable");
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_unreachable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("slow.pdb").join("1").join("slow.pdb");
        let url = format!("{}/slow.pdb/1/slow.pdb", mock_server.uri());

        let err = test_fetcher(Duration::from_millis(200))
            .fetch(&url, &dest)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "upstream_unreachable");
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_local_write_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        // A regular file where a directory is needed
        let blocker = dir.path().join("foo.pdb");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let dest = blocker.join("ABC").join("foo.pdb");
        let url = format!("{}/foo.pdb/ABC/foo.pdb", mock_server.uri());

        let err = test_fetcher(Duration::from_secs(5))
            .fetch(&url, &dest)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "local_write");
    }
}
