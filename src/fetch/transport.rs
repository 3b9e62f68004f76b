use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use url::Url;

use super::retry::{is_retryable, retry_async, HttpStatusError, RetryConfig};
use super::Transport;

/// Retrieves resources relative to a base URL.
pub struct HttpTransport {
    client: Client,
    base: Url,
    retry: RetryConfig,
}

impl HttpTransport {
    pub fn new(mut base: Url, timeout: Duration, retry: RetryConfig) -> Self {
        // Url::join drops the last path segment unless it ends with a slash
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base,
            retry,
        }
    }

    pub fn url_for(&self, key: &str) -> Result<Url> {
        self.base
            .join(key)
            .with_context(|| format!("cannot resolve {} against {}", key, self.base))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn retrieve(&self, key: &str) -> Result<String> {
        let url = self.url_for(key)?;
        retry_async(&self.retry, key, is_retryable, || {
            let url = url.clone();
            async move {
                let resp = self.client.get(url).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(HttpStatusError {
                        status: status.as_u16(),
                    }
                    .into());
                }
                Ok(resp.text().await?)
            }
        })
        .await
    }
}

/// Reads resources from a directory tree.
pub struct FileTransport {
    root: PathBuf,
}

impl FileTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(anyhow!("resource key escapes data root: {}", key));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn retrieve(&self, key: &str) -> Result<String> {
        let path = self.path_for(key)?;
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let base = Url::parse("https://example.org/dash").unwrap();
        let t = HttpTransport::new(base, Duration::from_secs(1), RetryConfig::default());
        assert_eq!(
            t.url_for("data/summary.json").unwrap().as_str(),
            "https://example.org/dash/data/summary.json"
        );
    }

    #[tokio::test]
    async fn file_transport_reads_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/a.json"), "{\"v\":1}").unwrap();

        let t = FileTransport::new(dir.path());
        assert_eq!(t.retrieve("data/a.json").await.unwrap(), "{\"v\":1}");
        assert!(t.retrieve("data/missing.json").await.is_err());
        assert!(t.retrieve("../etc/passwd").await.is_err());
        assert!(t.retrieve("/etc/passwd").await.is_err());
    }
}
