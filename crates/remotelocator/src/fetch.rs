//! Fetching the bytes behind a catalog location
//!
//! Archive locations are looked up in the configured local mirror of their
//! kind first; only when the file is not there is the URL downloaded.

use remotelocator_core::{Location, SourceKind};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::resolver::ResolveError;

/// Content of a remote file and where it came from
#[derive(Debug)]
pub struct Fetched {
    pub content: Vec<u8>,
    /// Path or URL, for messages
    pub origin: String,
}

pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
    mirrors: BTreeMap<SourceKind, PathBuf>,
}

impl Fetcher {
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        mirrors: BTreeMap<SourceKind, PathBuf>,
    ) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            timeout,
            mirrors,
        })
    }

    /// Mirror file for an archive location, if it exists
    async fn mirrored(&self, kind: SourceKind, relative: &str) -> Option<PathBuf> {
        let root = self.mirrors.get(&kind)?;
        if relative.is_empty() {
            return None;
        }
        let path = relative
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(root.clone(), |path, segment| path.join(segment));
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    async fn read_local(path: &Path) -> Result<Fetched, ResolveError> {
        let content = tokio::fs::read(path).await?;
        debug!(path = %path.display(), bytes = content.len(), "Read local file");
        Ok(Fetched {
            content,
            origin: path.display().to_string(),
        })
    }

    pub async fn fetch(&self, kind: SourceKind, location: &Location) -> Result<Fetched, ResolveError> {
        if let Some(path) = location.local_path() {
            return Self::read_local(path).await;
        }
        if let Some(path) = self.mirrored(kind, location.relative().unwrap_or_default()).await {
            return Self::read_local(&path).await;
        }

        self.fetch_url(&location.url()?).await
    }

    fn http_error(&self, error: reqwest::Error) -> ResolveError {
        if error.is_timeout() {
            ResolveError::Timeout(self.timeout)
        } else {
            ResolveError::Http(error)
        }
    }

    /// Download a URL with the configured client
    pub async fn fetch_url(&self, url: &Url) -> Result<Fetched, ResolveError> {
        info!(url = %url, "Downloading");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.http_error(e))?;
        if !response.status().is_success() {
            return Err(ResolveError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let content = response.bytes().await.map_err(|e| self.http_error(e))?.to_vec();
        debug!(url = %url, bytes = content.len(), "Downloaded");
        Ok(Fetched {
            content,
            origin: url.to_string(),
        })
    }
}
