//! Deferred resolution: from a catalog entry to the remote's commands
//!
//! Nothing is fetched while the catalog is built. A remote is read and
//! parsed only when asked for, one at a time for `locate` and on a bounded
//! pool for `export`.

use remotelocator_core::{
    CatalogEntry, CatalogKey, FullRemote, LocationError, ProtocolNormalizer, SourceKind,
};
use remotelocator_scrape::{format_for, RemoteRequest, ScrapeError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::fetch::Fetcher;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Remotes of kind {kind} cannot be resolved, see {location}")]
    NotResolvable { kind: SourceKind, location: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to parse remote: {0}")]
    Format(#[from] ScrapeError),
    #[error("Invalid location: {0}")]
    Location(#[from] LocationError),
}

/// One catalog entry to resolve, with the names of its enclosing levels
#[derive(Debug, Clone)]
pub struct ResolveJob {
    pub manufacturer: String,
    pub device_class: String,
    pub key: CatalogKey,
    pub entry: CatalogEntry,
}

impl ResolveJob {
    pub fn new(manufacturer: &str, device_class: &str, key: &CatalogKey, entry: &CatalogEntry) -> Self {
        Self {
            manufacturer: manufacturer.to_string(),
            device_class: device_class.to_string(),
            key: key.clone(),
            entry: entry.clone(),
        }
    }
}

pub struct Resolver {
    fetcher: Fetcher,
    normalizer: ProtocolNormalizer,
    timeout: Duration,
    max_concurrent: usize,
}

impl Resolver {
    pub fn new(fetcher: Fetcher, config: &ResolverConfig) -> Self {
        Self {
            fetcher,
            normalizer: ProtocolNormalizer::new(),
            timeout: config.timeout(),
            max_concurrent: config.max_concurrent.max(1),
        }
    }

    /// Fetch and parse the remote an entry points to
    pub async fn resolve(
        &self,
        manufacturer: &str,
        device_class: &str,
        entry: &CatalogEntry,
    ) -> Result<FullRemote, ResolveError> {
        let kind = entry.kind();
        if !kind.is_resolvable() {
            return Err(ResolveError::NotResolvable {
                kind,
                location: entry.location().to_string(),
            });
        }

        let fetched = tokio::time::timeout(self.timeout, self.fetcher.fetch(kind, entry.location()))
            .await
            .map_err(|_| ResolveError::Timeout(self.timeout))??;

        let request = RemoteRequest {
            manufacturer,
            device_class,
            remote_name: entry.remote_name(),
            selector: entry.selector(),
            origin: &fetched.origin,
        };
        let mut remote = format_for(kind).parse_remote(&fetched.content, &request, &self.normalizer)?;
        if remote.model.is_none() {
            remote.model = entry.model().map(str::to_string);
        }
        if remote.comment.is_none() {
            remote.comment = entry.comment().map(str::to_string);
        }
        debug!(remote = %remote.name, commands = remote.commands.len(), "Resolved remote");
        Ok(remote)
    }

    /// Resolve many entries, at most `max_concurrent` at a time.
    ///
    /// Results come back in job order. A failed job never stops the others.
    pub async fn resolve_all(
        self: &Arc<Self>,
        jobs: Vec<ResolveJob>,
    ) -> Vec<(ResolveJob, Result<FullRemote, ResolveError>)> {
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let total = jobs.len();

        for (index, job) in jobs.into_iter().enumerate() {
            let resolver = Arc::clone(self);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                let result = resolver
                    .resolve(&job.manufacturer, &job.device_class, &job.entry)
                    .await;
                (index, job, result)
            });
        }

        let mut slots: Vec<Option<(ResolveJob, Result<FullRemote, ResolveError>)>> =
            (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, job, result)) => slots[index] = Some((job, result)),
                Err(e) => warn!(error = %e, "Resolve task failed"),
            }
        }

        let results: Vec<_> = slots.into_iter().flatten().collect();
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(total, failed, "Bulk resolution finished");
        results
    }
}
