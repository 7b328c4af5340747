//! The `build` stage: scrape archive mirrors into a catalog document

use anyhow::{bail, Context, Result};
use remotelocator_core::{
    ingest, Catalog, CatalogDocument, IngestOptions, ProtocolNormalizer, SourceKind,
};
use remotelocator_scrape::format_for;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Config;

/// A local archive to scrape
#[derive(Debug, Clone)]
pub struct SourceRoot {
    pub kind: SourceKind,
    pub root: PathBuf,
}

pub fn build_document(
    config: &Config,
    roots: &[SourceRoot],
    options: &IngestOptions,
    sort: bool,
) -> Result<CatalogDocument> {
    let mut entries = Vec::new();
    let mut bases = BTreeMap::new();

    for source in roots {
        let base = config.base_url(source.kind)?;
        let scraped = format_for(source.kind)
            .scrape(&source.root, &base)
            .with_context(|| format!("Failed to scrape {} from {}", source.kind, source.root.display()))?;
        info!(kind = %source.kind, root = %source.root.display(), count = scraped.len(), "Scraped source");
        entries.extend(scraped);
        // JP1 rows carry absolute URLs
        if source.kind != SourceKind::Jp1 {
            bases.insert(source.kind, base);
        }
    }

    let mut catalog = Catalog::new();
    let report = ingest(&mut catalog, &ProtocolNormalizer::new(), entries, options);
    if !report.renamed.is_empty() {
        info!(count = report.renamed.len(), "Remotes renamed to resolve collisions");
    }
    if !report.skipped.is_empty() {
        let unsupported = report.skipped.iter().filter(|s| s.error.is_unsupported()).count();
        warn!(
            count = report.skipped.len(),
            unsupported,
            "Remotes skipped for unusable codes"
        );
    }
    if catalog.is_empty() {
        bail!("No remotes found");
    }
    if sort {
        catalog.sort();
    }

    let mut document = CatalogDocument::new(catalog, bases);
    document.info.title = config.catalog.title.clone();
    info!(remotes = document.catalog.len(), "Catalog built");
    Ok(document)
}
