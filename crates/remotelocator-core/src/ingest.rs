//! Ingestion: raw scraped tuples into a [`Catalog`]
//!
//! Tuples are put into a canonical order first, so building from the same
//! archive always assigns the same collision suffixes no matter in which
//! order the filesystem listed the files.

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogEntry};
use crate::key::{normalize, CatalogKey};
use crate::location::{Location, SourceKind};
use crate::protocol::{ProtocolError, ProtocolNormalizer, SourceCode};

/// One remote as found by a scraper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub manufacturer: String,
    pub device_class: String,
    pub remote_name: String,
    pub kind: SourceKind,
    pub location: Location,
    pub selector: Option<String>,
    pub comment: Option<String>,
    pub model: Option<String>,
    /// Representative code of the remote, if the source has one
    pub code: Option<SourceCode>,
}

impl RawEntry {
    pub fn new(
        manufacturer: &str,
        device_class: &str,
        remote_name: &str,
        kind: SourceKind,
        location: Location,
    ) -> Self {
        Self {
            manufacturer: manufacturer.to_string(),
            device_class: device_class.to_string(),
            remote_name: remote_name.to_string(),
            kind,
            location,
            selector: None,
            comment: None,
            model: None,
            code: None,
        }
    }

    fn sort_key(&self) -> (CatalogKey, CatalogKey, CatalogKey, String) {
        (
            normalize(&self.manufacturer),
            normalize(&self.device_class),
            normalize(&self.remote_name),
            self.location.to_string(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Sort tuples canonically before inserting
    pub presort: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { presort: true }
    }
}

/// An entry stored under a suffixed key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedEntry {
    pub manufacturer: String,
    pub device_class: String,
    pub remote_name: String,
    pub key: CatalogKey,
}

/// A tuple left out because its code could not be normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub manufacturer: String,
    pub device_class: String,
    pub remote_name: String,
    pub error: ProtocolError,
}

/// Outcome of one ingestion pass
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub inserted: usize,
    pub renamed: Vec<RenamedEntry>,
    pub skipped: Vec<SkippedEntry>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.renamed.is_empty() && self.skipped.is_empty()
    }
}

/// Insert raw tuples into `catalog`.
///
/// A tuple whose code fails to normalize is skipped and reported; the rest
/// of the batch is still inserted.
pub fn ingest(
    catalog: &mut Catalog,
    normalizer: &ProtocolNormalizer,
    mut entries: Vec<RawEntry>,
    options: &IngestOptions,
) -> IngestReport {
    if options.presort {
        entries.sort_by_cached_key(RawEntry::sort_key);
    }

    let mut report = IngestReport::default();
    for raw in entries {
        let code = match raw.code.as_ref().map(|c| normalizer.decode_source(c)).transpose() {
            Ok(code) => code,
            Err(e) => {
                warn!(
                    manufacturer = %raw.manufacturer,
                    device_class = %raw.device_class,
                    remote = %raw.remote_name,
                    error = %e,
                    "Skipping remote with unusable code"
                );
                report.skipped.push(SkippedEntry {
                    manufacturer: raw.manufacturer,
                    device_class: raw.device_class,
                    remote_name: raw.remote_name,
                    error: e,
                });
                continue;
            }
        };

        let mut entry = CatalogEntry::new(&raw.remote_name, raw.kind, raw.location)
            .with_selector(raw.selector)
            .with_comment(raw.comment)
            .with_model(raw.model);
        if let Some(code) = code {
            entry = entry.with_code(code);
        }

        let placement = catalog.put(&raw.manufacturer, &raw.device_class, entry);
        report.inserted += 1;
        if placement.renamed {
            report.renamed.push(RenamedEntry {
                manufacturer: raw.manufacturer,
                device_class: raw.device_class,
                remote_name: raw.remote_name,
                key: placement.key,
            });
        } else {
            debug!(key = %placement.key, "Inserted remote");
        }
    }

    info!(
        inserted = report.inserted,
        renamed = report.renamed.len(),
        skipped = report.skipped.len(),
        "Ingestion finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ParamName, PreDecodedCode, RawCode};

    fn raw(m: &str, d: &str, r: &str, path: &str) -> RawEntry {
        RawEntry::new(m, d, r, SourceKind::Flipper, Location::local(path))
    }

    #[test]
    fn test_presort_makes_suffixes_stable() {
        let a = raw("Sony", "TV", "Remote", "/m/b.ir");
        let b = raw("sony", "tv", "remote", "/m/a.ir");

        let mut forward = Catalog::new();
        ingest(&mut forward, &ProtocolNormalizer::new(), vec![a.clone(), b.clone()], &IngestOptions::default());
        let mut backward = Catalog::new();
        ingest(&mut backward, &ProtocolNormalizer::new(), vec![b, a], &IngestOptions::default());

        assert_eq!(forward, backward);
        assert_eq!(forward.triples(), backward.triples());
        // "/m/a.ir" sorts first and keeps the natural key
        let first = forward.get("sony", "tv", "remote").unwrap();
        assert_eq!(first.location(), &Location::local("/m/a.ir"));
    }

    #[test]
    fn test_keep_order() {
        let mut catalog = Catalog::new();
        let options = IngestOptions { presort: false };
        let report = ingest(
            &mut catalog,
            &ProtocolNormalizer::new(),
            vec![raw("Z", "x", "1", "/1"), raw("A", "x", "2", "/2")],
            &options,
        );
        assert_eq!(report.inserted, 2);
        assert!(report.is_clean());
        assert_eq!(catalog.list_manufacturers(None), vec!["Z", "A"]);
    }

    #[test]
    fn test_unsupported_code_skipped() {
        let mut good = raw("Samsung", "TV", "AA59", "/samsung.ir");
        good.code = Some(SourceCode::Raw(RawCode::new("Samsung32", 0x0700_0000, 0x0200_0000)));
        let mut bad = raw("Acme", "TV", "Foo", "/acme.ir");
        bad.code = Some(SourceCode::Raw(RawCode::new("Foo123", 0, 0)));

        let mut catalog = Catalog::new();
        let report = ingest(&mut catalog, &ProtocolNormalizer::new(), vec![good, bad], &IngestOptions::default());

        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].error, ProtocolError::Unsupported { token: "Foo123".to_string() });
        assert!(report.skipped[0].error.is_unsupported());
        assert_eq!(catalog.len(), 1);
        let entry = catalog.get("samsung", "tv", "aa59").unwrap();
        assert_eq!(entry.canonical_protocol(), Some("NECx1"));
        assert_eq!(entry.parameters().get(ParamName::S), Some(7));
    }

    #[test]
    fn test_tabular_code() {
        let mut entry = RawEntry::new(
            "Yamaha",
            "Receiver",
            "120,-1",
            SourceKind::Irdb,
            Location::local("/irdb/Yamaha/Receiver/120,-1.csv"),
        );
        entry.code = Some(SourceCode::Tabular(PreDecodedCode {
            protocol: "nec".to_string(),
            device: 127,
            subdevice: -1,
            function: Some(12),
        }));

        let mut catalog = Catalog::new();
        ingest(&mut catalog, &ProtocolNormalizer::new(), vec![entry], &IngestOptions::default());
        let stored = catalog.get("YAMAHA", "receiver", "120,-1").unwrap();
        assert_eq!(stored.canonical_protocol(), Some("NEC1"));
        assert_eq!(stored.parameters().get(ParamName::D), Some(127));
        assert_eq!(stored.parameters().get(ParamName::F), Some(12));
        assert!(!stored.parameters().contains(ParamName::S));
    }

    #[test]
    fn test_report_lists_renames() {
        let mut catalog = Catalog::new();
        let report = ingest(
            &mut catalog,
            &ProtocolNormalizer::new(),
            vec![raw("LG", "TV", "AKB", "/1"), raw("LG", "TV", "akb", "/2")],
            &IngestOptions::default(),
        );
        assert_eq!(report.inserted, 2);
        assert_eq!(report.renamed.len(), 1);
        assert_eq!(report.renamed[0].key.as_str(), "akb$1");
        assert_eq!(report.renamed[0].remote_name, "akb");
    }
}
