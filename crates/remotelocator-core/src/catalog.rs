//! Catalog index: manufacturer → device class → remote
//!
//! All three levels are insertion-ordered maps keyed by normalized names.
//! Duplicate remote keys inside one device class are renamed `key$1`,
//! `key$2`, … instead of replacing the earlier entry.

use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::warn;

use crate::key::{display_name, normalize, CatalogKey};
use crate::location::{Location, SourceKind};
use crate::protocol::{CanonicalCode, Parameters};

/// Catalog level, used in lookup failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Manufacturer,
    DeviceClass,
    Remote,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Manufacturer => "manufacturer",
            Level::DeviceClass => "device class",
            Level::Remote => "remote",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("No such {level}: {name}")]
    NotFound { level: Level, name: String },
}

impl CatalogError {
    fn not_found(level: Level, name: &str) -> Self {
        CatalogError::NotFound {
            level,
            name: name.to_string(),
        }
    }
}

/// Where an inserted entry ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub key: CatalogKey,
    /// True when the natural key was taken and a `$n` suffix was used
    pub renamed: bool,
}

/// One catalogued remote. The location is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    remote_name: String,
    kind: SourceKind,
    location: Location,
    selector: Option<String>,
    comment: Option<String>,
    model: Option<String>,
    canonical_protocol: Option<String>,
    parameters: Parameters,
}

impl CatalogEntry {
    pub fn new(remote_name: &str, kind: SourceKind, location: Location) -> Self {
        Self {
            remote_name: display_name(remote_name),
            kind,
            location,
            selector: None,
            comment: None,
            model: None,
            canonical_protocol: None,
            parameters: Parameters::new(),
        }
    }

    /// XPath-like selector picking this remote out of a multi-remote file
    pub fn with_selector(mut self, selector: Option<String>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_code(mut self, code: CanonicalCode) -> Self {
        self.canonical_protocol = Some(code.protocol);
        self.parameters = code.parameters;
        self
    }

    pub fn with_protocol(mut self, protocol: Option<String>, parameters: Parameters) -> Self {
        self.canonical_protocol = protocol;
        self.parameters = parameters;
        self
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn canonical_protocol(&self) -> Option<&str> {
        self.canonical_protocol.as_deref()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Key the entry would get without a collision
    pub fn natural_key(&self) -> CatalogKey {
        normalize(&self.remote_name)
    }
}

/// Insert under `key`, probing `key$1`, `key$2`, … when taken
fn place<V>(map: &mut IndexMap<CatalogKey, V>, key: CatalogKey, value: V) -> Placement {
    if !map.contains_key(&key) {
        map.insert(key.clone(), value);
        return Placement {
            key,
            renamed: false,
        };
    }

    let mut n = 1;
    let free = loop {
        let candidate = key.with_suffix(n);
        if !map.contains_key(&candidate) {
            break candidate;
        }
        n += 1;
    };
    warn!(key = %key, stored = %free, "Duplicate key, entry renamed");
    map.insert(free.clone(), value);
    Placement {
        key: free,
        renamed: true,
    }
}

/// Remotes of one device class of one manufacturer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceClassNode {
    name: String,
    remotes: IndexMap<CatalogKey, CatalogEntry>,
}

impl DeviceClassNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: display_name(name),
            remotes: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&mut self, entry: CatalogEntry) -> Placement {
        let key = entry.natural_key();
        place(&mut self.remotes, key, entry)
    }

    /// Insert under a previously assigned key (as read back from a document)
    pub fn insert_with_key(&mut self, key: CatalogKey, entry: CatalogEntry) -> Placement {
        place(&mut self.remotes, key, entry)
    }

    pub fn get(&self, remote: &str) -> Option<&CatalogEntry> {
        self.remotes.get(&normalize(remote))
    }

    pub fn remotes(&self) -> impl Iterator<Item = (&CatalogKey, &CatalogEntry)> {
        self.remotes.iter()
    }

    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    fn has_kind(&self, kind: Option<SourceKind>) -> bool {
        self.remotes.values().any(|e| matches_kind(e, kind))
    }

    fn sort_by<F: FnMut(&str, &str) -> Ordering>(&mut self, cmp: &mut F) {
        self.remotes.sort_by(|k1, e1, k2, e2| {
            cmp(listed_name(k1, e1), listed_name(k2, e2)).then_with(|| k1.cmp(k2))
        });
    }
}

/// Device classes of one manufacturer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerNode {
    name: String,
    device_classes: IndexMap<CatalogKey, DeviceClassNode>,
}

impl ManufacturerNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: display_name(name),
            device_classes: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, device_class: &str) -> Option<&DeviceClassNode> {
        self.device_classes.get(&normalize(device_class))
    }

    pub fn device_classes(&self) -> impl Iterator<Item = (&CatalogKey, &DeviceClassNode)> {
        self.device_classes.iter()
    }

    fn device_class_mut(&mut self, device_class: &str) -> &mut DeviceClassNode {
        self.device_classes
            .entry(normalize(device_class))
            .or_insert_with(|| DeviceClassNode::new(device_class))
    }

    fn has_kind(&self, kind: Option<SourceKind>) -> bool {
        self.device_classes.values().any(|d| d.has_kind(kind))
    }

    fn sort_by<F: FnMut(&str, &str) -> Ordering>(&mut self, cmp: &mut F) {
        for node in self.device_classes.values_mut() {
            node.sort_by(cmp);
        }
        self.device_classes
            .sort_by(|k1, d1, k2, d2| cmp(&d1.name, &d2.name).then_with(|| k1.cmp(k2)));
    }
}

/// The three-level catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    manufacturers: IndexMap<CatalogKey, ManufacturerNode>,
}

/// Name under which a remote is listed; renamed entries list as their key
fn listed_name<'a>(key: &'a CatalogKey, entry: &'a CatalogEntry) -> &'a str {
    if *key == entry.natural_key() {
        entry.remote_name()
    } else {
        key.as_str()
    }
}

fn matches_kind(entry: &CatalogEntry, kind: Option<SourceKind>) -> bool {
    kind.map_or(true, |k| entry.kind() == k)
}

/// Default ordering: case-insensitive lexicographic
pub fn case_insensitive(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, creating the manufacturer and device class nodes
    /// on first sight. The first spelling seen becomes the display name.
    pub fn put(&mut self, manufacturer: &str, device_class: &str, entry: CatalogEntry) -> Placement {
        self.manufacturer_mut(manufacturer)
            .device_class_mut(device_class)
            .insert(entry)
    }

    /// Like [`Catalog::put`], keeping a key assigned earlier
    pub fn put_with_key(
        &mut self,
        manufacturer: &str,
        device_class: &str,
        key: CatalogKey,
        entry: CatalogEntry,
    ) -> Placement {
        self.manufacturer_mut(manufacturer)
            .device_class_mut(device_class)
            .insert_with_key(key, entry)
    }

    fn manufacturer_mut(&mut self, manufacturer: &str) -> &mut ManufacturerNode {
        self.manufacturers
            .entry(normalize(manufacturer))
            .or_insert_with(|| ManufacturerNode::new(manufacturer))
    }

    /// Case-insensitive lookup
    pub fn get(
        &self,
        manufacturer: &str,
        device_class: &str,
        remote: &str,
    ) -> Result<&CatalogEntry, CatalogError> {
        self.device_class(manufacturer, device_class)?
            .get(remote)
            .ok_or_else(|| CatalogError::not_found(Level::Remote, remote))
    }

    pub fn manufacturer(&self, manufacturer: &str) -> Result<&ManufacturerNode, CatalogError> {
        self.manufacturers
            .get(&normalize(manufacturer))
            .ok_or_else(|| CatalogError::not_found(Level::Manufacturer, manufacturer))
    }

    pub fn device_class(
        &self,
        manufacturer: &str,
        device_class: &str,
    ) -> Result<&DeviceClassNode, CatalogError> {
        self.manufacturer(manufacturer)?
            .get(device_class)
            .ok_or_else(|| CatalogError::not_found(Level::DeviceClass, device_class))
    }

    /// Sort all levels case-insensitively by display name
    pub fn sort(&mut self) {
        self.sort_by(case_insensitive);
    }

    /// Stable recursive sort of all three levels. Keys are kept, so renamed
    /// entries stay retrievable under their suffixed key.
    pub fn sort_by<F: FnMut(&str, &str) -> Ordering>(&mut self, mut cmp: F) {
        for node in self.manufacturers.values_mut() {
            node.sort_by(&mut cmp);
        }
        self.manufacturers
            .sort_by(|k1, m1, k2, m2| cmp(&m1.name, &m2.name).then_with(|| k1.cmp(k2)));
    }

    /// Manufacturers having at least one entry of `kind` (all when `None`)
    pub fn list_manufacturers(&self, kind: Option<SourceKind>) -> Vec<&str> {
        self.manufacturers
            .values()
            .filter(|m| m.has_kind(kind))
            .map(|m| m.name())
            .collect()
    }

    pub fn list_device_classes(
        &self,
        manufacturer: &str,
        kind: Option<SourceKind>,
    ) -> Result<Vec<&str>, CatalogError> {
        Ok(self
            .manufacturer(manufacturer)?
            .device_classes
            .values()
            .filter(|d| d.has_kind(kind))
            .map(|d| d.name())
            .collect())
    }

    pub fn list_remotes(
        &self,
        manufacturer: &str,
        device_class: &str,
        kind: Option<SourceKind>,
    ) -> Result<Vec<&str>, CatalogError> {
        Ok(self
            .device_class(manufacturer, device_class)?
            .remotes
            .iter()
            .filter(|(_, e)| matches_kind(e, kind))
            .map(|(k, e)| listed_name(k, e))
            .collect())
    }

    pub fn manufacturers(&self) -> impl Iterator<Item = (&CatalogKey, &ManufacturerNode)> {
        self.manufacturers.iter()
    }

    /// Every entry in iteration order with its enclosing nodes and key
    pub fn entries(
        &self,
    ) -> impl Iterator<Item = (&ManufacturerNode, &DeviceClassNode, &CatalogKey, &CatalogEntry)> {
        self.manufacturers.values().flat_map(|m| {
            m.device_classes.values().flat_map(move |d| {
                d.remotes
                    .iter()
                    .map(move |(key, entry)| (m, d, key, entry))
            })
        })
    }

    /// Ordered key triples, the shape of the catalog without its payload
    pub fn triples(&self) -> Vec<(CatalogKey, CatalogKey, CatalogKey)> {
        self.manufacturers
            .iter()
            .flat_map(|(mk, m)| {
                m.device_classes.iter().flat_map(move |(dk, d)| {
                    d.remotes
                        .keys()
                        .map(move |rk| (mk.clone(), dk.clone(), rk.clone()))
                })
            })
            .collect()
    }

    pub fn kinds(&self) -> BTreeSet<SourceKind> {
        self.entries().map(|(_, _, _, e)| e.kind()).collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.manufacturers
            .values()
            .flat_map(|m| m.device_classes.values())
            .map(|d| d.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ParamName;
    use std::path::PathBuf;

    fn entry(name: &str, kind: SourceKind) -> CatalogEntry {
        CatalogEntry::new(name, kind, Location::local(PathBuf::from(format!("/mirror/{}", name))))
    }

    #[test]
    fn test_collision_rename() {
        let mut catalog = Catalog::new();
        let first = catalog.put("Philips", "TV", entry("RC5 Remote", SourceKind::Girr));
        let second = catalog.put("philips", "tv", entry("rc5 remote", SourceKind::Irdb));
        let third = catalog.put("PHILIPS", "TV", entry(" RC5 REMOTE ", SourceKind::Lirc));

        assert_eq!(first, Placement { key: normalize("rc5 remote"), renamed: false });
        assert_eq!(second.key.as_str(), "rc5 remote$1");
        assert!(second.renamed);
        assert_eq!(third.key.as_str(), "rc5 remote$2");

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("philips", "tv", "RC5 Remote").unwrap().kind(), SourceKind::Girr);
        assert_eq!(catalog.get("philips", "tv", "rc5 remote$1").unwrap().kind(), SourceKind::Irdb);
        // The entry keeps its own name
        assert_eq!(catalog.get("philips", "tv", "rc5 remote$1").unwrap().remote_name(), "rc5 remote");
        assert_eq!(
            catalog.list_remotes("Philips", "TV", None).unwrap(),
            vec!["RC5 Remote", "rc5 remote$1", "rc5 remote$2"]
        );
    }

    #[test]
    fn test_suffix_probe_skips_taken_keys() {
        let mut node = DeviceClassNode::new("tv");
        node.insert_with_key(CatalogKey::from_normalized("x$1"), entry("x", SourceKind::Girr));
        node.insert(entry("x", SourceKind::Girr));
        let placement = node.insert(entry("X", SourceKind::Girr));
        assert_eq!(placement.key.as_str(), "x$2");
        assert_eq!(node.len(), 3);
    }

    #[test]
    fn test_case_insensitive_get() {
        let mut catalog = Catalog::new();
        catalog.put("Sony", "Audio", entry("RM-AAU014", SourceKind::Irdb));
        let a = catalog.get("Sony", "Audio", "RM-AAU014").unwrap();
        let b = catalog.get("SONY", "aUdIo", "rm-aau014").unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(catalog.manufacturer("sony").unwrap().name(), "Sony");
    }

    #[test]
    fn test_not_found_levels() {
        let mut catalog = Catalog::new();
        catalog.put("Sony", "Audio", entry("RM-1", SourceKind::Irdb));
        assert_eq!(
            catalog.get("Yamaha", "Audio", "RM-1").unwrap_err(),
            CatalogError::NotFound { level: Level::Manufacturer, name: "Yamaha".to_string() }
        );
        assert_eq!(
            catalog.get("Sony", "TV", "RM-1").unwrap_err(),
            CatalogError::NotFound { level: Level::DeviceClass, name: "TV".to_string() }
        );
        let err = catalog.get("Sony", "Audio", "RM-2").unwrap_err();
        assert_eq!(err.to_string(), "No such remote: RM-2");
    }

    #[test]
    fn test_insertion_order_kept() {
        let mut catalog = Catalog::new();
        catalog.put("Zenith", "TV", entry("b", SourceKind::Girr));
        catalog.put("Acer", "Projector", entry("z", SourceKind::Girr));
        catalog.put("Zenith", "TV", entry("a", SourceKind::Girr));
        assert_eq!(catalog.list_manufacturers(None), vec!["Zenith", "Acer"]);
        assert_eq!(catalog.list_remotes("zenith", "tv", None).unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut catalog = Catalog::new();
        catalog.put("yamaha", "Receiver", entry("RX-V2", SourceKind::Girr));
        catalog.put("Apple", "tv", entry("b", SourceKind::Girr));
        catalog.put("apple", "Audio", entry("A", SourceKind::Irdb));
        catalog.put("Yamaha", "receiver", entry("rx-v1", SourceKind::Lirc));
        catalog.put("Yamaha", "receiver", entry("RX-V1", SourceKind::Flipper));
        catalog.put("Bose", "Audio", entry("c", SourceKind::Irdb));

        catalog.sort();
        let once = catalog.triples();
        catalog.sort();
        assert_eq!(catalog.triples(), once);

        assert_eq!(catalog.list_manufacturers(None), vec!["Apple", "Bose", "yamaha"]);
        assert_eq!(catalog.list_device_classes("apple", None).unwrap(), vec!["Audio", "tv"]);
        // renamed entry survives the sort under its suffixed key
        assert_eq!(
            catalog.list_remotes("yamaha", "receiver", None).unwrap(),
            vec!["rx-v1", "rx-v1$1", "RX-V2"]
        );
        assert_eq!(
            catalog.get("yamaha", "receiver", "rx-v1$1").unwrap().kind(),
            SourceKind::Flipper
        );
    }

    #[test]
    fn test_sort_by_custom_order() {
        let mut catalog = Catalog::new();
        catalog.put("a", "x", entry("1", SourceKind::Girr));
        catalog.put("b", "x", entry("2", SourceKind::Girr));
        catalog.sort_by(|a, b| b.cmp(a));
        assert_eq!(catalog.list_manufacturers(None), vec!["b", "a"]);
    }

    #[test]
    fn test_kind_filter() {
        let mut catalog = Catalog::new();
        catalog.put("Sony", "TV", entry("girr-remote", SourceKind::Girr));
        catalog.put("Sony", "Audio", entry("irdb-remote", SourceKind::Irdb));
        catalog.put("LG", "TV", entry("other", SourceKind::Irdb));

        assert_eq!(catalog.list_manufacturers(Some(SourceKind::Girr)), vec!["Sony"]);
        assert_eq!(catalog.list_manufacturers(Some(SourceKind::Irdb)), vec!["Sony", "LG"]);
        assert!(catalog.list_manufacturers(Some(SourceKind::Jp1)).is_empty());
        assert_eq!(
            catalog.list_device_classes("sony", Some(SourceKind::Irdb)).unwrap(),
            vec!["Audio"]
        );
        assert!(catalog.list_remotes("sony", "tv", Some(SourceKind::Irdb)).unwrap().is_empty());
        assert_eq!(
            catalog.kinds().into_iter().collect::<Vec<_>>(),
            vec![SourceKind::Girr, SourceKind::Irdb]
        );
    }

    #[test]
    fn test_empty_names_become_unknown() {
        let mut catalog = Catalog::new();
        catalog.put("", "  ", entry("", SourceKind::Lirc));
        assert_eq!(catalog.list_manufacturers(None), vec!["unknown"]);
        assert!(catalog.get("unknown", "unknown", "unknown").is_ok());
    }

    #[test]
    fn test_entry_code() {
        let mut parameters = Parameters::new();
        parameters.insert(ParamName::D, 7);
        let e = entry("r", SourceKind::Flipper).with_code(CanonicalCode {
            protocol: "NECx1".to_string(),
            parameters,
        });
        assert_eq!(e.canonical_protocol(), Some("NECx1"));
        assert_eq!(e.parameters().get(ParamName::D), Some(7));
        assert!(!e.parameters().contains(ParamName::S));
    }
}
