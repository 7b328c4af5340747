//! Catalog document: the persisted XML form of a [`Catalog`]
//!
//! The document carries a format version; a reader accepts exactly
//! [`FORMAT_VERSION`] and rejects anything else before touching the body.

use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::catalog::{Catalog, CatalogEntry};
use crate::key::CatalogKey;
use crate::location::{Location, SourceKind};
use crate::protocol::{ParamName, Parameters};

pub const FORMAT_VERSION: &str = "0.1";
pub const NAMESPACE: &str = "http://www.harctoolbox.org/RemoteLocator";
pub const DEFAULT_TITLE: &str = "Database of downloadable remotes";
const DATE_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Unsupported catalog format version {actual:?}, expected {expected:?}")]
    FormatVersionMismatch { expected: String, actual: String },
    #[error("Failed to parse catalog: {0}")]
    Parse(String),
    #[error("Failed to serialize catalog: {0}")]
    Serialize(String),
    #[error("Invalid location for remote {remote}: {reason}")]
    InvalidLocation { remote: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Document header attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub title: String,
    pub creating_user: Option<String>,
    pub creation_date: Option<String>,
}

impl DocumentInfo {
    /// Header stamped with the current user and local time
    pub fn now() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            creating_user: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .ok(),
            creation_date: Some(chrono::Local::now().format(DATE_FORMAT).to_string()),
        }
    }
}

impl Default for DocumentInfo {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            creating_user: None,
            creation_date: None,
        }
    }
}

/// A catalog together with its header and declared archive bases
#[derive(Debug, Clone, Default)]
pub struct CatalogDocument {
    pub info: DocumentInfo,
    /// One declared base URL per kind; remote locations under it are stored relative
    pub bases: BTreeMap<SourceKind, Url>,
    pub catalog: Catalog,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "remotedatabase")]
struct DocumentXml {
    #[serde(rename = "@xmlns", default)]
    xmlns: Option<String>,
    #[serde(rename = "@formatVersion")]
    format_version: String,
    #[serde(rename = "@title", default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(rename = "@creatingUser", default, skip_serializing_if = "Option::is_none")]
    creating_user: Option<String>,
    #[serde(rename = "@creationDate", default, skip_serializing_if = "Option::is_none")]
    creation_date: Option<String>,
    #[serde(default)]
    base: Vec<BaseXml>,
    #[serde(default)]
    manufacturer: Vec<ManufacturerXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BaseXml {
    #[serde(rename = "@kind")]
    kind: String,
    #[serde(rename = "@href")]
    href: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManufacturerXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "deviceClass", default)]
    device_class: Vec<DeviceClassXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DeviceClassXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "remoteLink", default)]
    remote_link: Vec<RemoteLinkXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RemoteLinkXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@key", default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(rename = "@kind")]
    kind: String,
    #[serde(rename = "@path", default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(rename = "@xpath", default, skip_serializing_if = "Option::is_none")]
    xpath: Option<String>,
    #[serde(rename = "@url", default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(rename = "@comment", default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(rename = "@model", default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(rename = "@protocol", default, skip_serializing_if = "Option::is_none")]
    protocol: Option<String>,
    #[serde(rename = "@device", default, skip_serializing_if = "Option::is_none")]
    device: Option<u64>,
    #[serde(rename = "@subdevice", default, skip_serializing_if = "Option::is_none")]
    subdevice: Option<u64>,
    #[serde(rename = "@function", default, skip_serializing_if = "Option::is_none")]
    function: Option<u64>,
    #[serde(rename = "@extra", default, skip_serializing_if = "Option::is_none")]
    extra: Option<u64>,
}

impl RemoteLinkXml {
    fn param_mut(&mut self, name: ParamName) -> &mut Option<u64> {
        match name {
            ParamName::D => &mut self.device,
            ParamName::S => &mut self.subdevice,
            ParamName::F => &mut self.function,
            ParamName::E => &mut self.extra,
        }
    }

    fn param(&self, name: ParamName) -> Option<u64> {
        match name {
            ParamName::D => self.device,
            ParamName::S => self.subdevice,
            ParamName::F => self.function,
            ParamName::E => self.extra,
        }
    }
}

/// Read the `formatVersion` attribute of the root element without parsing the body
pub fn probe_format_version(xml: &str) -> Result<Option<String>, DatabaseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let version = e
                    .try_get_attribute("formatVersion")
                    .map_err(|e| DatabaseError::Parse(e.to_string()))?;
                return match version {
                    Some(attr) => {
                        let value = attr
                            .unescape_value()
                            .map_err(|e| DatabaseError::Parse(e.to_string()))?;
                        Ok(Some(value.into_owned()))
                    }
                    None => Ok(None),
                };
            }
            Ok(Event::Eof) => return Err(DatabaseError::Parse("no root element".to_string())),
            Ok(_) => {}
            Err(e) => return Err(DatabaseError::Parse(e.to_string())),
        }
    }
}

impl CatalogDocument {
    pub fn new(catalog: Catalog, bases: BTreeMap<SourceKind, Url>) -> Self {
        Self {
            info: DocumentInfo::now(),
            bases,
            catalog,
        }
    }

    /// Parse a catalog document; the version is checked first
    pub fn from_xml(xml: &str) -> Result<Self, DatabaseError> {
        let version = probe_format_version(xml)?.unwrap_or_default();
        if version != FORMAT_VERSION {
            return Err(DatabaseError::FormatVersionMismatch {
                expected: FORMAT_VERSION.to_string(),
                actual: version,
            });
        }

        let doc: DocumentXml = from_str(xml).map_err(|e| DatabaseError::Parse(e.to_string()))?;
        Self::from_document(doc)
    }

    pub fn from_file(path: &Path) -> Result<Self, DatabaseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_xml(&content)
    }

    pub fn to_xml(&self) -> Result<String, DatabaseError> {
        let doc = self.to_document()?;
        let xml = to_string(&doc).map_err(|e| DatabaseError::Serialize(e.to_string()))?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}\n", xml))
    }

    pub fn to_file(&self, path: &Path) -> Result<(), DatabaseError> {
        let xml = self.to_xml()?;
        std::fs::write(path, xml)?;
        Ok(())
    }

    fn from_document(doc: DocumentXml) -> Result<Self, DatabaseError> {
        let mut bases = BTreeMap::new();
        for base in &doc.base {
            let kind: SourceKind = base
                .kind
                .parse()
                .map_err(|e: crate::location::LocationError| DatabaseError::Parse(e.to_string()))?;
            let href = Url::parse(&base.href)
                .map_err(|e| DatabaseError::Parse(format!("base {}: {}", base.href, e)))?;
            bases.insert(kind, href);
        }

        let mut catalog = Catalog::new();
        for manufacturer in doc.manufacturer {
            for device_class in manufacturer.device_class {
                for link in device_class.remote_link {
                    let key = link.key.as_deref().map(CatalogKey::from_normalized);
                    let entry = entry_from_link(link, &bases)?;
                    let key = key.unwrap_or_else(|| entry.natural_key());
                    catalog.put_with_key(&manufacturer.name, &device_class.name, key, entry);
                }
            }
        }
        debug!(entries = catalog.len(), "Loaded catalog document");

        Ok(Self {
            info: DocumentInfo {
                title: doc.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
                creating_user: doc.creating_user,
                creation_date: doc.creation_date,
            },
            bases,
            catalog,
        })
    }

    fn to_document(&self) -> Result<DocumentXml, DatabaseError> {
        let mut manufacturers = Vec::new();
        for (_, m) in self.catalog.manufacturers() {
            let mut device_classes = Vec::new();
            for (_, d) in m.device_classes() {
                let remote_link = d
                    .remotes()
                    .map(|(key, entry)| self.link_from_entry(key, entry))
                    .collect::<Result<Vec<_>, _>>()?;
                device_classes.push(DeviceClassXml {
                    name: d.name().to_string(),
                    remote_link,
                });
            }
            manufacturers.push(ManufacturerXml {
                name: m.name().to_string(),
                device_class: device_classes,
            });
        }

        Ok(DocumentXml {
            xmlns: Some(NAMESPACE.to_string()),
            format_version: FORMAT_VERSION.to_string(),
            title: Some(self.info.title.clone()),
            creating_user: self.info.creating_user.clone(),
            creation_date: self.info.creation_date.clone(),
            base: self
                .bases
                .iter()
                .map(|(kind, url)| BaseXml {
                    kind: kind.as_str().to_string(),
                    href: url.to_string(),
                })
                .collect(),
            manufacturer: manufacturers,
        })
    }

    fn link_from_entry(&self, key: &CatalogKey, entry: &CatalogEntry) -> Result<RemoteLinkXml, DatabaseError> {
        let mut link = RemoteLinkXml {
            name: entry.remote_name().to_string(),
            key: (*key != entry.natural_key()).then(|| key.to_string()),
            kind: entry.kind().as_str().to_string(),
            xpath: entry.selector().map(str::to_string),
            comment: entry.comment().map(str::to_string),
            model: entry.model().map(str::to_string),
            protocol: entry.canonical_protocol().map(str::to_string),
            ..Default::default()
        };
        for (name, value) in entry.parameters().iter() {
            *link.param_mut(name) = Some(value);
        }

        let location = entry.location();
        match location {
            Location::Local(path) => {
                link.path = Some(path.to_string_lossy().into_owned());
            }
            Location::Remote {
                base,
                relative,
                suffix,
            } => {
                let url = location.url().map_err(|e| DatabaseError::InvalidLocation {
                    remote: entry.remote_name().to_string(),
                    reason: e.to_string(),
                })?;
                let declared = self.bases.get(&entry.kind()) == Some(base)
                    && !relative.is_empty()
                    && suffix == entry.kind().url_suffix();
                if declared {
                    link.path = Some(relative.clone());
                }
                link.url = Some(url.to_string());
            }
        }
        Ok(link)
    }
}

fn entry_from_link(
    link: RemoteLinkXml,
    bases: &BTreeMap<SourceKind, Url>,
) -> Result<CatalogEntry, DatabaseError> {
    let kind: SourceKind = link
        .kind
        .parse()
        .map_err(|e: crate::location::LocationError| DatabaseError::Parse(e.to_string()))?;

    let invalid = |reason: String| DatabaseError::InvalidLocation {
        remote: link.name.clone(),
        reason,
    };
    let location = match (&link.path, &link.url) {
        (Some(path), Some(url)) => match bases.get(&kind) {
            Some(base) => Location::in_archive(kind, base.clone(), path),
            None => Location::absolute(Url::parse(url).map_err(|e| invalid(e.to_string()))?),
        },
        (Some(path), None) => Location::Local(PathBuf::from(path)),
        (None, Some(url)) => Location::absolute(Url::parse(url).map_err(|e| invalid(e.to_string()))?),
        (None, None) => return Err(invalid("neither path nor url given".to_string())),
    };

    let parameters: Parameters = ParamName::ALL
        .into_iter()
        .filter_map(|name| link.param(name).map(|v| (name, v)))
        .collect();

    Ok(CatalogEntry::new(&link.name, kind, location)
        .with_selector(link.xpath)
        .with_comment(link.comment)
        .with_model(link.model)
        .with_protocol(link.protocol, parameters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CanonicalCode;

    fn sample() -> CatalogDocument {
        let girr_base = SourceKind::Girr.default_base().unwrap();
        let lirc_base = SourceKind::Lirc.default_base().unwrap();
        let mut bases = BTreeMap::new();
        bases.insert(SourceKind::Girr, girr_base.clone());
        bases.insert(SourceKind::Lirc, lirc_base.clone());

        let mut params = Parameters::new();
        params.insert(ParamName::D, 127);
        params.insert(ParamName::F, 12);

        let mut catalog = Catalog::new();
        catalog.put(
            "Yamaha",
            "Receiver",
            CatalogEntry::new(
                "RX-V 1",
                SourceKind::Girr,
                Location::in_archive(SourceKind::Girr, girr_base, "Yamaha/rx-v.girr"),
            )
            .with_selector(Some("remotes/remote[@name='RX-V 1']".to_string()))
            .with_comment(Some("main zone & \"quoted\"".to_string())),
        );
        catalog.put(
            "Yamaha",
            "Receiver",
            CatalogEntry::new("rx-v 1", SourceKind::Irdb, Location::local("/mirror/irdb/Yamaha/Receiver/rx-v 1.csv"))
                .with_code(CanonicalCode { protocol: "NEC1".to_string(), parameters: params }),
        );
        catalog.put(
            "Philips",
            "TV",
            CatalogEntry::new(
                "RC2020",
                SourceKind::Lirc,
                Location::in_archive(SourceKind::Lirc, lirc_base, "philips/RC2020.lircd.conf"),
            )
            .with_model(Some("RC 2020".to_string())),
        );
        catalog.put(
            "Philips",
            "TV",
            CatalogEntry::new(
                "RC-7",
                SourceKind::Jp1,
                Location::absolute(Url::parse("http://www.hifi-remote.com/forums/dload.php?action=file&file_id=7").unwrap()),
            ),
        );

        CatalogDocument {
            info: DocumentInfo {
                title: DEFAULT_TITLE.to_string(),
                creating_user: Some("tester".to_string()),
                creation_date: Some("2024-01-01_00:00:00".to_string()),
            },
            bases,
            catalog,
        }
    }

    #[test]
    fn test_round_trip() {
        let doc = sample();
        let xml = doc.to_xml().unwrap();
        assert!(xml.contains("formatVersion=\"0.1\""));
        assert!(xml.contains("key=\"rx-v 1$1\""));

        let loaded = CatalogDocument::from_xml(&xml).unwrap();
        assert_eq!(loaded.catalog.triples(), doc.catalog.triples());
        assert_eq!(loaded.catalog, doc.catalog);
        assert_eq!(loaded.bases, doc.bases);
        assert_eq!(loaded.info, doc.info);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.xml");
        let doc = sample();
        doc.to_file(&path).unwrap();
        let loaded = CatalogDocument::from_file(&path).unwrap();
        let entry = loaded.catalog.get("philips", "tv", "rc2020").unwrap();
        assert_eq!(entry.model(), Some("RC 2020"));
        assert_eq!(
            entry.location().url().unwrap().query(),
            Some("format=raw")
        );
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let xml = r#"<?xml version="1.0"?>
<remotedatabase xmlns="http://www.harctoolbox.org/RemoteLocator" formatVersion="0.2">
  <manufacturer name="Sony"/>
</remotedatabase>"#;
        match CatalogDocument::from_xml(xml) {
            Err(DatabaseError::FormatVersionMismatch { expected, actual }) => {
                assert_eq!(expected, "0.1");
                assert_eq!(actual, "0.2");
            }
            other => panic!("expected version mismatch, got {:?}", other.map(|d| d.catalog.len())),
        }

        let xml = r#"<remotedatabase><manufacturer name="Sony"/></remotedatabase>"#;
        assert!(matches!(
            CatalogDocument::from_xml(xml),
            Err(DatabaseError::FormatVersionMismatch { .. })
        ));
    }

    #[test]
    fn test_hand_written_document() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<remotedatabase xmlns="http://www.harctoolbox.org/RemoteLocator" formatVersion="0.1" title="test">
  <base kind="irdb" href="https://cdn.jsdelivr.net/gh/probonopd/irdb@master/codes/"/>
  <manufacturer name="Sony">
    <deviceClass name="TV">
      <remoteLink name="1,-1" kind="irdb" path="Sony/TV/1,-1.csv" url="https://cdn.jsdelivr.net/gh/probonopd/irdb@master/codes/Sony/TV/1,-1.csv" protocol="Sony12" device="1" function="21"/>
      <remoteLink name="Local" kind="girr" path="/tmp/local.girr"/>
    </deviceClass>
  </manufacturer>
</remotedatabase>"#;
        let doc = CatalogDocument::from_xml(xml).unwrap();
        assert_eq!(doc.info.title, "test");
        let entry = doc.catalog.get("sony", "tv", "1,-1").unwrap();
        assert_eq!(entry.kind(), SourceKind::Irdb);
        assert_eq!(entry.location().relative(), Some("Sony/TV/1,-1.csv"));
        assert_eq!(entry.canonical_protocol(), Some("Sony12"));
        assert_eq!(entry.parameters().get(ParamName::F), Some(21));
        assert!(!entry.parameters().contains(ParamName::S));
        assert!(doc.catalog.get("sony", "tv", "local").unwrap().location().is_local());
    }

    #[test]
    fn test_link_without_location_rejected() {
        let xml = r#"<remotedatabase formatVersion="0.1">
  <manufacturer name="Sony"><deviceClass name="TV"><remoteLink name="x" kind="girr"/></deviceClass></manufacturer>
</remotedatabase>"#;
        assert!(matches!(
            CatalogDocument::from_xml(xml),
            Err(DatabaseError::InvalidLocation { .. })
        ));
    }
}
