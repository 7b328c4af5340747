//! Drill-down through the catalog
//!
//! Each missing (or `?`) argument stops the descent and lists the level
//! reached so far, filtered by kind.

use remotelocator_core::{Catalog, CatalogEntry, CatalogError, Level, SourceKind};

pub const WILDCARD: &str = "?";

#[derive(Debug, Clone, Copy, Default)]
pub struct Query<'a> {
    pub manufacturer: Option<&'a str>,
    pub device_class: Option<&'a str>,
    pub remote: Option<&'a str>,
    pub kind: Option<SourceKind>,
}

/// How far a query got
#[derive(Debug)]
pub enum Located<'a> {
    Manufacturers(Vec<&'a str>),
    DeviceClasses {
        manufacturer: &'a str,
        names: Vec<&'a str>,
    },
    Remotes {
        manufacturer: &'a str,
        device_class: &'a str,
        names: Vec<&'a str>,
    },
    Remote {
        manufacturer: &'a str,
        device_class: &'a str,
        entry: &'a CatalogEntry,
    },
}

impl Located<'_> {
    /// Names of a listing; empty for a located remote
    pub fn names(&self) -> &[&str] {
        match self {
            Located::Manufacturers(names)
            | Located::DeviceClasses { names, .. }
            | Located::Remotes { names, .. } => names,
            Located::Remote { .. } => &[],
        }
    }
}

fn given(argument: Option<&str>) -> Option<&str> {
    argument.filter(|a| !a.is_empty() && *a != WILDCARD)
}

pub fn locate<'a>(catalog: &'a Catalog, query: &Query<'_>) -> Result<Located<'a>, CatalogError> {
    let Some(manufacturer) = given(query.manufacturer) else {
        return Ok(Located::Manufacturers(catalog.list_manufacturers(query.kind)));
    };
    let manufacturer_node = catalog.manufacturer(manufacturer)?;

    let Some(device_class) = given(query.device_class) else {
        return Ok(Located::DeviceClasses {
            manufacturer: manufacturer_node.name(),
            names: catalog.list_device_classes(manufacturer, query.kind)?,
        });
    };
    let class_node = catalog.device_class(manufacturer, device_class)?;

    let Some(remote) = given(query.remote) else {
        return Ok(Located::Remotes {
            manufacturer: manufacturer_node.name(),
            device_class: class_node.name(),
            names: catalog.list_remotes(manufacturer, device_class, query.kind)?,
        });
    };
    let entry = catalog.get(manufacturer, device_class, remote)?;
    if query.kind.is_some_and(|kind| kind != entry.kind()) {
        return Err(CatalogError::NotFound {
            level: Level::Remote,
            name: remote.to_string(),
        });
    }

    Ok(Located::Remote {
        manufacturer: manufacturer_node.name(),
        device_class: class_node.name(),
        entry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use remotelocator_core::Location;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.put(
            "Yamaha",
            "Receiver",
            CatalogEntry::new("RAV-1", SourceKind::Irdb, Location::local("/a.csv")),
        );
        catalog.put(
            "Yamaha",
            "Receiver",
            CatalogEntry::new("RAV-1", SourceKind::Girr, Location::local("/a.girr")),
        );
        catalog.put(
            "Sony",
            "TV",
            CatalogEntry::new("RM-ED009", SourceKind::Girr, Location::local("/b.girr")),
        );
        catalog
    }

    #[test]
    fn test_listing_levels() {
        let catalog = catalog();
        let all = locate(&catalog, &Query::default()).unwrap();
        assert_eq!(all.names(), ["Yamaha", "Sony"]);

        let irdb = Query {
            kind: Some(SourceKind::Irdb),
            ..Default::default()
        };
        assert_eq!(locate(&catalog, &irdb).unwrap().names(), ["Yamaha"]);

        let wildcard = Query {
            manufacturer: Some("yamaha"),
            device_class: Some(WILDCARD),
            ..Default::default()
        };
        match locate(&catalog, &wildcard).unwrap() {
            Located::DeviceClasses { manufacturer, names } => {
                assert_eq!(manufacturer, "Yamaha");
                assert_eq!(names, ["Receiver"]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let remotes = Query {
            manufacturer: Some("Yamaha"),
            device_class: Some("receiver"),
            ..Default::default()
        };
        assert_eq!(locate(&catalog, &remotes).unwrap().names(), ["RAV-1", "rav-1$1"]);
    }

    #[test]
    fn test_locate_remote() {
        let catalog = catalog();
        let query = Query {
            manufacturer: Some("YAMAHA"),
            device_class: Some("Receiver"),
            remote: Some("rav-1$1"),
            kind: Some(SourceKind::Girr),
        };
        match locate(&catalog, &query).unwrap() {
            Located::Remote { entry, .. } => assert_eq!(entry.kind(), SourceKind::Girr),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_kind_mismatch_is_not_found() {
        let catalog = catalog();
        let query = Query {
            manufacturer: Some("Sony"),
            device_class: Some("TV"),
            remote: Some("RM-ED009"),
            kind: Some(SourceKind::Irdb),
        };
        assert_eq!(
            locate(&catalog, &query).unwrap_err(),
            CatalogError::NotFound {
                level: Level::Remote,
                name: "RM-ED009".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_manufacturer() {
        let query = Query {
            manufacturer: Some("Philips"),
            ..Default::default()
        };
        assert!(matches!(
            locate(&catalog(), &query),
            Err(CatalogError::NotFound { level: Level::Manufacturer, .. })
        ));
    }
}
