//! RemoteLocator Core - catalog of downloadable IR remotes
//!
//! This crate provides the core of the RemoteLocator system:
//! - Key normalization for case-insensitive lookup
//! - Protocol normalization of source-specific IR codes
//! - The three-level catalog index with collision renaming
//! - The persisted catalog document
//! - Ingestion of scraped tuples

pub mod catalog;
pub mod database;
pub mod ingest;
pub mod key;
pub mod location;
pub mod protocol;
pub mod remote;

pub use catalog::{Catalog, CatalogEntry, CatalogError, Level, Placement};
pub use database::{CatalogDocument, DatabaseError, DocumentInfo, FORMAT_VERSION};
pub use ingest::{ingest, IngestOptions, IngestReport, RawEntry};
pub use key::{normalize, CatalogKey};
pub use location::{Location, LocationError, SourceKind};
pub use protocol::{
    CanonicalCode, ParamName, Parameters, PreDecodedCode, ProtocolError, ProtocolNormalizer,
    RawCode, SourceCode,
};
pub use remote::{Command, FullRemote, RawSignal, Signal};
