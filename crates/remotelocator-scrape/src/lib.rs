//! RemoteLocator Scrape - per-archive scrapers and remote grammars
//!
//! Every supported archive kind has one [`SourceFormat`]:
//! - `scrape` walks a local mirror of the archive and yields [`RawEntry`] tuples
//! - `parse_remote` turns the bytes of one remote file into a [`FullRemote`]

pub mod flipper;
pub mod girr;
pub mod irdb;
pub mod jp1;
pub mod lirc;
mod walk;

use remotelocator_core::{FullRemote, ProtocolError, ProtocolNormalizer, RawEntry, SourceKind};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub use flipper::FlipperFormat;
pub use girr::{to_girr_xml, GirrFormat};
pub use irdb::IrdbFormat;
pub use jp1::Jp1Format;
pub use lirc::LircFormat;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not a readable directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Parse error in {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error("XML error: {0}")]
    Xml(String),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Remotes of kind {0} cannot be parsed into commands")]
    NotResolvable(SourceKind),
}

impl ScrapeError {
    pub(crate) fn parse(origin: &str, message: impl Into<String>) -> Self {
        ScrapeError::Parse {
            origin: origin.to_string(),
            message: message.into(),
        }
    }
}

/// What is known about a remote when its file is parsed
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteRequest<'a> {
    pub manufacturer: &'a str,
    pub device_class: &'a str,
    pub remote_name: &'a str,
    /// Picks one remote out of a file holding several
    pub selector: Option<&'a str>,
    /// Path or URL of the file, for messages and the result's `source`
    pub origin: &'a str,
}

/// Scraper and grammar for one archive kind
pub trait SourceFormat: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Walk a local mirror rooted at `root`. Locations are made relative to
    /// `base`, except for kinds whose rows carry absolute URLs.
    fn scrape(&self, root: &Path, base: &Url) -> Result<Vec<RawEntry>, ScrapeError>;

    /// Parse the content of one remote file
    fn parse_remote(
        &self,
        content: &[u8],
        request: &RemoteRequest<'_>,
        normalizer: &ProtocolNormalizer,
    ) -> Result<FullRemote, ScrapeError>;
}

/// The format implementation for a kind
pub fn format_for(kind: SourceKind) -> &'static dyn SourceFormat {
    match kind {
        SourceKind::Girr => &GirrFormat,
        SourceKind::Irdb => &IrdbFormat,
        SourceKind::Lirc => &LircFormat,
        SourceKind::Jp1 => &Jp1Format,
        SourceKind::Flipper => &FlipperFormat,
    }
}

/// Archives have no declared charset: take UTF-8 when valid, else Latin-1
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text.strip_prefix('\u{feff}').unwrap_or(text)),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_table_covers_every_kind() {
        for kind in SourceKind::ALL {
            assert_eq!(format_for(kind).kind(), kind);
        }
    }

    #[test]
    fn test_decode_text_falls_back_to_latin1() {
        assert_eq!(decode_text("Löwe".as_bytes()), "Löwe");
        assert_eq!(decode_text(&[b'L', 0xF6, b'w', b'e']), "Löwe");
        assert_eq!(decode_text("\u{feff}abc".as_bytes()), "abc");
    }
}
