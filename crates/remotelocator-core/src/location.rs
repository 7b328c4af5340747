//! Source kinds and where a remote's definition lives

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("Unknown source kind: {0}")]
    UnknownKind(String),
    #[error("URL cannot be used as a base: {0}")]
    CannotBeABase(String),
    #[error("Path cannot be expressed as a URL: {0}")]
    InvalidPath(PathBuf),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// The archive a remote was harvested from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Girr,
    Irdb,
    Lirc,
    Jp1,
    Flipper,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Girr,
        SourceKind::Irdb,
        SourceKind::Lirc,
        SourceKind::Jp1,
        SourceKind::Flipper,
    ];

    /// Tag used in the catalog document and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Girr => "girr",
            SourceKind::Irdb => "irdb",
            SourceKind::Lirc => "lirc",
            SourceKind::Jp1 => "jp1",
            SourceKind::Flipper => "flipper",
        }
    }

    /// Where the public archive of this kind is published.
    ///
    /// JP1 rows carry absolute URLs, so its base is only the file area root.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            SourceKind::Girr => {
                "https://raw.githubusercontent.com/bengtmartensson/GirrLib/master/Girr/"
            }
            SourceKind::Irdb => "https://cdn.jsdelivr.net/gh/probonopd/irdb@master/codes/",
            SourceKind::Lirc => {
                "https://sourceforge.net/p/lirc-remotes/code/ci/master/tree/remotes/"
            }
            SourceKind::Jp1 => "http://www.hifi-remote.com/forums/",
            SourceKind::Flipper => {
                "https://raw.githubusercontent.com/Lucaslhm/Flipper-IRDB/refs/heads/main/"
            }
        }
    }

    /// Appended to every resolved URL of this kind; a leading `?` makes it a query
    pub fn url_suffix(&self) -> &'static str {
        match self {
            SourceKind::Lirc => "?format=raw",
            _ => "",
        }
    }

    /// Parsed default base URL
    pub fn default_base(&self) -> Result<Url, LocationError> {
        Ok(Url::parse(self.default_base_url())?)
    }

    /// Whether remotes of this kind can be fetched and parsed into commands
    pub fn is_resolvable(&self) -> bool {
        !matches!(self, SourceKind::Jp1)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| LocationError::UnknownKind(s.to_string()))
    }
}

/// Where a remote's definition can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A file on the local filesystem
    Local(PathBuf),
    /// A path relative to an archive base URL
    Remote {
        base: Url,
        relative: String,
        suffix: String,
    },
}

impl Location {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Location::Local(path.into())
    }

    pub fn remote(base: Url, relative: &str, suffix: &str) -> Self {
        Location::Remote {
            base,
            relative: relative.to_string(),
            suffix: suffix.to_string(),
        }
    }

    /// Location inside a kind's archive, using the kind's URL suffix
    pub fn in_archive(kind: SourceKind, base: Url, relative: &str) -> Self {
        Self::remote(base, relative, kind.url_suffix())
    }

    /// Absolute URL, given verbatim
    pub fn absolute(url: Url) -> Self {
        Self::remote(url, "", "")
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Location::Local(_))
    }

    /// Archive-relative path, if any
    pub fn relative(&self) -> Option<&str> {
        match self {
            Location::Remote { relative, .. } if !relative.is_empty() => Some(relative),
            _ => None,
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Location::Local(path) => Some(path),
            Location::Remote { .. } => None,
        }
    }

    /// Resolve to a URL.
    ///
    /// Each segment of `relative` is percent-encoded and appended to the
    /// base path. Local files become `file:` URLs.
    pub fn url(&self) -> Result<Url, LocationError> {
        match self {
            Location::Local(path) => {
                let absolute = std::path::absolute(path)
                    .map_err(|_| LocationError::InvalidPath(path.clone()))?;
                Url::from_file_path(&absolute).map_err(|_| LocationError::InvalidPath(path.clone()))
            }
            Location::Remote {
                base,
                relative,
                suffix,
            } => join_url(base, relative, suffix),
        }
    }
}

fn join_url(base: &Url, relative: &str, suffix: &str) -> Result<Url, LocationError> {
    let mut url = base.clone();
    let query = suffix.strip_prefix('?');

    let mut segments: Vec<String> = relative
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if query.is_none() && !suffix.is_empty() {
        if let Some(last) = segments.last_mut() {
            last.push_str(suffix);
        }
    }

    if !segments.is_empty() {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| LocationError::CannotBeABase(base.to_string()))?;
        path.pop_if_empty();
        path.extend(segments.iter().map(String::as_str));
    }

    if let Some(query) = query {
        url.set_query(Some(query));
    }
    Ok(url)
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Remote {
                base,
                relative,
                suffix,
            } => match join_url(base, relative, suffix) {
                Ok(url) => write!(f, "{}", url),
                Err(_) => write!(f, "{}{}{}", base, relative, suffix),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.as_str().parse::<SourceKind>().unwrap(), kind);
            assert!(kind.default_base().is_ok());
        }
        assert_eq!("GIRR".parse::<SourceKind>().unwrap(), SourceKind::Girr);
        assert!("pronto".parse::<SourceKind>().is_err());
        assert!(!SourceKind::Jp1.is_resolvable());
    }

    #[test]
    fn test_url_encodes_segments() {
        let base = Url::parse("https://example.com/codes/").unwrap();
        let location = Location::remote(base, "Sony/TV/1,-1.csv", "");
        assert_eq!(
            location.url().unwrap().as_str(),
            "https://example.com/codes/Sony/TV/1,-1.csv"
        );

        let base = Url::parse("https://example.com/Girr/").unwrap();
        let location = Location::remote(base, "Yamaha/RX V 1.girr", "");
        assert_eq!(
            location.url().unwrap().as_str(),
            "https://example.com/Girr/Yamaha/RX%20V%201.girr"
        );
    }

    #[test]
    fn test_query_suffix() {
        let location = Location::in_archive(
            SourceKind::Lirc,
            SourceKind::Lirc.default_base().unwrap(),
            "philips/RC2020.lircd.conf",
        );
        assert_eq!(
            location.to_string(),
            "https://sourceforge.net/p/lirc-remotes/code/ci/master/tree/remotes/philips/RC2020.lircd.conf?format=raw"
        );
    }

    #[test]
    fn test_plain_suffix_extends_last_segment() {
        let base = Url::parse("https://example.com/a/").unwrap();
        let location = Location::remote(base, "b/c", ".raw");
        assert_eq!(location.url().unwrap().as_str(), "https://example.com/a/b/c.raw");
    }

    #[test]
    fn test_absolute_and_local() {
        let url = Url::parse("http://www.hifi-remote.com/forums/dload.php?id=1").unwrap();
        let location = Location::absolute(url.clone());
        assert_eq!(location.url().unwrap(), url);
        assert_eq!(location.relative(), None);

        let location = Location::local("/tmp/remote.girr");
        assert!(location.is_local());
        assert_eq!(location.url().unwrap().scheme(), "file");
    }
}
