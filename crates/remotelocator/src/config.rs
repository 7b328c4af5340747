//! Configuration loading

use anyhow::{Context, Result};
use remotelocator_core::SourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Local archive mirrors and base URLs, per source kind
    #[serde(default)]
    pub sources: BTreeMap<SourceKind, SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog document used by `locate` and `export`
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            title: default_title(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("remotelocator.xml")
}

fn default_title() -> String {
    remotelocator_core::database::DEFAULT_TITLE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Timeout of one fetch, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Upper bound of simultaneous fetches in bulk resolution
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_concurrent: default_max_concurrent(),
            user_agent: default_user_agent(),
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    8
}

fn default_user_agent() -> String {
    format!("remotelocator/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Local mirror of the archive; also the default scrape root
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Overrides the kind's well-known base URL
    #[serde(default)]
    pub base_url: Option<Url>,
}

impl Config {
    pub fn source_dir(&self, kind: SourceKind) -> Option<&Path> {
        self.sources.get(&kind).and_then(|s| s.dir.as_deref())
    }

    /// Configured base URL of a kind, else its well-known one
    pub fn base_url(&self, kind: SourceKind) -> Result<Url> {
        match self.sources.get(&kind).and_then(|s| s.base_url.clone()) {
            Some(url) => Ok(url),
            None => kind
                .default_base()
                .with_context(|| format!("Invalid default base URL for {}", kind)),
        }
    }

    /// Mirror directories by kind
    pub fn mirrors(&self) -> BTreeMap<SourceKind, PathBuf> {
        self.sources
            .iter()
            .filter_map(|(kind, source)| source.dir.clone().map(|dir| (*kind, dir)))
            .collect()
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.resolver.timeout_secs, 30);
        assert_eq!(config.resolver.max_concurrent, 8);
        assert_eq!(config.catalog.path, PathBuf::from("remotelocator.xml"));
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_parse_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remotelocator.toml");
        std::fs::write(
            &path,
            r#"
[catalog]
path = "/var/lib/remotelocator/catalog.xml"

[resolver]
timeout_secs = 5

[sources.irdb]
dir = "/srv/irdb/codes"

[sources.girr]
base_url = "https://example.org/girr/"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.resolver.timeout(), Duration::from_secs(5));
        assert_eq!(config.resolver.max_concurrent, 8);
        assert_eq!(config.source_dir(SourceKind::Irdb), Some(Path::new("/srv/irdb/codes")));
        assert_eq!(config.source_dir(SourceKind::Girr), None);
        assert_eq!(
            config.base_url(SourceKind::Girr).unwrap().as_str(),
            "https://example.org/girr/"
        );
        assert_eq!(
            config.base_url(SourceKind::Irdb).unwrap(),
            SourceKind::Irdb.default_base().unwrap()
        );
        assert_eq!(config.mirrors().len(), 1);
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[resolver]\ntimeout_secs = \"soon\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
