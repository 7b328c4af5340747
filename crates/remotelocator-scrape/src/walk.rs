//! Directory walking shared by the scrapers

use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::ScrapeError;

pub(crate) fn assert_readable_directory(dir: &Path) -> Result<(), ScrapeError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(ScrapeError::NotADirectory(dir.to_path_buf()))
    }
}

/// Directory entries sorted by file name
pub(crate) fn list_sorted(dir: &Path) -> Result<Vec<PathBuf>, ScrapeError> {
    let mut paths = std::fs::read_dir(dir)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory entry");
                None
            }
        })
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Editor backup files
pub(crate) fn is_backup(name: &str) -> bool {
    name.ends_with('~')
}

/// `path` relative to `root`, with `/` separators as used in archive URLs
pub(crate) fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
