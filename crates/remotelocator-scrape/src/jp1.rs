//! JP1: the flat OpenDocument spreadsheet (`.fods`) listing the files of
//! the JP1 forum.
//!
//! Rows styled `ro1` describe one remote each. Cell 1 carries a hyperlink
//! formula whose first quoted string is the URL of the file. The files are
//! RMDU/RemoteMaster uploads that are located but never parsed.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use remotelocator_core::protocol::SUBDEVICE_ABSENT;
use remotelocator_core::{
    FullRemote, Location, PreDecodedCode, ProtocolNormalizer, RawEntry, SourceCode, SourceKind,
};
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

use crate::walk::list_sorted;
use crate::{decode_text, RemoteRequest, ScrapeError, SourceFormat};

const REMOTE_ROW_STYLE: &str = "ro1";
const MIN_CELLS: usize = 7;
const FODS_ENDING: &str = ".fods";

#[derive(Debug, Default)]
struct Cell {
    formula: Option<String>,
    /// Text of the first paragraph
    text: Option<String>,
}

fn attribute(element: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// Cells of every remote row, in document order
fn read_rows(xml: &str) -> Result<Vec<Vec<Cell>>, ScrapeError> {
    let mut reader = Reader::from_str(xml);
    let mut rows = Vec::new();
    let mut row: Option<Vec<Cell>> = None;
    let mut in_paragraph = false;
    let mut total = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ScrapeError::Xml(format!("at {}: {}", reader.buffer_position(), e)))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"table-row" => {
                    total += 1;
                    let remote_row = attribute(&e, b"style-name").as_deref() == Some(REMOTE_ROW_STYLE);
                    row = remote_row.then(Vec::new);
                }
                b"table-cell" => {
                    if let Some(cells) = row.as_mut() {
                        cells.push(Cell {
                            formula: attribute(&e, b"formula"),
                            text: None,
                        });
                    }
                }
                b"p" => in_paragraph = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"table-cell" => {
                    if let Some(cells) = row.as_mut() {
                        cells.push(Cell {
                            formula: attribute(&e, b"formula"),
                            text: None,
                        });
                    }
                }
                b"table-row" => total += 1,
                _ => {}
            },
            Event::Text(t) if in_paragraph => {
                if let Some(cell) = row.as_mut().and_then(|cells| cells.last_mut()) {
                    let text = t.unescape().map_err(|e| ScrapeError::Xml(e.to_string()))?;
                    // only the first paragraph counts
                    if cell.text.is_none() {
                        cell.text = Some(text.trim().to_string());
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"p" => in_paragraph = false,
                b"table-row" => {
                    if let Some(cells) = row.take() {
                        rows.push(cells);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    info!(rows = total, "Read spreadsheet rows");
    Ok(rows)
}

fn cell_text(cells: &[Cell], index: usize) -> &str {
    cells
        .get(index)
        .and_then(|c| c.text.as_deref())
        .unwrap_or_default()
}

fn tabular_code(protocol: &str, device: &str, subdevice: &str) -> Option<SourceCode> {
    if protocol.is_empty() {
        return None;
    }
    let device = device.parse().ok()?;
    let subdevice = if subdevice.is_empty() {
        SUBDEVICE_ABSENT
    } else {
        subdevice.parse().ok()?
    };
    Some(SourceCode::Tabular(PreDecodedCode {
        protocol: protocol.to_string(),
        device,
        subdevice,
        function: None,
    }))
}

fn row_entry(cells: &[Cell]) -> Option<RawEntry> {
    if cells.len() < MIN_CELLS {
        return None;
    }
    let formula = cells[1].formula.as_deref().filter(|f| !f.is_empty())?;
    let link = formula.split('"').nth(1)?;
    let url = match Url::parse(link) {
        Ok(url) => url,
        Err(e) => {
            warn!(url = link, error = %e, "Invalid URL, row ignored");
            return None;
        }
    };

    let mut entry = RawEntry::new(
        cell_text(cells, 5),
        cell_text(cells, 4),
        cell_text(cells, 6),
        SourceKind::Jp1,
        Location::absolute(url),
    );
    entry.code = tabular_code(cell_text(cells, 9), cell_text(cells, 10), cell_text(cells, 11));
    Some(entry)
}

fn scrape_file(path: &Path) -> Result<Vec<RawEntry>, ScrapeError> {
    let bytes = std::fs::read(path)?;
    let rows = read_rows(&decode_text(&bytes))?;
    Ok(rows.iter().filter_map(|cells| row_entry(cells)).collect())
}

pub struct Jp1Format;

impl SourceFormat for Jp1Format {
    fn kind(&self) -> SourceKind {
        SourceKind::Jp1
    }

    /// `root` is either the spreadsheet itself or a directory holding
    /// `.fods` files. Rows carry absolute URLs, `base` is not used.
    fn scrape(&self, root: &Path, _base: &Url) -> Result<Vec<RawEntry>, ScrapeError> {
        if root.is_file() {
            return scrape_file(root);
        }
        if !root.is_dir() {
            return Err(ScrapeError::NotADirectory(root.to_path_buf()));
        }

        let mut entries = Vec::new();
        for path in list_sorted(root)? {
            if path.is_file() && path.to_string_lossy().ends_with(FODS_ENDING) {
                entries.extend(scrape_file(&path)?);
            }
        }
        debug!(count = entries.len(), "Scraped JP1 remotes");
        Ok(entries)
    }

    fn parse_remote(
        &self,
        _content: &[u8],
        _request: &RemoteRequest<'_>,
        _normalizer: &ProtocolNormalizer,
    ) -> Result<FullRemote, ScrapeError> {
        Err(ScrapeError::NotResolvable(SourceKind::Jp1))
    }
}
