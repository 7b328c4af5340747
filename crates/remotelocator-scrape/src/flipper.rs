//! Flipper Zero `.ir` files: `<device type>/<manufacturer>/.../<remote>.ir`
//!
//! ```text
//! Filetype: IR signals file
//! Version: 1
//! #
//! name: Power
//! type: parsed
//! protocol: NEC
//! address: 07 00 00 00
//! command: 02 00 00 00
//! #
//! name: Vol_up
//! type: raw
//! frequency: 38000
//! duty_cycle: 0.330000
//! data: 9024 4512 579 552 ...
//! ```

use remotelocator_core::{
    Command, FullRemote, Location, ProtocolNormalizer, RawCode, RawEntry, RawSignal, Signal,
    SourceCode, SourceKind,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};
use url::Url;

use crate::walk::{assert_readable_directory, file_name, is_backup, list_sorted, relative_path};
use crate::{decode_text, RemoteRequest, ScrapeError, SourceFormat};

const HEADER1: &str = "Filetype: IR signals file";
const HEADER2: &str = "Version: 1";
const REMOTE_ENDING: &str = ".ir";

/// A command as written in the file, before protocol normalization
#[derive(Debug, Clone, PartialEq)]
pub enum FlipperCommand {
    Parsed { name: String, code: RawCode },
    Raw { name: String, signal: RawSignal },
}

impl FlipperCommand {
    pub fn name(&self) -> &str {
        match self {
            FlipperCommand::Parsed { name, .. } | FlipperCommand::Raw { name, .. } => name,
        }
    }
}

fn is_comment(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

/// `07 00 00 00` → 0x07000000
fn parse_hex_word(value: &str) -> Option<u32> {
    let digits: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    u32::from_str_radix(&digits, 16).ok()
}

fn block_to_command(
    block: &HashMap<String, String>,
    origin: &str,
    lineno: usize,
) -> Result<FlipperCommand, ScrapeError> {
    let field = |key: &str| {
        block
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ScrapeError::parse(origin, format!("missing {} before line {}", key, lineno)))
    };
    let name = field("name")?.to_string();

    match field("type")? {
        "parsed" => {
            let word = |key: &str| {
                field(key).and_then(|v| {
                    parse_hex_word(v).ok_or_else(|| {
                        ScrapeError::parse(origin, format!("bad {} before line {}", key, lineno))
                    })
                })
            };
            Ok(FlipperCommand::Parsed {
                name,
                code: RawCode::new(field("protocol")?, word("address")?, word("command")?),
            })
        }
        "raw" => {
            let frequency = field("frequency")?
                .parse::<f64>()
                .map_err(|e| ScrapeError::parse(origin, format!("frequency: {}", e)))?;
            let duty_cycle = block.get("duty_cycle").and_then(|d| d.parse::<f64>().ok());
            let durations = field("data")?
                .split_whitespace()
                .map(|d| d.parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ScrapeError::parse(origin, format!("data: {}", e)))?;
            Ok(FlipperCommand::Raw {
                name,
                signal: RawSignal::new(frequency.round() as u32, duty_cycle, durations),
            })
        }
        other => Err(ScrapeError::parse(
            origin,
            format!("neither raw nor parsed: {} before line {}", other, lineno),
        )),
    }
}

/// Parse a `.ir` file into its commands, in file order
pub fn parse_commands(text: &str, origin: &str) -> Result<Vec<FlipperCommand>, ScrapeError> {
    let mut lines = text.lines().map(|l| l.trim_end_matches('\r')).enumerate();

    for expected in [HEADER1, HEADER2] {
        let found = lines.by_ref().find(|(_, line)| !is_comment(line));
        match found {
            Some((_, line)) if line.trim_end() == expected => {}
            Some((index, line)) => {
                return Err(ScrapeError::parse(
                    origin,
                    format!("line {}: expected {:?}, found {:?}", index + 1, expected, line),
                ))
            }
            None => return Err(ScrapeError::parse(origin, "missing header")),
        }
    }

    let mut commands = Vec::new();
    let mut block: HashMap<String, String> = HashMap::new();
    let mut lineno = 0;
    for (index, line) in lines {
        lineno = index + 1;
        if is_comment(line) {
            // a bare "#" or blank line ends a block; other comments are annotations
            if !block.is_empty() && line.trim().len() <= 1 {
                commands.push(block_to_command(&block, origin, lineno)?);
                block.clear();
            }
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) => {
                block.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => {
                return Err(ScrapeError::parse(
                    origin,
                    format!("line {}: expected key: value", lineno),
                ))
            }
        }
    }
    if !block.is_empty() {
        commands.push(block_to_command(&block, origin, lineno + 1)?);
    }
    Ok(commands)
}

pub struct FlipperFormat;

impl FlipperFormat {
    fn scrape_remotes(
        &self,
        root: &Path,
        base: &Url,
        manufacturer: &str,
        device_class: &str,
        dir: &Path,
        entries: &mut Vec<RawEntry>,
    ) -> Result<(), ScrapeError> {
        for path in list_sorted(dir)? {
            let file = file_name(&path);
            if is_backup(&file) {
                continue;
            }
            if path.is_dir() {
                self.scrape_remotes(root, base, manufacturer, device_class, &path, entries)?;
                continue;
            }
            let Some(remote_name) = file.strip_suffix(REMOTE_ENDING) else {
                warn!(path = %path.display(), "Not a .ir file, ignored");
                continue;
            };

            let origin = path.display().to_string();
            let commands = match std::fs::read(&path)
                .map_err(ScrapeError::from)
                .and_then(|bytes| parse_commands(&decode_text(&bytes), &origin))
            {
                Ok(commands) => commands,
                Err(e) => {
                    warn!(error = %e, "Parse error, remote ignored");
                    continue;
                }
            };

            let mut entry = RawEntry::new(
                manufacturer,
                device_class,
                remote_name,
                SourceKind::Flipper,
                Location::in_archive(SourceKind::Flipper, base.clone(), &relative_path(root, &path)),
            );
            entry.code = commands.iter().find_map(|c| match c {
                FlipperCommand::Parsed { code, .. } => Some(SourceCode::Raw(code.clone())),
                FlipperCommand::Raw { .. } => None,
            });
            entries.push(entry);
        }
        Ok(())
    }
}

impl SourceFormat for FlipperFormat {
    fn kind(&self) -> SourceKind {
        SourceKind::Flipper
    }

    fn scrape(&self, root: &Path, base: &Url) -> Result<Vec<RawEntry>, ScrapeError> {
        assert_readable_directory(root)?;
        let mut entries = Vec::new();

        // Top level directories are device types; anything else (README.md, .github) is skipped
        for type_dir in list_sorted(root)? {
            let device_class = file_name(&type_dir);
            if !device_class.starts_with(|c: char| c.is_alphabetic()) {
                continue;
            }
            if !type_dir.is_dir() {
                debug!(path = %type_dir.display(), "Not a directory, skipped");
                continue;
            }

            for manufacturer_dir in list_sorted(&type_dir)? {
                if !manufacturer_dir.is_dir() {
                    warn!(path = %manufacturer_dir.display(), "Non-directory, ignored");
                    continue;
                }
                let manufacturer = file_name(&manufacturer_dir);
                self.scrape_remotes(root, base, &manufacturer, &device_class, &manufacturer_dir, &mut entries)?;
            }
        }

        debug!(count = entries.len(), "Scraped Flipper remotes");
        Ok(entries)
    }

    fn parse_remote(
        &self,
        content: &[u8],
        request: &RemoteRequest<'_>,
        normalizer: &ProtocolNormalizer,
    ) -> Result<FullRemote, ScrapeError> {
        let commands = parse_commands(&decode_text(content), request.origin)?;

        let mut remote = FullRemote::new(request.remote_name);
        remote.manufacturer = Some(request.manufacturer.to_string());
        remote.device_class = Some(request.device_class.to_string());
        remote.source = Some(request.origin.to_string());
        for command in commands {
            let signal = match &command {
                FlipperCommand::Raw { signal, .. } => Signal::Raw(signal.clone()),
                FlipperCommand::Parsed { code, .. } => match normalizer.decode(code) {
                    Ok(canonical) => Signal::Decoded(canonical),
                    Err(e) => {
                        warn!(command = %command.name(), error = %e, "Command ignored");
                        continue;
                    }
                },
            };
            remote.commands.push(Command::new(command.name(), signal));
        }
        Ok(remote)
    }
}
