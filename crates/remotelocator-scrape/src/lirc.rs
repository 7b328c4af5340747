//! LIRC configuration files: `remotes/<manufacturer>/<file>.lircd.conf`
//!
//! Only the structure is read: remote names, the carrier frequency, and
//! the commands of `begin codes` (code words) and `begin raw_codes`
//! (durations) sections. Code words are not rendered to timings.

use remotelocator_core::key::UNKNOWN;
use remotelocator_core::{
    Command, FullRemote, Location, ProtocolNormalizer, RawEntry, RawSignal, Signal, SourceKind,
};
use std::path::Path;
use tracing::{debug, warn};
use url::Url;

use crate::walk::{assert_readable_directory, file_name, is_backup, list_sorted, relative_path};
use crate::{decode_text, RemoteRequest, ScrapeError, SourceFormat};

const DEFAULT_FREQUENCY: u32 = 38000;

#[derive(Debug, Clone, PartialEq)]
pub struct LircRemote {
    pub name: String,
    pub frequency: Option<u32>,
    pub commands: Vec<Command>,
}

#[derive(Debug, PartialEq)]
enum Section {
    Outside,
    Remote,
    Codes,
    RawCodes,
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_code(word: &str) -> Option<u64> {
    match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => word.parse().ok(),
    }
}

/// Read the remotes of a configuration file in file order
pub fn parse_config(text: &str, origin: &str) -> Result<Vec<LircRemote>, ScrapeError> {
    let mut remotes = Vec::new();
    let mut section = Section::Outside;
    let mut current: Option<LircRemote> = None;
    // raw command being collected: name and durations
    let mut raw: Option<(String, Vec<u32>)> = None;

    let flush_raw = |raw: &mut Option<(String, Vec<u32>)>, remote: &mut Option<LircRemote>| {
        if let (Some((name, durations)), Some(remote)) = (raw.take(), remote.as_mut()) {
            let frequency = remote.frequency.unwrap_or(DEFAULT_FREQUENCY);
            remote
                .commands
                .push(Command::new(&name, Signal::Raw(RawSignal::new(frequency, None, durations))));
        }
    };

    for (index, line) in text.lines().enumerate() {
        let lineno = index + 1;
        let words: Vec<&str> = strip_comment(line).split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        match (words[0], words.get(1).copied()) {
            ("begin", Some("remote")) => {
                if section != Section::Outside {
                    return Err(ScrapeError::parse(origin, format!("line {}: nested remote", lineno)));
                }
                section = Section::Remote;
                current = Some(LircRemote {
                    name: String::new(),
                    frequency: None,
                    commands: Vec::new(),
                });
            }
            ("end", Some("remote")) => {
                if let Some(remote) = current.take() {
                    remotes.push(remote);
                }
                section = Section::Outside;
            }
            ("begin", Some("codes")) if section == Section::Remote => section = Section::Codes,
            ("begin", Some("raw_codes")) if section == Section::Remote => section = Section::RawCodes,
            ("end", Some("codes")) => section = Section::Remote,
            ("end", Some("raw_codes")) => {
                flush_raw(&mut raw, &mut current);
                section = Section::Remote;
            }
            _ => match section {
                Section::Outside => {}
                Section::Remote => {
                    if let Some(remote) = current.as_mut() {
                        match (words[0], words.get(1)) {
                            ("name", Some(name)) => remote.name = name.to_string(),
                            ("frequency", Some(f)) => remote.frequency = f.parse().ok(),
                            _ => {}
                        }
                    }
                }
                Section::Codes => {
                    let (Some(remote), Some(word)) = (current.as_mut(), words.get(1)) else {
                        continue;
                    };
                    match parse_code(word) {
                        Some(code) => remote.commands.push(Command::new(words[0], Signal::Code(code))),
                        None => warn!(origin, lineno, "Unparsable code, ignored"),
                    }
                }
                Section::RawCodes => {
                    if words[0] == "name" {
                        flush_raw(&mut raw, &mut current);
                        raw = words.get(1).map(|name| (name.to_string(), Vec::new()));
                    } else if let Some((_, durations)) = raw.as_mut() {
                        for word in &words {
                            match word.parse::<u32>() {
                                Ok(d) => durations.push(d),
                                Err(_) => warn!(origin, lineno, word, "Bad duration, ignored"),
                            }
                        }
                    }
                }
            },
        }
    }

    if section != Section::Outside {
        return Err(ScrapeError::parse(origin, "unterminated remote"));
    }
    Ok(remotes)
}

pub struct LircFormat;

impl SourceFormat for LircFormat {
    fn kind(&self) -> SourceKind {
        SourceKind::Lirc
    }

    /// Every remote of every file; LIRC has no device classes
    fn scrape(&self, root: &Path, base: &Url) -> Result<Vec<RawEntry>, ScrapeError> {
        assert_readable_directory(root)?;
        let mut entries = Vec::new();

        for manufacturer_dir in list_sorted(root)? {
            if !manufacturer_dir.is_dir() {
                warn!(path = %manufacturer_dir.display(), "Not a readable directory");
                continue;
            }
            let manufacturer = file_name(&manufacturer_dir);

            for path in list_sorted(&manufacturer_dir)? {
                if path.is_dir() || is_backup(&file_name(&path)) {
                    continue;
                }
                let origin = path.display().to_string();
                let remotes = match std::fs::read(&path)
                    .map_err(ScrapeError::from)
                    .and_then(|bytes| parse_config(&decode_text(&bytes), &origin))
                {
                    Ok(remotes) => remotes,
                    Err(e) => {
                        warn!(error = %e, "File ignored");
                        continue;
                    }
                };

                let relative = relative_path(root, &path);
                let several = remotes.len() > 1;
                for remote in remotes {
                    let mut entry = RawEntry::new(
                        &manufacturer,
                        UNKNOWN,
                        &remote.name,
                        SourceKind::Lirc,
                        Location::in_archive(SourceKind::Lirc, base.clone(), &relative),
                    );
                    if several {
                        entry.selector = Some(remote.name.clone());
                    }
                    entries.push(entry);
                }
            }
        }

        debug!(count = entries.len(), "Scraped LIRC remotes");
        Ok(entries)
    }

    fn parse_remote(
        &self,
        content: &[u8],
        request: &RemoteRequest<'_>,
        _normalizer: &ProtocolNormalizer,
    ) -> Result<FullRemote, ScrapeError> {
        let remotes = parse_config(&decode_text(content), request.origin)?;
        let lirc = match request.selector {
            Some(name) => remotes.into_iter().find(|r| r.name == name),
            None => remotes.into_iter().next(),
        }
        .ok_or_else(|| ScrapeError::parse(request.origin, "no matching remote in file"))?;

        let mut remote = FullRemote::new(&lirc.name);
        remote.manufacturer = Some(request.manufacturer.to_string());
        remote.device_class = Some(request.device_class.to_string());
        remote.source = Some(request.origin.to_string());
        remote.commands = lirc.commands;
        Ok(remote)
    }
}
