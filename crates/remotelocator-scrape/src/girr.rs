//! Girr XML: reading remotes out of Girr files and writing them back
//!
//! A Girr file has either a `<remotes>` root holding several `<remote>`
//! elements, or a single `<remote>` root. Scraped entries remember which one
//! they came from in their selector: `remotes/remote[@name='X']` or `/remote`.

use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use quick_xml::se::to_string;
use remotelocator_core::{
    CanonicalCode, Command, FullRemote, Location, ParamName, Parameters, ProtocolNormalizer,
    RawEntry, RawSignal, Signal, SourceKind,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

use crate::walk::{assert_readable_directory, file_name, list_sorted, relative_path};
use crate::{decode_text, RemoteRequest, ScrapeError, SourceFormat};

pub const GIRR_NAMESPACE: &str = "http://www.harctoolbox.org/Girr";
pub const GIRR_VERSION: &str = "1.2";
const SINGLE_REMOTE_SELECTOR: &str = "/remote";
const JUNK_EXTENSIONS: [&str; 4] = [".xsl", ".jpg", ".html", ".pdf"];

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "remotes")]
struct RemotesXml {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    xmlns: Option<String>,
    #[serde(rename = "@girrVersion", default, skip_serializing_if = "Option::is_none")]
    girr_version: Option<String>,
    #[serde(rename = "@title", default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default)]
    remote: Vec<RemoteXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "remote")]
struct RemoteXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@displayName", default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(rename = "@comment", default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(rename = "metaData", default, skip_serializing_if = "Option::is_none")]
    meta_data: Option<MetaDataXml>,
    #[serde(rename = "commandSet", default)]
    command_set: Vec<CommandSetXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetaDataXml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(rename = "deviceClass", default, skip_serializing_if = "Option::is_none")]
    device_class: Option<String>,
    #[serde(rename = "remoteName", default, skip_serializing_if = "Option::is_none")]
    remote_name: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CommandSetXml {
    #[serde(rename = "@name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// Defaults inherited by the commands of the set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameters: Option<ParametersXml>,
    #[serde(default)]
    command: Vec<CommandXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CommandXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@comment", default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(rename = "@master", default, skip_serializing_if = "Option::is_none")]
    master: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameters: Option<ParametersXml>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<RawXml>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ccf: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    format: Vec<FormatXml>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ParametersXml {
    #[serde(rename = "@protocol", default, skip_serializing_if = "Option::is_none")]
    protocol: Option<String>,
    #[serde(default)]
    parameter: Vec<ParameterXml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParameterXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@value")]
    value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawXml {
    #[serde(rename = "@frequency", default, skip_serializing_if = "Option::is_none")]
    frequency: Option<u32>,
    #[serde(rename = "@dutyCycle", default, skip_serializing_if = "Option::is_none")]
    duty_cycle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repeat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ending: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FormatXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$text", default)]
    text: String,
}

fn parse_number(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// `+9024 -4512 +564` → [9024, 4512, 564]
fn parse_durations(text: &str) -> Vec<u32> {
    text.split_whitespace()
        .filter_map(|t| t.trim_start_matches(['+', '-']).parse::<f64>().ok())
        .map(|d| d.round() as u32)
        .collect()
}

impl ParametersXml {
    /// Overlay `self` on inherited defaults
    fn merged(&self, defaults: Option<&ParametersXml>) -> ParametersXml {
        let mut merged = defaults.cloned().unwrap_or_default();
        if self.protocol.is_some() {
            merged.protocol = self.protocol.clone();
        }
        for p in &self.parameter {
            merged.parameter.retain(|q| q.name != p.name);
            merged.parameter.push(p.clone());
        }
        merged
    }

    fn to_code(&self) -> Option<CanonicalCode> {
        let protocol = self.protocol.clone()?;
        let parameters: Parameters = self
            .parameter
            .iter()
            .filter_map(|p| Some((ParamName::from_name(&p.name)?, parse_number(&p.value)?)))
            .collect();
        Some(CanonicalCode {
            protocol,
            parameters,
        })
    }

    fn from_code(code: &CanonicalCode) -> Self {
        Self {
            protocol: Some(code.protocol.clone()),
            parameter: code
                .parameters
                .iter()
                .map(|(name, value)| ParameterXml {
                    name: name.as_str().to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }
}

impl CommandXml {
    fn to_signal(&self, defaults: Option<&ParametersXml>) -> Option<Signal> {
        let parameters = match &self.parameters {
            Some(own) => Some(own.merged(defaults)),
            None => defaults.cloned(),
        };
        let decoded = parameters.as_ref().and_then(ParametersXml::to_code);
        let raw = self.raw.as_ref().map(|raw| {
            let mut durations = Vec::new();
            for part in [&raw.intro, &raw.repeat, &raw.ending].into_iter().flatten() {
                durations.extend(parse_durations(part));
            }
            RawSignal::new(raw.frequency.unwrap_or(38000), raw.duty_cycle, durations)
        });
        let pronto = self.ccf.as_ref().map(|ccf| ccf.trim().to_string());

        // Prefer what the file declares as master, then parameters, raw, ccf
        match self.master.as_deref() {
            Some("raw") if raw.is_some() => raw.map(Signal::Raw),
            Some("ccf") if pronto.is_some() => pronto.map(Signal::Pronto),
            _ => decoded
                .map(Signal::Decoded)
                .or_else(|| raw.map(Signal::Raw))
                .or_else(|| pronto.map(Signal::Pronto)),
        }
    }

    fn from_command(command: &Command) -> Self {
        let mut xml = CommandXml {
            name: command.name.clone(),
            ..Default::default()
        };
        match &command.signal {
            Signal::Decoded(code) => {
                xml.master = Some("parameters".to_string());
                xml.parameters = Some(ParametersXml::from_code(code));
            }
            Signal::Raw(raw) => {
                xml.master = Some("raw".to_string());
                xml.raw = Some(RawXml {
                    frequency: Some(raw.frequency),
                    duty_cycle: raw.duty_cycle,
                    intro: Some(raw.signed_text()),
                    repeat: None,
                    ending: None,
                });
            }
            Signal::Pronto(ccf) => {
                xml.master = Some("ccf".to_string());
                xml.ccf = Some(ccf.clone());
            }
            Signal::Code(code) => {
                xml.format.push(FormatXml {
                    name: "lirc".to_string(),
                    text: format!("0x{:X}", code),
                });
            }
        }
        xml
    }
}

impl RemoteXml {
    fn commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        for set in &self.command_set {
            for command in &set.command {
                match command.to_signal(set.parameters.as_ref()) {
                    Some(signal) => commands.push(Command::new(&command.name, signal)),
                    None => debug!(command = %command.name, "Command without usable signal"),
                }
            }
        }
        commands
    }

    fn meta(&self) -> &MetaDataXml {
        static EMPTY: MetaDataXml = MetaDataXml {
            manufacturer: None,
            model: None,
            device_class: None,
            remote_name: None,
        };
        self.meta_data.as_ref().unwrap_or(&EMPTY)
    }

    fn to_full_remote(&self, source: &str) -> FullRemote {
        let meta = self.meta();
        FullRemote {
            name: self.name.clone(),
            manufacturer: meta.manufacturer.clone(),
            device_class: meta.device_class.clone(),
            model: meta.model.clone(),
            comment: self.comment.clone(),
            source: Some(source.to_string()),
            commands: self.commands(),
        }
    }

    fn from_full_remote(remote: &FullRemote) -> Self {
        let has_meta = remote.manufacturer.is_some()
            || remote.model.is_some()
            || remote.device_class.is_some();
        RemoteXml {
            name: remote.name.clone(),
            display_name: None,
            comment: remote.comment.clone(),
            meta_data: has_meta.then(|| MetaDataXml {
                manufacturer: remote.manufacturer.clone(),
                model: remote.model.clone(),
                device_class: remote.device_class.clone(),
                remote_name: None,
            }),
            command_set: vec![CommandSetXml {
                name: Some("commandSet".to_string()),
                parameters: None,
                command: remote.commands.iter().map(CommandXml::from_command).collect(),
            }],
        }
    }
}

/// Local name of the root element
fn root_element(xml: &str) -> Result<String, ScrapeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Ok(Event::Eof) => return Err(ScrapeError::Xml("no root element".to_string())),
            Ok(_) => {}
            Err(e) => return Err(ScrapeError::Xml(e.to_string())),
        }
    }
}

/// The remotes of a Girr document with their selectors
fn read_document(xml: &str) -> Result<Vec<(RemoteXml, String)>, ScrapeError> {
    match root_element(xml)?.as_str() {
        "remotes" => {
            let doc: RemotesXml = from_str(xml).map_err(|e| ScrapeError::Xml(e.to_string()))?;
            Ok(doc
                .remote
                .into_iter()
                .map(|r| {
                    let selector = name_selector(&r.name);
                    (r, selector)
                })
                .collect())
        }
        "remote" => {
            let remote: RemoteXml = from_str(xml).map_err(|e| ScrapeError::Xml(e.to_string()))?;
            Ok(vec![(remote, SINGLE_REMOTE_SELECTOR.to_string())])
        }
        other => Err(ScrapeError::Xml(format!("top level element is {}", other))),
    }
}

/// Selector of a named remote; double quotes when the name has an apostrophe
fn name_selector(name: &str) -> String {
    let quote = if name.contains('\'') { '"' } else { '\'' };
    format!("remotes/remote[@name={quote}{name}{quote}]")
}

/// The name in a `[@name='X']` predicate, if any.
///
/// The predicate runs to the closing `]` at the end, so the name may hold
/// the other quote character.
fn selected_name(selector: &str) -> Option<&str> {
    let start = selector.find("[@name=")? + "[@name=".len();
    let body = selector[start..].strip_suffix(']')?;
    let quote = body.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    body[quote.len_utf8()..].strip_suffix(quote)
}

/// Write remotes as a Girr document
pub fn to_girr_xml(remotes: &[FullRemote], title: Option<&str>) -> Result<String, ScrapeError> {
    let doc = RemotesXml {
        xmlns: Some(GIRR_NAMESPACE.to_string()),
        girr_version: Some(GIRR_VERSION.to_string()),
        title: title.map(str::to_string),
        remote: remotes.iter().map(RemoteXml::from_full_remote).collect(),
    };
    let xml = to_string(&doc).map_err(|e| ScrapeError::Xml(e.to_string()))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}\n", xml))
}

pub struct GirrFormat;

impl GirrFormat {
    fn scrape_file(&self, root: &Path, base: &Url, path: &Path, entries: &mut Vec<RawEntry>) {
        let origin = path.display().to_string();
        let remotes = match std::fs::read(path)
            .map_err(ScrapeError::from)
            .and_then(|bytes| read_document(&decode_text(&bytes)))
        {
            Ok(remotes) => remotes,
            Err(e) => {
                info!(path = %origin, error = %e, "File ignored");
                return;
            }
        };

        let relative = relative_path(root, path);
        for (remote, selector) in remotes {
            let meta = remote.meta();
            let mut entry = RawEntry::new(
                meta.manufacturer.as_deref().unwrap_or_default(),
                meta.device_class.as_deref().unwrap_or_default(),
                &remote.name,
                SourceKind::Girr,
                Location::in_archive(SourceKind::Girr, base.clone(), &relative),
            );
            entry.selector = Some(selector);
            entry.comment = remote.comment.clone();
            entry.model = meta.model.clone();
            entries.push(entry);
        }
    }

    fn scrape_recursive(&self, root: &Path, base: &Url, dir: &Path, entries: &mut Vec<RawEntry>) -> Result<(), ScrapeError> {
        for path in list_sorted(dir)? {
            let name = file_name(&path);
            if path.is_dir() {
                self.scrape_recursive(root, base, &path, entries)?;
            } else if JUNK_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
                debug!(path = %path.display(), "Ignored due to its extension");
            } else if path.is_file() {
                self.scrape_file(root, base, &path, entries);
            } else {
                warn!(path = %path.display(), "Unknown file");
            }
        }
        Ok(())
    }
}

impl SourceFormat for GirrFormat {
    fn kind(&self) -> SourceKind {
        SourceKind::Girr
    }

    fn scrape(&self, root: &Path, base: &Url) -> Result<Vec<RawEntry>, ScrapeError> {
        assert_readable_directory(root)?;
        let mut entries = Vec::new();
        self.scrape_recursive(root, base, root, &mut entries)?;
        debug!(count = entries.len(), "Scraped Girr remotes");
        Ok(entries)
    }

    fn parse_remote(
        &self,
        content: &[u8],
        request: &RemoteRequest<'_>,
        _normalizer: &ProtocolNormalizer,
    ) -> Result<FullRemote, ScrapeError> {
        let remotes = read_document(&decode_text(content))?;
        let wanted = request.selector.and_then(selected_name);
        let (remote, _) = remotes
            .into_iter()
            .find(|(r, _)| wanted.map_or(true, |name| r.name == name))
            .ok_or_else(|| ScrapeError::parse(request.origin, "no matching remote in file"))?;
        Ok(remote.to_full_remote(request.origin))
    }
}
