//! IRDB: `codes/<manufacturer>/<device class>/<remote>.csv`
//!
//! Each file holds one remote, one command per line:
//! `functionname,protocol,device,subdevice,function`, subdevice `-1`
//! meaning none.

use remotelocator_core::{
    Command, FullRemote, Location, PreDecodedCode, ProtocolNormalizer, RawEntry, Signal, SourceCode,
    SourceKind,
};
use std::path::Path;
use tracing::{debug, warn};
use url::Url;

use crate::walk::{assert_readable_directory, file_name, is_backup, list_sorted, relative_path};
use crate::{decode_text, RemoteRequest, ScrapeError, SourceFormat};

pub const HEADER: [&str; 5] = ["functionname", "protocol", "device", "subdevice", "function"];
const REMOTE_ENDING: &str = ".csv";

/// One command line of an IRDB file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrdbCommand {
    pub name: String,
    pub protocol: String,
    pub device: i64,
    pub subdevice: i64,
    pub function: i64,
}

impl IrdbCommand {
    pub fn code(&self) -> PreDecodedCode {
        PreDecodedCode {
            protocol: self.protocol.clone(),
            device: self.device,
            subdevice: self.subdevice,
            function: Some(self.function),
        }
    }
}

/// Parse the content of an IRDB file.
///
/// Lines with unparsable numbers are skipped. A line with other than five
/// fields rejects the whole file, as does a file without a single named
/// command.
pub fn parse_commands(text: &str, origin: &str) -> Result<Vec<IrdbCommand>, ScrapeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut commands = Vec::new();
    let mut named = false;

    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(origin, error = %e, "Skipping line");
                continue;
            }
        };
        let lineno = record.position().map_or(0, |p| p.line());
        if record.len() != HEADER.len() {
            return Err(ScrapeError::parse(
                origin,
                format!("wrong number of fields in line {}", lineno),
            ));
        }

        let name = &record[0];
        if name.is_empty() {
            warn!(origin, lineno, "Empty function name");
        } else {
            named = true;
        }

        let numbers = (
            record[2].parse::<i64>(),
            record[3].parse::<i64>(),
            record[4].parse::<i64>(),
        );
        match numbers {
            (Ok(device), Ok(subdevice), Ok(function)) => commands.push(IrdbCommand {
                name: name.to_string(),
                protocol: record[1].to_string(),
                device,
                subdevice,
                function,
            }),
            _ => warn!(origin, lineno, "Invalid number, skipping line"),
        }
    }

    if !named {
        return Err(ScrapeError::parse(
            origin,
            "no command with a non-empty name",
        ));
    }
    Ok(commands)
}

pub struct IrdbFormat;

impl IrdbFormat {
    fn scrape_device_class(
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
            let remote_name = file.strip_suffix(REMOTE_ENDING).unwrap_or(&file);

            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable file, ignored");
                    continue;
                }
            };
            let origin = path.display().to_string();
            let commands = match parse_commands(&decode_text(&bytes), &origin) {
                Ok(commands) => commands,
                Err(e) => {
                    warn!(error = %e, "Remote ignored");
                    continue;
                }
            };

            let mut entry = RawEntry::new(
                manufacturer,
                device_class,
                remote_name,
                SourceKind::Irdb,
                Location::in_archive(SourceKind::Irdb, base.clone(), &relative_path(root, &path)),
            );
            entry.code = commands.first().map(|c| SourceCode::Tabular(c.code()));
            entries.push(entry);
        }
        Ok(())
    }
}

impl SourceFormat for IrdbFormat {
    fn kind(&self) -> SourceKind {
        SourceKind::Irdb
    }

    fn scrape(&self, root: &Path, base: &Url) -> Result<Vec<RawEntry>, ScrapeError> {
        assert_readable_directory(root)?;
        let mut entries = Vec::new();

        for manufacturer_dir in list_sorted(root)? {
            let manufacturer = file_name(&manufacturer_dir);
            if !manufacturer_dir.is_dir() {
                if manufacturer != "index" && manufacturer != "index.sh" {
                    warn!(path = %manufacturer_dir.display(), "Not a directory, ignored");
                }
                continue;
            }

            for class_dir in list_sorted(&manufacturer_dir)? {
                if !class_dir.is_dir() {
                    warn!(path = %class_dir.display(), "Not a directory, ignored");
                    continue;
                }
                let device_class = file_name(&class_dir);
                self.scrape_device_class(root, base, &manufacturer, &device_class, &class_dir, &mut entries)?;
            }
        }

        debug!(count = entries.len(), "Scraped IRDB remotes");
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
            match normalizer.decode_tabular(&command.code()) {
                Ok(code) => remote.commands.push(Command::new(&command.name, Signal::Decoded(code))),
                Err(e) => warn!(command = %command.name, error = %e, "Command ignored"),
            }
        }
        Ok(remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remotelocator_core::ParamName;

    const YAMAHA: &str = "functionname,protocol,device,subdevice,function\n\
                          Mute,nec,127,-1,12\n\
                          \"Vol+, fast\",NEC,127,-1,26\n\
                          Broken,NEC,x,-1,1\n";

    #[test]
    fn test_parse_commands() {
        let commands = parse_commands(YAMAHA, "test").unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].name, "Mute");
        assert_eq!(commands[0].subdevice, -1);
        assert_eq!(commands[1].name, "Vol+, fast");
    }

    #[test]
    fn test_wrong_field_count_rejects_file() {
        let text = "functionname,protocol,device,subdevice,function\nMute,nec,127,-1\n";
        assert!(matches!(parse_commands(text, "t"), Err(ScrapeError::Parse { .. })));
    }

    #[test]
    fn test_padding_and_blank_lines() {
        let text = "functionname,protocol,device,subdevice,function\r\n\r\n  Power , NEC1 , 4 , -1 , 8 \r\n";
        let commands = parse_commands(text, "t").unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].name, "Power");
        assert_eq!(commands[0].protocol, "NEC1");
        assert_eq!(commands[0].function, 8);
    }

    #[test]
    fn test_unnamed_file_rejected() {
        let text = "functionname,protocol,device,subdevice,function\n,nec,1,-1,2\n";
        assert!(parse_commands(text, "t").is_err());
    }

    #[test]
    fn test_parse_remote() {
        let request = RemoteRequest {
            manufacturer: "Yamaha",
            device_class: "Receiver",
            remote_name: "127,-1",
            selector: None,
            origin: "Yamaha/Receiver/127,-1.csv",
        };
        let remote = IrdbFormat
            .parse_remote(YAMAHA.as_bytes(), &request, &ProtocolNormalizer::new())
            .unwrap();
        assert_eq!(remote.name, "127,-1");
        assert_eq!(remote.manufacturer.as_deref(), Some("Yamaha"));
        match &remote.commands[0].signal {
            Signal::Decoded(code) => {
                assert_eq!(code.protocol, "NEC1");
                assert_eq!(code.parameters.get(ParamName::D), Some(127));
                assert_eq!(code.parameters.get(ParamName::F), Some(12));
                assert!(!code.parameters.contains(ParamName::S));
            }
            other => panic!("unexpected signal {:?}", other),
        }
    }

    #[test]
    fn test_scrape() {
        let dir = tempfile::tempdir().unwrap();
        let class_dir = dir.path().join("Yamaha").join("Receiver");
        std::fs::create_dir_all(&class_dir).unwrap();
        std::fs::write(class_dir.join("127,-1.csv"), YAMAHA).unwrap();
        std::fs::write(class_dir.join("127,-1.csv~"), YAMAHA).unwrap();
        std::fs::write(class_dir.join("bad.csv"), "functionname\n,,\n").unwrap();
        std::fs::write(dir.path().join("index"), "").unwrap();

        let base = SourceKind::Irdb.default_base().unwrap();
        let entries = IrdbFormat.scrape(dir.path(), &base).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.manufacturer, "Yamaha");
        assert_eq!(entry.device_class, "Receiver");
        assert_eq!(entry.remote_name, "127,-1");
        assert_eq!(entry.location.relative(), Some("Yamaha/Receiver/127,-1.csv"));
        assert_eq!(
            entry.code,
            Some(SourceCode::Tabular(PreDecodedCode {
                protocol: "nec".to_string(),
                device: 127,
                subdevice: -1,
                function: Some(12),
            }))
        );
    }
}
