//! Encodings of a resolved remote for `locate`

use anyhow::{anyhow, Context, Result};
use remotelocator_core::protocol::SUBDEVICE_ABSENT;
use remotelocator_core::{FullRemote, ParamName, RawSignal, Signal};
use remotelocator_scrape::irdb::HEADER;
use remotelocator_scrape::to_girr_xml;
use tracing::{debug, warn};

/// Pronto frequency words count in units of this many microseconds
const PRONTO_CLOCK: f64 = 0.241246;

pub fn girr(remote: &FullRemote) -> Result<String> {
    to_girr_xml(std::slice::from_ref(remote), Some(&remote.name)).context("Failed to write Girr")
}

pub fn json(remote: &FullRemote) -> Result<String> {
    serde_json::to_string_pretty(remote).context("Failed to write JSON")
}

/// Learned Pronto Hex of a raw signal: `0000 FFFF NNNN 0000 ...`
pub fn pronto_hex(signal: &RawSignal) -> Option<String> {
    if signal.frequency == 0 {
        return None;
    }
    let frequency = f64::from(signal.frequency);
    let frequency_code = (1_000_000.0 / (frequency * PRONTO_CLOCK)).round() as u32;

    let mut words = vec![0, frequency_code, signal.pairs() as u32, 0];
    words.extend(
        signal
            .durations
            .iter()
            .map(|&d| ((f64::from(d) * frequency / 1_000_000.0).round() as u32).max(1)),
    );
    Some(
        words
            .iter()
            .map(|w| format!("{:04X}", w))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// One `name: pronto` line per command that has a Pronto form
pub fn pronto(remote: &FullRemote) -> String {
    let mut out = String::new();
    for command in &remote.commands {
        let text = match &command.signal {
            Signal::Pronto(ccf) => Some(ccf.clone()),
            Signal::Raw(raw) => pronto_hex(raw),
            Signal::Decoded(_) | Signal::Code(_) => None,
        };
        match text {
            Some(text) => {
                out.push_str(&command.name);
                out.push_str(": ");
                out.push_str(&text);
                out.push('\n');
            }
            None => warn!(command = %command.name, "No Pronto Hex form, skipped"),
        }
    }
    out
}

/// IRDB style CSV of the decoded commands
pub fn csv(remote: &FullRemote) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(HEADER).context("Failed to write CSV")?;
    for command in &remote.commands {
        let Signal::Decoded(code) = &command.signal else {
            debug!(command = %command.name, "Not a decoded command, left out of CSV");
            continue;
        };
        let param = |name: ParamName| {
            code.parameters
                .get(name)
                .map_or(SUBDEVICE_ABSENT.to_string(), |v| v.to_string())
        };
        writer
            .write_record([
                command.name.clone(),
                code.protocol.clone(),
                param(ParamName::D),
                param(ParamName::S),
                param(ParamName::F),
            ])
            .context("Failed to write CSV")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to write CSV: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV is not UTF-8")
}
