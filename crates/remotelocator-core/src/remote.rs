//! Resolved remotes: the command lists a catalog entry points to

use serde::{Deserialize, Serialize};

use crate::protocol::CanonicalCode;

/// Gap appended to raw sequences of odd length, in microseconds
pub const DUMMY_ENDING_GAP: u32 = 50_000;

/// A remote with its commands, as read from its source file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullRemote {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Path or URL the remote was read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub commands: Vec<Command>,
}

impl FullRemote {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub signal: Signal,
}

impl Command {
    pub fn new(name: &str, signal: Signal) -> Self {
        Self {
            name: name.to_string(),
            signal,
        }
    }
}

/// The payload of one command, in whatever form the source had it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Protocol name plus parameters
    Decoded(CanonicalCode),
    /// Measured durations
    Raw(RawSignal),
    /// Pronto Hex text, passed through
    Pronto(String),
    /// A bare code word without protocol information (LIRC)
    Code(u64),
}

/// Alternating flash/gap durations in microseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignal {
    pub frequency: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duty_cycle: Option<f64>,
    pub durations: Vec<u32>,
}

impl RawSignal {
    /// Build a signal, padding odd-length sequences with [`DUMMY_ENDING_GAP`]
    pub fn new(frequency: u32, duty_cycle: Option<f64>, mut durations: Vec<u32>) -> Self {
        if durations.len() % 2 == 1 {
            durations.push(DUMMY_ENDING_GAP);
        }
        Self {
            frequency,
            duty_cycle,
            durations,
        }
    }

    /// Number of flash/gap pairs
    pub fn pairs(&self) -> usize {
        self.durations.len() / 2
    }

    /// Durations with signs: flashes positive, gaps negative
    pub fn signed_text(&self) -> String {
        self.durations
            .iter()
            .enumerate()
            .map(|(i, d)| if i % 2 == 0 { format!("+{}", d) } else { format!("-{}", d) })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
