//! Protocol normalization
//!
//! Sources hand us IR codes in their own notation: a protocol token plus a
//! 32-bit address and a 32-bit command word (Flipper style), or an already
//! tabulated protocol/device/subdevice/function row (IRDB style). This module
//! maps both onto a canonical protocol name and the named parameters
//! D (device), S (subdevice), F (function) and E (extra).
//!
//! The mapping is a closed table. Unknown tokens fail instead of producing an
//! empty result.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Sentinel used by tabular sources for "no subdevice"
pub const SUBDEVICE_ABSENT: i64 = -1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unsupported protocol: {token}")]
    Unsupported { token: String },
    #[error("Unsupported Kaseikyo vendor code M={m}, N={n}")]
    UnsupportedVendor { m: u32, n: u32 },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ProtocolError {
    /// True for the "not in the dispatch table" family of failures
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            ProtocolError::Unsupported { .. } | ProtocolError::UnsupportedVendor { .. }
        )
    }
}

/// Canonical parameter names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamName {
    D,
    S,
    F,
    E,
}

impl ParamName {
    pub const ALL: [ParamName; 4] = [ParamName::D, ParamName::S, ParamName::F, ParamName::E];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamName::D => "D",
            ParamName::S => "S",
            ParamName::F => "F",
            ParamName::E => "E",
        }
    }

    /// Parse a parameter name, accepting either case
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "D" | "d" => Some(ParamName::D),
            "S" | "s" => Some(ParamName::S),
            "F" | "f" => Some(ParamName::F),
            "E" | "e" => Some(ParamName::E),
            _ => None,
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named parameter set. Absence of a parameter is absence of its key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<ParamName, u64>);

impl Parameters {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: ParamName, value: u64) {
        self.0.insert(name, value);
    }

    pub fn get(&self, name: ParamName) -> Option<u64> {
        self.0.get(&name).copied()
    }

    pub fn contains(&self, name: ParamName) -> bool {
        self.0.contains_key(&name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamName, u64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

impl FromIterator<(ParamName, u64)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (ParamName, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", name, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Normalized protocol name plus parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCode {
    pub protocol: String,
    pub parameters: Parameters,
}

impl CanonicalCode {
    fn new(protocol: &str, parameters: &[(ParamName, u64)]) -> Self {
        Self {
            protocol: protocol.to_string(),
            parameters: parameters.iter().copied().collect(),
        }
    }
}

impl fmt::Display for CanonicalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.protocol, self.parameters)
    }
}

/// A bit-encoded code as delivered by the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCode {
    pub protocol_token: String,
    pub address: u32,
    pub command: u32,
}

impl RawCode {
    pub fn new(protocol_token: &str, address: u32, command: u32) -> Self {
        Self {
            protocol_token: protocol_token.to_string(),
            address,
            command,
        }
    }
}

/// An already decoded code from a tabular source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreDecodedCode {
    pub protocol: String,
    pub device: i64,
    /// [`SUBDEVICE_ABSENT`] when the source has no subdevice
    pub subdevice: i64,
    pub function: Option<i64>,
}

/// Whatever code a source attached to an ingested tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceCode {
    Raw(RawCode),
    Tabular(PreDecodedCode),
}

type Rule = fn(u32, u32) -> Result<CanonicalCode, ProtocolError>;

/// Immutable dispatch table from source tokens to extraction rules.
///
/// Build it once with [`ProtocolNormalizer::new`] and share it by reference.
#[derive(Debug, Clone)]
pub struct ProtocolNormalizer {
    rules: HashMap<&'static str, Rule>,
    aliases: HashMap<&'static str, &'static str>,
}

impl Default for ProtocolNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolNormalizer {
    /// Create the normalizer with the standard rule table
    pub fn new() -> Self {
        let mut rules: HashMap<&'static str, Rule> = HashMap::new();
        rules.insert("NEC42", nec42);
        rules.insert("NEC", nec);
        rules.insert("NECext", nec_ext);
        rules.insert("Samsung32", samsung32);
        rules.insert("RC5", rc5);
        rules.insert("RC5X", rc5x);
        rules.insert("RC6", rc6);
        rules.insert("SIRC", sirc);
        rules.insert("SIRC15", sirc15);
        rules.insert("SIRC20", sirc20);
        rules.insert("Pioneer", pioneer);
        rules.insert("RCA", rca);
        rules.insert("Kaseikyo", kaseikyo);

        let mut aliases = HashMap::new();
        aliases.insert("nec", "NEC1");

        Self { rules, aliases }
    }

    /// Decode a bit-encoded code. The token is matched case-sensitively.
    pub fn decode(&self, raw: &RawCode) -> Result<CanonicalCode, ProtocolError> {
        let rule = self
            .rules
            .get(raw.protocol_token.as_str())
            .ok_or_else(|| ProtocolError::Unsupported {
                token: raw.protocol_token.clone(),
            })?;
        rule(raw.address, raw.command)
    }

    /// Canonicalize a tabular code, dropping the subdevice sentinel
    pub fn decode_tabular(&self, code: &PreDecodedCode) -> Result<CanonicalCode, ProtocolError> {
        let name = code.protocol.trim();
        if name.is_empty() {
            return Err(ProtocolError::InvalidParameter(
                "empty protocol name".to_string(),
            ));
        }
        let protocol = self
            .aliases
            .get(name.to_lowercase().as_str())
            .map(|canonical| canonical.to_string())
            .unwrap_or_else(|| name.to_string());

        let mut parameters = Parameters::new();
        parameters.insert(ParamName::D, non_negative("device", code.device)?);
        if code.subdevice != SUBDEVICE_ABSENT {
            parameters.insert(ParamName::S, non_negative("subdevice", code.subdevice)?);
        }
        if let Some(function) = code.function {
            parameters.insert(ParamName::F, non_negative("function", function)?);
        }

        Ok(CanonicalCode {
            protocol,
            parameters,
        })
    }

    pub fn decode_source(&self, code: &SourceCode) -> Result<CanonicalCode, ProtocolError> {
        match code {
            SourceCode::Raw(raw) => self.decode(raw),
            SourceCode::Tabular(tabular) => self.decode_tabular(tabular),
        }
    }
}

fn non_negative(what: &str, value: i64) -> Result<u64, ProtocolError> {
    u64::try_from(value)
        .map_err(|_| ProtocolError::InvalidParameter(format!("{} = {}", what, value)))
}

fn high_byte(word: u32) -> u64 {
    (word >> 24) as u64
}

fn second_byte(word: u32) -> u64 {
    ((word >> 16) & 0xFF) as u64
}

/// Rules of the shape D = addr>>24, F = cmd>>24
fn device_function(protocol: &str, addr: u32, cmd: u32) -> CanonicalCode {
    CanonicalCode::new(
        protocol,
        &[(ParamName::D, high_byte(addr)), (ParamName::F, high_byte(cmd))],
    )
}

fn nec42(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    Ok(CanonicalCode::new(
        "Aiwa",
        &[
            (ParamName::D, high_byte(addr)),
            (ParamName::S, second_byte(addr)),
            (ParamName::F, high_byte(cmd)),
        ],
    ))
}

fn nec(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    Ok(device_function("NEC1", addr, cmd))
}

fn nec_ext(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    let d = high_byte(addr);
    let s = second_byte(addr);
    let e = second_byte(cmd);

    let mut parameters = Parameters::new();
    parameters.insert(ParamName::D, d);
    // S is implied by D when it is D's complement
    if s + d != 255 {
        parameters.insert(ParamName::S, s);
    }
    parameters.insert(ParamName::F, high_byte(cmd));

    let protocol = if e != 0 {
        parameters.insert(ParamName::E, e);
        "NEC1-f16"
    } else {
        "NEC1"
    };

    Ok(CanonicalCode {
        protocol: protocol.to_string(),
        parameters,
    })
}

fn samsung32(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    // S duplicates D; this mirrors what the archives contain
    Ok(CanonicalCode::new(
        "NECx1",
        &[
            (ParamName::D, high_byte(addr)),
            (ParamName::S, high_byte(addr)),
            (ParamName::F, high_byte(cmd)),
        ],
    ))
}

fn rc5(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    Ok(device_function("RC5", addr, cmd))
}

/// Flipper's RC5X is RC5 with bit 6 of F forced on, not the RC5x protocol
fn rc5x(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    Ok(CanonicalCode::new(
        "RC5",
        &[
            (ParamName::D, high_byte(addr)),
            (ParamName::F, high_byte(cmd) + 0x40),
        ],
    ))
}

fn rc6(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    Ok(device_function("RC6", addr, cmd))
}

fn sirc(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    Ok(device_function("Sony12", addr, cmd))
}

fn sirc15(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    Ok(device_function("Sony15", addr, cmd))
}

fn sirc20(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    let a = addr as u64;
    Ok(CanonicalCode::new(
        "Sony20",
        &[
            (ParamName::D, (a >> 24) & 0x1F),
            (ParamName::S, (((a >> 16) & 0xFF) << 3) | (a >> 29)),
            (ParamName::F, high_byte(cmd)),
        ],
    ))
}

fn pioneer(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    let mut parameters = Parameters::new();
    parameters.insert(ParamName::D, high_byte(addr));
    let s = second_byte(addr);
    if s != 0 {
        parameters.insert(ParamName::S, s);
    }
    parameters.insert(ParamName::F, high_byte(cmd));
    Ok(CanonicalCode {
        protocol: "Pioneer".to_string(),
        parameters,
    })
}

fn rca(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    Ok(device_function("RCA", addr, cmd))
}

/// Kaseikyo is a family; the vendor bytes M and N select the member
fn kaseikyo(addr: u32, cmd: u32) -> Result<CanonicalCode, ProtocolError> {
    let a28_31 = (addr >> 28) as u64;
    let a24_27 = ((addr >> 24) & 0xF) as u64;
    let m = (addr >> 16) & 0xFF;
    let n = (addr >> 8) & 0xFF;
    let a0_1 = (addr & 0x3) as u64;
    let c28_31 = (cmd >> 28) as u64;
    let c24_27 = ((cmd >> 24) & 0xF) as u64;
    let c16_17 = ((cmd >> 16) & 0x3) as u64;

    match (m, n) {
        (84, 50) => Ok(CanonicalCode::new(
            "Denon-K",
            &[
                (ParamName::D, a28_31),
                (ParamName::S, a24_27),
                (
                    ParamName::F,
                    (a0_1 << 10) | (c16_17 << 8) | (c28_31 << 4) | c24_27,
                ),
            ],
        )),
        // Panasonic and JVC-48 share the bit layout
        (2, 32) => Ok(panasonic_layout("Panasonic", a28_31, a24_27, a0_1, c28_31, c24_27, c16_17)),
        (3, 1) => Ok(panasonic_layout("JVC-48", a28_31, a24_27, a0_1, c28_31, c24_27, c16_17)),
        _ => Err(ProtocolError::UnsupportedVendor { m, n }),
    }
}

fn panasonic_layout(
    protocol: &str,
    a28_31: u64,
    a24_27: u64,
    a0_1: u64,
    c28_31: u64,
    c24_27: u64,
    c16_17: u64,
) -> CanonicalCode {
    CanonicalCode::new(
        protocol,
        &[
            (ParamName::D, a28_31 << 4),
            (ParamName::S, (c24_27 << 4) | a24_27),
            (ParamName::F, (a0_1 << 6) | (c16_17 << 4) | c28_31),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(token: &str, address: u32, command: u32) -> Result<CanonicalCode, ProtocolError> {
        ProtocolNormalizer::new().decode(&RawCode::new(token, address, command))
    }

    fn params(code: &CanonicalCode) -> Vec<(ParamName, u64)> {
        code.parameters.iter().collect()
    }

    #[test]
    fn test_rc5x_sets_bit_six() {
        let code = decode("RC5X", 0x0500_0000, 0x0C00_0000).unwrap();
        assert_eq!(code.protocol, "RC5");
        assert_eq!(params(&code), vec![(ParamName::D, 5), (ParamName::F, 0x0C + 0x40)]);
        assert!(!code.parameters.contains(ParamName::S));
    }

    #[test]
    fn test_nec_ext_subdevice_rules() {
        let code = decode("NECext", 0x4900_0000, 0x1A00_0000).unwrap();
        assert_eq!(code.protocol, "NEC1");
        assert_eq!(
            params(&code),
            vec![(ParamName::D, 73), (ParamName::S, 0), (ParamName::F, 26)]
        );

        // S byte equal to 255 - D is implied and omitted
        let complement = (255 - 0x49) as u32;
        let code = decode("NECext", 0x4900_0000 | (complement << 16), 0x1A00_0000).unwrap();
        assert_eq!(code.protocol, "NEC1");
        assert_eq!(code.parameters.get(ParamName::S), None);
        assert_eq!(code.parameters.get(ParamName::D), Some(73));
    }

    #[test]
    fn test_nec_ext_extra_byte_selects_f16() {
        let code = decode("NECext", 0x0400_0000, 0x0810_0000).unwrap();
        assert_eq!(code.protocol, "NEC1-f16");
        assert_eq!(code.parameters.get(ParamName::E), Some(0x10));
        assert_eq!(code.parameters.get(ParamName::F), Some(8));
    }

    #[test]
    fn test_simple_rules() {
        let cases = [
            ("NEC", "NEC1"),
            ("RC5", "RC5"),
            ("RC6", "RC6"),
            ("SIRC", "Sony12"),
            ("SIRC15", "Sony15"),
            ("RCA", "RCA"),
        ];
        for (token, protocol) in cases {
            let code = decode(token, 0x1122_3344, 0x5566_7788).unwrap();
            assert_eq!(code.protocol, protocol, "token {}", token);
            assert_eq!(
                params(&code),
                vec![(ParamName::D, 0x11), (ParamName::F, 0x55)],
                "token {}",
                token
            );
        }
    }

    #[test]
    fn test_aiwa_always_has_subdevice() {
        let code = decode("NEC42", 0x6E00_0000, 0x0100_0000).unwrap();
        assert_eq!(code.protocol, "Aiwa");
        assert_eq!(code.parameters.get(ParamName::S), Some(0));
    }

    #[test]
    fn test_samsung_subdevice_copies_device() {
        let code = decode("Samsung32", 0x0712_0000, 0x0200_0000).unwrap();
        assert_eq!(code.protocol, "NECx1");
        assert_eq!(code.parameters.get(ParamName::D), Some(7));
        assert_eq!(code.parameters.get(ParamName::S), Some(7));
        assert_eq!(code.parameters.get(ParamName::F), Some(2));
    }

    #[test]
    fn test_sirc20() {
        // D byte 0xE5: low five bits 5, top three bits 7; S byte 0x12
        let code = decode("SIRC20", 0xE512_0000, 0x3300_0000).unwrap();
        assert_eq!(code.protocol, "Sony20");
        assert_eq!(code.parameters.get(ParamName::D), Some(5));
        assert_eq!(code.parameters.get(ParamName::S), Some((0x12 << 3) | 7));
        assert_eq!(code.parameters.get(ParamName::F), Some(0x33));
    }

    #[test]
    fn test_pioneer_zero_subdevice_omitted() {
        let code = decode("Pioneer", 0xAA00_0000, 0x1C00_0000).unwrap();
        assert!(!code.parameters.contains(ParamName::S));
        let code = decode("Pioneer", 0xAA05_0000, 0x1C00_0000).unwrap();
        assert_eq!(code.parameters.get(ParamName::S), Some(5));
    }

    #[test]
    fn test_kaseikyo_denon() {
        // a28_31=4 a24_27=1 M=84 N=50 a0_1=0; c28_31=7 c24_27=3 c16_17=2
        let address = (4 << 28) | (1 << 24) | (84 << 16) | (50 << 8);
        let command = (7 << 28) | (3 << 24) | (2 << 16);
        let code = decode("Kaseikyo", address, command).unwrap();
        assert_eq!(code.protocol, "Denon-K");
        assert_eq!(code.parameters.get(ParamName::D), Some(4));
        assert_eq!(code.parameters.get(ParamName::S), Some(1));
        assert_eq!(
            code.parameters.get(ParamName::F),
            Some((0 << 10) | (2 << 8) | (7 << 4) | 3)
        );
    }

    #[test]
    fn test_kaseikyo_panasonic_and_jvc_share_layout() {
        let tail = 0x3; // a0_1
        let panasonic = decode("Kaseikyo", (0x8 << 28) | (0x4 << 24) | (2 << 16) | (32 << 8) | tail, 0x9102_0000).unwrap();
        let jvc = decode("Kaseikyo", (0x8 << 28) | (0x4 << 24) | (3 << 16) | (1 << 8) | tail, 0x9102_0000).unwrap();
        assert_eq!(panasonic.protocol, "Panasonic");
        assert_eq!(jvc.protocol, "JVC-48");
        assert_eq!(panasonic.parameters, jvc.parameters);
        assert_eq!(panasonic.parameters.get(ParamName::D), Some(0x80));
        assert_eq!(panasonic.parameters.get(ParamName::S), Some((0x1 << 4) | 0x4));
        assert_eq!(panasonic.parameters.get(ParamName::F), Some((3 << 6) | (2 << 4) | 0x9));
    }

    #[test]
    fn test_kaseikyo_unknown_vendor() {
        let err = decode("Kaseikyo", (1 << 16) | (1 << 8), 0).unwrap_err();
        assert_eq!(err, ProtocolError::UnsupportedVendor { m: 1, n: 1 });
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_unknown_token_fails() {
        let err = decode("Foo123", 0, 0).unwrap_err();
        assert_eq!(err, ProtocolError::Unsupported { token: "Foo123".to_string() });
        // tokens are case-sensitive
        assert!(decode("nec", 0, 0).is_err());
    }

    #[test]
    fn test_tabular_alias_and_sentinel() {
        let normalizer = ProtocolNormalizer::new();
        let code = normalizer
            .decode_tabular(&PreDecodedCode {
                protocol: "nec".to_string(),
                device: 127,
                subdevice: SUBDEVICE_ABSENT,
                function: Some(12),
            })
            .unwrap();
        assert_eq!(code.protocol, "NEC1");
        assert_eq!(params(&code), vec![(ParamName::D, 127), (ParamName::F, 12)]);

        let code = normalizer
            .decode_tabular(&PreDecodedCode {
                protocol: "NEC".to_string(),
                device: 1,
                subdevice: 254,
                function: None,
            })
            .unwrap();
        assert_eq!(code.protocol, "NEC1");
        assert_eq!(code.parameters.get(ParamName::S), Some(254));

        let code = normalizer
            .decode_tabular(&PreDecodedCode {
                protocol: "RC5".to_string(),
                device: 0,
                subdevice: -1,
                function: Some(1),
            })
            .unwrap();
        assert_eq!(code.protocol, "RC5");
    }

    #[test]
    fn test_tabular_rejects_negative_values() {
        let err = ProtocolNormalizer::new()
            .decode_tabular(&PreDecodedCode {
                protocol: "nec".to_string(),
                device: -3,
                subdevice: -1,
                function: Some(1),
            })
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidParameter(_)));
    }

    #[test]
    fn test_parameters_display() {
        let code = decode("NEC", 0x0100_0000, 0x0200_0000).unwrap();
        assert_eq!(code.to_string(), "NEC1 D=1 F=2");
    }
}
