//! Typed controller parameters
//!
//! A [`Parameter`] is one named controller setting. It knows the command
//! that reads it back, the command that writes a value, and how to decide
//! whether a value read from the controller matches the one on file.
//!
//! Read and write commands depend only on the parameter's identity (kind,
//! name, axis, index) and, for writes, the value. The cached `value` is
//! touched only by [`Parameter::get`] and [`Parameter::set`] with
//! `refresh = true`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::channel::{CommandChannel, DeviceError};
use crate::codec::{decode_network_value, round_device, round_text};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Value not defined for parameter {name} of type {kind}")]
    NoValue { name: String, kind: &'static str },
    #[error("Invalid value '{value}' for parameter {name}")]
    InvalidValue { name: String, value: String },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Where a parameter was read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub file: String,
    pub line: usize,
}

/// Wire shape of a parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Bare command (`MO`, `SHA`); the value is always 1
    Command,
    /// `NAME value`, read with `MG_NAME`
    Basic,
    /// `NAME value`, read with `NAME ?`
    BasicQuery,
    /// `NAME=value`, read with `MG_NAME`
    Eq,
    /// `NAMEa=value`, read with `MG_NAMEa`
    Axis { axis: char },
    /// `NAMEa=value`, read with `NAMEa=?`
    AxisQuery { axis: char },
    /// SSI encoder setup, read with `SIa=?`
    SsiQuery { axis: char },
    /// Subset of axes (`BA ACD`), one probe per axis
    AxisMask,
    /// Fixed-length numeric list (`CN 1,-1,-1,0,1`), one probe per index
    Vector { length: usize },
    /// Packed IP address or netmask (`IA 10,10,10,2`)
    Network,
    /// `NAME index,value` (`AQ 1,2`)
    Indexed { index: u32 },
    /// Digital output set with `SBn` / cleared with `CBn`
    OutputBit { index: u32 },
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Command => "Command",
            ParameterKind::Basic => "Basic",
            ParameterKind::BasicQuery => "BasicQuery",
            ParameterKind::Eq => "Eq",
            ParameterKind::Axis { .. } => "Axis",
            ParameterKind::AxisQuery { .. } => "AxisQuery",
            ParameterKind::SsiQuery { .. } => "SSIQuery",
            ParameterKind::AxisMask => "AxisMask",
            ParameterKind::Vector { .. } => "Vector",
            ParameterKind::Network => "Network",
            ParameterKind::Indexed { .. } => "Indexed",
            ParameterKind::OutputBit { .. } => "OutputBit",
        }
    }
}

/// How a parameter is read back from the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPlan {
    /// One command, one reply
    Single(String),
    /// One numeric probe per axis or index: `(probe, command)`
    Probes(Vec<(String, String)>),
}

/// One named controller setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    kind: ParameterKind,
    name: String,
    /// Last value set, read with refresh, or parsed from file
    pub value: Option<String>,
    axes: Option<String>,
    source: Option<Source>,
}

impl Parameter {
    /// Create a parameter with the kind's default value (1 for commands,
    /// set/clear state for output bits).
    pub fn new(kind: ParameterKind, name: impl Into<String>) -> Self {
        let name = name.into();
        let value = match kind {
            ParameterKind::Command => Some("1".to_string()),
            ParameterKind::OutputBit { .. } => {
                Some(if name == "SB" { "1" } else { "0" }.to_string())
            }
            _ => None,
        };

        Self {
            kind,
            name,
            value,
            axes: None,
            source: None,
        }
    }

    /// Set the value on file. Command values stay fixed at 1.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        if self.kind != ParameterKind::Command {
            self.value = Some(value.into());
        }
        self
    }

    pub fn with_axes(mut self, axes: impl Into<String>) -> Self {
        self.axes = Some(axes.into());
        self
    }

    pub fn with_source(mut self, file: impl Into<String>, line: usize) -> Self {
        self.source = Some(Source {
            file: file.into(),
            line,
        });
        self
    }

    pub fn kind(&self) -> &ParameterKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn axes(&self) -> Option<&str> {
        self.axes.as_deref()
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Command stem: the name, plus the axis letter for per-axis kinds
    pub fn mnemonic(&self) -> String {
        match self.kind {
            ParameterKind::Axis { axis }
            | ParameterKind::AxisQuery { axis }
            | ParameterKind::SsiQuery { axis } => format!("{}{}", self.name, axis),
            _ => self.name.clone(),
        }
    }

    pub fn read_plan(&self) -> ReadPlan {
        let mnemonic = self.mnemonic();
        match &self.kind {
            ParameterKind::Command => ReadPlan::Single("MG1".to_string()),
            ParameterKind::Basic | ParameterKind::Eq | ParameterKind::Axis { .. } => {
                ReadPlan::Single(format!("MG_{}", mnemonic))
            }
            ParameterKind::BasicQuery => ReadPlan::Single(format!("{} ?", mnemonic)),
            ParameterKind::AxisQuery { .. } | ParameterKind::SsiQuery { .. } => {
                ReadPlan::Single(format!("{}=?", mnemonic))
            }
            ParameterKind::AxisMask => ReadPlan::Probes(
                self.axes
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .map(|axis| (axis.to_string(), format!("MG_{}{}", self.name, axis)))
                    .collect(),
            ),
            ParameterKind::Vector { length } => ReadPlan::Probes(
                (0..*length)
                    .map(|i| (i.to_string(), format!("MG_{}{}", self.name, i)))
                    .collect(),
            ),
            ParameterKind::Network => ReadPlan::Single(format!("MG_{}0", self.name)),
            ParameterKind::Indexed { index } => {
                ReadPlan::Single(format!("MG_{}{}", self.name, index))
            }
            ParameterKind::OutputBit { index } => {
                ReadPlan::Single(format!("MG@OUT[{}]", index))
            }
        }
    }

    /// Read command, for kinds read with a single command
    pub fn get_cmd(&self) -> Option<String> {
        match self.read_plan() {
            ReadPlan::Single(cmd) => Some(cmd),
            ReadPlan::Probes(_) => None,
        }
    }

    /// Write command for `value`
    pub fn set_cmd(&self, value: &str) -> Result<String, ParameterError> {
        let mnemonic = self.mnemonic();
        let cmd = match &self.kind {
            ParameterKind::Command => mnemonic,
            ParameterKind::Basic
            | ParameterKind::BasicQuery
            | ParameterKind::AxisMask
            | ParameterKind::Vector { .. }
            | ParameterKind::Network => format!("{} {}", mnemonic, value),
            ParameterKind::Eq
            | ParameterKind::Axis { .. }
            | ParameterKind::AxisQuery { .. }
            | ParameterKind::SsiQuery { .. } => format!("{}={}", mnemonic, value),
            ParameterKind::Indexed { index } => format!("{} {},{}", self.name, index, value),
            ParameterKind::OutputBit { index } => {
                let level = value.trim().parse::<f64>().map_err(|_| {
                    ParameterError::InvalidValue {
                        name: self.name.clone(),
                        value: value.to_string(),
                    }
                })?;
                if level.trunc() != 0.0 {
                    format!("SB{}", index)
                } else {
                    format!("CB{}", index)
                }
            }
        };
        Ok(cmd)
    }

    /// Read the current value from the controller without caching it
    pub fn read(&self, channel: &mut dyn CommandChannel) -> Result<String, ParameterError> {
        match self.read_plan() {
            ReadPlan::Single(cmd) => {
                debug!(parameter = %self.mnemonic(), command = %cmd, "Reading parameter");
                match self.kind {
                    ParameterKind::SsiQuery { .. } => Ok(self.read_ssi(channel, &cmd)),
                    ParameterKind::Network => {
                        let packed = channel.command_value(&cmd)?;
                        Ok(decode_network_value(packed.round() as i64 as i32))
                    }
                    _ => Ok(channel.command(&cmd)?.trim().to_string()),
                }
            }
            ReadPlan::Probes(probes) => {
                debug!(
                    parameter = %self.mnemonic(),
                    probes = probes.len(),
                    "Probing parameter"
                );
                if let ParameterKind::Vector { .. } = self.kind {
                    let mut parts = Vec::with_capacity(probes.len());
                    for (_, cmd) in &probes {
                        parts.push(round_device(channel.command_value(cmd)?).to_string());
                    }
                    return Ok(parts.join(","));
                }

                let mut axes = String::new();
                for (axis, cmd) in &probes {
                    match channel.command_value(cmd) {
                        Ok(flag) if flag != 0.0 => axes.push_str(axis),
                        Ok(_) => {}
                        Err(e) => {
                            warn!(parameter = %self.name, axis = %axis, error = %e, "Skipping axis probe")
                        }
                    }
                }
                Ok(if axes.is_empty() { "N".to_string() } else { axes })
            }
        }
    }

    fn read_ssi(&self, channel: &mut dyn CommandChannel, cmd: &str) -> String {
        let reply = match channel.command(cmd) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(parameter = %self.mnemonic(), error = %e, "SSI read failed, using 0");
                return "0".to_string();
            }
        };

        let fields: Vec<&str> = reply.split(',').map(str::trim).collect();
        if fields.len() < 6 {
            warn!(parameter = %self.mnemonic(), reply = %reply, "Malformed SSI reply, using 0");
            return "0".to_string();
        }
        format!(
            "{},{},{},{}<{}>{}",
            fields[0], fields[1], fields[2], fields[3], fields[4], fields[5]
        )
    }

    /// Read the value, caching it when `refresh` is set
    pub fn get(
        &mut self,
        channel: &mut dyn CommandChannel,
        refresh: bool,
    ) -> Result<String, ParameterError> {
        let value = self.read(channel)?;
        if refresh {
            self.value = Some(value.clone());
        }
        Ok(value)
    }

    /// Write `value`, caching it (without reading back) when `refresh` is set.
    /// A command's cached value stays 1.
    pub fn set(
        &mut self,
        channel: &mut dyn CommandChannel,
        value: &str,
        refresh: bool,
    ) -> Result<(), ParameterError> {
        let cmd = self.set_cmd(value)?;
        debug!(parameter = %self.mnemonic(), command = %cmd, "Writing parameter");
        channel.command(&cmd)?;
        if refresh && self.kind != ParameterKind::Command {
            self.value = Some(value.to_string());
        }
        Ok(())
    }

    /// Does `current` (read from the controller) match `desired`?
    ///
    /// Vectors compare per component at controller precision. SSI setups,
    /// axis masks and network addresses compare as text, so a `Network`
    /// value written as `10,10,10,2` never matches its dotted read-back
    /// form. A refreshed value matches later reads.
    pub fn compare(&self, current: &str, desired: &str) -> bool {
        match self.kind {
            ParameterKind::Vector { .. } => {
                let current: Vec<&str> = current.split(',').collect();
                let desired: Vec<&str> = desired.split(',').collect();
                current.len() == desired.len()
                    && current
                        .iter()
                        .zip(&desired)
                        .all(|(c, d)| values_match(c, d))
            }
            ParameterKind::SsiQuery { .. } | ParameterKind::AxisMask | ParameterKind::Network => {
                current == desired
            }
            _ => values_match(current, desired),
        }
    }

    /// Read the controller and return its value if it differs from the
    /// cached one. A parameter without a cached value always differs.
    pub fn drift(&self, channel: &mut dyn CommandChannel) -> Result<Option<String>, ParameterError> {
        let current = self.read(channel)?;
        match &self.value {
            Some(desired) if self.compare(&current, desired) => Ok(None),
            _ => Ok(Some(current)),
        }
    }

    /// Does the controller still hold the cached value?
    pub fn check(&self, channel: &mut dyn CommandChannel) -> Result<bool, ParameterError> {
        Ok(self.drift(channel)?.is_none())
    }

    /// The settings-file line for this parameter
    pub fn to_text(&self) -> Result<String, ParameterError> {
        match &self.value {
            Some(value) => self.set_cmd(value),
            None => Err(ParameterError::NoValue {
                name: self.name.clone(),
                kind: self.kind.as_str(),
            }),
        }
    }
}

/// Text equality first, then equality at controller precision. Anything
/// that does not parse as a number only matches itself.
pub fn values_match(current: &str, desired: &str) -> bool {
    if current == desired {
        return true;
    }
    match (round_text(current), round_text(desired)) {
        (Some(c), Some(d)) => c == d,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;

    fn axis_query(name: &str, axis: char) -> Parameter {
        Parameter::new(ParameterKind::AxisQuery { axis }, name)
    }

    #[test]
    fn test_command_shapes() {
        let cases = [
            (Parameter::new(ParameterKind::Command, "MO"), "MG1", "MO"),
            (Parameter::new(ParameterKind::Basic, "LZ"), "MG_LZ", "LZ 5"),
            (Parameter::new(ParameterKind::BasicQuery, "TM"), "TM ?", "TM 5"),
            (Parameter::new(ParameterKind::Eq, "IT"), "MG_IT", "IT=5"),
            (
                Parameter::new(ParameterKind::Axis { axis: 'B' }, "KP"),
                "MG_KPB",
                "KPB=5",
            ),
            (axis_query("KD", 'C'), "KDC=?", "KDC=5"),
            (Parameter::new(ParameterKind::Network, "IA"), "MG_IA0", "IA 5"),
            (
                Parameter::new(ParameterKind::Indexed { index: 2 }, "AQ"),
                "MG_AQ2",
                "AQ 2,5",
            ),
            (
                Parameter::new(ParameterKind::OutputBit { index: 3 }, "SB"),
                "MG@OUT[3]",
                "SB3",
            ),
        ];

        for (param, get, set) in cases {
            assert_eq!(param.get_cmd().as_deref(), Some(get), "{:?}", param.kind());
            assert_eq!(param.set_cmd("5").unwrap(), set, "{:?}", param.kind());
        }
    }

    #[test]
    fn test_commands_ignore_cached_value() {
        let a = Parameter::new(ParameterKind::Basic, "LZ").with_value("1");
        let b = Parameter::new(ParameterKind::Basic, "LZ").with_value("0");
        assert_eq!(a.get_cmd(), b.get_cmd());
        assert_eq!(a.set_cmd("7"), b.set_cmd("7"));
    }

    #[test]
    fn test_output_bit_defaults_and_levels() {
        let sb = Parameter::new(ParameterKind::OutputBit { index: 1 }, "SB");
        let cb = Parameter::new(ParameterKind::OutputBit { index: 1 }, "CB");
        assert_eq!(sb.to_text().unwrap(), "SB1");
        assert_eq!(cb.to_text().unwrap(), "CB1");
        assert_eq!(sb.set_cmd("0.0000").unwrap(), "CB1");
        assert_eq!(cb.set_cmd("1.0000").unwrap(), "SB1");
        assert!(matches!(
            sb.set_cmd("on"),
            Err(ParameterError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_command_value_is_constant() {
        let param = Parameter::new(ParameterKind::Command, "SHA").with_value("7");
        assert_eq!(param.value.as_deref(), Some("1"));
        assert_eq!(param.to_text().unwrap(), "SHA");
    }

    #[test]
    fn test_to_text_without_value() {
        let param = Parameter::new(ParameterKind::Eq, "IT");
        assert_eq!(
            param.to_text(),
            Err(ParameterError::NoValue {
                name: "IT".to_string(),
                kind: "Eq"
            })
        );
    }

    #[test]
    fn test_get_with_and_without_refresh() {
        let mut channel = MockChannel::new().reply("KPA=?", " 6.0000");
        let mut param = axis_query("KP", 'A').with_value("5");

        assert_eq!(param.get(&mut channel, false).unwrap(), "6.0000");
        assert_eq!(param.value.as_deref(), Some("5"));

        assert_eq!(param.get(&mut channel, true).unwrap(), "6.0000");
        assert_eq!(param.value.as_deref(), Some("6.0000"));
    }

    #[test]
    fn test_get_propagates_device_errors() {
        let mut channel = MockChannel::new();
        let mut param = Parameter::new(ParameterKind::Basic, "LZ").with_value("1");

        assert!(matches!(
            param.get(&mut channel, true),
            Err(ParameterError::Device(DeviceError::Rejected { .. }))
        ));
        assert_eq!(param.value.as_deref(), Some("1"));
    }

    #[test]
    fn test_set_caches_without_reading_back() {
        let mut channel = MockChannel::new().reply("KPA=12", "");
        let mut param = axis_query("KP", 'A');

        param.set(&mut channel, "12", true).unwrap();
        assert_eq!(param.value.as_deref(), Some("12"));
        assert_eq!(channel.sent(), ["KPA=12"]);
    }

    #[test]
    fn test_set_keeps_command_value() {
        let mut channel = MockChannel::new().reply("MO", "");
        let mut param = Parameter::new(ParameterKind::Command, "MO");

        param.set(&mut channel, "7", true).unwrap();
        assert_eq!(param.value.as_deref(), Some("1"));
        assert_eq!(channel.sent(), ["MO"]);
        assert_eq!(param.to_text().unwrap(), "MO");
    }

    #[test]
    fn test_axis_mask_probes_each_axis() {
        let mut channel = MockChannel::new()
            .reply("MG_BAA", "1.0000")
            .reply("MG_BAB", "0.0000")
            .reply("MG_BAD", "1.0000");
        let param = Parameter::new(ParameterKind::AxisMask, "BA").with_axes("ABCD");

        // C is rejected by the mock and skipped
        assert_eq!(param.read(&mut channel).unwrap(), "AD");
        assert_eq!(channel.sent(), ["MG_BAA", "MG_BAB", "MG_BAC", "MG_BAD"]);
    }

    #[test]
    fn test_axis_mask_empty_is_n() {
        let mut channel = MockChannel::new().reply("MG_BAA", "0").reply("MG_BAB", "0");
        let param = Parameter::new(ParameterKind::AxisMask, "BA").with_axes("AB");
        assert_eq!(param.read(&mut channel).unwrap(), "N");
        assert_eq!(param.set_cmd("N").unwrap(), "BA N");
    }

    #[test]
    fn test_vector_read_and_compare() {
        let mut channel = MockChannel::new()
            .reply("MG_CN0", "1.0000")
            .reply("MG_CN1", "-1.0000")
            .reply("MG_CN2", "-1.0000")
            .reply("MG_CN3", "0.0000")
            .reply("MG_CN4", "0.5000");
        let param = Parameter::new(ParameterKind::Vector { length: 5 }, "CN");
        assert_eq!(param.read(&mut channel).unwrap(), "1,-1,-1,0,0.5");

        assert!(param.compare("1.00001,2,3.00005", "1,2,3"));
        assert!(!param.compare("1,2,3", "1,2"));
        assert!(!param.compare("1,2,4", "1,2,3"));
    }

    #[test]
    fn test_vector_probe_failure_fails_read() {
        let mut channel = MockChannel::new().reply("MG_CN0", "1");
        let param = Parameter::new(ParameterKind::Vector { length: 2 }, "CN");
        assert!(param.read(&mut channel).is_err());
    }

    #[test]
    fn test_network_read() {
        let packed = i32::from_le_bytes([10, 10, 10, 2]);
        let mut channel = MockChannel::new().reply("MG_IA0", &format!("{}.0000", packed));
        let param = Parameter::new(ParameterKind::Network, "IA");
        assert_eq!(param.read(&mut channel).unwrap(), "2.10.10.10");
    }

    #[test]
    fn test_ssi_read() {
        let mut channel = MockChannel::new().reply("SIA=?", " 1, 25, 13, 0, 2, 0");
        let param = Parameter::new(ParameterKind::SsiQuery { axis: 'A' }, "SI");
        assert_eq!(param.read(&mut channel).unwrap(), "1,25,13,0<2>0");
    }

    #[test]
    fn test_ssi_read_recovers_with_zero() {
        let param = Parameter::new(ParameterKind::SsiQuery { axis: 'B' }, "SI");

        let mut failing = MockChannel::new();
        assert_eq!(param.read(&mut failing).unwrap(), "0");

        let mut short = MockChannel::new().reply("SIB=?", "1,25");
        assert_eq!(param.read(&mut short).unwrap(), "0");
    }

    #[test]
    fn test_default_compare() {
        let param = Parameter::new(ParameterKind::Basic, "LZ");
        assert!(param.compare("6.0000", "6"));
        assert!(param.compare("3.14159", "3.1416"));
        assert!(param.compare("abc", "abc"));
        assert!(!param.compare("6.0000", "six"));
        assert!(!param.compare("6.1", "6"));
    }

    #[test]
    fn test_string_compare_kinds() {
        let mask = Parameter::new(ParameterKind::AxisMask, "BA");
        assert!(mask.compare("AB", "AB"));
        assert!(!mask.compare("AB", "BA"));

        let ssi = Parameter::new(ParameterKind::SsiQuery { axis: 'A' }, "SI");
        assert!(!ssi.compare("0", "0.0000"));
    }

    #[test]
    fn test_network_compares_as_text() {
        let packed = i32::from_le_bytes([10, 10, 10, 2]);
        let mut channel = MockChannel::new().reply("MG_IA0", &format!("{}.0000", packed));

        // File form never matches the dotted read-back
        let mut param = Parameter::new(ParameterKind::Network, "IA").with_value("10,10,10,2");
        assert_eq!(
            param.drift(&mut channel).unwrap().as_deref(),
            Some("2.10.10.10")
        );

        // Once refreshed, the cached read-back form is stable
        param.get(&mut channel, true).unwrap();
        assert!(param.check(&mut channel).unwrap());
        assert!(!param.compare("2.10.10.10", "2.10.10.1"));
    }

    #[test]
    fn test_check_and_drift() {
        let mut channel = MockChannel::new().reply("MG_LZ", "1.0000");
        let same = Parameter::new(ParameterKind::Basic, "LZ").with_value("1");
        let changed = Parameter::new(ParameterKind::Basic, "LZ").with_value("0");
        let unset = Parameter::new(ParameterKind::Basic, "LZ");

        assert!(same.check(&mut channel).unwrap());
        assert_eq!(changed.drift(&mut channel).unwrap().as_deref(), Some("1.0000"));
        assert!(!unset.check(&mut channel).unwrap());
        assert_eq!(changed.value.as_deref(), Some("0"));
    }
}
