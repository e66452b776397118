//! Wire encodings used by the controller
//!
//! Every controller variable is a "4.2" fixed point number: 4 bytes of
//! integer part and 2 bytes of fraction. Strings are stored in the same
//! 6 byte cell and travel as `$XXXXXXXX.XXXX` hex numbers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Capacity of one controller variable when used as a string
pub const STRING_CAPACITY: usize = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Controller strings may have at most {STRING_CAPACITY} characters, got {len}")]
    TooLong { len: usize },
    #[error("Invalid controller hex string: {0}")]
    InvalidHex(String),
}

/// Encode a string as the controller stores it.
///
/// E.g.: `"12345"` -> `"$31323334.3500"`
pub fn encode_string(s: &str) -> Result<String, CodecError> {
    let bytes = s.as_bytes();
    if bytes.len() > STRING_CAPACITY {
        return Err(CodecError::TooLong { len: bytes.len() });
    }

    let mut cell = [0u8; STRING_CAPACITY];
    cell[..bytes.len()].copy_from_slice(bytes);
    let digits = hex::encode_upper(cell);

    Ok(format!("${}.{}", &digits[..8], &digits[8..]))
}

/// Decode a controller hex string, dropping trailing NUL padding.
///
/// E.g.: `"$31323334.3500"` -> `"12345"`
pub fn decode_string(ghex: &str) -> Result<String, CodecError> {
    let raw = decode_binary(ghex)?;
    Ok(raw.trim_end_matches('\0').to_string())
}

/// Like [`decode_string`] but keeps trailing NUL bytes.
///
/// E.g.: `"$31323334.3500"` -> `"12345\0"`
pub fn decode_binary(ghex: &str) -> Result<String, CodecError> {
    let digits: String = ghex
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != '.')
        .collect();
    let bytes = hex::decode(&digits).map_err(|_| CodecError::InvalidHex(ghex.to_string()))?;
    Ok(bytes.into_iter().map(char::from).collect())
}

/// Render a packed 32 bit network value as dotted octets.
///
/// The value's little-endian memory layout is printed in reverse, so the
/// bytes `[10, 10, 10, 2]` read as `"2.10.10.10"`.
pub fn decode_network_value(value: i32) -> String {
    let bytes = value.to_le_bytes();
    bytes
        .iter()
        .rev()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// A number rounded to controller precision
///
/// Whole numbers are kept integral so their text form matches what the
/// controller prints (`3`, not `3.0`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceNumber {
    Int(i64),
    Float(f64),
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceNumber::Int(v) => write!(f, "{}", v),
            DeviceNumber::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Round to 4 decimal digits, the controller's fractional precision.
///
/// Rounding works on the exact decimal expansion of `x`; scaling by 10^4
/// first would turn `3.00005` (really `3.0000499...`) into a tie.
pub fn round_device(x: f64) -> DeviceNumber {
    let rounded: f64 = format!("{:.4}", x).parse().unwrap_or(x);
    if rounded.is_finite() && rounded.fract() == 0.0 && rounded.abs() < i64::MAX as f64 {
        DeviceNumber::Int(rounded as i64)
    } else {
        DeviceNumber::Float(rounded)
    }
}

/// Parse controller text as a number and round it, `None` if not numeric.
pub fn round_text(text: &str) -> Option<DeviceNumber> {
    text.trim().parse::<f64>().ok().map(round_device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_string() {
        assert_eq!(encode_string("12345").unwrap(), "$31323334.3500");
        assert_eq!(encode_string("").unwrap(), "$00000000.0000");
        assert_eq!(encode_string("Homing").unwrap(), "$486F6D69.6E67");
    }

    #[test]
    fn test_encode_rejects_long_strings() {
        assert_eq!(
            encode_string("1234567"),
            Err(CodecError::TooLong { len: 7 })
        );
    }

    #[test]
    fn test_decode_string() {
        assert_eq!(decode_string("$31323334.3500").unwrap(), "12345");
        assert_eq!(decode_string("$486f6d69.6e67").unwrap(), "Homing");
        assert_eq!(decode_binary("$31323334.3500").unwrap(), "12345\0");
        assert!(decode_string("$3132zz34.3500").is_err());
    }

    #[test]
    fn test_string_survives_encoding() {
        for s in ["", "a", "xPrg", "ABCDEF", "a b"] {
            let encoded = encode_string(s).unwrap();
            assert_eq!(decode_string(&encoded).unwrap(), s);
        }
    }

    #[test]
    fn test_network_value() {
        let value = i32::from_le_bytes([10, 10, 10, 2]);
        assert_eq!(decode_network_value(value), "2.10.10.10");

        let value = i32::from_le_bytes([0, 255, 255, 255]);
        assert_eq!(decode_network_value(value), "255.255.255.0");
    }

    #[test]
    fn test_round_device() {
        assert_eq!(round_device(3.00001), DeviceNumber::Int(3));
        assert_eq!(round_device(3.14159), DeviceNumber::Float(3.1416));
        assert_eq!(round_device(3.00005), DeviceNumber::Int(3));
        assert_eq!(round_device(-2.0).to_string(), "-2");
        assert_eq!(round_device(0.5).to_string(), "0.5");
        assert_eq!(round_text(" 6.0000"), Some(DeviceNumber::Int(6)));
        assert_eq!(round_text("N"), None);
    }
}
