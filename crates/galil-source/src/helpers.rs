//! Code-generation helpers for program templates

use galil_core::codec::{round_device, DeviceNumber};
use std::fmt;
use thiserror::Error;

/// Number of axes a parameter list can address
pub const MAX_AXES: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HelperError {
    #[error("Unknown axis: {0}")]
    UnknownAxis(String),
    #[error("No values in the parameter list")]
    EmptyParameterList,
}

/// Position of an axis letter in positional argument lists.
///
/// `A`-`H` map to 0-7; the `X`, `Y`, `Z`, `W` aliases map to 0-3.
pub fn axis_index(axis: char) -> Option<usize> {
    match axis.to_ascii_uppercase() {
        c @ 'A'..='H' => Some(c as usize - 'A' as usize),
        'X' => Some(0),
        'Y' => Some(1),
        'Z' => Some(2),
        'W' => Some(3),
        _ => None,
    }
}

fn resolve_axis(key: &str) -> Result<usize, HelperError> {
    let mut chars = key.chars();
    let index = match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => axis_index(c),
        _ => key.parse::<usize>().ok(),
    };
    index
        .filter(|i| *i < MAX_AXES)
        .ok_or_else(|| HelperError::UnknownAxis(key.to_string()))
}

/// Build a positional per-axis argument list.
///
/// Keys are axis letters or axis numbers. Axes without a value are left
/// empty and trailing empties are dropped, so `{"B": 5, "D": 7}` becomes
/// `,5,,7`.
pub fn param_list<K, V, I>(params: I) -> Result<String, HelperError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: fmt::Display,
{
    let mut slots: [String; MAX_AXES] = Default::default();
    for (key, value) in params {
        slots[resolve_axis(key.as_ref())?] = value.to_string();
    }

    let used = slots
        .iter()
        .rposition(|s| !s.is_empty())
        .ok_or(HelperError::EmptyParameterList)?;
    Ok(slots[..=used].join(","))
}

/// Repeat a command once per argument: `HX{}` over `1, 2, 3` is
/// `HX1;HX2;HX3`.
pub fn repeat_command<I>(format: &str, args: I) -> String
where
    I: IntoIterator,
    I::Item: fmt::Display,
{
    args.into_iter()
        .map(|arg| format.replacen("{}", &arg.to_string(), 1))
        .collect::<Vec<_>>()
        .join(";")
}

/// Greedily join commands into as few device lines as possible.
///
/// Each packed line stays shorter than `max_line_length - 2` so the
/// terminal can still append its own framing.
pub fn pack_commands<I>(commands: I, max_line_length: usize) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let limit = max_line_length.saturating_sub(2);
    let mut lines: Vec<String> = Vec::new();
    for command in commands {
        let command = command.as_ref();
        match lines.last_mut() {
            Some(line) if line.len() + command.len() < limit => {
                line.push(';');
                line.push_str(command);
            }
            _ => lines.push(command.to_string()),
        }
    }
    lines
}

/// Value of a program variable assignment
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(DeviceNumber),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(DeviceNumber::Int(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(round_device(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// `name=value` commands, with strings quoted
pub fn assignments<'a, I>(pairs: I) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, Value)>,
{
    pairs
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_index() {
        assert_eq!(axis_index('A'), Some(0));
        assert_eq!(axis_index('h'), Some(7));
        assert_eq!(axis_index('W'), Some(3));
        assert_eq!(axis_index('Q'), None);
    }

    #[test]
    fn test_param_list() {
        assert_eq!(param_list([("A", 1), ("B", 2)]).unwrap(), "1,2");
        assert_eq!(param_list([("D", 7), ("B", 5)]).unwrap(), ",5,,7");
        assert_eq!(param_list([("2", "^a*4096")]).unwrap(), ",,^a*4096");
        assert_eq!(param_list([("Z", 3)]).unwrap(), ",,3");
    }

    #[test]
    fn test_param_list_errors() {
        let empty: [(&str, i32); 0] = [];
        assert_eq!(param_list(empty), Err(HelperError::EmptyParameterList));
        assert_eq!(param_list([("A", "")]), Err(HelperError::EmptyParameterList));
        assert_eq!(
            param_list([("9", 1)]),
            Err(HelperError::UnknownAxis("9".to_string()))
        );
        assert_eq!(
            param_list([("AB", 1)]),
            Err(HelperError::UnknownAxis("AB".to_string()))
        );
    }

    #[test]
    fn test_repeat_command() {
        assert_eq!(repeat_command("HX{}", [1, 2, 3]), "HX1;HX2;HX3");
        assert_eq!(repeat_command("SB{}", [4]), "SB4");
        assert_eq!(repeat_command("CB{}", Vec::<u32>::new()), "");
    }

    #[test]
    fn test_pack_commands() {
        let cmds = ["a=1", "b=2", "c=3", "d=4"];
        assert_eq!(pack_commands(cmds, 79), vec!["a=1;b=2;c=3;d=4"]);
        // limit 10: "a=1;b=2" + "c=3" would reach 10
        assert_eq!(pack_commands(cmds, 12), vec!["a=1;b=2", "c=3;d=4"]);
        assert!(pack_commands(Vec::<String>::new(), 79).is_empty());
    }

    #[test]
    fn test_assignments() {
        let code = assignments([
            ("xPressP", Value::from(3i64)),
            ("xRate", Value::from(1.23456)),
            ("xName", Value::from("pump")),
        ]);
        assert_eq!(code, vec!["xPressP=3", "xRate=1.2346", "xName=\"pump\""]);
    }
}
