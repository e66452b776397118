//! Controller settings files
//!
//! A settings file is a list of controller commands, one per line, that
//! together describe a controller's configuration (`KPA=6`, `BA ACD`,
//! `CN 1,-1,-1,0,1`, ...). Each line is classified against an ordered rule
//! table; the first rule that matches wins. Comment and blank lines are kept
//! verbatim, every other line becomes a [`Parameter`]. A line no rule
//! recognizes fails the whole load.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::channel::CommandChannel;
use crate::parameter::{Parameter, ParameterError, ParameterKind};

/// Axis set handed to axis-mask parameters unless configured otherwise
pub const DEFAULT_AXES: &str = "ABCDEFGH";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Unparsable setting in {file} line {line}: '{text}'")]
    Malformed {
        file: String,
        line: usize,
        text: String,
    },
    #[error("No builder registered under '{0}'")]
    UnknownBuilder(String),
    #[error("Invalid rule pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// One rule: a pattern and the name of the builder for matching lines.
/// `None` keeps matching lines as literal text.
pub type RuleSpec = (&'static str, Option<&'static str>);

/// Standard rule table, in precedence order
pub const STANDARD_RULES: &[RuleSpec] = &[
    (r"^\s*#", None),
    (r"^\s*$", None),
    (r"^\s*(?:REM|NO|EN|')", None),
    (r"^\s*(?P<name>SI)(?P<axis>[A-Z])=(?P<value>.*)$", Some("SSIQuery")),
    (r"^\s*(?P<name>[A-Z]{2})(?P<axis>[A-Z])=(?P<value>.*)$", Some("AxisQuery")),
    (r"^\s*(?P<name>[A-Z]{2})=(?P<value>.*)$", Some("Eq")),
    (r"^\s*(?P<name>[A-Z]{2})$", Some("Command")),
    (r"^\s*(?P<name>SH[A-Z])$", Some("Command")),
    (r"^\s*(?P<name>LZ|CO|LB|LU)\s+(?P<value>.*)$", Some("Basic")),
    (r"^\s*(?P<name>RC|DH|VF|PF|IK|TM|MW|EI)\s+(?P<value>.*)$", Some("BasicQuery")),
    (r"^\s*(?P<name>[CS]B)\s*(?P<index>\d+)$", Some("OutputBit")),
    (r"^\s*(?P<name>CW)\s+(?P<value>[\d.]+)$", Some("Basic")),
    (r"^\s*(?P<name>AQ)\s*(?P<index>\d+),(?P<value>.*)$", Some("Indexed")),
    (r"^\s*(?P<name>BA)\s+(?P<value>.*)$", Some("AxisMask")),
    (r"^\s*(?P<name>SM|IA)\s+(?P<value>.*)$", Some("Network")),
    (r"^\s*(?P<name>CN)\s+(?P<value>.*)$", Some("Vector5")),
];

/// Fields extracted from one matching line
#[derive(Debug, Clone)]
pub struct LineFields {
    pub name: String,
    pub axis: Option<char>,
    pub value: Option<String>,
    pub index: Option<String>,
    /// Default axis set of the parser
    pub axes: String,
    pub file: String,
    pub line: usize,
    pub text: String,
}

impl LineFields {
    fn from_captures(caps: &Captures<'_>, axes: &str, file: &str, line: usize, text: &str) -> Self {
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
        Self {
            name: group("name").unwrap_or_default(),
            axis: caps.name("axis").and_then(|m| m.as_str().chars().next()),
            value: group("value"),
            index: group("index"),
            axes: axes.to_string(),
            file: file.to_string(),
            line,
            text: text.to_string(),
        }
    }

    /// The error for a line whose fields do not fit the builder
    pub fn malformed(&self) -> SettingsError {
        SettingsError::Malformed {
            file: self.file.clone(),
            line: self.line,
            text: self.text.clone(),
        }
    }

    pub fn require_axis(&self) -> Result<char, SettingsError> {
        self.axis.ok_or_else(|| self.malformed())
    }

    pub fn require_index(&self) -> Result<u32, SettingsError> {
        self.index
            .as_deref()
            .and_then(|i| i.parse().ok())
            .ok_or_else(|| self.malformed())
    }

    /// Parameter of `kind` carrying the line's value and provenance
    pub fn parameter(&self, kind: ParameterKind) -> Parameter {
        let param = Parameter::new(kind, self.name.clone())
            .with_axes(self.axes.clone())
            .with_source(self.file.clone(), self.line);
        match &self.value {
            Some(value) => param.with_value(value.clone()),
            None => param,
        }
    }
}

/// Builds a parameter from a matching line
pub type Builder = fn(&LineFields) -> Result<Parameter, SettingsError>;

/// Named builders that rule tables refer to
///
/// Builders are looked up once, when a [`SettingsParser`] is built, so a
/// replacement registered here changes every rule that names it.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<(&'static str, Builder)>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builders for every parameter kind in [`STANDARD_RULES`]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("Command", |f| Ok(f.parameter(ParameterKind::Command)));
        registry.register("Basic", |f| Ok(f.parameter(ParameterKind::Basic)));
        registry.register("BasicQuery", |f| Ok(f.parameter(ParameterKind::BasicQuery)));
        registry.register("Eq", |f| Ok(f.parameter(ParameterKind::Eq)));
        registry.register("Axis", |f| {
            Ok(f.parameter(ParameterKind::Axis {
                axis: f.require_axis()?,
            }))
        });
        registry.register("AxisQuery", |f| {
            Ok(f.parameter(ParameterKind::AxisQuery {
                axis: f.require_axis()?,
            }))
        });
        registry.register("SSIQuery", |f| {
            Ok(f.parameter(ParameterKind::SsiQuery {
                axis: f.require_axis()?,
            }))
        });
        registry.register("AxisMask", |f| Ok(f.parameter(ParameterKind::AxisMask)));
        registry.register("Vector5", |f| {
            Ok(f.parameter(ParameterKind::Vector { length: 5 }))
        });
        registry.register("Network", |f| Ok(f.parameter(ParameterKind::Network)));
        registry.register("Indexed", |f| {
            Ok(f.parameter(ParameterKind::Indexed {
                index: f.require_index()?,
            }))
        });
        registry.register("OutputBit", |f| {
            Ok(f.parameter(ParameterKind::OutputBit {
                index: f.require_index()?,
            }))
        });
        registry
    }

    /// Add a builder, returning the one it replaces
    pub fn register(&mut self, name: &'static str, builder: Builder) -> Option<Builder> {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            return Some(std::mem::replace(&mut entry.1, builder));
        }
        self.entries.push((name, builder));
        None
    }

    pub fn lookup(&self, name: &str) -> Option<Builder> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, builder)| *builder)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

struct Rule {
    pattern: Regex,
    builder: Option<Builder>,
}

/// Classifies settings lines against an ordered rule table
pub struct SettingsParser {
    rules: Vec<Rule>,
    axes: String,
}

impl SettingsParser {
    /// Parser over [`STANDARD_RULES`] with the given builders
    pub fn new(registry: &Registry) -> Result<Self, SettingsError> {
        Self::from_table(STANDARD_RULES, registry)
    }

    /// Parser over [`STANDARD_RULES`] and [`Registry::standard`]
    pub fn standard() -> Result<Self, SettingsError> {
        Self::new(&Registry::standard())
    }

    pub fn from_table(table: &[RuleSpec], registry: &Registry) -> Result<Self, SettingsError> {
        let mut rules = Vec::with_capacity(table.len());
        for (pattern, builder) in table {
            let builder = match builder {
                Some(name) => Some(
                    registry
                        .lookup(name)
                        .ok_or_else(|| SettingsError::UnknownBuilder(name.to_string()))?,
                ),
                None => None,
            };
            rules.push(Rule {
                pattern: Regex::new(pattern)?,
                builder,
            });
        }

        Ok(Self {
            rules,
            axes: DEFAULT_AXES.to_string(),
        })
    }

    /// Set the axis set handed to axis-mask parameters
    pub fn with_axes(mut self, axes: impl Into<String>) -> Self {
        self.axes = axes.into();
        self
    }

    pub fn axes(&self) -> &str {
        &self.axes
    }

    /// Classify one line (1-based `line` number, used in diagnostics)
    pub fn parse_line(&self, text: &str, file: &str, line: usize) -> Result<SettingItem, SettingsError> {
        let text = text.trim_end();
        for rule in &self.rules {
            let Some(caps) = rule.pattern.captures(text) else {
                continue;
            };
            return match rule.builder {
                None => Ok(SettingItem::Literal(text.to_string())),
                Some(build) => {
                    let fields = LineFields::from_captures(&caps, &self.axes, file, line, text);
                    build(&fields).map(SettingItem::Parameter)
                }
            };
        }

        Err(SettingsError::Malformed {
            file: file.to_string(),
            line,
            text: text.to_string(),
        })
    }
}

/// One line of a settings document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "item", rename_all = "lowercase")]
pub enum SettingItem {
    /// Comment, blank or ignorable line, kept verbatim
    Literal(String),
    Parameter(Parameter),
}

impl SettingItem {
    pub fn to_text(&self) -> Result<String, ParameterError> {
        match self {
            SettingItem::Literal(text) => Ok(text.clone()),
            SettingItem::Parameter(param) => param.to_text(),
        }
    }
}

/// A parameter whose controller value differs from the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingChange {
    pub name: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub old: Option<String>,
    pub new: String,
}

impl fmt::Display for SettingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self
            .line
            .map(|l| l.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        write!(
            f,
            "{} command on {} line {} changed from {} to {}",
            self.name,
            self.file.as_deref().unwrap_or("Unknown"),
            line,
            self.old.as_deref().unwrap_or("<unset>"),
            self.new
        )
    }
}

/// A parsed settings file, in source order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsDocument {
    pub items: Vec<SettingItem>,
}

impl SettingsDocument {
    /// Load a settings file
    pub fn load(parser: &SettingsParser, path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let doc = Self::parse_str(parser, &content, &path.display().to_string())?;
        info!(
            path = %path.display(),
            lines = doc.items.len(),
            parameters = doc.parameters().count(),
            "Loaded settings"
        );
        Ok(doc)
    }

    /// Parse settings text; `file` only labels diagnostics
    pub fn parse_str(parser: &SettingsParser, content: &str, file: &str) -> Result<Self, SettingsError> {
        let items = content
            .lines()
            .enumerate()
            .map(|(i, line)| parser.parse_line(line, file, i + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { items })
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.items.iter().filter_map(|item| match item {
            SettingItem::Parameter(param) => Some(param),
            SettingItem::Literal(_) => None,
        })
    }

    pub fn parameters_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.items.iter_mut().filter_map(|item| match item {
            SettingItem::Parameter(param) => Some(param),
            SettingItem::Literal(_) => None,
        })
    }

    /// Re-read every parameter from the controller, in document order
    pub fn refresh(&mut self, channel: &mut dyn CommandChannel) -> Result<(), SettingsError> {
        for param in self.parameters_mut() {
            param.get(channel, true)?;
        }
        debug!("Refreshed settings from controller");
        Ok(())
    }

    /// Report every parameter whose controller value differs from the file
    pub fn check(&self, channel: &mut dyn CommandChannel) -> Result<Vec<SettingChange>, SettingsError> {
        let mut changes = Vec::new();
        for param in self.parameters() {
            if let Some(current) = param.drift(channel)? {
                changes.push(SettingChange {
                    name: param.mnemonic(),
                    file: param.source().map(|s| s.file.clone()),
                    line: param.source().map(|s| s.line),
                    old: param.value.clone(),
                    new: current,
                });
            }
        }
        Ok(changes)
    }

    /// Render the document, one item per line
    pub fn to_text(&self) -> Result<String, SettingsError> {
        let mut out = String::new();
        for item in &self.items {
            out.push_str(&item.to_text()?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Write the document to `path`
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let content = self.to_text()?;
        std::fs::write(path, content)?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }
}
