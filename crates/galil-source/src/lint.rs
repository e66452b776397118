//! Static checks over minified DMC programs
//!
//! The linter is line-local: it minifies its input, then scans every line
//! for problems the controller would only report at run time (or never):
//! - overlong lines, `==` / `!=` operators, leftover `None` template values
//! - duplicate labels, calls to undefined labels
//! - subroutine calls with inconsistent argument counts
//! - calculations or `_JS` used as call arguments
//! - string literals longer than a controller variable
//!
//! With warnings enabled it also reports unused labels and conditional
//! jumps that could use the jump's own condition argument.

use crate::minify::{Minifier, DEFAULT_LINE_LENGTH};
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static LABEL_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|;)(#[a-zA-Z0-9_]{1,7})").expect("valid label regex"));

static BAD_OPERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"==|!=").expect("valid operator regex"));

static IF_JUMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|;)IF\([^;\n]+\)[;\n](J[SP]#[a-zA-Z]+)[^;\n]*[;\n]ENDIF")
        .expect("valid conditional jump regex")
});

/// Labels the controller invokes on its own
const ENTRY_LABELS: [&str; 6] = ["#AUTO", "#MCTIME", "#AMPERR", "#AUTOERR", "#POSERR", "#CMDERR"];

/// Labels that always accept a bare `(-1)` whatever their usual arity
const NEGATIVE_ONE_LABELS: [&str; 2] = ["#ok", "#error"];

/// Longest string literal that fits in a controller variable
const MAX_STRING: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UndefinedValue,
    LongLine,
    BadOperator,
    DuplicateLabel,
    InconsistentArity,
    NestedSubroutineCall,
    DangerousArgument,
    LongString,
    UndefinedLabel,
    UnusedLabel,
    ConditionalJump,
}

impl DiagnosticKind {
    /// Warnings are only produced when the linter runs with warnings enabled
    pub fn is_warning(&self) -> bool {
        matches!(self, DiagnosticKind::UnusedLabel | DiagnosticKind::ConditionalJump)
    }
}

/// One lint finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 1-based lines of the minified program, empty for whole-program findings
    pub lines: Vec<usize>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    fn at(line: usize, kind: DiagnosticKind, message: String) -> Self {
        Self {
            lines: vec![line],
            kind,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lines.as_slice() {
            [] => write!(f, "{}", self.message),
            [line] if self.kind != DiagnosticKind::UndefinedLabel => {
                write!(f, "line {}, {}", line, self.message)
            }
            lines => {
                let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
                write!(f, "line(s) {}, {}", lines.join(", "), self.message)
            }
        }
    }
}

/// A `JS`, `JP` or `XQ` call found on a line
#[derive(Debug, Clone, PartialEq, Eq)]
struct Call<'a> {
    label: &'a str,
    /// Argument list including its parentheses, possibly empty
    args: &'a str,
}

impl Call<'_> {
    fn arity(&self) -> usize {
        if self.args.len() < 3 {
            0
        } else {
            self.args.split(',').count()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Linter {
    minifier: Minifier,
    warnings: bool,
}

impl Default for Linter {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_LENGTH)
    }
}

impl Linter {
    pub fn new(line_length: usize) -> Self {
        Self {
            minifier: Minifier::new(line_length),
            warnings: false,
        }
    }

    pub fn with_warnings(mut self, warnings: bool) -> Self {
        self.warnings = warnings;
        self
    }

    /// Minify `content` and report everything suspicious in the result.
    ///
    /// Line numbers refer to the minified program.
    pub fn lint(&self, content: &str) -> Vec<Diagnostic> {
        let content = self.minifier.minify(content);
        let line_length = self.minifier.line_length();
        let mut diagnostics = Vec::new();

        if self.warnings {
            for caps in IF_JUMP.captures_iter(&content) {
                let jump = &caps[1];
                diagnostics.push(Diagnostic {
                    lines: Vec::new(),
                    kind: DiagnosticKind::ConditionalJump,
                    message: format!("IF(...);{} better written as {},(...)", jump, jump),
                });
            }
        }

        let mut defined: Vec<&str> = Vec::new();
        let mut defined_on: HashMap<&str, usize> = HashMap::new();
        let mut called: Vec<&str> = Vec::new();
        let mut called_on: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut arity: HashMap<&str, (usize, usize)> = HashMap::new();

        for (i, line) in content.split('\n').enumerate() {
            let lineno = i + 1;

            if line.contains("None") {
                diagnostics.push(Diagnostic::at(
                    lineno,
                    DiagnosticKind::UndefinedValue,
                    format!("Contains 'None', check template vars: {}", line),
                ));
            }

            if line.len() > line_length {
                diagnostics.push(Diagnostic::at(
                    lineno,
                    DiagnosticKind::LongLine,
                    format!("Line too long: {}", line),
                ));
            }

            if BAD_OPERATOR.is_match(line) {
                diagnostics.push(Diagnostic::at(
                    lineno,
                    DiagnosticKind::BadOperator,
                    format!("bad operator: {}", line),
                ));
            }

            for caps in LABEL_DEF.captures_iter(line) {
                let Some(name) = caps.get(1).map(|m| m.as_str()) else {
                    continue;
                };
                match defined_on.get(name) {
                    Some(first) => diagnostics.push(Diagnostic::at(
                        lineno,
                        DiagnosticKind::DuplicateLabel,
                        format!("Duplicate label: {} (first defined on line {})", name, first),
                    )),
                    None => {
                        defined.push(name);
                        defined_on.insert(name, lineno);
                    }
                }
            }

            for call in find_calls(line) {
                if !called_on.contains_key(call.label) {
                    called.push(call.label);
                }
                called_on.entry(call.label).or_default().push(lineno);

                let count = call.arity();
                if NEGATIVE_ONE_LABELS.contains(&call.label) && call.args == "(-1)" {
                    // accepted whatever the arity
                } else if let Some(&(expected, first)) = arity.get(call.label) {
                    if count != expected {
                        diagnostics.push(Diagnostic::at(
                            lineno,
                            DiagnosticKind::InconsistentArity,
                            format!(
                                "inconsistent sub arity for {}. Was {} (line {}) now {}",
                                call.label, expected, first, count
                            ),
                        ));
                    }
                } else {
                    arity.insert(call.label, (count, lineno));
                }

                if call.args.contains("_JS") {
                    diagnostics.push(Diagnostic::at(
                        lineno,
                        DiagnosticKind::NestedSubroutineCall,
                        format!("_JS used in subroutine argument: {}", line),
                    ));
                }
                if is_dangerous_argument(call.args) {
                    diagnostics.push(Diagnostic::at(
                        lineno,
                        DiagnosticKind::DangerousArgument,
                        format!("Dangerous value (calculation) used in argument: {}", line),
                    ));
                }
            }

            for cmd in line.split(';').filter(|cmd| !cmd.starts_with("MG")) {
                for literal in cmd.split('"').skip(1).step_by(2) {
                    if literal.chars().count() > MAX_STRING {
                        diagnostics.push(Diagnostic::at(
                            lineno,
                            DiagnosticKind::LongString,
                            format!("Long string '{}' in command: {}", literal, cmd),
                        ));
                    }
                }
            }
        }

        for label in &called {
            if defined_on.contains_key(label) {
                continue;
            }
            diagnostics.push(Diagnostic {
                lines: called_on.get(label).cloned().unwrap_or_default(),
                kind: DiagnosticKind::UndefinedLabel,
                message: format!("J[SP]{} found but label {} not defined", label, label),
            });
        }

        if self.warnings {
            let used: HashSet<&str> = called.iter().copied().collect();
            for label in &defined {
                if used.contains(label) || ENTRY_LABELS.contains(label) {
                    continue;
                }
                diagnostics.push(Diagnostic::at(
                    defined_on[label],
                    DiagnosticKind::UnusedLabel,
                    format!("Label {} defined but never used", label),
                ));
            }
        }

        debug!(count = diagnostics.len(), "Lint finished");
        diagnostics
    }
}

/// Find the subroutine calls on one line.
///
/// A call starts a command (`JS`, `JP` or `XQ`, then `#label` of up to 7
/// characters, then an optional parenthesized argument list) and must be
/// followed by the end of the command, a `,(` condition, or a `,thread`
/// argument that ends the command.
fn find_calls(line: &str) -> Vec<Call<'_>> {
    let bytes = line.as_bytes();
    let mut calls = Vec::new();
    let mut pos = 0;

    while pos <= bytes.len() {
        let mut starts = Vec::with_capacity(2);
        if pos == 0 {
            starts.push(0);
        }
        if let Some(semi) = bytes[pos..].iter().position(|b| *b == b';') {
            starts.push(pos + semi + 1);
        }
        if starts.is_empty() {
            break;
        }

        match starts.iter().find_map(|start| match_call(line, *start)) {
            Some((call, end)) => {
                calls.push(call);
                pos = end;
            }
            // Advance past the `;` just tried
            None => match starts.last() {
                Some(&start) if start > pos => pos = start,
                _ => break,
            },
        }
    }

    calls
}

fn match_call(line: &str, start: usize) -> Option<(Call<'_>, usize)> {
    let bytes = line.as_bytes();
    let rest = &bytes[start..];
    if !(rest.starts_with(b"JS") || rest.starts_with(b"JP") || rest.starts_with(b"XQ")) {
        return None;
    }
    let hash = start + 2;
    if bytes.get(hash) != Some(&b'#') {
        return None;
    }

    let name_len = bytes[hash + 1..]
        .iter()
        .take(7)
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();

    for len in (1..=name_len).rev() {
        let label_end = hash + 1 + len;
        let label = &line[hash..label_end];

        if bytes.get(label_end) == Some(&b'(') {
            let closes = bytes[label_end..]
                .iter()
                .enumerate()
                .filter(|(_, b)| **b == b')')
                .map(|(i, _)| label_end + i + 1);
            for end in closes {
                if call_ends_at(line, end) {
                    let args = &line[label_end..end];
                    return Some((Call { label, args }, end));
                }
            }
        }
        if call_ends_at(line, label_end) {
            return Some((Call { label, args: "" }, label_end));
        }
    }

    None
}

fn call_ends_at(line: &str, pos: usize) -> bool {
    let rest = &line[pos..];
    if rest.is_empty() || rest.starts_with(';') || rest.starts_with(",(") {
        return true;
    }
    let Some(arg) = rest.strip_prefix(',') else {
        return false;
    };
    let thread = arg.split(';').next().unwrap_or("");
    let digits = !thread.is_empty() && thread.bytes().all(|b| b.is_ascii_digit());
    let axis = thread.len() == 2
        && thread.starts_with('^')
        && matches!(thread.as_bytes()[1], b'a'..=b'h');
    let word = (1..=8).contains(&thread.chars().count())
        && thread.chars().all(|c| c.is_alphanumeric() || c == '_');
    digits || axis || word
}

/// Call arguments should be plain variable references
fn is_dangerous_argument(args: &str) -> bool {
    let chars: Vec<char> = args.chars().collect();
    chars.iter().enumerate().any(|(i, c)| {
        let inner_paren = matches!(c, '(' | ')') && i > 0 && i + 1 < chars.len();
        let disallowed = !(c.is_ascii_alphanumeric() || ".,@[]_()^&\"-".contains(*c));
        let bare_minus = *c == '-' && (i == 0 || !matches!(chars[i - 1], '(' | ','));
        inner_paren || disallowed || bare_minus
    })
}
