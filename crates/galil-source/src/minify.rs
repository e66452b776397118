//! Minification of rendered DMC programs
//!
//! Controller program memory is counted in lines, so the minifier strips
//! comments and whitespace and then packs short statements together:
//!
//! - comments (`'`, `NO`, `REM` at a command boundary) run to end of line
//! - whitespace around operators and punctuation is removed
//! - "joinable" lines (simple assignments, `ENDIF`, `ELSE`) are appended to
//!   the line before them while the result stays under the line length
//! - a line holding only a label is squashed into the following line, and
//!   a following bare `EN` too when it fits
//!
//! A comment eats the rest of the physical line even past a `;`. The
//! controller itself ends a comment at the semicolon; generated programs
//! rely on the line-wide rule.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

/// Line length of most controllers. Some boards are capped at 39.
pub const DEFAULT_LINE_LENGTH: usize = 79;

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|;)\s*(?:'|NO|REM).*").expect("valid comment regex"));

static OPERATOR_SPACES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*([,;=+\-*/%<>()\[\]&|]|<>|>=|<=)\s*").expect("valid operator regex")
});

static LABEL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[a-zA-Z0-9]{1,7}$").expect("valid label regex"));

// Combinations of simple assignments (to lower-case variables or arrays,
// or to ^a / ~a arguments), ENDIF and ELSE. A joinable line never ends in a
// semicolon, so a trailing `;` forces a line break.
static JOINABLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:(?:^|;)\s*",
        r"(?:(?:[~^][a-z]|[a-z][a-zA-Z0-9]{0,7}(?:\[[^\];]+\])?)\s*=\s*[^;]+|ENDIF|ELSE)",
        r"\s*)+$"
    ))
    .expect("valid joinable regex")
});

/// Result of minification with the lines that still exceed the budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minified {
    pub text: String,
    /// 1-based numbers of lines longer than the line length
    pub overlong: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Minifier {
    line_length: usize,
}

impl Default for Minifier {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_LENGTH)
    }
}

impl Minifier {
    pub fn new(line_length: usize) -> Self {
        Self { line_length }
    }

    pub fn line_length(&self) -> usize {
        self.line_length
    }

    /// Minify, logging any line that could not be brought under the limit
    pub fn minify(&self, content: &str) -> String {
        self.minify_report(content).text
    }

    pub fn minify_report(&self, content: &str) -> Minified {
        // Packing can strip a forced-break semicolon and expose a line that
        // joins on a second pass; run until nothing changes.
        let mut lines = self.pass(content);
        for _ in 0..=lines.len() {
            let next = self.pass(&lines.join("\n"));
            if next == lines {
                break;
            }
            lines = next;
        }

        let mut overlong = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if line.len() > self.line_length {
                warn!(line = i + 1, text = %line, "Long line in minified output");
                overlong.push(i + 1);
            }
        }

        Minified {
            text: lines.join("\n"),
            overlong,
        }
    }

    fn fits(&self, line: &str, next: &str) -> bool {
        line.len() + 1 + next.len() < self.line_length
    }

    fn pass(&self, content: &str) -> Vec<String> {
        let compact: Vec<String> = content
            .split('\n')
            .map(|line| {
                let line = COMMENT.replace_all(line, "");
                let line = OPERATOR_SPACES.replace_all(&line, "$1");
                line.trim().to_string()
            })
            .filter(|line| !line.is_empty())
            .collect();

        let mut merged = Vec::with_capacity(compact.len());
        let mut i = 0;
        while i < compact.len() {
            let mut line = compact[i].clone();
            while i + 1 < compact.len()
                && JOINABLE_LINE.is_match(&compact[i + 1])
                && self.fits(&line, &compact[i + 1])
            {
                line.push(';');
                line.push_str(&compact[i + 1]);
                i += 1;
            }
            merged.push(line);
            i += 1;
        }

        let mut lines = Vec::with_capacity(merged.len());
        let mut i = 0;
        while i < merged.len() {
            let mut line = merged[i].clone();

            if i + 1 < merged.len()
                && LABEL_LINE.is_match(&line)
                && !merged[i + 1].starts_with('#')
                && self.fits(&line, &merged[i + 1])
            {
                line.push(';');
                line.push_str(&merged[i + 1]);
                i += 1;

                if i + 1 < merged.len() && merged[i + 1] == "EN" && self.fits(&line, "EN") {
                    line.push_str(";EN");
                    i += 1;
                }
            }

            let line = collapse_semicolons(&line);
            let line = line.strip_suffix(';').unwrap_or(&line);
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            i += 1;
        }

        lines
    }
}

/// Remove any `;` followed (after optional whitespace) by another `;`.
///
/// Empty statements confuse the controller and are easy to produce when
/// templating.
pub fn collapse_semicolons(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        if c == ';' && text[i + 1..].trim_start().starts_with(';') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Clean up rendered template output before minifying
pub fn prepare(rendered: &str) -> String {
    collapse_semicolons(rendered)
}

/// Whitespace trimming only: drop blank lines, trim the rest
pub fn trim(content: &str) -> String {
    content
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
