//! Subcommand implementations
//!
//! Most commands return their output text and `main` decides where it goes.

use anyhow::{Context, Result};
use galil_core::codec::{decode_binary, decode_string, encode_string, STRING_CAPACITY};
use galil_core::settings::{SettingsDocument, SettingsParser};
use galil_source::{prepare, program_hash, stamp_program, Diagnostic, Linter, Minifier};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Write `text` to `output`, or print it when no output is given
pub fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, format!("{}\n", text))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote output");
        }
        None => println!("{}", text),
    }
    Ok(())
}

pub fn minify(input: &Path, line_length: usize) -> Result<String> {
    let content = read_input(input)?;
    let minified = Minifier::new(line_length).minify_report(&prepare(&content));
    info!(
        path = %input.display(),
        lines = minified.text.lines().count(),
        overlong = minified.overlong.len(),
        "Minified program"
    );
    Ok(minified.text)
}

pub fn lint(input: &Path, linter: &Linter) -> Result<Vec<Diagnostic>> {
    let content = read_input(input)?;
    let diagnostics = linter.lint(&prepare(&content));
    info!(path = %input.display(), count = diagnostics.len(), "Linted program");
    Ok(diagnostics)
}

pub fn render_diagnostics(diagnostics: &[Diagnostic], json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(diagnostics)?);
    }
    Ok(diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Parse a settings file and save it in normalized form, returning the
/// number of parameters. Without an output the text is printed.
pub fn settings(input: &Path, output: Option<&Path>, axes: &str) -> Result<usize> {
    let parser = SettingsParser::standard()?.with_axes(axes);
    let document = SettingsDocument::load(&parser, input)?;
    let count = document.parameters().count();
    debug!(path = %input.display(), count, "Parsed settings");

    match output {
        Some(path) => document.save(path)?,
        None => print!("{}", document.to_text()?),
    }
    Ok(count)
}

pub fn encode(text: &str) -> Result<String> {
    Ok(encode_string(text)?)
}

pub fn decode(ghex: &str, binary: bool) -> Result<String> {
    if binary {
        Ok(decode_binary(ghex)?.escape_debug().to_string())
    } else {
        Ok(decode_string(ghex)?)
    }
}

/// Minify a program and fill in its name and hash stamps
pub fn stamp(input: &Path, name: &str, line_length: usize) -> Result<String> {
    anyhow::ensure!(
        name.len() <= STRING_CAPACITY,
        "Program name {:?} is longer than {} characters",
        name,
        STRING_CAPACITY
    );
    let program = minify(input, line_length)?;
    let hash = program_hash(&program)?;
    info!(name, hash = %hash, "Computed program hash");
    Ok(stamp_program(&program, name, &hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_minify_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prog.dmc");
        fs::write(&path, "#AUTO\n' start\na = 1\nb = 2\nEN\n").unwrap();
        assert_eq!(minify(&path, 79).unwrap(), "#AUTO;a=1;b=2\nEN");
    }

    #[test]
    fn test_lint_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prog.dmc");
        fs::write(&path, "JS#nowhere\n").unwrap();

        let diagnostics = lint(&path, &Linter::default()).unwrap();
        assert_eq!(diagnostics.len(), 1);
        let text = render_diagnostics(&diagnostics, false).unwrap();
        assert_eq!(text, "line(s) 1, J[SP]#nowhere found but label #nowhere not defined");
        let json = render_diagnostics(&diagnostics, true).unwrap();
        assert!(json.contains("\"undefined_label\""));
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.txt");
        let out = dir.path().join("normalized.txt");
        fs::write(&path, "' header\nKPA=6\n\nMO\n").unwrap();

        let count = settings(&path, Some(out.as_path()), "AB").unwrap();
        assert_eq!(count, 2);
        assert_eq!(fs::read_to_string(&out).unwrap(), "' header\nKPA=6\n\nMO\n");
    }

    #[test]
    fn test_codec_commands() {
        assert_eq!(encode("12345").unwrap(), "$31323334.3500");
        assert_eq!(decode("$31323334.3500", false).unwrap(), "12345");
        assert_eq!(decode("$31323334.3500", true).unwrap(), "12345\\0");
        assert!(encode("too long").is_err());
    }

    #[test]
    fn test_stamp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prog.dmc");
        fs::write(&path, "#xINIT\nEN\n#xAPIOk\nEN\n").unwrap();

        let stamped = stamp(&path, "pump", 79).unwrap();
        let hash = program_hash("#xINIT;EN\n#xAPIOk;EN").unwrap();
        assert_eq!(
            stamped,
            format!(
                "#xINIT;xPrgName=\"pump\";xPrgHash={};xAPIOk=0;EN\n#xAPIOk;xAPIOk=xAPIOk+1;EN",
                hash
            )
        );
        assert!(stamp(&path, "toolongname", 79).is_err());
    }
}
