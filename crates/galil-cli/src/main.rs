//! Galil CLI - Main entry point
//!
//! Offline tooling for controller programs and settings files.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use galil_source::Linter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "galil")]
#[command(about = "Minify, lint and stamp Galil DMC programs; normalize settings files")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "galil.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Minify a rendered program
    Minify {
        input: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Maximum controller line length
        #[arg(long)]
        line_length: Option<usize>,
    },
    /// Lint a rendered program; exits with status 1 on any finding
    Lint {
        input: PathBuf,
        /// Also report warnings (unused labels, conditional jumps)
        #[arg(short, long)]
        warnings: bool,
        /// Maximum controller line length
        #[arg(long)]
        line_length: Option<usize>,
        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse a settings file and write it back in normalized form
    Settings {
        input: PathBuf,
        /// Output file (stdout when omitted)
        output: Option<PathBuf>,
        /// Axes probed by axis-mask parameters
        #[arg(long)]
        axes: Option<String>,
    },
    /// Encode a string as a controller hex value
    Encode { text: String },
    /// Decode a controller hex value
    Decode {
        hex: String,
        /// Keep trailing NUL bytes (shown escaped)
        #[arg(long)]
        binary: bool,
    },
    /// Minify a program and stamp it with its name and hash
    Stamp {
        input: PathBuf,
        /// Program name recorded in xPrgName
        #[arg(long)]
        name: String,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn log_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&args.log_level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    debug!("Galil tools v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;

    match args.command {
        Command::Minify {
            input,
            output,
            line_length,
        } => {
            let line_length = line_length.unwrap_or(config.source.line_length);
            let text = commands::minify(&input, line_length)?;
            commands::write_output(output.as_deref(), &text)?;
        }
        Command::Lint {
            input,
            warnings,
            line_length,
            json,
        } => {
            let linter = Linter::new(line_length.unwrap_or(config.source.line_length))
                .with_warnings(warnings || config.source.warnings);
            let diagnostics = commands::lint(&input, &linter)?;
            if json || !diagnostics.is_empty() {
                println!("{}", commands::render_diagnostics(&diagnostics, json)?);
            }
            if !diagnostics.is_empty() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Settings {
            input,
            output,
            axes,
        } => {
            let axes = axes.unwrap_or(config.settings.axes);
            let count = commands::settings(&input, output.as_deref(), &axes)?;
            eprintln!("{} parameters", count);
        }
        Command::Encode { text } => println!("{}", commands::encode(&text)?),
        Command::Decode { hex, binary } => println!("{}", commands::decode(&hex, binary)?),
        Command::Stamp {
            input,
            name,
            output,
        } => {
            let text = commands::stamp(&input, &name, config.source.line_length)?;
            commands::write_output(output.as_deref(), &text)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_defaults_to_info() {
        let args = Args::try_parse_from(["galil", "encode", "abc"]).unwrap();
        assert_eq!(args.log_level, "info");
        assert_eq!(log_level(&args.log_level), Level::INFO);
        assert_eq!(log_level("bogus"), Level::INFO);
        assert_eq!(log_level("DEBUG"), Level::DEBUG);
    }

    #[test]
    fn test_global_flags() {
        let args =
            Args::try_parse_from(["galil", "--log-level", "warn", "lint", "prog.dmc", "--json"])
                .unwrap();
        assert_eq!(log_level(&args.log_level), Level::WARN);
        assert!(matches!(args.command, Command::Lint { json: true, .. }));
    }
}
