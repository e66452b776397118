//! Galil Source - Tooling for rendered DMC programs
//!
//! Template rendering happens elsewhere; this crate works on its output:
//! - Minification that packs statements under the controller line length
//! - A line-local linter for labels, calls and operators
//! - Helpers for generating per-axis argument lists and command runs
//! - Program stamping with name and content hash

pub mod helpers;
pub mod lint;
pub mod minify;
pub mod stamp;

pub use helpers::{
    assignments, axis_index, pack_commands, param_list, repeat_command, HelperError, Value,
};
pub use lint::{Diagnostic, DiagnosticKind, Linter};
pub use minify::{collapse_semicolons, prepare, trim, Minified, Minifier, DEFAULT_LINE_LENGTH};
pub use stamp::{program_hash, stamp_program};
