//! Program identification stamps
//!
//! A program carries empty `#xINIT` and `#xAPIOk` routines. Before upload
//! they are filled in so the controller can report which program (name and
//! content hash) it is running, and host tools can verify the handshake.

use galil_core::codec::{encode_string, CodecError};
use md5::{Digest, Md5};
use tracing::debug;

const INIT_STUB: &str = "#xINIT;EN";
const API_OK_STUB: &str = "#xAPIOk;EN";

/// Controller string identifying a program's content.
///
/// The first six hex digits of the MD5 digest, encoded as a controller
/// string value. Boards compare this against `xPrgHash` to decide whether
/// the program needs uploading.
pub fn program_hash(program: &str) -> Result<String, CodecError> {
    let digest = Md5::digest(program.as_bytes());
    let digits = hex::encode(digest);
    encode_string(&digits[..6])
}

/// Fill in the `#xINIT;EN` and `#xAPIOk;EN` stub lines.
///
/// Only lines consisting of exactly a stub are replaced, so the number of
/// lines and labels in the program does not change.
pub fn stamp_program(program: &str, name: &str, hash: &str) -> String {
    let mut stamped = 0;
    let lines: Vec<String> = program
        .split('\n')
        .map(|line| match line {
            INIT_STUB => {
                stamped += 1;
                format!(
                    "#xINIT;xPrgName=\"{}\";xPrgHash={};xAPIOk=0;EN",
                    name, hash
                )
            }
            API_OK_STUB => {
                stamped += 1;
                "#xAPIOk;xAPIOk=xAPIOk+1;EN".to_string()
            }
            other => other.to_string(),
        })
        .collect();

    debug!(name, hash, stamped, "Stamped program");
    lines.join("\n")
}
