//! Command channel abstraction
//!
//! The transport to the controller lives outside this crate. Anything that
//! can send a command line and return the reply implements
//! [`CommandChannel`]; retry policy, if any, belongs to the implementation.

use std::collections::{HashMap, VecDeque};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Timeout waiting for reply to '{command}'")]
    Timeout { command: String },
    #[error("Controller rejected '{command}': {reason}")]
    Rejected { command: String, reason: String },
    #[error("Transport error: {0}")]
    Transport(String),
}

/// A blocking, line-oriented connection to a controller
pub trait CommandChannel {
    /// Send a command and return the reply text
    fn command(&mut self, cmd: &str) -> Result<String, DeviceError>;

    /// Send a command whose reply is a single number
    fn command_value(&mut self, cmd: &str) -> Result<f64, DeviceError>;
}

/// Scripted channel for exercising parameters without hardware
///
/// Replies are looked up by exact command text. Queued replies for a
/// command are consumed in order before falling back to the fixed reply.
/// Unknown commands are rejected the way a controller answers `?`.
#[derive(Debug, Default)]
pub struct MockChannel {
    replies: HashMap<String, Result<String, DeviceError>>,
    queued: HashMap<String, VecDeque<Result<String, DeviceError>>>,
    sent: Vec<String>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `cmd` with `reply`
    pub fn reply(mut self, cmd: &str, reply: &str) -> Self {
        self.replies.insert(cmd.to_string(), Ok(reply.to_string()));
        self
    }

    /// Always fail `cmd` with `err`
    pub fn fail(mut self, cmd: &str, err: DeviceError) -> Self {
        self.replies.insert(cmd.to_string(), Err(err));
        self
    }

    /// Answer the next call of `cmd` with `reply`, ahead of any fixed reply
    pub fn queue(mut self, cmd: &str, reply: &str) -> Self {
        self.queued
            .entry(cmd.to_string())
            .or_default()
            .push_back(Ok(reply.to_string()));
        self
    }

    /// Every command sent so far, in order
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    fn answer(&mut self, cmd: &str) -> Result<String, DeviceError> {
        self.sent.push(cmd.to_string());

        if let Some(reply) = self.queued.get_mut(cmd).and_then(|q| q.pop_front()) {
            return reply;
        }
        match self.replies.get(cmd) {
            Some(reply) => reply.clone(),
            None => Err(DeviceError::Rejected {
                command: cmd.to_string(),
                reason: "unrecognized command".to_string(),
            }),
        }
    }
}

impl CommandChannel for MockChannel {
    fn command(&mut self, cmd: &str) -> Result<String, DeviceError> {
        self.answer(cmd)
    }

    fn command_value(&mut self, cmd: &str) -> Result<f64, DeviceError> {
        let reply = self.answer(cmd)?;
        reply.trim().parse::<f64>().map_err(|_| DeviceError::Rejected {
            command: cmd.to_string(),
            reason: format!("non-numeric reply '{}'", reply.trim()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_replies_and_records() {
        let mut channel = MockChannel::new().reply("MG_KPA", " 6.0000").reply("MG1", "1");

        assert_eq!(channel.command("MG_KPA").unwrap(), " 6.0000");
        assert_eq!(channel.command_value("MG1").unwrap(), 1.0);
        assert!(channel.command("XQ#AUTO").is_err());
        assert_eq!(channel.sent(), ["MG_KPA", "MG1", "XQ#AUTO"]);
    }

    #[test]
    fn test_mock_queue_precedes_fixed_reply() {
        let mut channel = MockChannel::new().reply("MG x", "2").queue("MG x", "1");

        assert_eq!(channel.command("MG x").unwrap(), "1");
        assert_eq!(channel.command("MG x").unwrap(), "2");
    }

    #[test]
    fn test_mock_failure() {
        let mut channel = MockChannel::new().fail(
            "MG_LZ",
            DeviceError::Timeout {
                command: "MG_LZ".to_string(),
            },
        );
        assert!(matches!(
            channel.command_value("MG_LZ"),
            Err(DeviceError::Timeout { .. })
        ));
    }
}
