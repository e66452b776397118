//! Galil Core - Wire codec, parameter model, and settings files
//!
//! This crate provides the controller-facing types of the Galil tools:
//! - Wire encodings for controller strings and packed network values
//! - The command channel capability a transport implements
//! - Typed parameters that know their read/write commands
//! - Settings files: parse, refresh, check against a live controller, save

pub mod channel;
pub mod codec;
pub mod parameter;
pub mod settings;

pub use channel::{CommandChannel, DeviceError, MockChannel};
pub use codec::{
    decode_binary, decode_network_value, decode_string, encode_string, round_device, CodecError,
    DeviceNumber,
};
pub use parameter::{Parameter, ParameterError, ParameterKind, ReadPlan, Source};
pub use settings::{
    Registry, SettingChange, SettingItem, SettingsDocument, SettingsError, SettingsParser,
};
