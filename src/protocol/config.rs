//! Config command/response wire format.
//!
//! One layout is shared by three independent parameter namespaces
//! (see [`ConfigTarget`]). Two layout versions exist in deployed firmware:
//!
//! ```text
//! V2 command  (7B): [target command param v0 v1 v2 v3]
//! V2 response (7B): [target status  param v0 v1 v2 v3]
//! V1 command  (6B): [command param v0 v1 v2 v3]          target = SENSOR
//! V1 response (6B): [status  param v0 v1 v2 v3]          target = SENSOR
//! ```
//!
//! `v0..v3` is a little-endian i32. Float parameters are bit-cast.
//!
//! There is no request id on the wire. A response is matched to its request
//! only by `param`; see [`crate::calibration`] for how that is handled.

use std::fmt;

use crate::codec;
use crate::error::{Result, WireError};
use crate::protocol::sensor::SensorParam;
use crate::protocol::user::{ExtStoreParam, UserParam};

/// Parameter id reserved as "not applicable".
pub const PARAM_NA: u8 = 0xFF;

// ---------------------------------------------------------------------------
// Single-byte enums
// ---------------------------------------------------------------------------

/// Which parameter table a command addresses.
///
/// Unknown ordinals decode to [`ConfigTarget::Na`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConfigTarget {
    Sensor,
    User,
    ExtStore,
    Na,
}

impl ConfigTarget {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Self::Sensor,
            1 => Self::User,
            2 => Self::ExtStore,
            _ => Self::Na,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Sensor => 0,
            Self::User => 1,
            Self::ExtStore => 2,
            Self::Na => 3,
        }
    }
}

/// Config operation. Unknown ordinals decode to [`ConfigCmd::Na`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConfigCmd {
    Get,
    Set,
    Reset,
    Store,
    Na,
}

impl ConfigCmd {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Self::Get,
            1 => Self::Set,
            2 => Self::Reset,
            3 => Self::Store,
            _ => Self::Na,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Get => 0,
            Self::Set => 1,
            Self::Reset => 2,
            Self::Store => 3,
            Self::Na => 4,
        }
    }
}

/// Response status. Unknown ordinals decode to [`ConfigStatus::Na`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConfigStatus {
    /// Value accepted as sent
    Ok,
    /// Value accepted and differs from what the device held before
    Updated,
    /// Value accepted but the device stored something other than requested
    Mismatch,
    /// Value or parameter rejected
    Invalid,
    Na,
}

impl ConfigStatus {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Self::Ok,
            1 => Self::Updated,
            2 => Self::Mismatch,
            3 => Self::Invalid,
            _ => Self::Na,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Updated => 1,
            Self::Mismatch => 2,
            Self::Invalid => 3,
            Self::Na => 4,
        }
    }

    /// Whether a general config sync should apply the carried value.
    pub fn is_applicable(self) -> bool {
        matches!(self, Self::Ok | Self::Updated | Self::Mismatch)
    }
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Updated => write!(f, "UPDATED"),
            Self::Mismatch => write!(f, "MISMATCH"),
            Self::Invalid => write!(f, "INVALID"),
            Self::Na => write!(f, "NA"),
        }
    }
}

// ---------------------------------------------------------------------------
// Namespaced parameter
// ---------------------------------------------------------------------------

/// A parameter id resolved against its namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    Sensor(SensorParam),
    User(UserParam),
    ExtStore(ExtStoreParam),
    /// Id not known in `target`'s table (or `target` itself unknown).
    Unknown { target: ConfigTarget, id: u8 },
}

impl Param {
    pub fn resolve(target: ConfigTarget, id: u8) -> Self {
        let known = match target {
            ConfigTarget::Sensor => SensorParam::from_id(id).map(Param::Sensor),
            ConfigTarget::User => UserParam::from_id(id).map(Param::User),
            ConfigTarget::ExtStore => ExtStoreParam::from_id(id).map(Param::ExtStore),
            ConfigTarget::Na => None,
        };
        known.unwrap_or(Param::Unknown { target, id })
    }

    pub fn target(self) -> ConfigTarget {
        match self {
            Param::Sensor(_) => ConfigTarget::Sensor,
            Param::User(_) => ConfigTarget::User,
            Param::ExtStore(_) => ConfigTarget::ExtStore,
            Param::Unknown { target, .. } => target,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Param::Sensor(p) => p.id(),
            Param::User(p) => p.id(),
            Param::ExtStore(p) => p.id(),
            Param::Unknown { id, .. } => id,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Sensor(p) => f.write_str(p.name()),
            Param::User(p) => f.write_str(p.name()),
            Param::ExtStore(p) => f.write_str(p.name()),
            Param::Unknown { id, .. } => write!(f, "param 0x{id:02X}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Layout version
// ---------------------------------------------------------------------------

/// Config layout version spoken by the connected firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WireVersion {
    /// 6 bytes, no target byte (SENSOR namespace only)
    V1,
    /// 7 bytes with leading target byte
    #[default]
    V2,
}

impl WireVersion {
    pub fn payload_len(self) -> usize {
        match self {
            WireVersion::V1 => 6,
            WireVersion::V2 => 7,
        }
    }
}

// ---------------------------------------------------------------------------
// Command / response
// ---------------------------------------------------------------------------

/// Config request (host → device).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigCommand {
    pub target: ConfigTarget,
    pub command: ConfigCmd,
    pub param_id: u8,
    pub value: i32,
}

impl ConfigCommand {
    pub fn get(param: Param) -> Self {
        Self::new(param, ConfigCmd::Get, 0)
    }

    pub fn set(param: Param, value: i32) -> Self {
        Self::new(param, ConfigCmd::Set, value)
    }

    pub fn set_float(param: Param, value: f32) -> Self {
        Self::new(param, ConfigCmd::Set, codec::float_to_value(value))
    }

    pub fn store(param: Param) -> Self {
        Self::new(param, ConfigCmd::Store, 0)
    }

    fn new(param: Param, command: ConfigCmd, value: i32) -> Self {
        Self {
            target: param.target(),
            command,
            param_id: param.id(),
            value,
        }
    }

    pub fn param(&self) -> Param {
        Param::resolve(self.target, self.param_id)
    }

    pub fn encode(&self, version: WireVersion) -> Vec<u8> {
        let mut buf = Vec::with_capacity(version.payload_len());
        if version == WireVersion::V2 {
            buf.push(self.target.as_byte());
        }
        buf.push(self.command.as_byte());
        buf.push(self.param_id);
        codec::write_int32(&mut buf, self.value);
        buf
    }

    /// Decode a command as the device would receive it.
    pub fn decode(payload: &[u8], version: WireVersion) -> Result<Self> {
        let (target, body) = split_target(payload, version, "ConfigCommand")?;
        Ok(Self {
            target,
            command: ConfigCmd::from_byte(body[0]),
            param_id: body[1],
            value: codec::read_int32(body, 2)?,
        })
    }
}

/// Config response (device → host).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigResponse {
    pub target: ConfigTarget,
    pub status: ConfigStatus,
    pub param_id: u8,
    pub value: i32,
}

impl ConfigResponse {
    pub fn decode(payload: &[u8], version: WireVersion) -> Result<Self> {
        let (target, body) = split_target(payload, version, "ConfigResponse")?;
        Ok(Self {
            target,
            status: ConfigStatus::from_byte(body[0]),
            param_id: body[1],
            value: codec::read_int32(body, 2)?,
        })
    }

    /// Encode a response as the device would send it.
    pub fn encode(&self, version: WireVersion) -> Vec<u8> {
        let mut buf = Vec::with_capacity(version.payload_len());
        if version == WireVersion::V2 {
            buf.push(self.target.as_byte());
        }
        buf.push(self.status.as_byte());
        buf.push(self.param_id);
        codec::write_int32(&mut buf, self.value);
        buf
    }

    pub fn param(&self) -> Param {
        Param::resolve(self.target, self.param_id)
    }

    /// The value slot reinterpreted as a float.
    pub fn value_f32(&self) -> f32 {
        codec::value_to_float(self.value)
    }
}

/// Check the layout length and peel off the target byte (implied for V1).
fn split_target<'a>(
    payload: &'a [u8],
    version: WireVersion,
    msg_type: &'static str,
) -> Result<(ConfigTarget, &'a [u8])> {
    if payload.len() != version.payload_len() {
        return Err(WireError::unexpected_length(msg_type, version.payload_len(), payload.len()));
    }
    match version {
        WireVersion::V1 => Ok((ConfigTarget::Sensor, payload)),
        WireVersion::V2 => Ok((ConfigTarget::from_byte(payload[0]), &payload[1..])),
    }
}
