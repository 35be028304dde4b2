//! Message types and decode/encode dispatch.
//!
//! - [`Command`] — writes we send to the launcher (host → device)
//! - [`Message`] — payloads the launcher pushes to us (device → host)
//!
//! Each message kind travels on its own [`Channel`], so dispatch is keyed by
//! channel. The config channel is further split into three parameter
//! namespaces by the target byte (see [`config::Param`]).

pub mod config;
pub mod sensor;
pub mod user;

use crate::channel::Channel;
use crate::error::Result;

use config::{ConfigCommand, ConfigResponse, WireVersion};
use sensor::{ResetKind, SensorId, SensorSample};

// ---------------------------------------------------------------------------
// Command — writes we send to the launcher
// ---------------------------------------------------------------------------

/// A write we send to the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Config(ConfigCommand),
    SensorSelect(SensorId),
    SampleEnable(bool),
    Reset(ResetKind),
}

impl Command {
    /// The endpoint this command is written to.
    pub fn channel(&self) -> Channel {
        match self {
            Command::Config(_) => Channel::Config,
            Command::SensorSelect(_) => Channel::SensorSelect,
            Command::SampleEnable(_) => Channel::SampleEnable,
            Command::Reset(_) => Channel::Reset,
        }
    }

    /// Encode into the bytes written to [`Command::channel`].
    pub fn encode(&self, version: WireVersion) -> Vec<u8> {
        match self {
            Command::Config(m) => m.encode(version),
            Command::SensorSelect(id) => vec![id.as_byte()],
            Command::SampleEnable(on) => vec![u8::from(*on)],
            Command::Reset(kind) => vec![kind.as_byte()],
        }
    }

    /// Format as a hex debug line: `"HOST→CONFIG 7B | 00010600000000"`.
    pub fn debug_hex(&self, version: WireVersion) -> String {
        let payload = self.encode(version);
        let mut s = format!("HOST→{} {}B", self.channel(), payload.len());
        if !payload.is_empty() {
            s.push_str(" | ");
            for b in &payload {
                s.push_str(&format!("{b:02X}"));
            }
        }
        s
    }
}

// ---------------------------------------------------------------------------
// Message — payloads the launcher pushes to us
// ---------------------------------------------------------------------------

/// A payload the launcher sends to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ConfigResponse(ConfigResponse),
    /// Sampling enabled (`true`) or disabled, pushed on every change.
    SampleState(bool),
    Sample(SensorSample),

    // -- Forward compat --
    /// Payload on an endpoint the host only writes to.
    Unknown { channel: Channel, payload: Vec<u8> },
}

impl Message {
    /// Decode a payload received on `channel`.
    pub fn decode(channel: Channel, payload: &[u8], version: WireVersion) -> Result<Self> {
        let msg = match channel {
            Channel::Config => Message::ConfigResponse(ConfigResponse::decode(payload, version)?),
            Channel::SampleEnable => Message::SampleState(sensor::decode_sample_state(payload)?),
            Channel::Samples => Message::Sample(SensorSample::decode(payload)?),
            Channel::SensorSelect | Channel::Reset => Message::Unknown {
                channel,
                payload: payload.to_vec(),
            },
        };
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::config::{ConfigStatus, ConfigTarget, Param};
    use crate::protocol::sensor::SensorParam;

    #[test]
    fn single_byte_writes() {
        let v = WireVersion::V2;
        assert_eq!(Command::SensorSelect(SensorId::Height).encode(v), vec![0x01]);
        assert_eq!(Command::SampleEnable(false).encode(v), vec![0x00]);
        assert_eq!(Command::SampleEnable(true).encode(v), vec![0x01]);
        assert_eq!(Command::Reset(ResetKind::ClearCalibration).encode(v), vec![0x02]);
        assert_eq!(Command::Reset(ResetKind::Reboot).channel(), Channel::Reset);
    }

    #[test]
    fn debug_hex_format() {
        let cmd = Command::Config(ConfigCommand::get(Param::Sensor(SensorParam::Config)));
        assert_eq!(cmd.debug_hex(WireVersion::V2), "HOST→CONFIG 7B | 00000000000000");
    }

    #[test]
    fn decode_dispatches_on_channel() {
        let v = WireVersion::V2;
        let msg = Message::decode(Channel::Config, &[0x00, 0x00, 0x01, 0x01, 0, 0, 0], v).unwrap();
        match msg {
            Message::ConfigResponse(resp) => {
                assert_eq!(resp.target, ConfigTarget::Sensor);
                assert_eq!(resp.status, ConfigStatus::Ok);
                assert_eq!(resp.param(), Param::Sensor(SensorParam::PowerLevel));
                assert_eq!(resp.value, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            Message::decode(Channel::SampleEnable, &[0x01], v).unwrap(),
            Message::SampleState(true)
        );
        assert!(matches!(
            Message::decode(Channel::Samples, &[0x01, 0xE8, 0x03], v).unwrap(),
            Message::Sample(SensorSample { sensor: SensorId::Height, distance_mm: 1000 })
        ));
    }

    #[test]
    fn write_only_channels_decode_as_unknown() {
        let msg = Message::decode(Channel::Reset, &[0xAA], WireVersion::V2).unwrap();
        assert_eq!(
            msg,
            Message::Unknown { channel: Channel::Reset, payload: vec![0xAA] }
        );
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(Message::decode(Channel::Config, &[0x00, 0x01], WireVersion::V2).is_err());
    }
}
