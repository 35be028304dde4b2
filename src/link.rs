//! Seam to the wireless transport.
//!
//! Connection management lives outside this crate. The transport hands us
//! notification payloads (see [`crate::Device::on_notify`]) and implements
//! [`Link`] so we can write back.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::channel::Channel;
use crate::error::WireError;
use crate::protocol::Message;
use crate::protocol::config::WireVersion;

/// Outgoing half of the transport.
pub trait Link {
    /// Write `payload` to `channel`. Writes are fire-and-forget; responses
    /// arrive later as notifications.
    fn write(&mut self, channel: Channel, payload: &[u8]) -> Result<(), LinkError>;
}

impl<F> Link for F
where
    F: FnMut(Channel, &[u8]) -> Result<(), LinkError>,
{
    fn write(&mut self, channel: Channel, payload: &[u8]) -> Result<(), LinkError> {
        self(channel, payload)
    }
}

/// Errors from link operations.
#[derive(Debug)]
pub enum LinkError {
    /// The link was torn down.
    Closed,
    /// The transport rejected the write.
    Write(String),
    /// Wire protocol decode error.
    Wire(WireError),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Closed => write!(f, "link closed"),
            LinkError::Write(msg) => write!(f, "write failed: {msg}"),
            LinkError::Wire(e) => write!(f, "wire error: {e}"),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::Wire(e) => Some(e),
            LinkError::Closed | LinkError::Write(_) => None,
        }
    }
}

impl From<WireError> for LinkError {
    fn from(e: WireError) -> Self {
        LinkError::Wire(e)
    }
}

/// A decoded notification with its channel and raw payload.
#[derive(Clone)]
pub struct Envelope {
    pub channel: Channel,
    pub raw: Vec<u8>,
    pub message: Message,
}

impl Envelope {
    /// Decode a notification, attaching the raw bytes to any error.
    pub fn decode(channel: Channel, raw: &[u8], version: WireVersion) -> Result<Self, WireError> {
        let message = Message::decode(channel, raw, version).map_err(|e| e.with_raw(raw))?;
        Ok(Self {
            channel,
            raw: raw.to_vec(),
            message,
        })
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // "SampleState(true) [SAMPLE_ENABLE 1B | 01]"
        write!(f, "{:?}", self.message)?;
        write!(f, " [{} {}B", self.channel, self.raw.len())?;
        if !self.raw.is_empty() {
            write!(f, " | ")?;
            for b in self.raw.iter() {
                write!(f, "{b:02X}")?;
            }
        }
        write!(f, "]")
    }
}

/// In-memory [`Link`] that records every write.
///
/// Clones share the record, so a test can keep one handle and give the
/// other to a [`crate::Device`].
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    writes: Arc<Mutex<Vec<(Channel, Vec<u8>)>>>,
    closed: Arc<Mutex<bool>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later write fail with [`LinkError::Closed`].
    pub fn close(&self) {
        *self.closed.lock().unwrap_or_else(|p| p.into_inner()) = true;
    }

    /// Take everything written so far.
    pub fn drain(&self) -> Vec<(Channel, Vec<u8>)> {
        std::mem::take(&mut *self.writes.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

impl Link for MemoryLink {
    fn write(&mut self, channel: Channel, payload: &[u8]) -> Result<(), LinkError> {
        if *self.closed.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(LinkError::Closed);
        }
        self.writes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((channel, payload.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_debug_shows_channel_and_hex() {
        let env = Envelope::decode(Channel::SampleEnable, &[0x01], WireVersion::V2).unwrap();
        assert_eq!(format!("{env:?}"), "SampleState(true) [SAMPLE_ENABLE 1B | 01]");
    }

    #[test]
    fn envelope_decode_error_carries_raw() {
        let err = Envelope::decode(Channel::Config, &[0x00, 0x01], WireVersion::V2).unwrap_err();
        assert!(err.to_string().ends_with("| 0001"), "{err}");
    }

    #[test]
    fn memory_link_records_and_closes() {
        let link = MemoryLink::new();
        let mut writer = link.clone();
        writer.write(Channel::Reset, &[0x00]).unwrap();
        assert_eq!(link.drain(), vec![(Channel::Reset, vec![0x00])]);
        assert!(link.drain().is_empty());
        link.close();
        assert!(matches!(writer.write(Channel::Reset, &[0x00]), Err(LinkError::Closed)));
    }

    #[test]
    fn closures_are_links() {
        let mut count = 0;
        let mut link = |_: Channel, _: &[u8]| -> Result<(), LinkError> {
            count += 1;
            Ok(())
        };
        link.write(Channel::Config, &[]).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn link_error_display() {
        assert_eq!(LinkError::Closed.to_string(), "link closed");
        assert_eq!(LinkError::Write("busy".into()).to_string(), "write failed: busy");
    }
}
