use std::fmt;

/// Link endpoints between the host and the launcher.
///
/// Each endpoint carries exactly one kind of payload. The transport maps its
/// own handles (characteristics, sockets) onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    /// Config commands (host → device) and config responses (device → host)
    Config,
    /// Sensor select, 1 byte sensor id (host → device)
    SensorSelect,
    /// Sampling enable, 1 byte 0x00/0x01 (both directions)
    SampleEnable,
    /// Reset request, 1 byte reset kind (host → device)
    Reset,
    /// Distance samples pushed by the active sensor (device → host)
    Samples,
}

impl Channel {
    pub fn name(self) -> &'static str {
        match self {
            Self::Config => "CONFIG",
            Self::SensorSelect => "SENSOR_SELECT",
            Self::SampleEnable => "SAMPLE_ENABLE",
            Self::Reset => "RESET",
            Self::Samples => "SAMPLES",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
