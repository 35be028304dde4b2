//! Distance sensor identifiers, calibration parameters, and sample payloads.

use std::fmt;

use crate::codec;
use crate::error::{Result, WireError};

/// Sensor id as carried by the sensor-select write and sample pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorId {
    /// Short-range sensor behind the carriage (carriage position)
    Position,
    /// Long-range sensor facing the ground (device height)
    Height,
    /// Ordinal the host does not know. Stores the raw byte.
    Unknown(u8),
}

impl SensorId {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Self::Position,
            1 => Self::Height,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Position => 0,
            Self::Height => 1,
            Self::Unknown(b) => b,
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position => write!(f, "position sensor"),
            Self::Height => write!(f, "height sensor"),
            Self::Unknown(b) => write!(f, "sensor 0x{b:02X}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Calibration parameters (SENSOR namespace)
// ---------------------------------------------------------------------------

/// Parameter ids in the SENSOR config namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SensorParam {
    /// Full configuration snapshot; only ever read.
    Config = 0x00,
    PowerLevel = 0x01,
    OffsetCorrectionMode = 0x02,
    PhaseCalPower = 0x03,
    SmudgeCorrection = 0x04,
    XtalkCorrection = 0x05,
    RegionOfInterest = 0x06,
    RefSpadCalibration = 0x07,
    XtalkCalibration = 0x08,
    /// Offset calibration against a target at a known distance.
    OffsetCalibration = 0x09,
    /// Offset calibration with the target touching the cover glass.
    OffsetZeroDistanceCalibration = 0x0A,
    TimingBudget = 0x0B,
}

impl SensorParam {
    pub const ALL: [SensorParam; 12] = [
        Self::Config,
        Self::PowerLevel,
        Self::OffsetCorrectionMode,
        Self::PhaseCalPower,
        Self::SmudgeCorrection,
        Self::XtalkCorrection,
        Self::RegionOfInterest,
        Self::RefSpadCalibration,
        Self::XtalkCalibration,
        Self::OffsetCalibration,
        Self::OffsetZeroDistanceCalibration,
        Self::TimingBudget,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::PowerLevel => "power level",
            Self::OffsetCorrectionMode => "offset correction mode",
            Self::PhaseCalPower => "phase calibration power",
            Self::SmudgeCorrection => "smudge correction",
            Self::XtalkCorrection => "crosstalk correction",
            Self::RegionOfInterest => "region of interest",
            Self::RefSpadCalibration => "reference SPAD calibration",
            Self::XtalkCalibration => "crosstalk calibration",
            Self::OffsetCalibration => "offset calibration",
            Self::OffsetZeroDistanceCalibration => "zero-distance offset calibration",
            Self::TimingBudget => "timing budget",
        }
    }
}

/// Emitter power level values for [`SensorParam::PowerLevel`] and
/// [`SensorParam::PhaseCalPower`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PowerLevel {
    Low = 0,
    Default = 1,
    High = 2,
}

/// Offset correction modes for [`SensorParam::OffsetCorrectionMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OffsetCorrectionMode {
    Standard = 0,
    PerZone = 1,
}

/// Receive region of interest, in SPADs.
///
/// Value slot encoding: `(width << 8) | height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub width: u8,
    pub height: u8,
}

impl Roi {
    pub const fn new(width: u8, height: u8) -> Self {
        Self { width, height }
    }

    pub const fn value(self) -> i32 {
        ((self.width as i32) << 8) | self.height as i32
    }

    pub fn from_value(value: i32) -> Self {
        Self {
            width: ((value >> 8) & 0xFF) as u8,
            height: (value & 0xFF) as u8,
        }
    }
}

// ---------------------------------------------------------------------------
// Single-byte writes and pushes
// ---------------------------------------------------------------------------

/// Reset request kinds (RESET channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Reboot,
    FactoryDefaults,
    ClearCalibration,
    /// Ordinal the host does not know. Stores the raw byte.
    Unknown(u8),
}

impl ResetKind {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Self::Reboot,
            1 => Self::FactoryDefaults,
            2 => Self::ClearCalibration,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Reboot => 0,
            Self::FactoryDefaults => 1,
            Self::ClearCalibration => 2,
            Self::Unknown(b) => b,
        }
    }
}

/// Distance sample pushed on the SAMPLES channel (3 bytes).
///
/// Format: `[sensor_id dist_lo dist_hi]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorSample {
    pub sensor: SensorId,
    /// Measured distance (mm)
    pub distance_mm: u16,
}

impl SensorSample {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() != 3 {
            return Err(WireError::unexpected_length("SensorSample", 3, payload.len()));
        }
        Ok(Self {
            sensor: SensorId::from_byte(payload[0]),
            distance_mm: codec::read_uint16(payload, 1)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.sensor.as_byte()];
        codec::write_uint16(&mut buf, self.distance_mm);
        buf
    }
}

/// Decode the 1-byte sampling state push. Any non-zero byte means enabled.
pub fn decode_sample_state(payload: &[u8]) -> Result<bool> {
    match payload {
        [b] => Ok(*b != 0),
        _ => Err(WireError::unexpected_length("SampleState", 1, payload.len())),
    }
}
