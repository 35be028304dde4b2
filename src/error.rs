use thiserror::Error;

use crate::protocol::sensor::SensorId;

/// Errors arising from wire protocol parsing and encoding.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("payload too short for {msg_type}: need {need} bytes, got {got}{}", format_raw_suffix(raw))]
    PayloadTooShort {
        msg_type: &'static str,
        need: usize,
        got: usize,
        /// Raw payload bytes for debug context.
        raw: Vec<u8>,
    },

    #[error("unexpected payload length for {msg_type}: expected {expected}, got {got}{}", format_raw_suffix(raw))]
    UnexpectedLength {
        msg_type: &'static str,
        expected: usize,
        got: usize,
        /// Raw payload bytes for debug context.
        raw: Vec<u8>,
    },
}

impl WireError {
    /// Create a `PayloadTooShort` error (raw bytes filled in later via `with_raw`).
    pub(crate) fn payload_too_short(msg_type: &'static str, need: usize, got: usize) -> Self {
        Self::PayloadTooShort { msg_type, need, got, raw: Vec::new() }
    }

    /// Create an `UnexpectedLength` error (raw bytes filled in later via `with_raw`).
    pub(crate) fn unexpected_length(msg_type: &'static str, expected: usize, got: usize) -> Self {
        Self::UnexpectedLength { msg_type, expected, got, raw: Vec::new() }
    }

    /// Attach raw payload bytes to decode-phase errors for diagnostics.
    pub fn with_raw(self, payload: &[u8]) -> Self {
        match self {
            Self::PayloadTooShort { msg_type, need, got, .. } => {
                Self::PayloadTooShort { msg_type, need, got, raw: payload.to_vec() }
            }
            Self::UnexpectedLength { msg_type, expected, got, .. } => {
                Self::UnexpectedLength { msg_type, expected, got, raw: payload.to_vec() }
            }
        }
    }
}

/// Errors from the geometry solver.
///
/// These are distinguishable failures rather than NaN results, so callers can
/// decide whether a degenerate mount is fatal or just yields zero force.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("point lies inside the circle (distance {distance:.3}, radius {radius:.3})")]
    PointInsideCircle { distance: f64, radius: f64 },

    #[error("sides {a:.3}, {b:.3}, {c:.3} do not form a triangle")]
    InvalidTriangle { a: f64, b: f64, c: f64 },

    #[error("angles {a:.3}° and {b:.3}° leave no room for a third angle")]
    InvalidAngles { a: f64, b: f64 },

    #[error("carriage travel {max_position:.3} mm is out of range")]
    InvalidTravel { max_position: f64 },
}

/// Errors from building a calibration session or validating its recipe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("no calibration recipe for {0}")]
    UnknownSensor(SensorId),

    #[error("calibration recipe for {0} has no steps")]
    EmptyRecipe(SensorId),

    #[error("calibration recipe for {sensor} repeats {param}")]
    DuplicateStep { sensor: SensorId, param: &'static str },

    #[error("calibration recipe for {sensor} writes read-only {param}")]
    ReadOnlyStep { sensor: SensorId, param: &'static str },
}

/// Format raw bytes as a suffix like " | 9E 00 03 ..." (empty if no bytes).
fn format_raw_suffix(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let limit = 16;
    let hex: String = raw.iter().take(limit).map(|b| format!("{b:02X}")).collect();
    let ellipsis = if raw.len() > limit { "..." } else { "" };
    format!(" | {hex}{ellipsis}")
}

pub type Result<T> = std::result::Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_suffix_is_attached() {
        let err = WireError::payload_too_short("ConfigResponse", 7, 3).with_raw(&[0x01, 0x02, 0x03]);
        assert_eq!(
            err.to_string(),
            "payload too short for ConfigResponse: need 7 bytes, got 3 | 010203"
        );
    }

    #[test]
    fn raw_suffix_truncates_long_payloads() {
        let err = WireError::unexpected_length("Sample", 3, 20).with_raw(&[0xAB; 20]);
        assert!(err.to_string().ends_with("..."));
    }
}
