//! Field codecs for the launcher link.
//!
//! The link is little-endian. Floats never travel as text: they are
//! bit-cast to a 32-bit integer (`f32::to_bits`) and sent in the integer
//! value slot.

use crate::error::{Result, WireError};

// ---------------------------------------------------------------------------
// Read helpers
// ---------------------------------------------------------------------------

/// Read a little-endian unsigned 16-bit integer.
pub fn read_uint16(data: &[u8], offset: usize) -> Result<u16> {
    check_len(data, offset, 2, "UINT16")?;
    Ok(u16::from_le_bytes([data[offset], data[offset + 1]]))
}

/// Read a little-endian signed 32-bit integer.
pub fn read_int32(data: &[u8], offset: usize) -> Result<i32> {
    check_len(data, offset, 4, "INT32")?;
    Ok(i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]))
}

// ---------------------------------------------------------------------------
// Write helpers
// ---------------------------------------------------------------------------

/// Write a little-endian unsigned 16-bit integer.
pub fn write_uint16(buf: &mut Vec<u8>, val: u16) {
    buf.extend_from_slice(&val.to_le_bytes());
}

/// Write a little-endian signed 32-bit integer.
pub fn write_int32(buf: &mut Vec<u8>, val: i32) {
    buf.extend_from_slice(&val.to_le_bytes());
}

// ---------------------------------------------------------------------------
// Float bit casts
// ---------------------------------------------------------------------------

/// Reinterpret an `f32` as the integer carried in a config value slot.
pub fn float_to_value(val: f32) -> i32 {
    val.to_bits() as i32
}

/// Reinterpret a config value slot as the `f32` it carries.
pub fn value_to_float(val: i32) -> f32 {
    f32::from_bits(val as u32)
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

fn check_len(data: &[u8], offset: usize, need: usize, name: &'static str) -> Result<()> {
    if data.len() < offset + need {
        Err(WireError::payload_too_short(name, offset + need, data.len()))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
