//! Periodic telemetry frames.
//!
//! While streaming, the bridge emits one line per period. Two layouts exist:
//!
//! ```text
//! readable:  P[AX[-12],AY[40],AZ[-1020],BA[0],BB[1]]
//! compact:   P FF4 028 C04 0 1 0       (13 bytes, spaces for clarity only)
//! ```
//!
//! Compact accelerometer axes are 12-bit two's complement in three uppercase
//! hex digits, followed by the button A, button B and logo flags.

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{FrameError, Result};

/// Length of a compact record, terminator excluded.
pub const COMPACT_RECORD_LEN: usize = 13;

const AXIS_MIN: i16 = -2048;
const AXIS_MAX: i16 = 2047;

/// Which layout a periodic frame uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodicLayout {
    Readable,
    Compact,
    /// Starts with `P` but matches neither layout.
    Unrecognized,
}

/// One periodic line, kept raw together with its detected layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicFrame {
    raw: Bytes,
    layout: PeriodicLayout,
}

impl PeriodicFrame {
    /// Wrap a line that starts with `P`. Never fails: unknown shapes are
    /// [`PeriodicLayout::Unrecognized`].
    pub fn parse(raw: Bytes) -> Self {
        let layout = detect_layout(&raw);
        Self { raw, layout }
    }

    /// Build a readable frame from its fields.
    pub fn readable(fields: &[Field]) -> Self {
        let mut buf = BytesMut::with_capacity(2 + fields.len() * 8);
        buf.put_slice(b"P[");
        for (index, field) in fields.iter().enumerate() {
            if index > 0 {
                buf.put_u8(b',');
            }
            buf.put_slice(field.key.as_bytes());
            buf.put_u8(b'[');
            buf.put_slice(field.value.as_bytes());
            buf.put_u8(b']');
        }
        buf.put_u8(b']');
        Self::parse(buf.freeze())
    }

    pub fn layout(&self) -> PeriodicLayout {
        self.layout
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.raw
    }

    /// Line text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }

    /// Fields of a readable frame, in wire order. Empty for other layouts.
    pub fn fields(&self) -> Vec<Field> {
        if self.layout != PeriodicLayout::Readable {
            return Vec::new();
        }
        let body = &self.raw[2..self.raw.len() - 1];
        parse_fields(&String::from_utf8_lossy(body))
    }

    /// Value of one readable field.
    pub fn field(&self, key: &str) -> Option<String> {
        self.fields()
            .into_iter()
            .find(|field| field.key == key)
            .map(|field| field.value)
    }

    /// Decode a compact frame.
    pub fn compact(&self) -> Result<CompactRecord> {
        CompactRecord::decode(&self.raw)
    }
}

fn detect_layout(raw: &[u8]) -> PeriodicLayout {
    if raw.len() >= 3 && raw.starts_with(b"P[") && raw.ends_with(b"]") {
        PeriodicLayout::Readable
    } else if raw.len() == COMPACT_RECORD_LEN && raw.first() == Some(&b'P') {
        PeriodicLayout::Compact
    } else {
        PeriodicLayout::Unrecognized
    }
}

/// A `KEY[VALUE]` pair from a readable frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub key: String,
    pub value: String,
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl ToString) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
        }
    }
}

/// Split the inside of `P[...]` into fields.
///
/// Separators between fields are optional; stray text without a `[` ends
/// the scan.
pub fn parse_fields(body: &str) -> Vec<Field> {
    let mut fields = Vec::new();
    let mut rest = body;
    loop {
        rest = rest.trim_start_matches([',', ' ']);
        let Some(open) = rest.find('[') else {
            break;
        };
        let Some(close) = rest[open..].find(']') else {
            break;
        };
        fields.push(Field {
            key: rest[..open].to_string(),
            value: rest[open + 1..open + close].to_string(),
        });
        rest = &rest[open + close + 1..];
    }
    fields
}

/// Decoded compact record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompactRecord {
    /// Accelerometer x, y, z in milli-g, within `-2048..=2047`.
    pub accel: [i16; 3],
    pub button_a: bool,
    pub button_b: bool,
    pub logo: bool,
}

impl CompactRecord {
    /// Encode into the 13-byte layout. Axes are clamped to 12 bits.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(COMPACT_RECORD_LEN);
        buf.put_u8(b'P');
        for axis in self.accel {
            let bits = (axis.clamp(AXIS_MIN, AXIS_MAX) as u16) & 0x0FFF;
            buf.put_slice(format!("{bits:03X}").as_bytes());
        }
        for flag in [self.button_a, self.button_b, self.logo] {
            buf.put_u8(if flag { b'1' } else { b'0' });
        }
        buf.freeze()
    }

    /// Decode a 13-byte record.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let invalid =
            || FrameError::InvalidCompactRecord(String::from_utf8_lossy(raw).into_owned());

        if raw.len() != COMPACT_RECORD_LEN || raw[0] != b'P' {
            return Err(invalid());
        }

        let mut accel = [0i16; 3];
        for (index, axis) in accel.iter_mut().enumerate() {
            let start = 1 + index * 3;
            let digits = std::str::from_utf8(&raw[start..start + 3]).map_err(|_| invalid())?;
            if !digits.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b)) {
                return Err(invalid());
            }
            let bits = u16::from_str_radix(digits, 16).map_err(|_| invalid())?;
            *axis = if bits >= 0x800 {
                bits as i16 - 0x1000
            } else {
                bits as i16
            };
        }

        let mut flags = [false; 3];
        for (flag, byte) in flags.iter_mut().zip(&raw[10..13]) {
            *flag = match byte {
                b'0' => false,
                b'1' => true,
                _ => return Err(invalid()),
            };
        }

        Ok(Self {
            accel,
            button_a: flags[0],
            button_b: flags[1],
            logo: flags[2],
        })
    }
}
