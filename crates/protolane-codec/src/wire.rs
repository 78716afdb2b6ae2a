//! Low-level protobuf wire primitives.
//!
//! Every field on the wire is a *tag* followed by a value. The tag is a
//! varint holding `field_number << 3 | wire_type`, and the wire type says
//! how to find the end of the value:
//!
//! ```text
//! 0  varint            int32, int64, uint32, uint64, sint32, sint64, bool, enum
//! 1  fixed64           fixed64, sfixed64, double
//! 2  length-delimited  string, bytes, nested messages, packed repeated
//! 3  start group       (deprecated, only skipped)
//! 4  end group         (deprecated, only skipped)
//! 5  fixed32           fixed32, sfixed32, float
//! ```
//!
//! Writing goes through [`bytes::BufMut`]; reading goes through the
//! crate-private [`Reader`], which tracks absolute offsets for error
//! reporting.

use std::fmt;

use bytes::{Buf, BufMut};

use crate::DeserializationError;

/// Largest legal field number (2^29 - 1).
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Field numbers reserved by the protobuf implementation itself.
pub const RESERVED_FIELD_NUMBERS: std::ops::RangeInclusive<u32> = 19_000..=19_999;

/// A varint never takes more than this many bytes.
pub const MAX_VARINT_LEN: usize = 10;

/// How a field's value is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    /// Maps the low three bits of a tag to a wire type.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Varint),
            1 => Some(Self::Fixed64),
            2 => Some(Self::LengthDelimited),
            3 => Some(Self::StartGroup),
            4 => Some(Self::EndGroup),
            5 => Some(Self::Fixed32),
            _ => None,
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Varint => "varint",
            Self::Fixed64 => "fixed64",
            Self::LengthDelimited => "length-delimited",
            Self::StartGroup => "start-group",
            Self::EndGroup => "end-group",
            Self::Fixed32 => "fixed32",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Appends `value` as a base-128 varint.
pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Number of bytes [`encode_varint`] writes for `value`.
pub fn varint_len(value: u64) -> usize {
    // Each byte carries 7 bits; zero still takes one byte.
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Appends the tag for `number` / `wire_type`.
pub fn encode_tag(number: u32, wire_type: WireType, buf: &mut impl BufMut) {
    encode_varint(tag_value(number, wire_type), buf);
}

/// Number of bytes [`encode_tag`] writes.
pub fn tag_len(number: u32) -> usize {
    varint_len(u64::from(number) << 3)
}

fn tag_value(number: u32, wire_type: WireType) -> u64 {
    (u64::from(number) << 3) | wire_type as u64
}

/// ZigZag maps signed to unsigned so small magnitudes stay small:
/// 0 → 0, -1 → 1, 1 → 2, -2 → 3, ...
pub fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

pub fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A cursor over an input buffer.
///
/// Nested readers share the parent's underlying slice and carry a `base`
/// so every reported offset is relative to the top-level input.
#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, base: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Position within this reader's own slice.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Absolute position within the top-level input.
    pub(crate) fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// The unread part of the buffer.
    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Bytes consumed between `start` (a [`position`](Self::position)) and now.
    pub(crate) fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.buf[start..self.pos]
    }

    pub(crate) fn read_varint(&mut self) -> Result<u64, DeserializationError> {
        let start = self.offset();
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(DeserializationError::Truncated { offset: start });
            };
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte < 0x80 {
                return Ok(value);
            }
        }
        Err(DeserializationError::VarintOverflow { offset: start })
    }

    pub(crate) fn read_fixed32(&mut self) -> Result<u32, DeserializationError> {
        let mut chunk = self.take(4)?;
        Ok(chunk.get_u32_le())
    }

    pub(crate) fn read_fixed64(&mut self) -> Result<u64, DeserializationError> {
        let mut chunk = self.take(8)?;
        Ok(chunk.get_u64_le())
    }

    /// Reads a length prefix and returns a reader over exactly that body.
    pub(crate) fn read_length_delimited(
        &mut self,
    ) -> Result<Reader<'a>, DeserializationError> {
        let offset = self.offset();
        let length = self.read_varint()?;
        let remaining = self.remaining();
        if length > remaining as u64 {
            return Err(DeserializationError::LengthOverflow {
                length,
                remaining,
                offset,
            });
        }
        let body_base = self.offset();
        let body = self.take(length as usize)?;
        Ok(Reader {
            buf: body,
            pos: 0,
            base: body_base,
        })
    }

    /// Reads a tag and splits it into field number and wire type.
    pub(crate) fn read_tag(&mut self) -> Result<(u32, WireType), DeserializationError> {
        let offset = self.offset();
        let raw = self.read_varint()?;
        let wire_type = WireType::from_raw((raw & 0x7) as u8).ok_or(
            DeserializationError::InvalidWireType {
                wire_type: (raw & 0x7) as u8,
                offset,
            },
        )?;
        let number = raw >> 3;
        if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
            return Err(DeserializationError::InvalidFieldNumber { number, offset });
        }
        Ok((number as u32, wire_type))
    }

    /// Skips the value of a field whose tag was just read.
    ///
    /// Groups are skipped as a balanced unit; `depth` counts how deeply
    /// nested we already are so hostile input cannot recurse forever.
    pub(crate) fn skip_field(
        &mut self,
        number: u32,
        wire_type: WireType,
        depth: usize,
        limit: usize,
    ) -> Result<(), DeserializationError> {
        match wire_type {
            WireType::Varint => self.read_varint().map(drop),
            WireType::Fixed64 => self.take(8).map(drop),
            WireType::Fixed32 => self.take(4).map(drop),
            WireType::LengthDelimited => self.read_length_delimited().map(drop),
            WireType::StartGroup => {
                if depth >= limit {
                    return Err(DeserializationError::RecursionLimit { limit });
                }
                loop {
                    if self.is_empty() {
                        return Err(DeserializationError::UnterminatedGroup { number });
                    }
                    let offset = self.offset();
                    let (inner, inner_type) = self.read_tag()?;
                    if inner_type == WireType::EndGroup {
                        if inner == number {
                            return Ok(());
                        }
                        return Err(DeserializationError::UnexpectedEndGroup {
                            number: inner,
                            offset,
                        });
                    }
                    self.skip_field(inner, inner_type, depth + 1, limit)?;
                }
            }
            WireType::EndGroup => Err(DeserializationError::UnexpectedEndGroup {
                number,
                offset: self.offset(),
            }),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DeserializationError> {
        if self.remaining() < len {
            return Err(DeserializationError::Truncated {
                offset: self.offset(),
            });
        }
        let chunk = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(chunk)
    }
}
