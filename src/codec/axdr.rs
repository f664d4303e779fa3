//! A-XDR encoded COSEM `Data` values.

use crate::error::DecodeError;

const MAX_DEPTH: usize = 16;

/// A COSEM data value as carried in a notification body.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Null,
    Array(Vec<DataValue>),
    Structure(Vec<DataValue>),
    Boolean(bool),
    /// Bit count and packed bits
    BitString(usize, Vec<u8>),
    Int32(i32),
    UInt32(u32),
    OctetString(Vec<u8>),
    VisibleString(String),
    Utf8String(String),
    Bcd(u8),
    Int8(i8),
    Int16(i16),
    UInt8(u8),
    UInt16(u16),
    Int64(i64),
    UInt64(u64),
    Enum(u8),
    Float32(f32),
    Float64(f64),
    DateTime([u8; 12]),
    Date([u8; 5]),
    Time([u8; 4]),
}

impl DataValue {
    pub(crate) fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a DataValue>) {
        match self {
            DataValue::Array(items) | DataValue::Structure(items) => {
                for item in items {
                    item.collect_leaves(out);
                }
            }
            leaf => out.push(leaf),
        }
    }

    /// Parses one tagged value from the reader
    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Self::read_nested(reader, 0)
    }

    fn read_nested(reader: &mut Reader<'_>, depth: usize) -> Result<Self, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::NestingTooDeep(MAX_DEPTH));
        }
        let offset = reader.position();
        let tag = reader.u8()?;
        let value = match tag {
            0x00 => DataValue::Null,
            0x01 | 0x02 => {
                let count = reader.length()?;
                // Each element needs at least its tag byte
                reader.ensure(count)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Self::read_nested(reader, depth + 1)?);
                }
                if tag == 0x01 {
                    DataValue::Array(items)
                } else {
                    DataValue::Structure(items)
                }
            }
            0x03 => DataValue::Boolean(reader.u8()? != 0),
            0x04 => {
                let bits = reader.length()?;
                DataValue::BitString(bits, reader.take(bits.div_ceil(8))?.to_vec())
            }
            0x05 => DataValue::Int32(i32::from_be_bytes(reader.array()?)),
            0x06 => DataValue::UInt32(u32::from_be_bytes(reader.array()?)),
            0x09 => {
                let len = reader.length()?;
                DataValue::OctetString(reader.take(len)?.to_vec())
            }
            0x0A => {
                let len = reader.length()?;
                DataValue::VisibleString(String::from_utf8_lossy(reader.take(len)?).into_owned())
            }
            0x0C => {
                let len = reader.length()?;
                DataValue::Utf8String(String::from_utf8_lossy(reader.take(len)?).into_owned())
            }
            0x0D => DataValue::Bcd(reader.u8()?),
            0x0F => DataValue::Int8(i8::from_be_bytes(reader.array()?)),
            0x10 => DataValue::Int16(i16::from_be_bytes(reader.array()?)),
            0x11 => DataValue::UInt8(reader.u8()?),
            0x12 => DataValue::UInt16(u16::from_be_bytes(reader.array()?)),
            0x14 => DataValue::Int64(i64::from_be_bytes(reader.array()?)),
            0x15 => DataValue::UInt64(u64::from_be_bytes(reader.array()?)),
            0x16 => DataValue::Enum(reader.u8()?),
            0x17 => DataValue::Float32(f32::from_be_bytes(reader.array()?)),
            0x18 => DataValue::Float64(f64::from_be_bytes(reader.array()?)),
            0x19 => DataValue::DateTime(reader.array()?),
            0x1A => DataValue::Date(reader.array()?),
            0x1B => DataValue::Time(reader.array()?),
            tag => return Err(DecodeError::UnsupportedDataTag { tag, offset }),
        };
        Ok(value)
    }
}

/// Bounds-checked cursor over a byte slice.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: needed - self.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(len)?;
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// A-XDR length: one byte below 0x80, otherwise 0x8N followed by N big-endian bytes
    pub(crate) fn length(&mut self) -> Result<usize, DecodeError> {
        let first = self.u8()?;
        if first < 0x80 {
            return Ok(first as usize);
        }
        let count = (first & 0x7F) as usize;
        if count == 0 || count > 4 {
            return Err(DecodeError::InvalidLength(first));
        }
        let len = self
            .take(count)?
            .iter()
            .fold(0usize, |acc, byte| (acc << 8) | *byte as usize);
        Ok(len)
    }
}
