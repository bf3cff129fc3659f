//! Protocol Buffers wire format for the migration payload.
//!
//! The payload is small and its schema is fixed, so this is a hand-rolled
//! codec rather than generated code:
//!
//! ```text
//! Payload        1: otp_parameters (repeated message)
//!                2: version (int32)   3: batch_size (int32)
//!                4: batch_index (int32)   5: batch_id (int64)
//! OtpParameters  1: secret (bytes)   2: name (string)   3: issuer (string)
//!                4: algorithm (enum) 5: digits (enum)   6: type (enum)
//!                7: counter (uint64)
//! ```
//!
//! Zero-valued scalars are omitted on encode, as proto3 does. Unknown fields
//! are skipped on decode; anything structurally broken is `DecodeFailed`.

use crate::migration::types::*;

/// Longest legal varint (a 64-bit value in 7-bit groups).
const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    fn from_bits(bits: u64) -> Result<Self, MigrationError> {
        match bits {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            // 3/4 are deprecated groups; 6/7 are unassigned.
            other => Err(MigrationError::decode(format!("unsupported wire type {}", other))),
        }
    }

    fn bits(self) -> u64 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Reader
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn has_remaining(&self) -> bool {
        self.pos < self.data.len()
    }

    pub(crate) fn read_varint(&mut self) -> Result<u64, MigrationError> {
        let mut result: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| MigrationError::decode("truncated varint"))?;
            self.pos += 1;
            result |= ((byte & 0x7F) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(MigrationError::decode("varint longer than 10 bytes"))
    }

    /// Read a field key, returning `(field_number, wire_type)`.
    pub(crate) fn read_key(&mut self) -> Result<(u64, WireType), MigrationError> {
        let key = self.read_varint()?;
        let field = key >> 3;
        if field == 0 {
            return Err(MigrationError::decode("field number 0"));
        }
        Ok((field, WireType::from_bits(key & 0x07)?))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], MigrationError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| MigrationError::decode("truncated field"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_bytes(&mut self) -> Result<&'a [u8], MigrationError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| MigrationError::decode("length overflow"))?;
        self.take(len)
    }

    pub(crate) fn read_string(&mut self) -> Result<String, MigrationError> {
        let raw = self.read_bytes()?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| MigrationError::decode("string field is not UTF-8").with_detail(e.to_string()))
    }

    pub(crate) fn skip(&mut self, wire_type: WireType) -> Result<(), MigrationError> {
        match wire_type {
            WireType::Varint => self.read_varint().map(|_| ()),
            WireType::Fixed64 => self.take(8).map(|_| ()),
            WireType::Fixed32 => self.take(4).map(|_| ()),
            WireType::LengthDelimited => self.read_bytes().map(|_| ()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Writer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub(crate) struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn put_varint(&mut self, mut v: u64) {
        while v >= 0x80 {
            self.buf.push((v as u8 & 0x7F) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    fn put_key(&mut self, field: u64, wire_type: WireType) {
        self.put_varint((field << 3) | wire_type.bits());
    }

    pub(crate) fn put_uint(&mut self, field: u64, v: u64) {
        if v != 0 {
            self.put_key(field, WireType::Varint);
            self.put_varint(v);
        }
    }

    /// Signed ints are sign-extended to 64 bits, so negatives take ten bytes.
    pub(crate) fn put_int(&mut self, field: u64, v: i64) {
        self.put_uint(field, v as u64);
    }

    pub(crate) fn put_bytes(&mut self, field: u64, v: &[u8]) {
        if !v.is_empty() {
            self.put_message(field, v);
        }
    }

    /// Length-delimited field emitted even when empty (repeated messages).
    pub(crate) fn put_message(&mut self, field: u64, v: &[u8]) {
        self.put_key(field, WireType::LengthDelimited);
        self.put_varint(v.len() as u64);
        self.buf.extend_from_slice(v);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Payload schema
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn decode_batch(data: &[u8]) -> Result<MigrationBatch, MigrationError> {
    let mut batch = MigrationBatch::default();
    let mut r = WireReader::new(data);

    while r.has_remaining() {
        match r.read_key()? {
            (1, WireType::LengthDelimited) => {
                let sub = r.read_bytes()?;
                batch.entries.push(decode_entry(sub)?);
            }
            (2, WireType::Varint) => batch.version = r.read_varint()? as i32,
            (3, WireType::Varint) => batch.batch_size = r.read_varint()? as i32,
            (4, WireType::Varint) => batch.batch_index = r.read_varint()? as i32,
            (5, WireType::Varint) => batch.batch_id = r.read_varint()? as i64,
            (_, wire_type) => r.skip(wire_type)?,
        }
    }

    Ok(batch)
}

fn decode_entry(data: &[u8]) -> Result<OtpEntry, MigrationError> {
    let mut entry = OtpEntry::default();
    let mut r = WireReader::new(data);

    while r.has_remaining() {
        match r.read_key()? {
            (1, WireType::LengthDelimited) => entry.secret = r.read_bytes()?.to_vec(),
            (2, WireType::LengthDelimited) => entry.name = r.read_string()?,
            (3, WireType::LengthDelimited) => entry.issuer = r.read_string()?,
            (4, WireType::Varint) => {
                let v = r.read_varint()?;
                entry.algorithm = Algorithm::from_wire(v)
                    .ok_or_else(|| MigrationError::decode(format!("algorithm value {} out of range", v)))?;
            }
            (5, WireType::Varint) => {
                let v = r.read_varint()?;
                entry.digits = DigitCount::from_wire(v)
                    .ok_or_else(|| MigrationError::decode(format!("digits value {} out of range", v)))?;
            }
            (6, WireType::Varint) => {
                let v = r.read_varint()?;
                entry.otp_type = OtpType::from_wire(v)
                    .ok_or_else(|| MigrationError::decode(format!("type value {} out of range", v)))?;
            }
            (7, WireType::Varint) => entry.counter = r.read_varint()?,
            (_, wire_type) => r.skip(wire_type)?,
        }
    }

    Ok(entry)
}

pub(crate) fn encode_batch(batch: &MigrationBatch) -> Vec<u8> {
    let mut w = WireWriter::default();
    for entry in &batch.entries {
        w.put_message(1, &encode_entry(entry));
    }
    w.put_int(2, batch.version as i64);
    w.put_int(3, batch.batch_size as i64);
    w.put_int(4, batch.batch_index as i64);
    w.put_int(5, batch.batch_id);
    w.into_bytes()
}

fn encode_entry(entry: &OtpEntry) -> Vec<u8> {
    let mut w = WireWriter::default();
    w.put_bytes(1, &entry.secret);
    w.put_bytes(2, entry.name.as_bytes());
    w.put_bytes(3, entry.issuer.as_bytes());
    w.put_uint(4, entry.algorithm.to_wire());
    w.put_uint(5, entry.digits.to_wire());
    w.put_uint(6, entry.otp_type.to_wire());
    w.put_uint(7, entry.counter);
    w.into_bytes()
}
