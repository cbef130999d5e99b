//! Byte-level encoding primitives for the binary module format.
//!
//! [`Writer`] is an append-only buffer; every integer count or index is
//! unsigned LEB128, constant operands are signed LEB128, floats are raw
//! little-endian IEEE-754 bits and strings are a length-prefixed UTF-8
//! payload. [`Reader`] mirrors it so emitted bytes can be walked in tests.

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn byte(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }

    pub fn bytes(&mut self, values: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(values);
        self
    }

    pub fn u32_fixed(&mut self, value: u32) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.bytes(&value.to_bits().to_le_bytes())
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.bytes(&value.to_bits().to_le_bytes())
    }

    /// Unsigned LEB128
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.u64(u64::from(value))
    }

    pub fn u64(&mut self, mut value: u64) -> &mut Self {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.bytes.push(byte);
                return self;
            }
            self.bytes.push(byte | 0x80);
        }
    }

    /// Signed LEB128
    pub fn s32(&mut self, value: i32) -> &mut Self {
        self.s64(i64::from(value))
    }

    pub fn s64(&mut self, mut value: i64) -> &mut Self {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            let sign_clear = byte & 0x40 == 0;
            if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
                self.bytes.push(byte);
                return self;
            }
            self.bytes.push(byte | 0x80);
        }
    }

    /// Length-prefixed UTF-8
    pub fn string(&mut self, value: &str) -> &mut Self {
        self.u32(value.len() as u32);
        self.bytes(value.as_bytes())
    }

    /// Length-prefixed copy of another buffer
    pub fn sized(&mut self, payload: &Writer) -> &mut Self {
        self.u32(payload.len() as u32);
        self.bytes(payload.as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("unexpected end of input at byte {position}")]
    UnexpectedEnd { position: usize },
    #[error("LEB128 value at byte {position} overflows its width")]
    Overflow { position: usize },
    #[error("invalid UTF-8 string at byte {position}")]
    InvalidUtf8 { position: usize },
}

/// Cursor over an encoded buffer
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn byte(&mut self) -> Result<u8, ReadError> {
        let value = *self.bytes.get(self.position).ok_or(ReadError::UnexpectedEnd {
            position: self.position,
        })?;
        self.position += 1;
        Ok(value)
    }

    pub fn bytes(&mut self, count: usize) -> Result<&'a [u8], ReadError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(ReadError::UnexpectedEnd {
                position: self.bytes.len(),
            })?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u32_fixed(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32, ReadError> {
        Ok(f32::from_bits(u32::from_le_bytes(self.array()?)))
    }

    pub fn f64(&mut self) -> Result<f64, ReadError> {
        Ok(f64::from_bits(u64::from_le_bytes(self.array()?)))
    }

    pub fn u64(&mut self) -> Result<u64, ReadError> {
        let start = self.position;
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.byte()?;
            if shift >= 64 {
                return Err(ReadError::Overflow { position: start });
            }
            result |= u64::from(byte & 0x7F) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
    }

    pub fn u32(&mut self) -> Result<u32, ReadError> {
        let start = self.position;
        u32::try_from(self.u64()?).map_err(|_| ReadError::Overflow { position: start })
    }

    pub fn s64(&mut self) -> Result<i64, ReadError> {
        let start = self.position;
        let mut result = 0i64;
        let mut shift = 0u32;
        loop {
            let byte = self.byte()?;
            if shift >= 64 {
                return Err(ReadError::Overflow { position: start });
            }
            result |= i64::from(byte & 0x7F) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }
    }

    pub fn s32(&mut self) -> Result<i32, ReadError> {
        let start = self.position;
        i32::try_from(self.s64()?).map_err(|_| ReadError::Overflow { position: start })
    }

    pub fn string(&mut self) -> Result<&'a str, ReadError> {
        let len = self.u32()? as usize;
        let start = self.position;
        let raw = self.bytes(len)?;
        std::str::from_utf8(raw).map_err(|_| ReadError::InvalidUtf8 { position: start })
    }

    /// Next section as `(id, payload)`
    pub fn read_section(&mut self) -> Result<(u8, &'a [u8]), ReadError> {
        let id = self.byte()?;
        let len = self.u32()? as usize;
        Ok((id, self.bytes(len)?))
    }
}
