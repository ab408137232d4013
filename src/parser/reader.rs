use super::error::DecodeError;
use byteorder::{ByteOrder, LittleEndian};

/// Forward-only cursor over an immutable byte slice.
///
/// Offsets reported in errors are absolute: a reader created for a slice
/// that starts part-way into a module (a section payload, a function body)
/// carries the slice's starting offset in `base`.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Reader<'a> {
        Reader::with_offset(bytes, 0)
    }

    pub fn with_offset(bytes: &'a [u8], base: usize) -> Reader<'a> {
        Reader { bytes, pos: 0, base }
    }
}

impl<'a> Reader<'a> {
    // Basic operations --------------------------------------------------------

    /// Position relative to the start of this reader's slice.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Absolute position within the module.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn has_at_least(&self, count: usize) -> bool {
        self.remaining() >= count
    }

    fn eof(&self) -> DecodeError {
        DecodeError::UnexpectedEof {
            offset: self.offset(),
        }
    }

    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        match self.bytes.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(byte)
            }
            None => Err(self.eof()),
        }
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if !self.has_at_least(len) {
            return Err(self.eof());
        }
        let bytes = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Split off the next `len` bytes as a reader of their own.
    pub fn sub_reader(&mut self, len: usize) -> Result<Reader<'a>, DecodeError> {
        let base = self.offset();
        let bytes = self.read_bytes(len)?;
        Ok(Reader::with_offset(bytes, base))
    }

    // Read and interpret types ------------------------------------------------

    /// Fixed-width little-endian u32, used for the header version field.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(LittleEndian::read_u32(bytes))
    }

    pub fn read_vu32(&mut self) -> Result<u32, DecodeError> {
        Ok(self.read_leb(32, false)? as u32)
    }

    pub fn read_vu64(&mut self) -> Result<u64, DecodeError> {
        self.read_leb(64, false)
    }

    pub fn read_vs32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_leb(32, true)? as i64 as i32)
    }

    /// Signed 33-bit integer, the encoding of a type-index block type.
    pub fn read_vs33(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_leb(33, true)? as i64)
    }

    pub fn read_vs64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_leb(64, true)? as i64)
    }

    /// IEEE-754 single, little-endian; NaN payloads are kept as-is.
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(LittleEndian::read_f32(bytes))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        Ok(LittleEndian::read_f64(bytes))
    }

    /// Vector length prefix. Every item takes at least one byte, so a count
    /// larger than what is left can be rejected before allocating.
    pub fn read_count(&mut self, limit: u32, what: &'static str) -> Result<u32, DecodeError> {
        let offset = self.offset();
        let count = self.read_vu32()?;
        if count > limit {
            return Err(DecodeError::LimitExceeded {
                offset,
                what,
                limit,
            });
        }
        if count as usize > self.remaining() {
            return Err(self.eof());
        }
        Ok(count)
    }

    /// Length-prefixed byte vector.
    pub fn read_byte_vec(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_vu32()? as usize;
        self.read_bytes(len)
    }

    /// Length-prefixed UTF-8 name.
    pub fn read_name(&mut self) -> Result<String, DecodeError> {
        let len = self.read_vu32()? as usize;
        let start = self.offset();
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| DecodeError::InvalidUtf8 {
                offset: start + e.valid_up_to(),
            })
    }

    /// Read a LEB128 integer of at most `bits` significant bits.
    ///
    /// The encoding may use at most `ceil(bits / 7)` bytes, and the unused
    /// high bits of the final byte must be zero (unsigned) or a copy of the
    /// sign bit (signed). Signed results are sign-extended to 64 bits.
    fn read_leb(&mut self, bits: u32, signed: bool) -> Result<u64, DecodeError> {
        let start = self.offset();
        let max_bytes = (bits + 6) / 7;
        let mut result: u64 = 0;
        let mut shift: u32 = 0;

        for i in 0..max_bytes {
            let byte = self.read_byte()?;
            let payload = (byte & 0x7f) as u64;
            let last = i == max_bytes - 1;

            if last {
                if byte & 0x80 != 0 {
                    return Err(DecodeError::malformed(start, "integer representation too long"));
                }
                let used = bits - 7 * i;
                if signed {
                    let mask = (0x7fu8 << (used - 1)) & 0x7f;
                    let high = byte & mask;
                    if high != 0 && high != mask {
                        return Err(DecodeError::malformed(start, "integer too large"));
                    }
                } else if used < 7 {
                    let mask = (0x7fu8 << used) & 0x7f;
                    if byte & mask != 0 {
                        return Err(DecodeError::malformed(start, "integer too large"));
                    }
                }
            }

            result |= payload << shift;
            shift += 7;

            if byte & 0x80 == 0 {
                if signed && shift < 64 && byte & 0x40 != 0 {
                    result |= !0u64 << shift;
                }
                return Ok(result);
            }
        }

        Err(DecodeError::malformed(start, "integer representation too long"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_read_byte() {
        let mut reader = Reader::new(&[0x00, 0x80, 0xff]);
        assert_eq!(reader.read_byte(), Ok(0));
        assert_eq!(reader.read_byte(), Ok(128));
        assert_eq!(reader.read_byte(), Ok(255));
        assert_eq!(reader.read_byte(), Err(DecodeError::UnexpectedEof { offset: 3 }));
    }

    #[test]
    fn test_read_u32() {
        let read = |v: &[u8]| Reader::new(v).read_u32().expect("Failed to read u32");

        assert_eq!(read(&[0x01, 0x00, 0x00, 0x00]), 1);
        assert_eq!(read(&[0x00, 0x01, 0x00, 0x00]), 256);
        assert_eq!(read(&[0x00, 0x00, 0x00, 0x80]), 2147483648);
        assert_eq!(read(&[0xff, 0xff, 0xff, 0xff]), 4294967295);
    }

    #[test]
    fn test_read_vu32() {
        let read = |v: &[u8]| Reader::new(v).read_vu32().expect("Failed to read vu32");

        assert_eq!(read(&[0]), 0);
        assert_eq!(read(&[1]), 1);
        assert_eq!(read(&[0x7f]), 127);
        assert_eq!(read(&[0x80, 0x7f]), 16256);
        assert_eq!(read(&[0b11100101, 0b10001110, 0b00100110]), 624485);
        assert_eq!(read(&[0x80, 0x80, 0x80, 0x80, 0x08]), 0x80000000);
        assert_eq!(read(&[0xff, 0xff, 0xff, 0xff, 0x0f]), 0xffffffff);
        // redundant padding within the byte budget is allowed
        assert_eq!(read(&[0x83, 0x80, 0x80, 0x80, 0x00]), 3);
    }

    #[test]
    fn test_read_vs32() {
        let read = |v: &[u8]| Reader::new(v).read_vs32().expect("Failed to read vs32");

        assert_eq!(read(&[0x00]), 0);
        assert_eq!(read(&[0x7f]), -1);
        assert_eq!(read(&[0x3f]), 63);
        assert_eq!(read(&[0x40]), -64);
        assert_eq!(read(&[0x80, 0x7f]), -128);
        assert_eq!(read(&[0xff, 0xff, 0xff, 0xff, 0x07]), i32::MAX);
        assert_eq!(read(&[0x80, 0x80, 0x80, 0x80, 0x78]), i32::MIN);
    }

    #[test]
    fn test_read_vs64() {
        let read = |v: &[u8]| Reader::new(v).read_vs64().expect("Failed to read vs64");

        assert_eq!(read(&[0x7f]), -1);
        assert_eq!(read(&[0xe5, 0x8e, 0x26]), 624485);
        assert_eq!(
            read(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7f]),
            i64::MIN
        );
        assert_eq!(
            read(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00]),
            i64::MAX
        );
    }

    #[test]
    fn test_read_vs33() {
        let read = |v: &[u8]| Reader::new(v).read_vs33().expect("Failed to read vs33");

        assert_eq!(read(&[0x00]), 0);
        assert_eq!(read(&[0x05]), 5);
        assert_eq!(read(&[0xff, 0xff, 0xff, 0xff, 0x0f]), 0xffffffff);
    }

    #[rstest]
    #[case::vu32_too_long(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00], false)]
    #[case::vu32_unused_bits(&[0xff, 0xff, 0xff, 0xff, 0x1f], false)]
    #[case::vs32_too_long(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x7f], true)]
    #[case::vs32_bad_sign_bits(&[0xff, 0xff, 0xff, 0xff, 0x4f], true)]
    #[case::vs32_positive_overflow(&[0x80, 0x80, 0x80, 0x80, 0x08], true)]
    fn test_leb_malformed(#[case] bytes: &[u8], #[case] signed: bool) {
        let mut reader = Reader::new(bytes);
        let result = if signed {
            reader.read_vs32().map(|_| ())
        } else {
            reader.read_vu32().map(|_| ())
        };
        assert!(matches!(result, Err(DecodeError::Malformed { offset: 0, .. })), "{:?}", result);
    }

    #[test]
    fn test_leb_truncated() {
        let mut reader = Reader::with_offset(&[0x80, 0x80], 10);
        assert_eq!(reader.read_vu32(), Err(DecodeError::UnexpectedEof { offset: 12 }));
    }

    #[test]
    fn test_read_floats_keep_nan_bits() {
        let mut reader = Reader::new(&[0x01, 0x00, 0xc0, 0x7f]);
        assert_eq!(reader.read_f32().map(f32::to_bits), Ok(0x7fc00001));

        let bytes = 0x7ff0_0000_0000_0001u64.to_le_bytes();
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_f64().map(f64::to_bits), Ok(0x7ff0_0000_0000_0001));

        let mut reader = Reader::new(&[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(reader.read_f32(), Ok(1.0));
    }

    #[test]
    fn test_read_name() {
        let mut reader = Reader::new(&[0x03, b'a', b'd', b'd']);
        assert_eq!(reader.read_name(), Ok("add".to_string()));

        let mut reader = Reader::with_offset(&[0x02, b'a', 0xff], 100);
        assert_eq!(reader.read_name(), Err(DecodeError::InvalidUtf8 { offset: 102 }));

        let mut reader = Reader::new(&[0x05, b'a']);
        assert_eq!(reader.read_name(), Err(DecodeError::UnexpectedEof { offset: 1 }));
    }

    #[test]
    fn test_read_count() {
        let mut reader = Reader::new(&[0x02, 0xaa, 0xbb]);
        assert_eq!(reader.read_count(10, "items"), Ok(2));

        let mut reader = Reader::new(&[0x0b, 0x00]);
        assert_eq!(
            reader.read_count(10, "items"),
            Err(DecodeError::LimitExceeded {
                offset: 0,
                what: "items",
                limit: 10
            })
        );

        let mut reader = Reader::new(&[0x05, 0x00]);
        assert_eq!(reader.read_count(10, "items"), Err(DecodeError::UnexpectedEof { offset: 1 }));
    }

    #[test]
    fn test_sub_reader_offsets() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut reader = Reader::new(&bytes);
        reader.read_byte().expect("byte");
        let mut sub = reader.sub_reader(3).expect("sub reader");
        assert_eq!(sub.offset(), 1);
        assert_eq!(sub.read_bytes(3), Ok(&bytes[1..4]));
        assert!(sub.is_empty());
        assert_eq!(sub.read_byte(), Err(DecodeError::UnexpectedEof { offset: 4 }));
        assert_eq!(reader.remaining(), 1);
    }
}
