//! Scalar encodings shared by the encoder and decoder.

use super::GobError;

/// Cursor over one gob message body.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn read_byte(&mut self) -> Result<u8, GobError> {
        let byte = *self.buf.get(self.pos).ok_or(GobError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], GobError> {
        if len > self.remaining() {
            return Err(GobError::UnexpectedEof);
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub(crate) fn read_uint(&mut self) -> Result<u64, GobError> {
        let first = self.read_byte()?;
        match length_prefix_width(first)? {
            0 => Ok(u64::from(first)),
            width => Ok(be_uint(self.read_bytes(width)?)),
        }
    }

    pub(crate) fn read_int(&mut self) -> Result<i64, GobError> {
        let bits = self.read_uint()?;
        if bits & 1 == 1 {
            Ok(!((bits >> 1) as i64))
        } else {
            Ok((bits >> 1) as i64)
        }
    }

    pub(crate) fn read_float(&mut self) -> Result<f64, GobError> {
        Ok(f64::from_bits(self.read_uint()?.swap_bytes()))
    }

    /// Reads a length and checks it against the bytes left in the message.
    pub(crate) fn read_len(&mut self) -> Result<usize, GobError> {
        let len = self.read_uint()?;
        usize::try_from(len)
            .ok()
            .filter(|len| *len <= self.remaining())
            .ok_or_else(|| GobError::Corrupt(format!("length {len} exceeds message")))
    }

    pub(crate) fn read_byte_slice(&mut self) -> Result<Vec<u8>, GobError> {
        let len = self.read_len()?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    pub(crate) fn read_string(&mut self) -> Result<String, GobError> {
        Ok(String::from_utf8(self.read_byte_slice()?)?)
    }
}

/// Number of big-endian bytes that follow the first byte of an unsigned
/// integer: zero when the first byte is the value itself.
pub fn length_prefix_width(first: u8) -> Result<usize, GobError> {
    if first < 0x80 {
        return Ok(0);
    }
    let width = usize::from(first.wrapping_neg());
    if width > 8 {
        return Err(GobError::IntegerOverflow);
    }
    Ok(width)
}

pub(crate) fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, b| (acc << 8) | u64::from(*b))
}

pub(crate) fn put_uint(out: &mut Vec<u8>, value: u64) {
    if value < 0x80 {
        out.push(value as u8);
        return;
    }
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let width = (bytes.len() - skip) as u8;
    out.push(width.wrapping_neg());
    out.extend_from_slice(&bytes[skip..]);
}

pub(crate) fn put_int(out: &mut Vec<u8>, value: i64) {
    let bits = if value < 0 {
        ((!value as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    put_uint(out, bits);
}

pub(crate) fn put_float(out: &mut Vec<u8>, value: f64) {
    put_uint(out, value.to_bits().swap_bytes());
}

pub(crate) fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_uint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Writes struct fields as deltas from the previously written field.
pub(crate) struct FieldWriter<'a> {
    out: &'a mut Vec<u8>,
    last: i64,
}

impl<'a> FieldWriter<'a> {
    pub(crate) fn new(out: &'a mut Vec<u8>) -> Self {
        Self { out, last: -1 }
    }

    /// Emits the delta for field `index` and returns the buffer so the
    /// caller can append the field's value.
    pub(crate) fn field(&mut self, index: usize) -> &mut Vec<u8> {
        let index = index as i64;
        put_uint(self.out, (index - self.last) as u64);
        self.last = index;
        &mut *self.out
    }

    pub(crate) fn finish(self) {
        put_uint(self.out, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uint_bytes(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        put_uint(&mut out, value);
        out
    }

    #[test]
    fn small_uints_are_one_byte() {
        assert_eq!(uint_bytes(0), vec![0x00]);
        assert_eq!(uint_bytes(7), vec![0x07]);
        assert_eq!(uint_bytes(127), vec![0x7f]);
    }

    #[test]
    fn large_uints_carry_negated_width() {
        assert_eq!(uint_bytes(128), vec![0xff, 0x80]);
        assert_eq!(uint_bytes(256), vec![0xfe, 0x01, 0x00]);
        assert_eq!(
            uint_bytes(u64::MAX),
            vec![0xf8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn signed_ints_fold_sign_into_low_bit() {
        let mut out = Vec::new();
        put_int(&mut out, -65);
        assert_eq!(out, vec![0xff, 0x81]);

        out.clear();
        put_int(&mut out, 65);
        assert_eq!(out, vec![0xff, 0x82]);

        let mut reader = ByteReader::new(&[0xff, 0x81, 0x2c]);
        assert_eq!(reader.read_int().unwrap(), -65);
        assert_eq!(reader.read_int().unwrap(), 22);
    }

    #[test]
    fn floats_are_byte_reversed() {
        let mut out = Vec::new();
        put_float(&mut out, 17.0);
        assert_eq!(out, vec![0xfe, 0x31, 0x40]);

        let mut reader = ByteReader::new(&out);
        assert_eq!(reader.read_float().unwrap(), 17.0);
    }

    #[test]
    fn truncated_uint_is_eof() {
        let mut reader = ByteReader::new(&[0xfe, 0x01]);
        assert!(matches!(reader.read_uint(), Err(GobError::UnexpectedEof)));
    }

    #[test]
    fn oversized_width_is_rejected() {
        let mut reader = ByteReader::new(&[0x80]);
        assert!(matches!(reader.read_uint(), Err(GobError::IntegerOverflow)));
    }

    #[test]
    fn lengths_beyond_message_are_corrupt() {
        let mut reader = ByteReader::new(&[0x05, b'a', b'b']);
        assert!(matches!(reader.read_string(), Err(GobError::Corrupt(_))));
    }

    #[test]
    fn field_writer_emits_deltas() {
        let mut out = Vec::new();
        let mut fields = FieldWriter::new(&mut out);
        fields.field(0).push(0xaa);
        fields.field(3).push(0xbb);
        fields.finish();
        assert_eq!(out, vec![0x01, 0xaa, 0x03, 0xbb, 0x00]);
    }
}
