//! Endian-aware cursor types for the binary codecs
//!
//! Binder headers switch byte order at runtime, so both types carry a
//! `big_endian` flag and dispatch to `byteorder::{BE, LE}` per call.

use byteorder::{ByteOrder, BE, LE};
use encoding_rs::SHIFT_JIS;

use crate::{Error, Result};

pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            big_endian: false,
        }
    }

    pub fn set_big_endian(&mut self, big_endian: bool) {
        self.big_endian = big_endian;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let slice = self.slice_at(self.pos, len)?;
        self.pos += len;
        Ok(slice)
    }

    /// Bounds-checked view independent of the cursor
    pub fn slice_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                Error::invalid(format!(
                    "read of {len} bytes at 0x{offset:X} is past end of data (0x{:X})",
                    self.data.len()
                ))
            })
    }

    pub fn peek_u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.slice_at(offset, 1)?[0])
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub fn expect_magic(&mut self, magic: &[u8]) -> Result<()> {
        let found = self.take(magic.len())?;
        if found != magic {
            return Err(Error::invalid(format!(
                "expected magic {:?}, found {:?}",
                String::from_utf8_lossy(magic),
                String::from_utf8_lossy(found)
            )));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(if self.big_endian { BE::read_u16(b) } else { LE::read_u16(b) })
    }

    pub fn i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(if self.big_endian { BE::read_i16(b) } else { LE::read_i16(b) })
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(if self.big_endian { BE::read_u32(b) } else { LE::read_u32(b) })
    }

    pub fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(if self.big_endian { BE::read_i32(b) } else { LE::read_i32(b) })
    }

    pub fn i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        Ok(if self.big_endian { BE::read_i64(b) } else { LE::read_i64(b) })
    }

    pub fn f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(if self.big_endian { BE::read_f32(b) } else { LE::read_f32(b) })
    }

    pub fn expect_i32(&mut self, expected: i32, what: &str) -> Result<()> {
        let at = self.pos;
        let found = self.i32()?;
        if found != expected {
            return Err(Error::invalid(format!(
                "{what} at 0x{at:X}: expected 0x{expected:X}, found 0x{found:X}"
            )));
        }
        Ok(())
    }

    pub fn expect_i64(&mut self, expected: i64, what: &str) -> Result<()> {
        let at = self.pos;
        let found = self.i64()?;
        if found != expected {
            return Err(Error::invalid(format!(
                "{what} at 0x{at:X}: expected 0x{expected:X}, found 0x{found:X}"
            )));
        }
        Ok(())
    }

    /// Fixed-width ASCII field, trimmed at the first NUL
    pub fn fixed_str(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
        std::str::from_utf8(&bytes[..end])
            .map(str::to_string)
            .map_err(|_| Error::invalid(format!("invalid text in {len}-byte field")))
    }

    /// NUL-terminated Shift-JIS string at an absolute offset
    pub fn shift_jis_at(&self, offset: usize) -> Result<String> {
        let tail = self.slice_at(offset, 0).map(|_| &self.data[offset..])?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::invalid(format!("unterminated string at 0x{offset:X}")))?;
        SHIFT_JIS
            .decode_without_bom_handling_and_without_replacement(&tail[..end])
            .map(|text| text.into_owned())
            .ok_or_else(|| Error::invalid(format!("invalid Shift-JIS string at 0x{offset:X}")))
    }

    /// NUL-terminated UTF-16 string at an absolute offset
    pub fn utf16_at(&self, offset: usize) -> Result<String> {
        let mut units = Vec::new();
        let mut at = offset;
        loop {
            let b = self.slice_at(at, 2)?;
            let unit = if self.big_endian { BE::read_u16(b) } else { LE::read_u16(b) };
            if unit == 0 {
                break;
            }
            units.push(unit);
            at += 2;
        }
        String::from_utf16(&units)
            .map_err(|_| Error::invalid(format!("invalid UTF-16 string at 0x{offset:X}")))
    }
}

/// Convert a stored size or offset to `usize`
pub fn to_usize<T>(value: T, what: &str) -> Result<usize>
where
    T: TryInto<usize> + Copy + std::fmt::Display,
{
    value
        .try_into()
        .map_err(|_| Error::invalid(format!("{what} out of range: {value}")))
}

pub struct Writer {
    buf: Vec<u8>,
    big_endian: bool,
}

impl Writer {
    pub fn new(big_endian: bool) -> Self {
        Self {
            buf: Vec::new(),
            big_endian,
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn zeros(&mut self, len: usize) {
        self.buf.resize(self.buf.len() + len, 0);
    }

    /// Zero-fill up to the next multiple of `align`
    pub fn pad(&mut self, align: usize) {
        if align > 1 {
            let rem = self.buf.len() % align;
            if rem != 0 {
                self.zeros(align - rem);
            }
        }
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn bool(&mut self, value: bool) {
        self.u8(u8::from(value));
    }

    pub fn u16(&mut self, value: u16) {
        let mut b = [0; 2];
        if self.big_endian { BE::write_u16(&mut b, value) } else { LE::write_u16(&mut b, value) }
        self.bytes(&b);
    }

    pub fn i16(&mut self, value: i16) {
        let mut b = [0; 2];
        if self.big_endian { BE::write_i16(&mut b, value) } else { LE::write_i16(&mut b, value) }
        self.bytes(&b);
    }

    pub fn f32(&mut self, value: f32) {
        let mut b = [0; 4];
        if self.big_endian { BE::write_f32(&mut b, value) } else { LE::write_f32(&mut b, value) }
        self.bytes(&b);
    }

    pub fn u32(&mut self, value: u32) {
        let mut b = [0; 4];
        if self.big_endian { BE::write_u32(&mut b, value) } else { LE::write_u32(&mut b, value) }
        self.bytes(&b);
    }

    pub fn i32(&mut self, value: i32) {
        let mut b = [0; 4];
        if self.big_endian { BE::write_i32(&mut b, value) } else { LE::write_i32(&mut b, value) }
        self.bytes(&b);
    }

    pub fn i64(&mut self, value: i64) {
        let mut b = [0; 8];
        if self.big_endian { BE::write_i64(&mut b, value) } else { LE::write_i64(&mut b, value) }
        self.bytes(&b);
    }

    /// Write a placeholder and return its offset for a later `fill_*`
    pub fn reserve_u32(&mut self) -> usize {
        let at = self.position();
        self.zeros(4);
        at
    }

    pub fn reserve_i64(&mut self) -> usize {
        let at = self.position();
        self.zeros(8);
        at
    }

    pub fn fill_u32(&mut self, at: usize, value: u32) {
        let b = &mut self.buf[at..at + 4];
        if self.big_endian { BE::write_u32(b, value) } else { LE::write_u32(b, value) }
    }

    pub fn fill_i32(&mut self, at: usize, value: i32) {
        let b = &mut self.buf[at..at + 4];
        if self.big_endian { BE::write_i32(b, value) } else { LE::write_i32(b, value) }
    }

    pub fn fill_i64(&mut self, at: usize, value: i64) {
        let b = &mut self.buf[at..at + 8];
        if self.big_endian { BE::write_i64(b, value) } else { LE::write_i64(b, value) }
    }

    /// Current position as a 32-bit offset
    pub fn offset_u32(&self) -> Result<u32> {
        u32::try_from(self.position()).map_err(|_| Error::invalid("output exceeds 4 GiB"))
    }

    pub fn offset_i64(&self) -> Result<i64> {
        i64::try_from(self.position()).map_err(|_| Error::invalid("output too large"))
    }

    /// Fixed-width ASCII field, NUL padded
    pub fn fixed_str(&mut self, text: &str, len: usize) -> Result<()> {
        let bytes = text.as_bytes();
        if bytes.len() > len {
            return Err(Error::invalid(format!("{text:?} is longer than {len} bytes")));
        }
        self.bytes(bytes);
        self.zeros(len - bytes.len());
        Ok(())
    }

    pub fn shift_jis_z(&mut self, text: &str) -> Result<()> {
        let (bytes, _, unmappable) = SHIFT_JIS.encode(text);
        if unmappable {
            return Err(Error::invalid(format!("{text:?} cannot be encoded as Shift-JIS")));
        }
        self.bytes(&bytes);
        self.u8(0);
        Ok(())
    }

    pub fn utf16_z(&mut self, text: &str) {
        for unit in text.encode_utf16() {
            self.u16(unit);
        }
        self.u16(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endian_switch() {
        let mut w = Writer::new(true);
        w.i32(0x0102_0304);
        w.i32(0x0102_0304);
        let data = w.into_inner();
        let mut r = Reader::new(&data);
        assert_eq!(r.i32().unwrap(), 0x0403_0201);
        r.set_big_endian(true);
        assert_eq!(r.i32().unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_reserve_and_fill() {
        let mut w = Writer::new(false);
        let at = w.reserve_u32();
        w.u8(7);
        w.fill_u32(at, 0xAABB_CCDD);
        assert_eq!(w.into_inner(), vec![0xDD, 0xCC, 0xBB, 0xAA, 7]);
    }

    #[test]
    fn test_strings() {
        let mut w = Writer::new(false);
        w.shift_jis_z("モデル.flver").unwrap();
        let utf16_at = w.position();
        w.utf16_z("chr/c0000.hkx");
        w.fixed_str("07D7R6", 8).unwrap();
        let data = w.into_inner();

        let mut r = Reader::new(&data);
        assert_eq!(r.shift_jis_at(0).unwrap(), "モデル.flver");
        assert_eq!(r.utf16_at(utf16_at).unwrap(), "chr/c0000.hkx");
        r.skip(data.len() - 8).unwrap();
        assert_eq!(r.fixed_str(8).unwrap(), "07D7R6");
    }

    #[test]
    fn test_bounds() {
        let data = [1u8, 2, 3];
        let mut r = Reader::new(&data);
        assert!(r.i32().is_err());
        assert!(r.slice_at(usize::MAX, 2).is_err());
        assert!(r.shift_jis_at(0).is_err());
        let mut w = Writer::new(false);
        assert!(w.fixed_str("too long for field", 8).is_err());
        assert!(w.shift_jis_z("\u{1F600}").is_err());
    }

    #[test]
    fn test_invalid_text_is_rejected() {
        // 0x81 0x20 is a truncated Shift-JIS lead byte pair
        let data = [0x81u8, 0x20, 0x00, 0xFF, 0xFE, 0x00, 0x00, 0xD8, 0x00, 0x00];
        let mut r = Reader::new(&data);
        assert!(matches!(r.shift_jis_at(0), Err(Error::InvalidData(_))));
        r.skip(3).unwrap();
        assert!(matches!(r.fixed_str(3), Err(Error::InvalidData(_))));
        // Lone high surrogate
        assert!(matches!(r.utf16_at(6), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_pad() {
        let mut w = Writer::new(false);
        w.u8(1);
        w.pad(0x10);
        assert_eq!(w.position(), 0x10);
        w.pad(0x10);
        assert_eq!(w.position(), 0x10);
    }
}
