// Big-endian cursor reader/writer for the buffer wire format.
use crate::core::buffer::MAX_BUFFER_LEN;
use crate::core::error::{Error, protocol};
use bytes::{Buf, BufMut, BytesMut};

pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, count: usize) -> Result<(), Error> {
        if self.buf.remaining() < count {
            return Err(protocol(format!(
                "unexpected end of buffer: need {count} bytes, {} remaining",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        self.need(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        self.need(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn read_f64(&mut self) -> Result<f64, Error> {
        self.need(8)?;
        Ok(self.buf.get_f64())
    }

    /// Reads an i32 length or element count, rejecting negative values.
    pub fn read_len(&mut self) -> Result<usize, Error> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(protocol(format!("negative length prefix {len}")));
        }
        Ok(len as usize)
    }

    /// Reads a length-prefixed byte run without copying.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], Error> {
        let len = self.read_len()?;
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_string(&mut self) -> Result<String, Error> {
        let bytes = self.read_bytes()?;
        let text = std::str::from_utf8(bytes).map_err(|err| {
            protocol("string is not valid UTF-8").with_source(err)
        })?;
        Ok(text.to_string())
    }

    /// Fails if any bytes are left after a complete value was read.
    pub fn finish(self) -> Result<(), Error> {
        if self.buf.has_remaining() {
            return Err(protocol(format!(
                "junk remaining in buffer after lifting: {} bytes",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

type Release = Box<dyn FnOnce() + Send>;

/// Growable output buffer.
///
/// Values that own a native reference register a release with `on_abandon`;
/// it runs if the writer is dropped before `into_vec` hands the bytes over.
#[derive(Default)]
pub struct WireWriter {
    buf: BytesMut,
    releases: Vec<Release>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_abandon(&mut self, release: impl FnOnce() + Send + 'static) {
        self.releases.push(Box::new(release));
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32(value);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64(value);
    }

    pub fn write_len(&mut self, len: usize) -> Result<(), Error> {
        if len as u64 > MAX_BUFFER_LEN {
            return Err(protocol(format!("length {len} exceeds i32::MAX")));
        }
        self.buf.put_i32(len as i32);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write_len(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    pub fn write_str(&mut self, value: &str) -> Result<(), Error> {
        self.write_bytes(value.as_bytes())
    }

    /// Marks the written references as handed over without taking the bytes.
    pub fn commit(mut self) {
        self.releases.clear();
    }

    /// Hands the bytes, and every reference written into them, to the caller.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.releases.clear();
        std::mem::take(&mut self.buf).to_vec()
    }
}

impl Drop for WireWriter {
    fn drop(&mut self) {
        for release in self.releases.drain(..) {
            release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{WireReader, WireWriter};
    use crate::core::error::ErrorKind;

    #[test]
    fn integers_are_big_endian() {
        let mut writer = WireWriter::new();
        writer.write_u16(0x0102);
        writer.write_u32(0x0304_0506);
        writer.write_i64(-2);
        let bytes = writer.into_vec();
        assert_eq!(
            bytes,
            vec![1, 2, 3, 4, 5, 6, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]
        );

        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.read_u16().expect("u16"), 0x0102);
        assert_eq!(reader.read_u32().expect("u32"), 0x0304_0506);
        assert_eq!(reader.read_i64().expect("i64"), -2);
        reader.finish().expect("finish");
    }

    #[test]
    fn string_has_four_byte_length_prefix() {
        let mut writer = WireWriter::new();
        writer.write_str("héllo").expect("write");
        let bytes = writer.into_vec();
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[..4], &[0, 0, 0, 6]);

        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.read_string().expect("read"), "héllo");
    }

    #[test]
    fn negative_length_fails_fast() {
        let bytes = (-5i32).to_be_bytes();
        let mut reader = WireReader::new(&bytes);
        let err = reader.read_bytes().expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn length_past_end_fails_fast() {
        let mut bytes = i32::MAX.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let mut reader = WireReader::new(&bytes);
        let err = reader.read_bytes().expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn invalid_utf8_is_not_replaced() {
        let mut writer = WireWriter::new();
        writer.write_bytes(&[0xff, 0xfe]).expect("write");
        let bytes = writer.into_vec();
        let err = WireReader::new(&bytes)
            .read_string()
            .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let bytes = [0u8, 1, 2];
        let mut reader = WireReader::new(&bytes);
        reader.read_u8().expect("u8");
        assert_eq!(
            reader.finish().expect_err("should fail").kind(),
            ErrorKind::Protocol
        );
    }

    #[test]
    fn releases_run_only_when_writer_is_abandoned() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let released = Arc::new(AtomicUsize::new(0));
        let mut writer = WireWriter::new();
        writer.write_u64(7);
        let counter = Arc::clone(&released);
        writer.on_abandon(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(writer.into_vec().len(), 8);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        let mut writer = WireWriter::new();
        let counter = Arc::clone(&released);
        writer.on_abandon(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(writer);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
