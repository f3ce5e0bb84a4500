//! Stream-oriented reading for sources too large to comfortably load into memory.
//!
//! [`DataCursor`](crate::data::DataCursor) and its borrowed cousins own (or borrow) the whole byte
//! slice up front, which is the right shape for most of this workspace's formats. Godot `.pck`
//! archives are the exception: they're routinely hundreds of megabytes to tens of gigabytes, and
//! the directory at the front only needs to be parsed once before individual file bodies are
//! streamed out on demand. [`ByteReader`] wraps any [`Read`] + [`Seek`] source with the same
//! endian-aware primitive reads, and [`ReadExt`]/[`SeekExt`] let code be generic over "a cursor
//! over memory" or "a cursor over a file" without caring which.

use std::io::{Read, Seek, SeekFrom as IoSeekFrom};

use crate::data::{
    DataCursorMut, DataCursorRef, DataCursorTrait, Endian, EndianRead, EndianWrite, Error, SeekFrom,
};

type Result<T> = core::result::Result<T, Error>;

/// Endian-aware primitive reads, implemented for both in-memory cursors and [`ByteReader`].
///
/// This is deliberately a superset of [`EndianRead`]: cursors already get it from their existing
/// impl via the blanket below, `ByteReader` gets it directly.
pub trait ReadExt: EndianRead {
    /// Reads exactly `N` bytes and returns them as a fixed-size array.
    ///
    /// # Errors
    /// Returns [`EndOfFile`](Error::EndOfFile) if trying to read out of bounds.
    fn read_exact<const N: usize>(&mut self) -> Result<[u8; N]>;

    /// Reads `length` bytes and returns them as an owned [`Vec`].
    ///
    /// # Errors
    /// Returns [`EndOfFile`](Error::EndOfFile) if trying to read out of bounds.
    fn read_slice(&mut self, length: usize) -> Result<Vec<u8>>;

    /// Reads `length` bytes and interprets them as a UTF-8 string.
    ///
    /// # Errors
    /// Returns [`EndOfFile`](Error::EndOfFile) if trying to read out of bounds, or
    /// [`InvalidUtf8`](Error::InvalidUtf8) if the bytes aren't valid UTF-8.
    fn read_string(&mut self, length: usize) -> Result<String> {
        let bytes = self.read_slice(length)?;
        String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }
}

/// Fallible seeking, implemented for both in-memory cursors and [`ByteReader`].
pub trait SeekExt {
    /// Returns the current position of the stream.
    ///
    /// # Errors
    /// Returns [`Io`](Error::Io) if the underlying stream fails to report a position.
    fn position(&mut self) -> Result<u64>;

    /// Sets the position of the stream.
    ///
    /// # Errors
    /// Returns [`Io`](Error::Io) if the underlying stream fails to seek.
    fn set_position(&mut self, pos: u64) -> Result<()>;

    /// Seeks relative to a [`SeekFrom`] origin, returning the new absolute position.
    ///
    /// # Errors
    /// Returns [`EndOfFile`](Error::EndOfFile) if the resulting offset would be negative.
    fn seek(&mut self, style: SeekFrom) -> Result<u64>;

    /// Returns the total length of the stream, if known.
    ///
    /// # Errors
    /// Returns [`Io`](Error::Io) if the underlying stream fails to report its length.
    fn stream_len(&mut self) -> Result<u64>;
}

macro_rules! impl_read_ext_for_cursor {
    ($t:ty) => {
        impl ReadExt for $t {
            #[inline]
            fn read_exact<const N: usize>(&mut self) -> Result<[u8; N]> {
                let mut buf = [0u8; N];
                self.read_length(&mut buf)?;
                Ok(buf)
            }

            #[inline]
            fn read_slice(&mut self, length: usize) -> Result<Vec<u8>> {
                Ok(self.get_slice(length)?.to_vec())
            }
        }

        impl SeekExt for $t {
            #[inline]
            fn position(&mut self) -> Result<u64> {
                Ok(DataCursorTrait::position(self) as u64)
            }

            #[inline]
            fn set_position(&mut self, pos: u64) -> Result<()> {
                DataCursorTrait::set_position(self, pos as usize);
                Ok(())
            }

            #[inline]
            fn seek(&mut self, style: SeekFrom) -> Result<u64> {
                Ok(DataCursorTrait::seek(self, style)? as u64)
            }

            #[inline]
            fn stream_len(&mut self) -> Result<u64> {
                Ok(DataCursorTrait::len(self) as u64)
            }
        }
    };
}

impl_read_ext_for_cursor!(crate::data::DataCursor);
impl_read_ext_for_cursor!(DataCursorRef<'_>);
impl_read_ext_for_cursor!(DataCursorMut<'_>);

/// Wraps any [`Read`] + [`Seek`] byte source (a file, a `BufReader`, a decrypted sub-stream, ...)
/// with the same endian-aware primitive reads the in-memory cursors provide.
pub struct ByteReader<R> {
    inner: R,
    endian: Endian,
}

impl<R: Read + Seek> ByteReader<R> {
    /// Wraps `inner`, reading multi-byte primitives with the given endianness.
    #[inline]
    pub fn new(inner: R, endian: Endian) -> Self {
        Self { inner, endian }
    }

    /// Consumes this reader, returning the underlying stream.
    #[inline]
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Returns the current endianness used for multi-byte reads.
    #[inline]
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Sets the endianness used for multi-byte reads.
    #[inline]
    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Returns a mutable reference to the underlying stream, for operations this type doesn't
    /// expose directly (e.g. wrapping it in a decryptor).
    #[inline]
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

macro_rules! byte_reader_read {
    ($self:ident, $t:ty) => {{
        const LEN: usize = core::mem::size_of::<$t>();
        let bytes: [u8; LEN] = ReadExt::read_exact($self)?;
        Ok(match $self.endian {
            Endian::Little => <$t>::from_le_bytes(bytes),
            Endian::Big => <$t>::from_be_bytes(bytes),
        })
    }};
}

impl<R: Read + Seek> EndianRead for ByteReader<R> {
    #[inline]
    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact::<1>()?[0])
    }

    #[inline]
    fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    #[inline]
    fn read_u16(&mut self) -> Result<u16> {
        byte_reader_read!(self, u16)
    }

    #[inline]
    fn read_i16(&mut self) -> Result<i16> {
        byte_reader_read!(self, i16)
    }

    #[inline]
    fn read_u32(&mut self) -> Result<u32> {
        byte_reader_read!(self, u32)
    }

    #[inline]
    fn read_i32(&mut self) -> Result<i32> {
        byte_reader_read!(self, i32)
    }

    #[inline]
    fn read_u64(&mut self) -> Result<u64> {
        byte_reader_read!(self, u64)
    }

    #[inline]
    fn read_i64(&mut self) -> Result<i64> {
        byte_reader_read!(self, i64)
    }

    #[inline]
    fn read_u128(&mut self) -> Result<u128> {
        byte_reader_read!(self, u128)
    }

    #[inline]
    fn read_i128(&mut self) -> Result<i128> {
        byte_reader_read!(self, i128)
    }

    #[inline]
    fn read_f32(&mut self) -> Result<f32> {
        byte_reader_read!(self, u32).map(f32::from_bits)
    }

    #[inline]
    fn read_f64(&mut self) -> Result<f64> {
        byte_reader_read!(self, u64).map(f64::from_bits)
    }
}

impl<R: Read + Seek> ReadExt for ByteReader<R> {
    #[inline]
    fn read_exact<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    #[inline]
    fn read_slice(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; length];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read + Seek> SeekExt for ByteReader<R> {
    #[inline]
    fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    #[inline]
    fn set_position(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(IoSeekFrom::Start(pos))?;
        Ok(())
    }

    #[inline]
    fn seek(&mut self, style: SeekFrom) -> Result<u64> {
        let io_style = match style {
            SeekFrom::Start(n) => IoSeekFrom::Start(n as u64),
            SeekFrom::Current(n) => IoSeekFrom::Current(n as i64),
            SeekFrom::End(n) => IoSeekFrom::End(n as i64),
        };
        Ok(self.inner.seek(io_style)?)
    }

    #[inline]
    fn stream_len(&mut self) -> Result<u64> {
        let current = self.inner.stream_position()?;
        let end = self.inner.seek(IoSeekFrom::End(0))?;
        self.inner.seek(IoSeekFrom::Start(current))?;
        Ok(end)
    }
}

impl<R: Read + Seek> Read for ByteReader<R> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

/// An append-only, endian-aware byte sink backing the writer half of every codec in this workspace.
///
/// [`DataCursor`](crate::data::DataCursor) is deliberately fixed-length (see its doc comment), which
/// is the wrong shape for formats whose final size isn't known until encoding finishes — a text
/// resource, a re-serialized project config, a rewritten PCK directory. `ByteWriter` just grows.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buffer: Vec<u8>,
    endian: Endian,
}

impl ByteWriter {
    /// Creates an empty writer using the given endianness.
    #[inline]
    #[must_use]
    pub fn new(endian: Endian) -> Self {
        Self { buffer: Vec::new(), endian }
    }

    /// Returns the current endianness used for multi-byte writes.
    #[inline]
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Sets the endianness used for multi-byte writes.
    #[inline]
    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Returns the number of bytes written so far.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns whether nothing has been written yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends raw bytes verbatim.
    #[inline]
    pub fn write_slice(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Appends `byte`, `count` times.
    #[inline]
    pub fn write_padding(&mut self, byte: u8, count: usize) {
        self.buffer.resize(self.buffer.len() + count, byte);
    }

    /// Overwrites `N` bytes at `offset`, for backpatching a length or offset field written before
    /// its value was known. Panics if the range is out of bounds, since that's always a bug in the
    /// calling encoder, not a malformed-input condition.
    pub fn patch<const N: usize>(&mut self, offset: usize, bytes: [u8; N]) {
        self.buffer[offset..offset + N].copy_from_slice(&bytes);
    }

    /// Consumes the writer, returning the accumulated bytes.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

macro_rules! byte_writer_write {
    ($self:ident, $value:ident, $t:ty) => {{
        let bytes = match $self.endian {
            Endian::Little => <$t>::to_le_bytes($value),
            Endian::Big => <$t>::to_be_bytes($value),
        };
        $self.buffer.extend_from_slice(&bytes);
        Ok(())
    }};
}

impl EndianWrite for ByteWriter {
    #[inline]
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.buffer.push(value);
        Ok(())
    }

    #[inline]
    fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_u8(value as u8)
    }

    #[inline]
    fn write_u16(&mut self, value: u16) -> Result<()> {
        byte_writer_write!(self, value, u16)
    }

    #[inline]
    fn write_i16(&mut self, value: i16) -> Result<()> {
        byte_writer_write!(self, value, i16)
    }

    #[inline]
    fn write_u32(&mut self, value: u32) -> Result<()> {
        byte_writer_write!(self, value, u32)
    }

    #[inline]
    fn write_i32(&mut self, value: i32) -> Result<()> {
        byte_writer_write!(self, value, i32)
    }

    #[inline]
    fn write_u64(&mut self, value: u64) -> Result<()> {
        byte_writer_write!(self, value, u64)
    }

    #[inline]
    fn write_i64(&mut self, value: i64) -> Result<()> {
        byte_writer_write!(self, value, i64)
    }

    #[inline]
    fn write_u128(&mut self, value: u128) -> Result<()> {
        byte_writer_write!(self, value, u128)
    }

    #[inline]
    fn write_i128(&mut self, value: i128) -> Result<()> {
        byte_writer_write!(self, value, i128)
    }

    #[inline]
    fn write_f32(&mut self, value: f32) -> Result<()> {
        let bits = value.to_bits();
        byte_writer_write!(self, bits, u32)
    }

    #[inline]
    fn write_f64(&mut self, value: f64) -> Result<()> {
        let bits = value.to_bits();
        byte_writer_write!(self, bits, u64)
    }
}
