//! §6 compression service — the `RSCC` chunked stream that wraps compressed `.res`/`.scn` bodies.
//!
//! Godot's `FileAccessCompressed` splits a resource into fixed-size blocks and compresses each one
//! independently (so a reader can seek to a block boundary without inflating the whole file). This
//! module only has to go one direction: fully materialize the decompressed bytes into memory so the
//! rest of the resource loader can treat them as an ordinary seekable stream (§4.3 step 1).

use num_enum::TryFromPrimitive;
use pakrat_core::stream::{ReadExt, SeekExt};

use crate::error::{corrupt, Result};

/// Magic at the start of a compressed resource stream.
pub const MAGIC: [u8; 4] = *b"RSCC";

/// Per-chunk codec, keyed by the `u32` written right after the magic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum CompressionMode {
    FastLz = 0,
    Deflate = 1,
    Zstd = 2,
    Gzip = 3,
}

impl CompressionMode {
    fn from_u32(raw: u32) -> Result<Self> {
        Self::try_from(raw).map_err(|_| corrupt("RSCC header", format!("unknown compression mode {raw}")))
    }
}

/// If `reader` is positioned at an `RSCC` header, consumes it and returns the fully decompressed
/// body. If the next 4 bytes aren't the magic, rewinds and returns `None` so the caller can proceed
/// to parse an uncompressed `RSRC` stream directly.
///
/// # Errors
/// Returns [`Error::CorruptData`](crate::error::Error::CorruptData) for a malformed header or a
/// chunk that fails to decompress, or [`Error::UnsupportedFormat`](crate::error::Error::UnsupportedFormat)
/// for `FastLz` (no available crate in this workspace implements it).
pub fn try_decompress<R: ReadExt + SeekExt>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let start = reader.position()?;
    let magic = reader.read_exact::<4>()?;
    if magic != MAGIC {
        reader.set_position(start)?;
        return Ok(None);
    }
    Ok(Some(decompress_body(reader)?))
}

fn decompress_body<R: ReadExt>(reader: &mut R) -> Result<Vec<u8>> {
    let mode = CompressionMode::from_u32(reader.read_u32()?)?;
    let uncompressed_size = reader.read_u32()? as usize;
    let block_size = reader.read_u32()? as usize;
    if block_size == 0 {
        return Err(corrupt("RSCC header", "block size is zero"));
    }

    let block_count = uncompressed_size.div_ceil(block_size);
    let mut block_sizes = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        block_sizes.push(reader.read_u32()? as usize);
    }

    let mut out = Vec::with_capacity(uncompressed_size);
    for (index, &compressed_len) in block_sizes.iter().enumerate() {
        let remaining = uncompressed_size - out.len();
        let expected_out = remaining.min(block_size);
        let chunk = reader.read_slice(compressed_len)?;
        let decompressed = decompress_block(mode, &chunk, expected_out)
            .map_err(|reason| corrupt(format!("RSCC block {index}"), reason))?;
        out.extend_from_slice(&decompressed);
    }

    Ok(out)
}

fn decompress_block(mode: CompressionMode, chunk: &[u8], expected_len: usize) -> core::result::Result<Vec<u8>, String> {
    match mode {
        CompressionMode::FastLz => Err("FastLZ blocks are not supported by this build".to_owned()),
        CompressionMode::Deflate => {
            use std::io::Read;
            let mut out = Vec::with_capacity(expected_len);
            flate2::read::DeflateDecoder::new(chunk).read_to_end(&mut out).map_err(|e| e.to_string())?;
            Ok(out)
        }
        CompressionMode::Gzip => {
            use std::io::Read;
            let mut out = Vec::with_capacity(expected_len);
            flate2::read::GzDecoder::new(chunk).read_to_end(&mut out).map_err(|e| e.to_string())?;
            Ok(out)
        }
        CompressionMode::Zstd => decompress_zstd(chunk, expected_len),
    }
}

#[cfg(feature = "zstd")]
fn decompress_zstd(chunk: &[u8], expected_len: usize) -> core::result::Result<Vec<u8>, String> {
    zstd::stream::decode_all(chunk).map(|mut out| {
        out.truncate(expected_len.min(out.len()));
        out
    }).map_err(|e| e.to_string())
}

#[cfg(not(feature = "zstd"))]
fn decompress_zstd(_chunk: &[u8], _expected_len: usize) -> core::result::Result<Vec<u8>, String> {
    Err("this build was compiled without the `zstd` feature".to_owned())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::io::Write;

    use pakrat_core::data::Endian;
    use pakrat_core::stream::ByteReader;

    use super::*;

    fn build_rscc(mode: CompressionMode, payload: &[u8], block_size: usize) -> Vec<u8> {
        let mut blocks = Vec::new();
        for chunk in payload.chunks(block_size) {
            let compressed = match mode {
                CompressionMode::Deflate => {
                    let mut encoder =
                        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
                    encoder.write_all(chunk).unwrap();
                    encoder.finish().unwrap()
                }
                _ => unreachable!("test only exercises Deflate"),
            };
            blocks.push(compressed);
        }

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&1u32.to_le_bytes()); // Deflate
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(block_size as u32).to_le_bytes());
        for block in &blocks {
            bytes.extend_from_slice(&(block.len() as u32).to_le_bytes());
        }
        for block in &blocks {
            bytes.extend_from_slice(block);
        }
        bytes
    }

    #[test]
    fn decompresses_single_deflate_block() {
        let payload = b"hello resource world, this text is long enough to compress";
        let bytes = build_rscc(CompressionMode::Deflate, payload, 4096);
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let out = try_decompress(&mut reader).unwrap().unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn decompresses_multiple_blocks() {
        let payload: Vec<u8> = (0..5000u32).map(|v| (v % 251) as u8).collect();
        let bytes = build_rscc(CompressionMode::Deflate, &payload, 1024);
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let out = try_decompress(&mut reader).unwrap().unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn non_matching_magic_rewinds_and_returns_none() {
        let bytes = b"RSRC".to_vec();
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let result = try_decompress(&mut reader).unwrap();
        assert!(result.is_none());
        assert_eq!(reader.position().unwrap(), 0);
    }
}
