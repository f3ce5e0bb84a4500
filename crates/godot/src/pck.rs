//! §4.1 — the `.pck` archive reader.
//!
//! Parses the directory of a Godot package: a standalone `.pck`, or one appended to the tail of a
//! self-contained executable export. Entry bodies are streamed out on demand through [`open_entry`](ArchiveHandle::open_entry)
//! rather than loaded up front, since packages range from a few kilobytes to tens of gigabytes.

use std::io::{Read, Seek, SeekFrom as IoSeekFrom, Take};
use std::sync::Arc;

use pakrat_core::cancel::Cancellation;
use pakrat_core::data::Endian;
use pakrat_core::hash::{Digest, Md5};
use pakrat_core::stream::{ByteReader, ReadExt, SeekExt};

use crate::crypto::{EncryptedStream, Key};
use crate::error::{corrupt, Error, Result};

const MAGIC: [u8; 4] = *b"GDPC";
const MAX_FORMAT_VERSION: u32 = 2;
const DIRECTORY_ENCRYPTED_FLAG: u32 = 1 << 0;
const FILE_ENCRYPTED_FLAG: u32 = 1 << 0;

/// Header fields common to every entry in an open archive.
#[derive(Clone, Debug)]
pub struct ArchiveInfo {
    pub format_version: u32,
    pub engine_major: u32,
    pub engine_minor: u32,
    pub engine_patch: u32,
    pub pack_flags: u32,
    pub file_base: u64,
    pub directory_encrypted: bool,
    pub file_count: u32,
}

/// One file recorded in a package's directory.
#[derive(Clone, Debug)]
pub struct PackEntry {
    /// The archive this entry came from, for diagnostics spanning multiple open packages.
    pub pack_path: Arc<str>,
    /// The path exactly as stored on disk, before sanitization.
    pub raw_path: String,
    /// The sanitized `res://…` path, safe to use as a filesystem-relative path.
    pub resource_path: String,
    /// Set if sanitization had to rewrite anything in `raw_path`.
    pub malformed: bool,
    pub offset: u64,
    pub size: u64,
    pub md5: [u8; 16],
    pub encrypted: bool,
    /// Populated by [`ArchiveHandle::verify_entry`]; `None` until then.
    pub checksum_ok: Option<bool>,
}

/// An open `.pck` archive: parsed directory plus a handle to stream entry bodies from.
pub struct ArchiveHandle<R> {
    reader: ByteReader<R>,
    path: Arc<str>,
    info: ArchiveInfo,
    entries: Vec<PackEntry>,
    key: Option<Key>,
}

impl<R: Read + Seek> ArchiveHandle<R> {
    /// Opens an archive from any seekable byte source, which may be a standalone `.pck` or an
    /// executable with one appended to its tail.
    pub fn open(inner: R, path: impl Into<Arc<str>>, key: Option<Key>) -> Result<Self> {
        Self::open_cancellable(inner, path, key, None)
    }

    /// Like [`open`](Self::open), but consults `cancellation` every
    /// [`Cancellation::CHECK_INTERVAL`] directory entries (§5), so scanning a multi-gigabyte
    /// archive's directory from a worker thread can be aborted without waiting for it to finish.
    ///
    /// # Errors
    /// [`Error::Cancelled`] if `cancellation` is observed cancelled mid-scan.
    pub fn open_cancellable(
        inner: R,
        path: impl Into<Arc<str>>,
        key: Option<Key>,
        cancellation: Option<&Cancellation>,
    ) -> Result<Self> {
        let path: Arc<str> = path.into();
        let mut reader = ByteReader::new(inner, Endian::Little);
        let header_start = find_header_start(&mut reader)?;
        log::debug!("found PCK header for {path} at offset {header_start:#x}");
        reader.set_position(header_start)?;

        let magic: [u8; 4] = ReadExt::read_exact(&mut reader)?;
        if magic != MAGIC {
            return Err(Error::BadMagic { expected: MAGIC, found: magic });
        }

        let format_version = reader.read_u32()?;
        if format_version == 0 || format_version > MAX_FORMAT_VERSION {
            return Err(Error::UnsupportedVersion { version: format_version, maximum: MAX_FORMAT_VERSION });
        }
        let engine_major = reader.read_u32()?;
        let engine_minor = reader.read_u32()?;
        let engine_patch = reader.read_u32()?;
        let (pack_flags, file_base) =
            if format_version == 2 { (reader.read_u32()?, reader.read_u64()?) } else { (0, 0) };
        let directory_encrypted = pack_flags & DIRECTORY_ENCRYPTED_FLAG != 0;

        for _ in 0..16 {
            reader.read_u32()?;
        }
        let file_count = reader.read_u32()?;

        let entries = if directory_encrypted {
            log::info!("directory for {path} is encrypted, decrypting {file_count} entries");
            let key = key.ok_or(Error::MissingKey)?;
            let mut decryptor = crate::crypto::DirectoryDecryptor::new(&mut reader, &key)?;
            read_entries(&mut decryptor, format_version, file_base, file_count, &path, cancellation)?
        } else {
            read_entries(&mut reader, format_version, file_base, file_count, &path, cancellation)?
        };

        let info = ArchiveInfo {
            format_version,
            engine_major,
            engine_minor,
            engine_patch,
            pack_flags,
            file_base,
            directory_encrypted,
            file_count,
        };

        Ok(Self { reader, path, info, entries, key })
    }

    #[must_use]
    pub fn info(&self) -> &ArchiveInfo {
        &self.info
    }

    #[must_use]
    pub fn entries(&self) -> &[PackEntry] {
        &self.entries
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Opens a stream over entry `index`'s body, decrypting it if the per-file flag is set.
    pub fn open_entry(&mut self, index: usize) -> Result<EntryReader<'_, R>> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| corrupt("pck directory", format!("entry index {index} out of range")))?;
        let offset = entry.offset;
        let size = entry.size;
        let encrypted = entry.encrypted;

        self.reader.set_position(offset)?;
        let bounded = (&mut self.reader).take(size);
        if encrypted {
            let key = self.key.ok_or(Error::MissingKey)?;
            Ok(EntryReader::Encrypted(EncryptedStream::new(bounded, key)))
        } else {
            Ok(EntryReader::Plain(bounded))
        }
    }

    /// Streams entry `index`'s body through MD5 and records whether it matches the stored digest.
    ///
    /// A zero-filled stored digest means "unset" (common for packs built without checksums) and is
    /// always treated as passing. Re-opening an encrypted entry already verifies the MAC; a
    /// mismatch there surfaces as [`Error::BadMac`] rather than a `false` result.
    pub fn verify_entry(&mut self, index: usize) -> Result<bool> {
        self.verify_entry_cancellable(index, None)
    }

    /// Like [`verify_entry`](Self::verify_entry), but consults `cancellation` every
    /// [`Cancellation::CHECK_INTERVAL`] chunks read (§5), so checksumming a very large entry can be
    /// aborted mid-stream.
    ///
    /// # Errors
    /// [`Error::Cancelled`] if `cancellation` is observed cancelled mid-pass.
    pub fn verify_entry_cancellable(&mut self, index: usize, cancellation: Option<&Cancellation>) -> Result<bool> {
        let stored = self
            .entries
            .get(index)
            .ok_or_else(|| corrupt("pck directory", format!("entry index {index} out of range")))?
            .md5;
        if stored == [0u8; 16] {
            self.entries[index].checksum_ok = Some(true);
            return Ok(true);
        }

        let ok = {
            let mut reader = self.open_entry(index)?;
            let mut digest = Md5::start();
            let mut buf = [0u8; 32 * 1024];
            let mut chunk = 0usize;
            loop {
                if chunk % Cancellation::CHECK_INTERVAL == 0 {
                    if let Some(cancellation) = cancellation {
                        if cancellation.is_cancelled() {
                            return Err(Error::Cancelled);
                        }
                    }
                }
                let read = reader.read(&mut buf)?;
                if read == 0 {
                    break;
                }
                digest.update(&buf[..read]);
                chunk += 1;
            }
            digest.finish() == stored
        };
        if !ok {
            log::warn!("MD5 mismatch for {}", self.entries[index].pack_path);
        }
        self.entries[index].checksum_ok = Some(ok);
        Ok(ok)
    }
}

/// A bounded, possibly-decrypted view over one entry's body.
pub enum EntryReader<'a, R> {
    Plain(Take<&'a mut ByteReader<R>>),
    Encrypted(EncryptedStream<Take<&'a mut ByteReader<R>>>),
}

impl<R: Read + Seek> Read for EntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Encrypted(r) => r.read(buf),
        }
    }
}

/// Locates the start of the `GDPC` header: offset 0 for a standalone package, or the start of the
/// appended blob for a self-contained executable export.
fn find_header_start<R: Read + Seek>(reader: &mut R) -> Result<u64> {
    let mut magic = [0u8; 4];
    reader.seek(IoSeekFrom::Start(0))?;
    reader.read_exact(&mut magic)?;
    if magic == MAGIC {
        return Ok(0);
    }

    let end = reader.seek(IoSeekFrom::End(0))?;
    if end < 4 {
        return Err(Error::BadMagic { expected: MAGIC, found: magic });
    }
    reader.seek(IoSeekFrom::Start(end - 4))?;
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(Error::BadMagic { expected: MAGIC, found: magic });
    }

    if end < 12 {
        return Err(corrupt("pck trailer", "file too short to contain an embedded-pack footer"));
    }
    reader.seek(IoSeekFrom::Start(end - 12))?;
    let mut size_bytes = [0u8; 8];
    reader.read_exact(&mut size_bytes)?;
    let data_size = u64::from_le_bytes(size_bytes);

    let header_start = end
        .checked_sub(data_size + 12)
        .ok_or_else(|| corrupt("pck trailer", "embedded pack size exceeds file size"))?;
    reader.seek(IoSeekFrom::Start(header_start))?;
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(Error::BadMagic { expected: MAGIC, found: magic });
    }
    Ok(header_start)
}

fn read_u32_le(reader: &mut impl Read) -> Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64_le(reader: &mut impl Read) -> Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

fn read_entries(
    reader: &mut impl Read,
    format_version: u32,
    file_base: u64,
    file_count: u32,
    pack_path: &Arc<str>,
    cancellation: Option<&Cancellation>,
) -> Result<Vec<PackEntry>> {
    let mut entries = Vec::with_capacity((file_count as usize).min(4096));
    for index in 0..file_count {
        if index as usize % Cancellation::CHECK_INTERVAL == 0 {
            if let Some(cancellation) = cancellation {
                if cancellation.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }
        }
        let path_len = read_u32_le(reader)? as usize;
        let mut path_bytes = vec![0u8; path_len];
        reader.read_exact(&mut path_bytes)?;
        let raw_path = String::from_utf8(path_bytes)
            .map_err(|_| corrupt("pck directory entry", "path is not valid UTF-8"))?;

        let offset = file_base + read_u64_le(reader)?;
        let size = read_u64_le(reader)?;
        let mut md5 = [0u8; 16];
        reader.read_exact(&mut md5)?;
        let entry_flags = if format_version == 2 { read_u32_le(reader)? } else { 0 };
        let encrypted = entry_flags & FILE_ENCRYPTED_FLAG != 0;

        let (resource_path, malformed) = sanitize_path(&raw_path);
        entries.push(PackEntry {
            pack_path: pack_path.clone(),
            raw_path,
            resource_path,
            malformed,
            offset,
            size,
            md5,
            encrypted,
            checksum_ok: None,
        });
    }
    Ok(entries)
}

/// Applies the fixed rewrite rules used to turn a stored path into a safe `res://…` path.
///
/// Returns the sanitized path and whether anything was rewritten. Idempotent: re-sanitizing the
/// result is always a no-op, since every rule either runs to a fixed point or substitutes a
/// character (`_`) that can't itself match an earlier rule.
#[must_use]
pub fn sanitize_path(raw_path: &str) -> (String, bool) {
    let mut malformed = false;
    let (prefix, mut path) = if let Some(rest) = raw_path.strip_prefix("res://") {
        ("res://", rest.to_string())
    } else if let Some(rest) = raw_path.strip_prefix("local://") {
        ("local://", rest.to_string())
    } else {
        ("", raw_path.to_string())
    };

    while let Some(rest) = path.strip_prefix('~') {
        path = rest.to_string();
        malformed = true;
    }
    while let Some(rest) = path.strip_prefix('/') {
        path = rest.to_string();
        malformed = true;
    }
    while path.contains("...") {
        path = path.replace("...", "_");
        malformed = true;
    }
    while path.contains("..") {
        path = path.replace("..", "_");
        malformed = true;
    }
    while path.contains("./") {
        path = path.replace("./", "_");
        malformed = true;
    }
    while path.contains("//") {
        path = path.replace("//", "_");
        malformed = true;
    }
    for needle in ["\\", ":", "|", "?", ">", "<", "*", "\"", "'"] {
        if path.contains(needle) {
            path = path.replace(needle, "_");
            malformed = true;
        }
    }

    (format!("{prefix}{path}"), malformed)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn push_entry(buf: &mut Vec<u8>, path: &str, offset: u64, size: u64, md5: [u8; 16], flags: u32) {
        buf.extend_from_slice(&(path.len() as u32).to_le_bytes());
        buf.extend_from_slice(path.as_bytes());
        buf.extend_from_slice(&offset.to_le_bytes());
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&md5);
        buf.extend_from_slice(&flags.to_le_bytes());
    }

    fn minimal_v2_header(pack_flags: u32, file_base: u64, file_count: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&2u32.to_le_bytes()); // format_version
        buf.extend_from_slice(&4u32.to_le_bytes()); // engine_major
        buf.extend_from_slice(&2u32.to_le_bytes()); // engine_minor
        buf.extend_from_slice(&0u32.to_le_bytes()); // engine_patch
        buf.extend_from_slice(&pack_flags.to_le_bytes());
        buf.extend_from_slice(&file_base.to_le_bytes());
        for _ in 0..16 {
            buf.extend_from_slice(&0u32.to_le_bytes());
        }
        buf.extend_from_slice(&file_count.to_le_bytes());
        buf
    }

    #[test]
    fn s2_pck_v2_minimal() {
        let body = b"hello";
        let md5 = pakrat_core::hash::md5(body);

        let mut buf = minimal_v2_header(0, 0, 1);
        let body_offset = (buf.len() + 4 + 11 + 8 + 8 + 16 + 4) as u64;
        push_entry(&mut buf, "res://a.txt", body_offset, body.len() as u64, md5, 0);
        buf.extend_from_slice(body);

        let mut archive = ArchiveHandle::open(Cursor::new(buf), "test.pck", None).unwrap();
        assert_eq!(archive.entries().len(), 1);
        assert_eq!(archive.entries()[0].resource_path, "res://a.txt");
        assert_eq!(archive.entries()[0].size, 5);

        let mut out = Vec::new();
        archive.open_entry(0).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, body);
        assert!(archive.verify_entry(0).unwrap());
    }

    #[test]
    fn s3_encrypted_entry_round_trips_with_correct_key_and_fails_with_wrong_key() {
        use cipher::{KeyIvInit, StreamCipherEncrypt};

        let mut key_bytes = [0u8; 32];
        for (i, b) in key_bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let key = Key::new(key_bytes);

        let plaintext = b"hello";
        let iv = [0x11u8; 16];
        let mut ciphertext = plaintext.to_vec();
        let mut cipher = cfb_mode::Encryptor::<aes::Aes256>::new((&key_bytes).into(), (&iv).into());
        cipher.encrypt(&mut ciphertext);

        let mut digest = Md5::start();
        digest.update(plaintext);
        let mac = digest.finish();

        let mut envelope = Vec::new();
        envelope.extend_from_slice(&mac);
        envelope.extend_from_slice(&iv);
        envelope.extend_from_slice(&ciphertext);

        let mut buf = minimal_v2_header(0, 0, 1);
        let body_offset = (buf.len() + 4 + 11 + 8 + 8 + 16 + 4) as u64;
        push_entry(&mut buf, "res://a.txt", body_offset, envelope.len() as u64, [0u8; 16], 1);
        buf.extend_from_slice(&envelope);

        let mut archive = ArchiveHandle::open(Cursor::new(buf.clone()), "test.pck", Some(key)).unwrap();
        let mut out = Vec::new();
        archive.open_entry(0).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, plaintext);

        let mut wrong_bytes = key_bytes;
        wrong_bytes[0] ^= 0xff;
        let mut bad_archive =
            ArchiveHandle::open(Cursor::new(buf), "test.pck", Some(Key::new(wrong_bytes))).unwrap();
        let mut sink = Vec::new();
        let err = bad_archive.open_entry(0).unwrap().read_to_end(&mut sink);
        assert!(err.is_err());
    }

    #[test]
    fn sanitize_path_is_idempotent_and_strips_forbidden_characters() {
        let cases = ["res://~/../../etc/passwd", "res://a//b\\c:d|e?f>g<h*i\"j'k", "res://plain/path.tres"];
        for raw in cases {
            let (once, _) = sanitize_path(raw);
            let (twice, _) = sanitize_path(&once);
            assert_eq!(once, twice);
            for forbidden in ['\\', ':', '|', '?', '>', '<', '*', '"', '\''] {
                assert!(!once.contains(forbidden));
            }
            assert!(!once.contains(".."));
        }
    }

    #[test]
    fn embedded_at_end_layout_is_located() {
        let header = minimal_v2_header(0, 0, 0);
        let mut exe = vec![0u8; 64]; // fake executable preamble
        exe.extend_from_slice(&header);
        let data_size = header.len() as u64;
        exe.extend_from_slice(&data_size.to_le_bytes());
        exe.extend_from_slice(&MAGIC);

        let archive = ArchiveHandle::open(Cursor::new(exe), "game.exe", None).unwrap();
        assert_eq!(archive.info().format_version, 2);
        assert_eq!(archive.entries().len(), 0);
    }

    #[test]
    fn zero_md5_is_treated_as_unset() {
        let body = b"hello";
        let mut buf = minimal_v2_header(0, 0, 1);
        let body_offset = (buf.len() + 4 + 11 + 8 + 8 + 16 + 4) as u64;
        push_entry(&mut buf, "res://a.txt", body_offset, body.len() as u64, [0u8; 16], 0);
        buf.extend_from_slice(body);

        let mut archive = ArchiveHandle::open(Cursor::new(buf), "test.pck", None).unwrap();
        assert!(archive.verify_entry(0).unwrap());
    }

    #[test]
    fn encrypted_directory_is_parsed_and_bodies_stay_readable() {
        use cipher::{KeyIvInit, StreamCipherEncrypt};

        let mut key_bytes = [0u8; 32];
        for (i, b) in key_bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let key = Key::new(key_bytes);

        let body = b"hello";
        let md5 = pakrat_core::hash::md5(body);
        let header_len = 104; // MAGIC+version fields+pack_flags+file_base+reserved+file_count
        let entry_len = 4 + 11 + 8 + 8 + 16 + 4;
        let envelope_overhead = 16 + 16; // MAC + IV prefix on the encrypted directory blob
        let body_offset = (header_len + envelope_overhead + entry_len) as u64;

        let mut directory = Vec::new();
        push_entry(&mut directory, "res://a.txt", body_offset, body.len() as u64, md5, 0);

        let mac = {
            let mut digest = Md5::start();
            digest.update(&directory);
            digest.finish()
        };
        let iv = [0x77u8; 16];
        let mut ciphertext = directory.clone();
        let mut cipher = cfb_mode::Encryptor::<aes::Aes256>::new((&key_bytes).into(), (&iv).into());
        cipher.encrypt(&mut ciphertext);

        let mut buf = minimal_v2_header(1, 0, 1); // pack_flags bit 0 = directory encrypted
        buf.extend_from_slice(&mac);
        buf.extend_from_slice(&iv);
        buf.extend_from_slice(&ciphertext);
        buf.extend_from_slice(body);

        let mut archive = ArchiveHandle::open(Cursor::new(buf), "test.pck", Some(key)).unwrap();
        assert!(archive.info().directory_encrypted);
        assert_eq!(archive.entries()[0].resource_path, "res://a.txt");

        let mut out = Vec::new();
        archive.open_entry(0).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, body);
    }
}
