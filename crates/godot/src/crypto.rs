//! §4.7 encryption transport.
//!
//! Encrypted directories and entries are wrapped in the same envelope: a 16-byte MD5 check value
//! (called the MAC here, though it's really just a content hash — Godot's own name for it), a
//! 16-byte IV, then the AES-256-CFB ciphertext. The key is caller-supplied; this crate never reads
//! it from environment, argv, or a config file, since that's a policy decision that belongs to
//! whatever sits above the core (see [`KeyScope`] for the one case where the core needs to thread a
//! key through a call path it doesn't otherwise own).

use std::cell::RefCell;
use std::io::Read;

use aes::Aes256;
use cfb_mode::Decryptor;
use cipher::{KeyIvInit, StreamCipherDecrypt};
use pakrat_core::hash::{Digest, Md5};

use crate::error::{Error, Result};

/// A 32-byte AES-256 key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Key([u8; 32]);

impl Key {
    /// Builds a key directly from 32 raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parses a key from a 64-character hex string, as used by `--key` CLI arguments and
    /// `res://project.binary`'s companion key files.
    #[must_use]
    pub fn from_hex(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(text, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl core::fmt::Debug for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Key(..)")
    }
}

thread_local! {
    static GLOBAL_KEY: RefCell<Option<Key>> = const { RefCell::new(None) };
}

/// A scoped installation of the global key, for legacy call paths that don't thread a [`Key`]
/// explicitly (the GDScript decompiler's `res://` re-import path is the one spot in this crate
/// that needs this). On drop, the previously-installed key (if any) is restored.
#[must_use = "the key is only installed for as long as this guard is alive"]
pub struct KeyScope {
    previous: Option<Key>,
}

impl KeyScope {
    /// Installs `key` as the current global key, returning a guard that restores whatever key was
    /// installed before on drop.
    pub fn install(key: Key) -> Self {
        let previous = GLOBAL_KEY.with(|cell| cell.replace(Some(key)));
        Self { previous }
    }
}

impl Drop for KeyScope {
    fn drop(&mut self) {
        GLOBAL_KEY.with(|cell| *cell.borrow_mut() = self.previous);
    }
}

/// Returns the currently-installed global key, if a [`KeyScope`] is active.
#[must_use]
pub fn current_key() -> Option<Key> {
    GLOBAL_KEY.with(|cell| *cell.borrow())
}

const MAC_LEN: usize = 16;
const IV_LEN: usize = 16;

/// Decrypts a full `MAC || IV || ciphertext` envelope and verifies the MAC.
///
/// Returns the plaintext on success. The MAC is an MD5 of the plaintext, so verification requires
/// decrypting the whole payload first — there's no way to stream-verify before the last chunk.
pub fn decrypt_envelope(envelope: &[u8], key: &Key) -> Result<Vec<u8>> {
    if envelope.len() < MAC_LEN + IV_LEN {
        return Err(Error::CorruptData {
            breadcrumb: String::from("encrypted envelope"),
            reason: String::from("too short to contain a MAC and IV"),
        });
    }
    let mac = &envelope[..MAC_LEN];
    let iv = &envelope[MAC_LEN..MAC_LEN + IV_LEN];
    let mut plaintext = envelope[MAC_LEN + IV_LEN..].to_vec();

    let mut cipher = Decryptor::<Aes256>::new(key.0.as_slice().into(), iv.into());
    cipher.decrypt(&mut plaintext);

    let mut digest = Md5::start();
    digest.update(&plaintext);
    if digest.finish().as_slice() != mac {
        return Err(Error::BadMac);
    }
    Ok(plaintext)
}

/// A reader over an encrypted stream that defers decryption until the first read.
///
/// Wraps an inner reader positioned at the start of a `MAC || IV || ciphertext` envelope. The
/// whole envelope is read and decrypted on first access; subsequent reads are served from the
/// decrypted buffer. This matches the "decrypt lazily" requirement without pretending the MAC
/// check can happen incrementally.
pub struct EncryptedStream<R> {
    inner: Option<R>,
    key: Key,
    plaintext: Option<std::io::Cursor<Vec<u8>>>,
}

impl<R: Read> EncryptedStream<R> {
    /// Wraps `inner`, which must be positioned at the start of the envelope.
    pub fn new(inner: R, key: Key) -> Self {
        Self { inner: Some(inner), key, plaintext: None }
    }

    fn ensure_decrypted(&mut self) -> Result<()> {
        if self.plaintext.is_some() {
            return Ok(());
        }
        let mut inner = self.inner.take().expect("ensure_decrypted called twice without inner");
        let mut envelope = Vec::new();
        inner.read_to_end(&mut envelope)?;
        let plaintext = decrypt_envelope(&envelope, &self.key)?;
        self.plaintext = Some(std::io::Cursor::new(plaintext));
        Ok(())
    }
}

impl<R: Read> Read for EncryptedStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.ensure_decrypted().map_err(std::io::Error::other)?;
        self.plaintext.as_mut().expect("decrypted above").read(buf)
    }
}

/// A streaming decryptor over an encrypted directory, whose total plaintext length isn't known
/// until every entry has been parsed out of it.
///
/// Unlike [`EncryptedStream`], this can't verify the MAC on construction — CFB is a stream cipher,
/// so bytes can be decrypted incrementally as the directory parser consumes them. The MAC is
/// deliberately not checked here; per-entry integrity is still covered by each entry's own MD5 (see
/// [`crate::pck::ArchiveHandle::verify_entry`]).
pub struct DirectoryDecryptor<R> {
    inner: R,
    cipher: Decryptor<Aes256>,
}

impl<R: Read> DirectoryDecryptor<R> {
    /// Wraps `inner`, which must be positioned at the start of the envelope's MAC.
    pub fn new(mut inner: R, key: &Key) -> Result<Self> {
        let mut mac_and_iv = [0u8; MAC_LEN + IV_LEN];
        inner.read_exact(&mut mac_and_iv)?;
        let iv = &mac_and_iv[MAC_LEN..];
        let cipher = Decryptor::<Aes256>::new(key.0.as_slice().into(), iv.into());
        Ok(Self { inner, cipher })
    }
}

impl<R: Read> Read for DirectoryDecryptor<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.cipher.decrypt(&mut buf[..read]);
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use cipher::StreamCipherEncrypt;

    use super::*;

    fn test_key() -> Key {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        Key(bytes)
    }

    fn encrypt_envelope(plaintext: &[u8], key: &Key, iv: [u8; 16]) -> Vec<u8> {
        let mut digest = Md5::start();
        digest.update(plaintext);
        let mac = digest.finish();

        let mut ciphertext = plaintext.to_vec();
        let mut cipher = cfb_mode::Encryptor::<Aes256>::new(key.0.as_slice().into(), (&iv).into());
        cipher.encrypt(&mut ciphertext);

        let mut envelope = Vec::with_capacity(32 + ciphertext.len());
        envelope.extend_from_slice(&mac);
        envelope.extend_from_slice(&iv);
        envelope.extend_from_slice(&ciphertext);
        envelope
    }

    #[test]
    fn round_trips_with_correct_key() {
        let key = test_key();
        let envelope = encrypt_envelope(b"hello", &key, [0x42; 16]);
        let plaintext = decrypt_envelope(&envelope, &key).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn wrong_key_raises_bad_mac() {
        let key = test_key();
        let envelope = encrypt_envelope(b"hello", &key, [0x42; 16]);
        let mut wrong = test_key();
        wrong.0[0] ^= 0xff;
        assert!(matches!(decrypt_envelope(&envelope, &wrong), Err(Error::BadMac)));
    }

    #[test]
    fn key_scope_restores_previous_on_drop() {
        assert!(current_key().is_none());
        {
            let _outer = KeyScope::install(test_key());
            assert!(current_key().is_some());
            {
                let mut inner_key = test_key();
                inner_key.0[0] = 0xaa;
                let _inner = KeyScope::install(inner_key);
                assert_eq!(current_key().unwrap().0[0], 0xaa);
            }
            assert_eq!(current_key().unwrap().0[0], 0);
        }
        assert!(current_key().is_none());
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(Key::from_hex("00").is_none());
        assert!(Key::from_hex(&"ab".repeat(32)).is_some());
    }
}
