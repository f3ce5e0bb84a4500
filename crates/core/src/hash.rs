//! A small streaming-hash contract, decoupled from any one implementation.
//!
//! Every format in this workspace that needs integrity checking (PCK entry checksums, the
//! encrypted-stream check value) wants the same three-call shape: start, feed bytes as they
//! become available, finish. Depending on the call site that's a whole file read through a
//! [`BufReader`](std::io::BufReader), or the output of an in-progress decrypt. Exposing the
//! contract as a trait keeps the hashing algorithm swappable without touching call sites, and
//! keeps `md-5` an implementation detail behind the `hash` feature instead of a hard dependency of
//! every crate that streams a file.

/// A streaming digest that can be fed incrementally and finalized once.
pub trait Digest {
    /// The finalized digest's byte representation.
    type Output: AsRef<[u8]>;

    /// Starts a new digest computation.
    fn start() -> Self;

    /// Feeds more bytes into the digest.
    fn update(&mut self, bytes: &[u8]);

    /// Consumes the digest, returning the finalized output.
    fn finish(self) -> Self::Output;
}

#[cfg(feature = "hash")]
mod md5_impl {
    use md5::{Digest as _, Md5 as Inner};

    use super::Digest;

    /// Streaming MD5, as used for PCK entry checksums and the legacy encrypted-stream check value.
    #[derive(Default)]
    pub struct Md5(Inner);

    impl Digest for Md5 {
        type Output = [u8; 16];

        #[inline]
        fn start() -> Self {
            Self(Inner::new())
        }

        #[inline]
        fn update(&mut self, bytes: &[u8]) {
            self.0.update(bytes);
        }

        #[inline]
        fn finish(self) -> [u8; 16] {
            self.0.finalize().into()
        }
    }

    /// Convenience one-shot helper for callers that already have the full buffer in memory.
    #[must_use]
    pub fn md5(bytes: &[u8]) -> [u8; 16] {
        let mut digest = Md5::start();
        digest.update(bytes);
        digest.finish()
    }
}

#[cfg(feature = "hash")]
pub use md5_impl::{md5, Md5};
