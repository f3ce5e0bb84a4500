//! The error taxonomy shared by every codec in this crate.
//!
//! Godot's file formats are all built from the same few primitives (Variant, string pool, magic +
//! version header), so a single flat `Error` enum for the whole crate reads better than one per
//! module — a caller doing `match err` doesn't have to care whether a `CorruptData` came from the
//! PCK directory or a Variant inside a resource body. Every variant that can be attributed to a
//! location in the input carries a `breadcrumb` describing where (see [`Error::CorruptData`]).

use pakrat_core::data::Error as DataError;
use snafu::prelude::*;

/// Errors produced while reading or writing any Godot archive, resource, or bytecode format.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// Wraps a filesystem failure.
    #[cfg(feature = "std")]
    #[snafu(display("Filesystem error: {source}"))]
    FileError { source: std::io::Error },

    /// Thrown if reading tries to go past the end of the current stream.
    #[snafu(display("Reached the end of the current stream!"))]
    EndOfFile,

    /// Thrown when a header or footer magic number doesn't match what was expected.
    #[snafu(display("Invalid magic number! Expected {expected:?}, found {found:?}."))]
    BadMagic { expected: [u8; 4], found: [u8; 4] },

    /// Thrown when a format version is newer than anything this crate understands.
    #[snafu(display("Unsupported format version {version} (maximum supported is {maximum})."))]
    UnsupportedVersion { version: u32, maximum: u32 },

    /// Thrown when a bytecode revision isn't registered in the [`RevisionTable`](crate::gdscript::RevisionTable).
    #[snafu(display("Unknown bytecode revision {revision:#010x}."))]
    UnknownRevision { revision: u32 },

    /// Catch-all for structurally invalid input: overrun lengths, unknown tags, dangling indices.
    #[snafu(display("Corrupt data at {breadcrumb}: {reason}"))]
    CorruptData { breadcrumb: String, reason: String },

    /// Thrown if UTF-8 validation fails when decoding a string.
    #[snafu(display("Invalid UTF-8 string at {breadcrumb}."))]
    BadUtf8 { breadcrumb: String },

    /// Thrown when Variant recursion exceeds the configured depth cap.
    #[snafu(display("Variant nesting exceeded the depth cap of {cap}."))]
    DepthExceeded { cap: usize },

    /// Thrown when an encrypted stream is opened without a key.
    #[snafu(display("This stream is encrypted and no key was supplied."))]
    MissingKey,

    /// Thrown when a supplied key fails to produce a valid stream (wrong key, or corrupt input).
    #[snafu(display("The supplied encryption key is incorrect, or the stream is corrupt."))]
    BadKey,

    /// Thrown when the check value embedded in an encrypted stream doesn't match the decrypted
    /// payload.
    #[snafu(display("MAC mismatch: the decrypted stream failed its integrity check."))]
    BadMac,

    /// Thrown for legacy image/audio encodings with no lossless modern equivalent, when running in
    /// strict mode (see [`LoadPolicy`](crate::resource::LoadPolicy)).
    #[snafu(display("Unsupported legacy format: {reason}"))]
    UnsupportedFormat { reason: String },

    /// Thrown when an external resource can't be resolved and the load policy demands it be fatal.
    #[snafu(display("Dependency missing: {path}"))]
    DependencyMissing { path: String },

    /// Thrown when a caller-supplied [`Cancellation`](pakrat_core::cancel::Cancellation) handle was
    /// observed cancelled mid-loop (§5: archive scans, MD5 passes, Variant array decode).
    #[snafu(display("Operation cancelled."))]
    Cancelled,
}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    #[inline]
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::EndOfFile,
            _ => Self::FileError { source: error },
        }
    }
}

impl From<DataError> for Error {
    #[inline]
    fn from(error: DataError) -> Self {
        match error {
            DataError::EndOfFile => Self::EndOfFile,
            DataError::InvalidUtf8 => Self::BadUtf8 { breadcrumb: String::from("<unknown>") },
            #[cfg(feature = "std")]
            DataError::Io { source } => Self::FileError { source },
            DataError::InvalidSize => Self::CorruptData {
                breadcrumb: String::from("<unknown>"),
                reason: String::from("invalid cursor resize"),
            },
        }
    }
}

pub(crate) type Result<T> = core::result::Result<T, Error>;

/// Builds a `CorruptData` error with a short structural breadcrumb, e.g.
/// `corrupt("resource #3 · property 'transform'", "NodePath subname index out of range")`.
#[inline]
pub(crate) fn corrupt(breadcrumb: impl Into<String>, reason: impl Into<String>) -> Error {
    Error::CorruptData { breadcrumb: breadcrumb.into(), reason: reason.into() }
}
