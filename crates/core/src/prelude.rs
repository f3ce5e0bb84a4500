//! Convenient re-exports of commonly used data types, designed to make crate usage painless.
//!
//! For example, when working with [`DataCursor`], you have to explicitly refer to [`data::Error`].
//!
//! The contents of this module can be used by including the following in any module:
//! ```
//! use pakrat_core::prelude::*;
//! ```

#[doc(inline)]
pub use crate::data::{
    DataCursor, DataCursorMut, DataCursorRef, DataCursorTrait, Endian, EndianRead, EndianWrite,
    SeekFrom,
};
pub use crate::cancel::Cancellation;
#[cfg(feature = "std")]
pub use crate::identify::*;
#[cfg(feature = "std")]
pub use crate::stream::{ByteReader, ByteWriter, ReadExt, SeekExt};

/// Contains [`data::Error`], which is used in Results returned by [`DataCursor`]
pub mod data {
    pub use crate::data::Error;
}

#[cfg(feature = "hash")]
pub mod hash {
    pub use crate::hash::*;
}

#[cfg(all(feature = "time", feature = "std"))]
pub mod time {
    pub use crate::time::*;
}

pub mod util {
    pub use crate::util::format_size;
}
