//! Convenient re-exports of commonly used data types, designed to make crate usage painless.
//!
//! The contents of this module can be used by including the following in any module:
//! ```ignore
//! use pakrat_godot::prelude::*;
//! ```

#[doc(inline)]
pub use crate::engine::EngineGeneration;
#[doc(inline)]
pub use crate::error::Error;
#[doc(inline)]
pub use crate::identify::identify_any;
#[doc(inline)]
pub use crate::pck::{ArchiveHandle, ArchiveInfo, PackEntry};
#[doc(inline)]
pub use crate::resource::{LoadPolicy, ResourceGraph, ResourceResolver};
#[doc(inline)]
pub use crate::variant::Variant;

pub mod pck {
    #[doc(inline)]
    pub use crate::error::Error;
}
