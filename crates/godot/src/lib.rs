//! This crate contains modules for [PakRat](https://crates.io/crates/pakrat) that add support for
//! reverse-engineering Godot game archives: the `.pck` package format, the polymorphic `Variant`
//! encoding, binary and text resource files, project configuration, and GDScript bytecode.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
mod no_std {
    extern crate alloc;
    pub use alloc::{boxed::Box, format, vec};
}

pub mod compression;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod fake;
pub mod gdscript;
pub mod identify;
pub mod legacy;
pub mod math;
pub mod pck;
pub mod project;
pub mod resource;
pub mod text;
pub mod variant;

pub mod prelude;
