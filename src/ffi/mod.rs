// In: src/ffi/mod.rs

//! Foreign surfaces over `bridge::handle_api`.
//!
//! `capi` is always built (the crate ships as a `cdylib`). `python` is compiled only
//! with the `python` feature.

pub mod capi;

#[cfg(feature = "python")]
pub mod python;
