//! This file is the root of the `stagepipe` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of our library (`pipeline`, `bridge`, etc.)
//!     so the Rust compiler knows they exist.
//! 2.  Re-exporting the types most callers need.
//! 3.  Defining the `#[pymodule]` (behind the `python` feature) which acts as the main
//!     entry point when the compiled library is imported into Python.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
mod observability; // Make macros available throughout the crate

pub mod bridge;
pub mod config;
pub mod error;
pub mod ffi;
pub mod pipeline;
pub mod types;

pub use config::{MissingIdPolicy, PipelineConfig, StageConfig};
pub use error::{Result, StagepipeError};
pub use observability::{init_logging, parse_level};
pub use pipeline::{
    AttributeUpdatePolicy, FrameUpdate, ObjectUpdatePolicy, Pipeline, StagePayloadType,
    UpdateCommand,
};

//==================================================================================
// 2. Python Module Definition
//==================================================================================
#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The `stagepipe` Python module, containing all exposed Rust functions.
#[cfg(feature = "python")]
#[pymodule]
fn stagepipe(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::python::PyPipeline>()?;

    m.add_function(wrap_pyfunction!(ffi::python::check_version_py, m)?)?;
    m.add_function(wrap_pyfunction!(ffi::python::enable_verbose_logging_py, m)?)?;

    // --- Expose the custom error type ---
    m.add(
        "StagepipeError",
        m.py().get_type_bound::<pyo3::exceptions::PyValueError>(),
    )?;

    // --- Expose version string as a module attribute ---
    m.add("__version__", VERSION)?;

    Ok(())
}
