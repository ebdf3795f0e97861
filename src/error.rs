// In: src/error.rs

//! This module defines the single, unified error type for the entire stagepipe library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.
//!
//! Nothing in here ever crosses the C boundary: `ffi::capi` folds every error into a
//! boolean, a sentinel id or a sentinel length before returning to the caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagepipeError {
    // =========================================================================
    // === Stage Graph Errors
    // =========================================================================
    #[error("Stage not found: '{0}'")]
    StageNotFound(String),

    #[error("Stage '{0}' is declared more than once")]
    DuplicateStage(String),

    #[error("Stage '{stage}' holds {expected:?} payloads, got {actual:?}")]
    StageTypeMismatch {
        stage: String,
        expected: crate::pipeline::StagePayloadType,
        actual: crate::pipeline::StagePayloadType,
    },

    // =========================================================================
    // === Identity Errors
    // =========================================================================
    #[error("Unknown frame or batch id: {0}")]
    UnknownId(i64),

    #[error("Id {0} is not an independent frame")]
    NotAnIndependentFrame(i64),

    #[error("Id {0} is not a batch")]
    NotABatch(i64),

    #[error("Frame {frame_id} is not a member of batch {batch_id}")]
    NotInBatch { batch_id: i64, frame_id: i64 },

    #[error("Frame id {0} appears more than once in a pack request")]
    DuplicateFrameId(i64),

    #[error("Cannot pack an empty list of frames into a batch")]
    EmptyBatch,

    // =========================================================================
    // === Object & Attribute Errors (raised while applying updates)
    // =========================================================================
    #[error("Object {object_id} not found in frame {frame_id}")]
    ObjectNotFound { frame_id: i64, object_id: i64 },

    #[error("Object id {object_id} already exists in frame {frame_id}")]
    ObjectIdCollision { frame_id: i64, object_id: i64 },

    #[error("Frame {frame_id} has no object id left to assign")]
    ObjectIdExhausted { frame_id: i64 },

    #[error("Text of object {object_id} contains a NUL byte")]
    InteriorNul { object_id: i64 },

    #[error("Attribute ({namespace}, {name}) already exists")]
    AttributeCollision { namespace: String, name: String },

    #[error("Applying updates to id {id} failed: {source}")]
    UpdateFailed {
        id: i64,
        #[source]
        source: Box<StagepipeError>,
    },

    // =========================================================================
    // === Configuration & Serialization
    // =========================================================================
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// An error from the Serde JSON library, typically during config or frame ingestion.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error for FFI (Foreign Function Interface) operations.
    #[error("FFI operation failed: {0}")]
    FfiError(String),
}

pub type Result<T> = std::result::Result<T, StagepipeError>;

// =============================================================================
// === Manual `From` Implementations ===
// =============================================================================

#[cfg(feature = "python")]
impl From<pyo3::PyErr> for StagepipeError {
    fn from(err: pyo3::PyErr) -> Self {
        StagepipeError::FfiError(err.to_string())
    }
}

#[cfg(feature = "python")]
impl From<StagepipeError> for pyo3::PyErr {
    fn from(err: StagepipeError) -> pyo3::PyErr {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}
