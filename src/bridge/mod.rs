// In: src/bridge/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Bridge Layer
// ====================================================================================
//
// The `bridge` sits between foreign callers and the pure `pipeline` engine. The
// engine knows nothing about handles or caller-owned buffers; the bridge owns both.
//
// Call Flow (any boundary operation):
//
//   1. [Surface (ffi::capi / ffi::python)] -> Receives raw pointers or Python objects
//         |
//         `-> converts them into slices / &str, nothing else
//
//   2. [Handle API (handle_api)]           -> Receives `u64` handle + safe arguments
//         |
//         `-> a. Resolves the handle through `registry::pipelines()` -> `Arc<Pipeline>`
//         |
//         `-> b. Calls the engine, which returns owned values or `Result`
//         |
//         `-> c. Copies results out through `negotiation` (size-query-then-fill)
//
//   3. [Pipeline Engine (pipeline::core)]  -> Locks, moves, reads, applies
//
// Errors stop at step 1: the surfaces fold `StagepipeError` into booleans, sentinel
// ids and sentinel lengths after logging it.
//
// ====================================================================================
pub mod handle_api;
pub mod negotiation;
pub mod registry;

pub use handle_api::FloatVecRead;
pub use negotiation::Negotiated;
pub use registry::{pipelines, HandleRegistry};

#[cfg(test)]
mod tests;
