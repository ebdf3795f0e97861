// In: src/pipeline/mod.rs

//! The pipeline engine.
//!
//! - `stage`: named graph nodes and their payload types.
//! - `update`: deferred frame mutations and the per-identity queue holding them.
//! - `core`: the `Pipeline` itself, which owns the stage graph, moves frames and
//!   batches between stages, and serves the object accessors.

pub mod core;
pub mod stage;
pub mod update;

pub use self::core::{Location, Pipeline, PipelineStats, UnpackOutcome};
pub use self::stage::{Stage, StagePayloadType};
pub use self::update::{
    AttributeUpdatePolicy, FrameUpdate, ObjectUpdatePolicy, PendingUpdate, UpdateCommand,
    UpdateQueue,
};

#[cfg(test)]
mod pipeline_tests;
