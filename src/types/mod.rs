//! This module defines the core, strongly-typed data representations tracked by the
//! pipeline: bounding boxes, attributes, objects, frames and batches.
//!
//! These are plain owned values with no locking of their own; the pipeline wraps
//! frames in per-entity locks when it stores them.

pub mod attribute;
pub mod batch;
pub mod bbox;
pub mod frame;
pub mod object;

// Re-export the main type(s) for easier access.
pub use attribute::{Attribute, AttributeStore, AttributeValue, AttributeValueKind};
pub use batch::FrameBatch;
pub use bbox::{BoundingBox, TrackingInfo};
pub use frame::VideoFrame;
pub use object::{ObjectTextField, VideoObject};
