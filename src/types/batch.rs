//! A batch: frames packed together for a bulk stage transition.
//!
//! The batch only records membership. Frame data stays in the pipeline's frame
//! table, so objects of a batched frame remain addressable by frame id.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FrameBatch {
    pub id: i64,
    /// Member frame ids in pack order.
    frames: Vec<i64>,
}

impl FrameBatch {
    pub(crate) fn new(id: i64, frames: Vec<i64>) -> Self {
        Self { id, frames }
    }

    pub fn frames(&self) -> &[i64] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, frame_id: i64) -> bool {
        self.frames.contains(&frame_id)
    }

    pub(crate) fn into_frames(self) -> Vec<i64> {
        self.frames
    }
}
