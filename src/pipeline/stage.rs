//! A named node of the stage graph and the ids currently resident in it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a stage may hold.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StagePayloadType {
    /// Independent frames.
    Frame,
    /// Batches of frames.
    Batch,
}

#[derive(Debug, Clone)]
pub struct Stage {
    name: String,
    payload: StagePayloadType,
    /// Resident ids. Ordered so that "move everything" walks them in allocation order.
    resident: BTreeSet<i64>,
}

impl Stage {
    pub(crate) fn new(name: &str, payload: StagePayloadType) -> Self {
        Self {
            name: name.to_owned(),
            payload,
            resident: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> StagePayloadType {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.resident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resident.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.resident.contains(&id)
    }

    pub fn ids(&self) -> Vec<i64> {
        self.resident.iter().copied().collect()
    }

    pub(crate) fn insert(&mut self, id: i64) {
        self.resident.insert(id);
    }

    pub(crate) fn remove(&mut self, id: i64) -> bool {
        self.resident.remove(&id)
    }
}
