// In: src/pipeline/update.rs

//! Deferred mutations and the queue that holds them until they are applied.
//!
//! A `FrameUpdate` is an explicit, ordered command list. Staging one never touches
//! live frame state; only `Pipeline::apply_updates` does, and it does so
//! transactionally (see `pipeline::core`).

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StagepipeError};
use crate::types::{Attribute, AttributeStore, BoundingBox, TrackingInfo, VideoFrame, VideoObject};

//==================================================================================
// I. Collision Policies
//==================================================================================

/// How `AddObject` treats an incoming object whose id already exists in the frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObjectUpdatePolicy {
    /// **Default:** the foreign object is added under the next free id.
    #[default]
    AddForeignObjects,
    /// The whole apply fails.
    ErrorIfIdCollides,
    /// The existing object is replaced in place.
    ReplaceSameIdObjects,
}

/// How attribute writes treat an existing `(namespace, name)` key.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttributeUpdatePolicy {
    /// **Default:** the incoming attribute wins.
    #[default]
    ReplaceWithForeignWhenDuplicate,
    /// The existing attribute wins; the incoming one is dropped silently.
    KeepOwnWhenDuplicate,
    /// The whole apply fails.
    ErrorWhenDuplicate,
}

//==================================================================================
// II. Commands
//==================================================================================

/// A single staged mutation against one frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum UpdateCommand {
    SetConfidence {
        object_id: i64,
        confidence: Option<f32>,
    },
    SetDetectionBox {
        object_id: i64,
        bbox: BoundingBox,
    },
    SetTrackingInfo {
        object_id: i64,
        tracking: Option<TrackingInfo>,
    },
    SetLabel {
        object_id: i64,
        label: String,
    },
    SetDrawLabel {
        object_id: i64,
        draw_label: Option<String>,
    },
    AddObject {
        object: VideoObject,
        #[serde(default)]
        policy: ObjectUpdatePolicy,
    },
    DeleteObject {
        object_id: i64,
    },
    SetObjectAttribute {
        object_id: i64,
        attribute: Attribute,
        #[serde(default)]
        policy: AttributeUpdatePolicy,
    },
    DeleteObjectAttribute {
        object_id: i64,
        namespace: String,
        name: String,
    },
    SetFrameAttribute {
        attribute: Attribute,
        #[serde(default)]
        policy: AttributeUpdatePolicy,
    },
    DeleteFrameAttribute {
        namespace: String,
        name: String,
    },
}

impl UpdateCommand {
    /// Applies the command to `frame`. `frame_id` is only used for error context.
    pub fn apply(&self, frame_id: i64, frame: &mut VideoFrame) -> Result<()> {
        match self {
            UpdateCommand::SetConfidence {
                object_id,
                confidence,
            } => {
                object_mut(frame_id, frame, *object_id)?.confidence = *confidence;
            }
            UpdateCommand::SetDetectionBox { object_id, bbox } => {
                object_mut(frame_id, frame, *object_id)?.detection_box = *bbox;
            }
            UpdateCommand::SetTrackingInfo {
                object_id,
                tracking,
            } => {
                object_mut(frame_id, frame, *object_id)?.tracking = *tracking;
            }
            UpdateCommand::SetLabel { object_id, label } => {
                object_mut(frame_id, frame, *object_id)?.label = label.clone();
            }
            UpdateCommand::SetDrawLabel {
                object_id,
                draw_label,
            } => {
                object_mut(frame_id, frame, *object_id)?.draw_label = draw_label.clone();
            }
            UpdateCommand::AddObject { object, policy } => {
                add_object(frame_id, frame, object.clone(), *policy)?;
            }
            UpdateCommand::DeleteObject { object_id } => {
                frame
                    .delete_object(*object_id)
                    .ok_or(StagepipeError::ObjectNotFound {
                        frame_id,
                        object_id: *object_id,
                    })?;
            }
            UpdateCommand::SetObjectAttribute {
                object_id,
                attribute,
                policy,
            } => {
                let object = object_mut(frame_id, frame, *object_id)?;
                merge_attribute(&mut object.attributes, attribute.clone(), *policy)?;
            }
            UpdateCommand::DeleteObjectAttribute {
                object_id,
                namespace,
                name,
            } => {
                object_mut(frame_id, frame, *object_id)?
                    .attributes
                    .delete(namespace, name);
            }
            UpdateCommand::SetFrameAttribute { attribute, policy } => {
                merge_attribute(&mut frame.attributes, attribute.clone(), *policy)?;
            }
            UpdateCommand::DeleteFrameAttribute { namespace, name } => {
                frame.attributes.delete(namespace, name);
            }
        }
        Ok(())
    }
}

fn object_mut(frame_id: i64, frame: &mut VideoFrame, object_id: i64) -> Result<&mut VideoObject> {
    frame
        .get_object_mut(object_id)
        .ok_or(StagepipeError::ObjectNotFound {
            frame_id,
            object_id,
        })
}

fn add_object(
    frame_id: i64,
    frame: &mut VideoFrame,
    mut object: VideoObject,
    policy: ObjectUpdatePolicy,
) -> Result<()> {
    if !frame.object_exists(object.id) {
        frame.objects.push(object);
        return Ok(());
    }
    match policy {
        ObjectUpdatePolicy::AddForeignObjects => {
            object.id = frame
                .next_object_id()
                .ok_or(StagepipeError::ObjectIdExhausted { frame_id })?;
            frame.objects.push(object);
        }
        ObjectUpdatePolicy::ErrorIfIdCollides => {
            return Err(StagepipeError::ObjectIdCollision {
                frame_id,
                object_id: object.id,
            });
        }
        ObjectUpdatePolicy::ReplaceSameIdObjects => {
            if let Some(existing) = frame.get_object_mut(object.id) {
                *existing = object;
            }
        }
    }
    Ok(())
}

fn merge_attribute(
    store: &mut AttributeStore,
    attribute: Attribute,
    policy: AttributeUpdatePolicy,
) -> Result<()> {
    let exists = store.contains(&attribute.namespace, &attribute.name);
    match (exists, policy) {
        (false, _) | (true, AttributeUpdatePolicy::ReplaceWithForeignWhenDuplicate) => {
            store.set(attribute);
        }
        (true, AttributeUpdatePolicy::KeepOwnWhenDuplicate) => {}
        (true, AttributeUpdatePolicy::ErrorWhenDuplicate) => {
            return Err(StagepipeError::AttributeCollision {
                namespace: attribute.namespace,
                name: attribute.name,
            });
        }
    }
    Ok(())
}

//==================================================================================
// III. FrameUpdate
//==================================================================================

/// An ordered list of commands staged against one frame.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FrameUpdate {
    #[serde(default)]
    pub commands: Vec<UpdateCommand>,
}

impl FrameUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn push(&mut self, command: UpdateCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn set_confidence(&mut self, object_id: i64, confidence: Option<f32>) -> &mut Self {
        self.push(UpdateCommand::SetConfidence {
            object_id,
            confidence,
        })
    }

    pub fn set_detection_box(&mut self, object_id: i64, bbox: BoundingBox) -> &mut Self {
        self.push(UpdateCommand::SetDetectionBox { object_id, bbox })
    }

    pub fn set_tracking_info(&mut self, object_id: i64, tracking: Option<TrackingInfo>) -> &mut Self {
        self.push(UpdateCommand::SetTrackingInfo {
            object_id,
            tracking,
        })
    }

    pub fn set_label(&mut self, object_id: i64, label: &str) -> &mut Self {
        self.push(UpdateCommand::SetLabel {
            object_id,
            label: label.to_owned(),
        })
    }

    pub fn set_draw_label(&mut self, object_id: i64, draw_label: Option<String>) -> &mut Self {
        self.push(UpdateCommand::SetDrawLabel {
            object_id,
            draw_label,
        })
    }

    pub fn add_object(&mut self, object: VideoObject, policy: ObjectUpdatePolicy) -> &mut Self {
        self.push(UpdateCommand::AddObject { object, policy })
    }

    pub fn delete_object(&mut self, object_id: i64) -> &mut Self {
        self.push(UpdateCommand::DeleteObject { object_id })
    }

    pub fn set_object_attribute(
        &mut self,
        object_id: i64,
        attribute: Attribute,
        policy: AttributeUpdatePolicy,
    ) -> &mut Self {
        self.push(UpdateCommand::SetObjectAttribute {
            object_id,
            attribute,
            policy,
        })
    }

    pub fn set_frame_attribute(&mut self, attribute: Attribute, policy: AttributeUpdatePolicy) -> &mut Self {
        self.push(UpdateCommand::SetFrameAttribute { attribute, policy })
    }

    /// Runs every command in order against `frame`, stopping at the first failure.
    /// The caller is responsible for discarding `frame` if this returns an error.
    pub fn apply_to(&self, frame_id: i64, frame: &mut VideoFrame) -> Result<()> {
        for command in &self.commands {
            command.apply(frame_id, frame)?;
        }
        Ok(())
    }
}

//==================================================================================
// IV. UpdateQueue
//==================================================================================

/// A staged update together with the frame it targets. For an independent frame
/// the target equals the queue key; for a batch it names one of the members.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub frame_id: i64,
    pub update: FrameUpdate,
}

/// Per-identity pending mutation lists. Keys are frame or batch ids.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    pending: Mutex<HashMap<i64, Vec<PendingUpdate>>>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, id: i64, pending: PendingUpdate) {
        self.pending.lock().entry(id).or_default().push(pending);
    }

    /// Appends a whole list, preserving its order. Empty lists create no entry.
    pub fn extend(&self, id: i64, updates: Vec<PendingUpdate>) {
        if updates.is_empty() {
            return;
        }
        self.pending.lock().entry(id).or_default().extend(updates);
    }

    /// Removes and returns everything pending for `id`.
    pub fn take(&self, id: i64) -> Option<Vec<PendingUpdate>> {
        self.pending.lock().remove(&id)
    }

    /// Puts `updates` back in front of anything staged for `id` since they were taken.
    pub fn restore(&self, id: i64, mut updates: Vec<PendingUpdate>) {
        let mut pending = self.pending.lock();
        if let Some(newer) = pending.remove(&id) {
            updates.extend(newer);
        }
        if !updates.is_empty() {
            pending.insert(id, updates);
        }
    }

    /// Discards everything pending for `id`. Returns whether anything was dropped.
    pub fn clear(&self, id: i64) -> bool {
        self.pending
            .lock()
            .remove(&id)
            .map_or(false, |updates| !updates.is_empty())
    }

    pub fn pending_len(&self, id: i64) -> usize {
        self.pending.lock().get(&id).map_or(0, Vec::len)
    }

    pub fn has_pending(&self, id: i64) -> bool {
        self.pending_len(id) > 0
    }
}
