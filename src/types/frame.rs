//! A single unit of source data together with its detected objects.

use serde::{Deserialize, Serialize};

use crate::types::attribute::AttributeStore;
use crate::types::object::VideoObject;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct VideoFrame {
    /// Source the frame came from (camera, file, stream name).
    pub source_id: String,
    /// Presentation timestamp in the source's time base.
    #[serde(default)]
    pub pts: i64,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    /// Objects in insertion order.
    #[serde(default)]
    pub objects: Vec<VideoObject>,
    #[serde(default)]
    pub attributes: AttributeStore,
}

impl VideoFrame {
    pub fn new(source_id: &str, pts: i64) -> Self {
        Self {
            source_id: source_id.to_owned(),
            pts,
            ..Default::default()
        }
    }

    pub fn with_object(mut self, object: VideoObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn get_object(&self, object_id: i64) -> Option<&VideoObject> {
        self.objects.iter().find(|o| o.id == object_id)
    }

    pub fn get_object_mut(&mut self, object_id: i64) -> Option<&mut VideoObject> {
        self.objects.iter_mut().find(|o| o.id == object_id)
    }

    pub fn object_exists(&self, object_id: i64) -> bool {
        self.get_object(object_id).is_some()
    }

    /// Removes and returns the object, keeping the order of the rest.
    pub fn delete_object(&mut self, object_id: i64) -> Option<VideoObject> {
        let pos = self.objects.iter().position(|o| o.id == object_id)?;
        Some(self.objects.remove(pos))
    }

    /// The smallest id greater than every object id in the frame, or `None` when
    /// the frame already holds `i64::MAX`.
    pub fn next_object_id(&self) -> Option<i64> {
        match self.objects.iter().map(|o| o.id).max() {
            Some(max) => max.checked_add(1),
            None => Some(0),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
