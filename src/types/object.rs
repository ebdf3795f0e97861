//! A detected object and its metadata.

use serde::{Deserialize, Serialize};

use crate::types::attribute::AttributeStore;
use crate::types::bbox::{BoundingBox, TrackingInfo};

/// One detection inside a frame.
///
/// `confidence` and `tracking` are independently optional. The detection box is
/// always present.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VideoObject {
    /// Unique within the owning frame.
    pub id: i64,
    /// Which producer created the object (detector name, model id ...).
    pub namespace: String,
    pub label: String,
    /// Display label used for overlays. Falls back to `label` when unset.
    #[serde(default)]
    pub draw_label: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    pub detection_box: BoundingBox,
    #[serde(default)]
    pub tracking: Option<TrackingInfo>,
    #[serde(default)]
    pub attributes: AttributeStore,
}

impl VideoObject {
    pub fn new(id: i64, namespace: &str, label: &str, detection_box: BoundingBox) -> Self {
        Self {
            id,
            namespace: namespace.to_owned(),
            label: label.to_owned(),
            draw_label: None,
            confidence: None,
            detection_box,
            tracking: None,
            attributes: AttributeStore::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_draw_label(mut self, draw_label: &str) -> Self {
        self.draw_label = Some(draw_label.to_owned());
        self
    }

    pub fn with_tracking(mut self, bbox: BoundingBox, id: i64) -> Self {
        self.tracking = Some(TrackingInfo::new(bbox, id));
        self
    }

    /// The label to draw: `draw_label` if set, otherwise `label`.
    pub fn effective_draw_label(&self) -> &str {
        self.draw_label.as_deref().unwrap_or(&self.label)
    }
}

/// A single field of an object, used by readers that select which piece of text to
/// fetch (the C ABI exposes one function per field on top of this).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectTextField {
    Namespace,
    Label,
    DrawLabel,
}

impl ObjectTextField {
    pub fn read(self, object: &VideoObject) -> String {
        match self {
            ObjectTextField::Namespace => object.namespace.clone(),
            ObjectTextField::Label => object.label.clone(),
            ObjectTextField::DrawLabel => object.effective_draw_label().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_label_fallback() {
        let o = VideoObject::new(1, "yolo", "person", BoundingBox::default());
        assert_eq!(o.effective_draw_label(), "person");
        assert_eq!(ObjectTextField::DrawLabel.read(&o), "person");

        let o = o.with_draw_label("Person #1");
        assert_eq!(ObjectTextField::DrawLabel.read(&o), "Person #1");
        assert_eq!(ObjectTextField::Label.read(&o), "person");
        assert_eq!(ObjectTextField::Namespace.read(&o), "yolo");
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "id": 3,
            "namespace": "yolo",
            "label": "car",
            "detection_box": {"xc": 1.0, "yc": 2.0, "width": 3.0, "height": 4.0}
        }"#;
        let o: VideoObject = serde_json::from_str(json).unwrap();
        assert_eq!(o.id, 3);
        assert!(o.confidence.is_none());
        assert!(o.tracking.is_none());
        assert!(!o.detection_box.oriented);
        assert!(o.attributes.is_empty());
    }
}
