//! The `BoundingBox` value type shared by detections and tracks.
//!
//! Boxes are stored center-based (`xc`, `yc`, `width`, `height`) with an optional
//! rotation. The rotation is kept as a raw `angle` plus an `oriented` flag rather than
//! an `Option<f32>` so that a box handed in over the ABI comes back bit-for-bit
//! identical, including an `angle` the caller set on an axis-aligned box.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub xc: f32,
    pub yc: f32,
    pub width: f32,
    pub height: f32,
    /// Rotation in degrees. Only meaningful when `oriented` is true.
    #[serde(default)]
    pub angle: f32,
    #[serde(default)]
    pub oriented: bool,
}

impl BoundingBox {
    /// An axis-aligned box.
    pub fn new(xc: f32, yc: f32, width: f32, height: f32) -> Self {
        Self {
            xc,
            yc,
            width,
            height,
            angle: 0.0,
            oriented: false,
        }
    }

    /// A rotated box.
    pub fn rotated(xc: f32, yc: f32, width: f32, height: f32, angle: f32) -> Self {
        Self {
            xc,
            yc,
            width,
            height,
            angle,
            oriented: true,
        }
    }

    /// The rotation, if the box is oriented.
    pub fn rotation(&self) -> Option<f32> {
        self.oriented.then_some(self.angle)
    }
}

/// A track box together with the identifier that links it across frames.
///
/// Stored as a single `Option<TrackingInfo>` on the object, so the box and the id
/// are always replaced together.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TrackingInfo {
    pub bbox: BoundingBox,
    pub id: i64,
}

impl TrackingInfo {
    pub fn new(bbox: BoundingBox, id: i64) -> Self {
        Self { bbox, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_only_when_oriented() {
        let mut b = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        b.angle = 45.0;
        assert_eq!(b.rotation(), None);
        let r = BoundingBox::rotated(0.0, 0.0, 1.0, 1.0, 45.0);
        assert_eq!(r.rotation(), Some(45.0));
    }
}
