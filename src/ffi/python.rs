// In: src/ffi/python.rs

use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::sync::Arc;

use crate::bridge::handle_api;
use crate::observability;
use crate::pipeline::{Pipeline as CorePipeline, StagePayloadType};
use crate::types::{BoundingBox, VideoFrame};

//==================================================================================
// I. Pipeline Class
//==================================================================================

/// A registered pipeline. The Python object holds the handle; the pipeline itself
/// lives in the process-wide registry until `release()` is called or the object is
/// collected, whichever comes first.
#[pyclass(name = "Pipeline", module = "stagepipe")]
pub struct PyPipeline {
    handle: u64,
}

impl Drop for PyPipeline {
    fn drop(&mut self) {
        // Stale after an explicit release(); the generation check makes this a no-op.
        handle_api::release_pipeline(self.handle);
    }
}

impl PyPipeline {
    fn inner(&self) -> PyResult<Arc<CorePipeline>> {
        Ok(handle_api::lookup(self.handle)?)
    }
}

fn parse_bbox(bbox: (f32, f32, f32, f32), angle: Option<f32>) -> BoundingBox {
    let (xc, yc, width, height) = bbox;
    match angle {
        Some(angle) => BoundingBox::rotated(xc, yc, width, height, angle),
        None => BoundingBox::new(xc, yc, width, height),
    }
}

#[pymethods]
impl PyPipeline {
    /// Creates a pipeline from a JSON configuration string.
    #[new]
    fn new(config_json: &str) -> PyResult<Self> {
        let handle = handle_api::create_pipeline_from_json(config_json)?;
        Ok(Self { handle })
    }

    #[getter]
    fn handle(&self) -> u64 {
        self.handle
    }

    /// Drops the pipeline from the registry. Later calls on this object raise.
    fn release(&self) -> bool {
        handle_api::release_pipeline(self.handle)
    }

    fn stage_names(&self) -> PyResult<Vec<String>> {
        Ok(self.inner()?.stage_names())
    }

    /// `"frame"`, `"batch"` or `None` for an unknown stage.
    fn get_stage_type(&self, stage: &str) -> PyResult<Option<&'static str>> {
        Ok(self.inner()?.get_stage_type(stage).map(|t| match t {
            StagePayloadType::Frame => "frame",
            StagePayloadType::Batch => "batch",
        }))
    }

    fn stage_len(&self, stage: &str) -> PyResult<Option<usize>> {
        Ok(self.inner()?.stage_len(stage))
    }

    fn add_frame(&self, stage: &str, frame_json: &str) -> PyResult<i64> {
        Ok(handle_api::add_frame_json(self.handle, stage, frame_json)?)
    }

    /// The frame as a JSON string, or `None` for an unknown id.
    fn get_frame(&self, frame_id: i64) -> PyResult<Option<String>> {
        match self.inner()?.get_frame(frame_id) {
            Some(frame) => Ok(Some(VideoFrame::to_json(&frame).map_err(crate::error::StagepipeError::from)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, id: i64) -> PyResult<()> {
        Ok(self.inner()?.delete(id)?)
    }

    // --- Movement ---

    fn move_as_is(&self, py: Python, dest_stage: &str, ids: Vec<i64>) -> PyResult<usize> {
        let p = self.inner()?;
        Ok(py.allow_threads(|| p.move_as_is(dest_stage, &ids))?)
    }

    fn move_and_pack_frames(&self, py: Python, dest_stage: &str, frame_ids: Vec<i64>) -> PyResult<i64> {
        let p = self.inner()?;
        Ok(py.allow_threads(|| p.move_and_pack_frames(dest_stage, &frame_ids))?)
    }

    fn move_and_unpack_batch(&self, py: Python, dest_stage: &str, batch_id: i64) -> PyResult<Vec<i64>> {
        let p = self.inner()?;
        Ok(py.allow_threads(|| p.move_and_unpack_batch(dest_stage, batch_id))?)
    }

    // --- Updates ---

    fn add_frame_update(&self, frame_id: i64, update_json: &str) -> PyResult<()> {
        Ok(handle_api::add_frame_update_json(self.handle, frame_id, update_json)?)
    }

    fn add_batched_frame_update(&self, batch_id: i64, frame_id: i64, update_json: &str) -> PyResult<()> {
        Ok(handle_api::add_batched_frame_update_json(
            self.handle,
            batch_id,
            frame_id,
            update_json,
        )?)
    }

    fn apply_updates(&self, py: Python, id: i64) -> PyResult<bool> {
        let p = self.inner()?;
        Ok(py.allow_threads(|| p.apply_updates(id))?)
    }

    fn clear_updates(&self, id: i64) -> PyResult<bool> {
        Ok(self.inner()?.clear_updates(id))
    }

    // --- Object accessors ---

    fn get_confidence(&self, frame_id: i64, object_id: i64) -> PyResult<Option<f32>> {
        Ok(self.inner()?.get_confidence(frame_id, object_id))
    }

    fn set_confidence(&self, frame_id: i64, object_id: i64, confidence: f32) -> PyResult<bool> {
        Ok(self.inner()?.set_confidence(frame_id, object_id, confidence))
    }

    fn clear_confidence(&self, frame_id: i64, object_id: i64) -> PyResult<bool> {
        Ok(self.inner()?.clear_confidence(frame_id, object_id))
    }

    fn get_label(&self, frame_id: i64, object_id: i64) -> PyResult<Option<String>> {
        Ok(self.inner()?.get_label(frame_id, object_id))
    }

    fn get_namespace(&self, frame_id: i64, object_id: i64) -> PyResult<Option<String>> {
        Ok(self.inner()?.get_namespace(frame_id, object_id))
    }

    fn get_draw_label(&self, frame_id: i64, object_id: i64) -> PyResult<Option<String>> {
        Ok(self.inner()?.get_draw_label(frame_id, object_id))
    }

    /// Detection box as a dict with `xc`, `yc`, `width`, `height`, `angle` (`None` unless
    /// oriented) and `oriented`.
    fn get_detection_box<'py>(
        &self,
        py: Python<'py>,
        frame_id: i64,
        object_id: i64,
    ) -> PyResult<Option<Bound<'py, PyDict>>> {
        match self.inner()?.get_detection_box(frame_id, object_id) {
            Some(bbox) => Ok(Some(bbox_dict(py, &bbox)?)),
            None => Ok(None),
        }
    }

    #[pyo3(signature = (frame_id, object_id, bbox, angle = None))]
    fn set_detection_box(
        &self,
        frame_id: i64,
        object_id: i64,
        bbox: (f32, f32, f32, f32),
        angle: Option<f32>,
    ) -> PyResult<bool> {
        Ok(self
            .inner()?
            .set_detection_box(frame_id, object_id, parse_bbox(bbox, angle)))
    }

    /// `(bbox_dict, track_id)` or `None`.
    fn get_tracking_info<'py>(
        &self,
        py: Python<'py>,
        frame_id: i64,
        object_id: i64,
    ) -> PyResult<Option<(Bound<'py, PyDict>, i64)>> {
        match self.inner()?.get_tracking_info(frame_id, object_id) {
            Some(info) => Ok(Some((bbox_dict(py, &info.bbox)?, info.id))),
            None => Ok(None),
        }
    }

    #[pyo3(signature = (frame_id, object_id, bbox, track_id, angle = None))]
    fn set_tracking_info(
        &self,
        frame_id: i64,
        object_id: i64,
        bbox: (f32, f32, f32, f32),
        track_id: i64,
        angle: Option<f32>,
    ) -> PyResult<bool> {
        Ok(self
            .inner()?
            .set_tracking_info(frame_id, object_id, parse_bbox(bbox, angle), track_id))
    }

    fn clear_tracking_info(&self, frame_id: i64, object_id: i64) -> PyResult<bool> {
        Ok(self.inner()?.clear_tracking_info(frame_id, object_id))
    }

    /// `(values, confidence)` for a float-vector attribute value, or `None`.
    fn get_float_vec_attribute_value(
        &self,
        frame_id: i64,
        object_id: i64,
        namespace: &str,
        name: &str,
        index: usize,
    ) -> PyResult<Option<(Vec<f64>, Option<f32>)>> {
        let value = self
            .inner()?
            .get_attribute_value(frame_id, object_id, namespace, name, index);
        Ok(value.and_then(|v| {
            v.as_float_vector()
                .map(|values| (values.to_vec(), v.confidence))
        }))
    }
}

fn bbox_dict<'py>(py: Python<'py>, bbox: &BoundingBox) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("xc", bbox.xc)?;
    dict.set_item("yc", bbox.yc)?;
    dict.set_item("width", bbox.width)?;
    dict.set_item("height", bbox.height)?;
    dict.set_item("angle", bbox.rotation())?;
    dict.set_item("oriented", bbox.oriented)?;
    Ok(dict)
}

//==================================================================================
// II. Module Functions
//==================================================================================

#[pyfunction]
#[pyo3(name = "check_version")]
pub fn check_version_py(expected: &str) -> bool {
    expected == crate::VERSION
}

#[pyfunction]
#[pyo3(name = "enable_verbose_logging")]
#[pyo3(signature = (log_file = None, level = None))]
pub fn enable_verbose_logging_py(log_file: Option<String>, level: Option<String>) {
    observability::init_logging(
        observability::parse_level(level.as_deref()),
        log_file.as_deref(),
    );
}
