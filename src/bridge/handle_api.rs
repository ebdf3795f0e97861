// In: src/bridge/handle_api.rs

//! Safe, handle-addressed operations shared by the C and Python surfaces.
//!
//! Everything here takes plain Rust slices and strings and returns `Result`s. The
//! surfaces on top only convert raw pointers or Python objects and fold errors into
//! sentinels.

use std::sync::Arc;

use crate::bridge::negotiation::{copy_negotiated, write_c_string, Negotiated};
use crate::bridge::registry::pipelines;
use crate::config::PipelineConfig;
use crate::error::{Result, StagepipeError};
use crate::observability;
use crate::pipeline::{FrameUpdate, Pipeline, UnpackOutcome, UpdateCommand};
use crate::types::{ObjectTextField, VideoFrame, VideoObject};

/// Result of reading a float-vector attribute value into a caller buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum FloatVecRead {
    /// Unknown object, missing key, index out of range or a non-vector value.
    Absent,
    /// The value exists but the buffer is too small. Nothing was written.
    NeedsCapacity(usize),
    Copied {
        len: usize,
        confidence: Option<f32>,
    },
}

/// Builds a pipeline and publishes it in the global registry.
///
/// If the config names a `log_level`, logging is initialised at that level (only
/// the first initialisation in the process takes effect).
pub fn create_pipeline(config: &PipelineConfig) -> Result<u64> {
    if config.log_level.is_some() {
        observability::init_logging(
            observability::parse_level(config.log_level.as_deref()),
            None,
        );
    }
    let pipeline = Pipeline::new(config)?;
    let handle = pipelines().insert(pipeline);
    log::debug!("pipeline '{}' registered as handle {:#x}", config.name, handle);
    Ok(handle)
}

pub fn create_pipeline_from_json(json: &str) -> Result<u64> {
    let config = PipelineConfig::from_json_str(json)?;
    create_pipeline(&config)
}

/// Invalidates `handle`. Operations already running against it finish normally.
pub fn release_pipeline(handle: u64) -> bool {
    pipelines().remove(handle).is_some()
}

pub fn lookup(handle: u64) -> Result<Arc<Pipeline>> {
    pipelines()
        .get(handle)
        .ok_or_else(|| StagepipeError::FfiError(format!("unknown pipeline handle {:#x}", handle)))
}

// Object text is read back through NUL-terminated buffers, so a NUL inside it
// would truncate what the caller sees.
fn check_text(object_id: i64, text: &str) -> Result<()> {
    if text.contains('\0') {
        return Err(StagepipeError::InteriorNul { object_id });
    }
    Ok(())
}

fn check_object_text(object: &VideoObject) -> Result<()> {
    check_text(object.id, &object.namespace)?;
    check_text(object.id, &object.label)?;
    object
        .draw_label
        .as_deref()
        .map_or(Ok(()), |text| check_text(object.id, text))
}

fn check_update_text(update: &FrameUpdate) -> Result<()> {
    for command in &update.commands {
        match command {
            UpdateCommand::AddObject { object, .. } => check_object_text(object)?,
            UpdateCommand::SetLabel { object_id, label } => check_text(*object_id, label)?,
            UpdateCommand::SetDrawLabel {
                object_id,
                draw_label: Some(text),
            } => check_text(*object_id, text)?,
            _ => {}
        }
    }
    Ok(())
}

pub fn add_frame_json(handle: u64, stage: &str, frame_json: &str) -> Result<i64> {
    let frame = VideoFrame::from_json(frame_json)?;
    frame.objects.iter().try_for_each(check_object_text)?;
    lookup(handle)?.add_frame(stage, frame)
}

pub fn add_frame_update_json(handle: u64, frame_id: i64, update_json: &str) -> Result<()> {
    let update = FrameUpdate::from_json(update_json)?;
    check_update_text(&update)?;
    lookup(handle)?.add_frame_update(frame_id, update)
}

pub fn add_batched_frame_update_json(
    handle: u64,
    batch_id: i64,
    frame_id: i64,
    update_json: &str,
) -> Result<()> {
    let update = FrameUpdate::from_json(update_json)?;
    check_update_text(&update)?;
    lookup(handle)?.add_batched_frame_update(batch_id, frame_id, update)
}

/// Writes an object's text field plus NUL into `dst`. `None` means the pipeline or
/// object is unknown.
pub fn read_text(
    handle: u64,
    frame_id: i64,
    object_id: i64,
    field: ObjectTextField,
    dst: &mut [u8],
) -> Option<Negotiated> {
    let text = lookup(handle)
        .ok()?
        .get_object_text(frame_id, object_id, field)?;
    Some(write_c_string(&text, dst))
}

pub fn read_float_vec_attribute(
    handle: u64,
    frame_id: i64,
    object_id: i64,
    namespace: &str,
    name: &str,
    index: usize,
    dst: &mut [f64],
) -> FloatVecRead {
    let Some(value) = lookup(handle)
        .ok()
        .and_then(|p| p.get_attribute_value(frame_id, object_id, namespace, name, index))
    else {
        return FloatVecRead::Absent;
    };
    let Some(values) = value.as_float_vector() else {
        return FloatVecRead::Absent;
    };
    match copy_negotiated(values, dst) {
        Negotiated::Written(len) => FloatVecRead::Copied {
            len,
            confidence: value.confidence,
        },
        Negotiated::NeedsCapacity(required) => FloatVecRead::NeedsCapacity(required),
    }
}

/// Unpacks `batch_id` into `dest_stage` only if `dst` can hold every member id.
pub fn unpack_into(handle: u64, dest_stage: &str, batch_id: i64, dst: &mut [i64]) -> Result<Negotiated> {
    let capacity = dst.len();
    let outcome =
        lookup(handle)?.move_and_unpack_batch_guarded(dest_stage, batch_id, |n| n <= capacity)?;
    Ok(match outcome {
        UnpackOutcome::Unpacked(ids) => copy_negotiated(&ids, dst),
        UnpackOutcome::NeedsCapacity(required) => Negotiated::NeedsCapacity(required),
    })
}
