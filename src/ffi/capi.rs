// In: src/ffi/capi.rs

//! The C ABI.
//!
//! Every function here converts raw pointers into safe values, calls into
//! `bridge::handle_api` or the `Pipeline`, and folds failures into a boolean, a
//! sentinel id (`-1`), a sentinel handle or length (`0`). Failures are logged; no
//! error value crosses the boundary and no panic is allowed to unwind through it.
//!
//! Output pointers that are not written on failure are left exactly as the caller
//! passed them.

use log::warn;
use std::ffi::{c_char, CStr};
use std::slice;

use crate::bridge::handle_api::{self, FloatVecRead};
use crate::bridge::negotiation::Negotiated;
use crate::error::Result;
use crate::observability;
use crate::pipeline::Pipeline;
use crate::types::{BoundingBox, ObjectTextField};
use crate::VERSION;

//==================================================================================
// I. Boundary Types & Helpers
//==================================================================================

/// `BoundingBox` as laid out for C callers.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FfiBoundingBox {
    pub xc: f32,
    pub yc: f32,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
    pub oriented: bool,
}

impl From<BoundingBox> for FfiBoundingBox {
    fn from(b: BoundingBox) -> Self {
        Self {
            xc: b.xc,
            yc: b.yc,
            width: b.width,
            height: b.height,
            angle: b.angle,
            oriented: b.oriented,
        }
    }
}

impl From<FfiBoundingBox> for BoundingBox {
    fn from(b: FfiBoundingBox) -> Self {
        Self {
            xc: b.xc,
            yc: b.yc,
            width: b.width,
            height: b.height,
            angle: b.angle,
            oriented: b.oriented,
        }
    }
}

/// Borrows a NUL-terminated UTF-8 string. `None` for null or invalid UTF-8.
unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// A read-only view of `len` elements. A null pointer is only accepted with `len == 0`.
unsafe fn in_slice<'a, T>(ptr: *const T, len: usize) -> Option<&'a [T]> {
    if ptr.is_null() {
        return if len == 0 { Some(&[][..]) } else { None };
    }
    Some(slice::from_raw_parts(ptr, len))
}

/// A writable view of a caller buffer. A null pointer behaves as an empty buffer,
/// which turns the call into a pure size query.
unsafe fn out_slice<'a, T>(ptr: *mut T, len: usize) -> &'a mut [T] {
    if ptr.is_null() || len == 0 {
        return &mut [];
    }
    slice::from_raw_parts_mut(ptr, len)
}

fn pipeline(handle: usize) -> Option<std::sync::Arc<Pipeline>> {
    handle_api::lookup(handle as u64).ok()
}

fn report<T>(op: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", op, e);
            None
        }
    }
}

//==================================================================================
// II. Version, Logging & Lifecycle
//==================================================================================

/// Returns whether `expected` names the version of this library.
///
/// # Safety
/// `expected` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn stagepipe_check_version(expected: *const c_char) -> bool {
    c_str(expected) == Some(VERSION)
}

/// Installs the logging backend. `level` and `log_file` may be null.
///
/// # Safety
/// Both pointers must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn stagepipe_init_logging(level: *const c_char, log_file: *const c_char) {
    observability::init_logging(observability::parse_level(c_str(level)), c_str(log_file));
}

/// Builds a pipeline from a JSON config. Returns 0 on failure.
///
/// # Safety
/// `config_json` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pipeline_create(config_json: *const c_char) -> usize {
    let Some(json) = c_str(config_json) else {
        warn!("pipeline_create: config is null or not UTF-8");
        return 0;
    };
    let Some(handle) = report("pipeline_create", handle_api::create_pipeline_from_json(json)) else {
        return 0;
    };
    match usize::try_from(handle) {
        Ok(h) => h,
        Err(_) => {
            handle_api::release_pipeline(handle);
            warn!("pipeline_create: handle {:#x} does not fit in usize", handle);
            0
        }
    }
}

#[no_mangle]
pub extern "C" fn pipeline_release(handle: usize) -> bool {
    handle_api::release_pipeline(handle as u64)
}

/// Ingests a JSON frame into `stage`. Returns the frame id, or -1.
///
/// # Safety
/// `stage` and `frame_json` must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn pipeline_add_frame_json(
    handle: usize,
    stage: *const c_char,
    frame_json: *const c_char,
) -> i64 {
    let (Some(stage), Some(json)) = (c_str(stage), c_str(frame_json)) else {
        return -1;
    };
    report(
        "pipeline_add_frame_json",
        handle_api::add_frame_json(handle as u64, stage, json),
    )
    .unwrap_or(-1)
}

/// Stages a JSON `FrameUpdate` against an independent frame.
///
/// # Safety
/// `update_json` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pipeline_add_frame_update_json(
    handle: usize,
    frame_id: i64,
    update_json: *const c_char,
) -> bool {
    let Some(json) = c_str(update_json) else {
        return false;
    };
    report(
        "pipeline_add_frame_update_json",
        handle_api::add_frame_update_json(handle as u64, frame_id, json),
    )
    .is_some()
}

/// Stages a JSON `FrameUpdate` against one member of a batch.
///
/// # Safety
/// `update_json` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pipeline_add_batched_frame_update_json(
    handle: usize,
    batch_id: i64,
    frame_id: i64,
    update_json: *const c_char,
) -> bool {
    let Some(json) = c_str(update_json) else {
        return false;
    };
    report(
        "pipeline_add_batched_frame_update_json",
        handle_api::add_batched_frame_update_json(handle as u64, batch_id, frame_id, json),
    )
    .is_some()
}

/// Number of entities resident in `stage`, or -1 for an unknown stage or handle.
///
/// # Safety
/// `stage` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pipeline_stage_len(handle: usize, stage: *const c_char) -> i64 {
    let (Some(p), Some(stage)) = (pipeline(handle), c_str(stage)) else {
        return -1;
    };
    p.stage_len(stage).map_or(-1, |n| n as i64)
}

#[no_mangle]
pub extern "C" fn pipeline_delete(handle: usize, id: i64) -> bool {
    pipeline(handle).map_or(false, |p| report("pipeline_delete", p.delete(id)).is_some())
}

//==================================================================================
// III. Object Accessors
//==================================================================================

/// # Safety
/// `conf` must be null or point to writable storage for one `f32`.
#[no_mangle]
pub unsafe extern "C" fn object_get_confidence(
    handle: usize,
    frame_id: i64,
    object_id: i64,
    conf: *mut f32,
) -> bool {
    if conf.is_null() {
        return false;
    }
    match pipeline(handle).and_then(|p| p.get_confidence(frame_id, object_id)) {
        Some(value) => {
            *conf = value;
            true
        }
        None => false,
    }
}

#[no_mangle]
pub extern "C" fn object_set_confidence(handle: usize, frame_id: i64, object_id: i64, conf: f32) -> bool {
    pipeline(handle).map_or(false, |p| p.set_confidence(frame_id, object_id, conf))
}

#[no_mangle]
pub extern "C" fn object_clear_confidence(handle: usize, frame_id: i64, object_id: i64) -> bool {
    pipeline(handle).map_or(false, |p| p.clear_confidence(frame_id, object_id))
}

unsafe fn object_text(
    handle: usize,
    frame_id: i64,
    object_id: i64,
    field: ObjectTextField,
    buf: *mut c_char,
    len: usize,
) -> usize {
    let dst = out_slice(buf.cast::<u8>(), len);
    handle_api::read_text(handle as u64, frame_id, object_id, field, dst).map_or(0, Negotiated::required)
}

/// Copies the object's namespace plus NUL into `buf` if `len` is large enough.
/// Returns the required length including the NUL, or 0 for an unknown object.
/// Text containing a NUL byte is refused by the JSON ingestion calls, so the
/// returned length always matches what `strlen` sees plus one.
///
/// # Safety
/// `buf` must be null or point to `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn object_get_namespace(
    handle: usize,
    frame_id: i64,
    object_id: i64,
    buf: *mut c_char,
    len: usize,
) -> usize {
    object_text(handle, frame_id, object_id, ObjectTextField::Namespace, buf, len)
}

/// See `object_get_namespace`.
///
/// # Safety
/// `buf` must be null or point to `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn object_get_label(
    handle: usize,
    frame_id: i64,
    object_id: i64,
    buf: *mut c_char,
    len: usize,
) -> usize {
    object_text(handle, frame_id, object_id, ObjectTextField::Label, buf, len)
}

/// See `object_get_namespace`. Falls back to the label when no draw label is set.
///
/// # Safety
/// `buf` must be null or point to `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn object_get_draw_label(
    handle: usize,
    frame_id: i64,
    object_id: i64,
    buf: *mut c_char,
    len: usize,
) -> usize {
    object_text(handle, frame_id, object_id, ObjectTextField::DrawLabel, buf, len)
}

/// # Safety
/// `bb` must be null or point to writable storage for one `FfiBoundingBox`.
#[no_mangle]
pub unsafe extern "C" fn object_get_detection_box(
    handle: usize,
    frame_id: i64,
    object_id: i64,
    bb: *mut FfiBoundingBox,
) -> bool {
    if bb.is_null() {
        return false;
    }
    match pipeline(handle).and_then(|p| p.get_detection_box(frame_id, object_id)) {
        Some(bbox) => {
            *bb = bbox.into();
            true
        }
        None => false,
    }
}

/// # Safety
/// `bb` must be null or point to a valid `FfiBoundingBox`.
#[no_mangle]
pub unsafe extern "C" fn object_set_detection_box(
    handle: usize,
    frame_id: i64,
    object_id: i64,
    bb: *const FfiBoundingBox,
) -> bool {
    let Some(bbox) = bb.as_ref() else {
        return false;
    };
    pipeline(handle).map_or(false, |p| p.set_detection_box(frame_id, object_id, (*bbox).into()))
}

/// Writes both the track box and the track id, or neither.
///
/// # Safety
/// `bb` and `tracking_id` must be null or point to writable storage.
#[no_mangle]
pub unsafe extern "C" fn object_get_tracking_info(
    handle: usize,
    frame_id: i64,
    object_id: i64,
    bb: *mut FfiBoundingBox,
    tracking_id: *mut i64,
) -> bool {
    if bb.is_null() || tracking_id.is_null() {
        return false;
    }
    match pipeline(handle).and_then(|p| p.get_tracking_info(frame_id, object_id)) {
        Some(info) => {
            *bb = info.bbox.into();
            *tracking_id = info.id;
            true
        }
        None => false,
    }
}

/// # Safety
/// `bb` must be null or point to a valid `FfiBoundingBox`.
#[no_mangle]
pub unsafe extern "C" fn object_set_tracking_info(
    handle: usize,
    frame_id: i64,
    object_id: i64,
    bb: *const FfiBoundingBox,
    tracking_id: i64,
) -> bool {
    let Some(bbox) = bb.as_ref() else {
        return false;
    };
    pipeline(handle).map_or(false, |p| {
        p.set_tracking_info(frame_id, object_id, (*bbox).into(), tracking_id)
    })
}

#[no_mangle]
pub extern "C" fn object_clear_tracking_info(handle: usize, frame_id: i64, object_id: i64) -> bool {
    pipeline(handle).map_or(false, |p| p.clear_tracking_info(frame_id, object_id))
}

/// Reads a float-vector attribute value.
///
/// On entry `*result_len` is the capacity of `result`. Returns true after copying
/// the value, with `*result_len` set to its length and `*conf_set` telling whether
/// `*conf` was written. If the value exists but does not fit, returns false with
/// `*result_len` set to the required length. If it does not exist, returns false
/// and touches nothing.
///
/// # Safety
/// `namespace` and `name` must be null or valid NUL-terminated strings; `result`
/// must be null or point to `*result_len` writable doubles; `result_len`, `conf`
/// and `conf_set` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn object_get_float_vec_attribute_value(
    handle: usize,
    frame_id: i64,
    object_id: i64,
    namespace: *const c_char,
    name: *const c_char,
    index: usize,
    result: *mut f64,
    result_len: *mut usize,
    conf: *mut f32,
    conf_set: *mut bool,
) -> bool {
    if result_len.is_null() || conf.is_null() || conf_set.is_null() {
        return false;
    }
    let (Some(namespace), Some(name)) = (c_str(namespace), c_str(name)) else {
        return false;
    };
    let dst = out_slice(result, *result_len);
    match handle_api::read_float_vec_attribute(handle as u64, frame_id, object_id, namespace, name, index, dst) {
        FloatVecRead::Absent => false,
        FloatVecRead::NeedsCapacity(required) => {
            *result_len = required;
            false
        }
        FloatVecRead::Copied { len, confidence } => {
            *result_len = len;
            match confidence {
                Some(c) => {
                    *conf = c;
                    *conf_set = true;
                }
                None => *conf_set = false,
            }
            true
        }
    }
}

//==================================================================================
// IV. Movement & Updates
//==================================================================================

/// Moves ids unchanged. An empty list (`len == 0`) moves everything from the
/// preceding stage. Returns the number moved, or -1.
///
/// # Safety
/// `dest_stage` must be null or a valid string; `ids` must be null or point to
/// `len` readable ids.
#[no_mangle]
pub unsafe extern "C" fn pipeline_move_as_is(
    handle: usize,
    dest_stage: *const c_char,
    ids: *const i64,
    len: usize,
) -> i64 {
    let (Some(p), Some(dest), Some(ids)) = (pipeline(handle), c_str(dest_stage), in_slice(ids, len)) else {
        return -1;
    };
    report("pipeline_move_as_is", p.move_as_is(dest, ids)).map_or(-1, |n| n as i64)
}

/// Packs frames into a new batch. Returns the batch id, or -1.
///
/// # Safety
/// `dest_stage` must be null or a valid string; `frame_ids` must be null or point
/// to `len` readable ids.
#[no_mangle]
pub unsafe extern "C" fn pipeline_move_and_pack_frames(
    handle: usize,
    dest_stage: *const c_char,
    frame_ids: *const i64,
    len: usize,
) -> i64 {
    let (Some(p), Some(dest), Some(ids)) =
        (pipeline(handle), c_str(dest_stage), in_slice(frame_ids, len))
    else {
        return -1;
    };
    report("pipeline_move_and_pack_frames", p.move_and_pack_frames(dest, ids)).unwrap_or(-1)
}

/// Unpacks a batch into `dest_stage` and returns its member count.
///
/// The move only happens when `resulting_ids_len` is at least the member count; in
/// that case the member ids are written in pack order. A return value larger than
/// `resulting_ids_len` means nothing moved and the caller should retry with a buffer
/// of that size. Returns 0 on failure (batches are never empty).
///
/// # Safety
/// `dest_stage` must be null or a valid string; `resulting_ids` must be null or
/// point to `resulting_ids_len` writable ids.
#[no_mangle]
pub unsafe extern "C" fn pipeline_move_and_unpack_batch(
    handle: usize,
    dest_stage: *const c_char,
    batch_id: i64,
    resulting_ids: *mut i64,
    resulting_ids_len: usize,
) -> usize {
    let Some(dest) = c_str(dest_stage) else {
        return 0;
    };
    let dst = out_slice(resulting_ids, resulting_ids_len);
    report(
        "pipeline_move_and_unpack_batch",
        handle_api::unpack_into(handle as u64, dest, batch_id, dst),
    )
    .map_or(0, Negotiated::required)
}

#[no_mangle]
pub extern "C" fn pipeline_apply_updates(handle: usize, id: i64) -> bool {
    pipeline(handle).map_or(false, |p| {
        report("pipeline_apply_updates", p.apply_updates(id)).unwrap_or(false)
    })
}

#[no_mangle]
pub extern "C" fn pipeline_clear_updates(handle: usize, id: i64) -> bool {
    pipeline(handle).map_or(false, |p| p.clear_updates(id))
}
