use crate::config::{MissingIdPolicy, PipelineConfig};
use crate::error::StagepipeError;
use crate::pipeline::{
    AttributeUpdatePolicy, FrameUpdate, Location, ObjectUpdatePolicy, Pipeline, StagePayloadType,
    UnpackOutcome,
};
use crate::types::{Attribute, AttributeValue, BoundingBox, VideoFrame, VideoObject};

// Test Helpers
fn test_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_stage("input", StagePayloadType::Frame)
        .with_stage("infer", StagePayloadType::Batch)
        .with_stage("output", StagePayloadType::Frame)
        .with_stage("archive", StagePayloadType::Batch)
}

fn test_pipeline() -> Pipeline {
    Pipeline::new(&test_config()).unwrap()
}

/// A frame with a confident `person` (id 0) and an unscored `car` (id 1).
fn make_frame(pts: i64) -> VideoFrame {
    VideoFrame::new("cam-0", pts)
        .with_object(
            VideoObject::new(0, "det", "person", BoundingBox::new(10.0, 20.0, 4.0, 8.0))
                .with_confidence(0.5),
        )
        .with_object(VideoObject::new(
            1,
            "det",
            "car",
            BoundingBox::new(50.0, 50.0, 10.0, 5.0),
        ))
}

fn add_frames(p: &Pipeline, n: usize) -> Vec<i64> {
    (0..n)
        .map(|i| p.add_frame("input", make_frame(i as i64)).unwrap())
        .collect()
}

//==================================================================================
// Stage Graph & Ingestion
//==================================================================================

#[test]
fn test_stage_graph_inspection() {
    let p = test_pipeline();
    assert_eq!(p.stage_names(), vec!["input", "infer", "output", "archive"]);
    assert_eq!(p.get_stage_type("infer"), Some(StagePayloadType::Batch));
    assert_eq!(p.get_stage_type("nope"), None);
    assert_eq!(p.stage_len("input"), Some(0));
    assert_eq!(p.stage_len("nope"), None);
}

#[test]
fn test_duplicate_stage_names_are_rejected() {
    let config = PipelineConfig::default()
        .with_stage("a", StagePayloadType::Frame)
        .with_stage("a", StagePayloadType::Batch);
    assert!(matches!(
        Pipeline::new(&config),
        Err(StagepipeError::DuplicateStage(name)) if name == "a"
    ));
}

#[test]
fn test_frames_and_batches_share_one_id_counter() {
    let p = test_pipeline();
    let ids = add_frames(&p, 2);
    assert_eq!(ids, vec![1, 2]);
    let batch_id = p.move_and_pack_frames("infer", &ids).unwrap();
    assert_eq!(batch_id, 3);
    let next = p.add_frame("input", make_frame(9)).unwrap();
    assert_eq!(next, 4);
}

#[test]
fn test_add_frame_requires_frame_stage() {
    let p = test_pipeline();
    let err = p.add_frame("infer", make_frame(0)).unwrap_err();
    assert!(matches!(err, StagepipeError::StageTypeMismatch { .. }));
    assert!(matches!(
        p.add_frame("missing", make_frame(0)),
        Err(StagepipeError::StageNotFound(_))
    ));
    assert_eq!(p.stats().frames, 0);
}

//==================================================================================
// move_as_is
//==================================================================================

#[test]
fn test_move_as_is_explicit_ids() {
    let p = test_pipeline();
    let ids = add_frames(&p, 3);
    assert_eq!(p.move_as_is("output", &ids[..2]).unwrap(), 2);
    assert_eq!(p.stage_ids("input"), Some(vec![ids[2]]));
    assert_eq!(p.stage_ids("output"), Some(vec![ids[0], ids[1]]));
    assert_eq!(
        p.locate(ids[0]),
        Some(Location::Stage {
            stage: "output".to_string(),
            payload: StagePayloadType::Frame
        })
    );
}

#[test]
fn test_move_as_is_empty_ids_pulls_from_previous_stage() {
    let config = PipelineConfig::default()
        .with_stage("decode", StagePayloadType::Frame)
        .with_stage("detect", StagePayloadType::Frame)
        .with_stage("track", StagePayloadType::Frame);
    let p = Pipeline::new(&config).unwrap();
    let a = p.add_frame("decode", make_frame(0)).unwrap();
    let b = p.add_frame("decode", make_frame(1)).unwrap();

    // The first stage has no predecessor.
    assert_eq!(p.move_as_is("decode", &[]).unwrap(), 0);
    // "detect" is empty, so nothing reaches "track".
    assert_eq!(p.move_as_is("track", &[]).unwrap(), 0);

    assert_eq!(p.move_as_is("detect", &[]).unwrap(), 2);
    assert_eq!(p.stage_ids("detect"), Some(vec![a, b]));
    assert_eq!(p.stage_len("decode"), Some(0));

    // Batches in the preceding stage cannot land in a frame stage.
    let p = test_pipeline();
    let ids = add_frames(&p, 2);
    p.move_and_pack_frames("infer", &ids).unwrap();
    assert!(matches!(
        p.move_as_is("output", &[]),
        Err(StagepipeError::StageTypeMismatch { .. })
    ));
}

#[test]
fn test_move_as_is_kind_mismatch_moves_nothing() {
    let p = test_pipeline();
    let ids = add_frames(&p, 2);
    let err = p.move_as_is("infer", &ids).unwrap_err();
    assert!(matches!(
        err,
        StagepipeError::StageTypeMismatch {
            expected: StagePayloadType::Batch,
            actual: StagePayloadType::Frame,
            ..
        }
    ));
    assert_eq!(p.stage_len("input"), Some(2));
    assert_eq!(p.stage_len("infer"), Some(0));
}

#[test]
fn test_move_as_is_missing_id_policies() {
    let p = test_pipeline();
    let ids = add_frames(&p, 1);
    assert_eq!(p.move_as_is("output", &[ids[0], 404]).unwrap(), 1);

    let strict = Pipeline::new(&test_config().with_missing_id_policy(MissingIdPolicy::Abort)).unwrap();
    let ids = add_frames(&strict, 1);
    assert!(matches!(
        strict.move_as_is("output", &[ids[0], 404]),
        Err(StagepipeError::UnknownId(404))
    ));
    assert_eq!(strict.stage_ids("input"), Some(ids));
}

#[test]
fn test_move_as_is_rejects_batched_frames() {
    let p = test_pipeline();
    let ids = add_frames(&p, 2);
    p.move_and_pack_frames("infer", &ids).unwrap();
    assert!(matches!(
        p.move_as_is("output", &[ids[0]]),
        Err(StagepipeError::NotAnIndependentFrame(id)) if id == ids[0]
    ));
}

//==================================================================================
// Pack / Unpack
//==================================================================================

#[test]
fn test_pack_then_unpack_restores_frames_in_order() {
    let p = test_pipeline();
    let ids = add_frames(&p, 3);
    let order = vec![ids[2], ids[0], ids[1]];

    let batch_id = p.move_and_pack_frames("infer", &order).unwrap();
    assert_eq!(p.stage_len("input"), Some(0));
    assert_eq!(p.stage_ids("infer"), Some(vec![batch_id]));
    assert_eq!(p.get_batch(batch_id).unwrap().frames(), order.as_slice());
    assert_eq!(p.locate(ids[0]), Some(Location::Batch(batch_id)));
    // Batched frames stay readable by frame id.
    assert_eq!(p.get_frame(ids[2]).unwrap().pts, 2);

    let unpacked = p.move_and_unpack_batch("output", batch_id).unwrap();
    assert_eq!(unpacked, order);
    assert!(p.get_batch(batch_id).is_none());
    assert!(p.locate(batch_id).is_none());
    assert_eq!(p.stage_ids("output"), Some(ids));
    assert_eq!(p.stats().batches, 0);
}

#[test]
fn test_pack_failures_leave_state_untouched() {
    let p = test_pipeline();
    let ids = add_frames(&p, 2);

    assert!(matches!(
        p.move_and_pack_frames("infer", &[]),
        Err(StagepipeError::EmptyBatch)
    ));
    assert!(matches!(
        p.move_and_pack_frames("infer", &[ids[0], ids[0]]),
        Err(StagepipeError::DuplicateFrameId(_))
    ));
    assert!(matches!(
        p.move_and_pack_frames("infer", &[ids[0], 77]),
        Err(StagepipeError::UnknownId(77))
    ));
    assert!(matches!(
        p.move_and_pack_frames("output", &ids),
        Err(StagepipeError::StageTypeMismatch { .. })
    ));
    assert_eq!(p.stage_ids("input"), Some(ids.clone()));
    assert_eq!(p.stats().batches, 0);

    let batch_id = p.move_and_pack_frames("infer", &[ids[0]]).unwrap();
    assert!(matches!(
        p.move_and_pack_frames("archive", &[ids[0], ids[1]]),
        Err(StagepipeError::NotAnIndependentFrame(_))
    ));
    assert!(matches!(
        p.move_and_pack_frames("archive", &[batch_id]),
        Err(StagepipeError::NotAnIndependentFrame(_))
    ));
    assert_eq!(p.stage_ids("input"), Some(vec![ids[1]]));
}

#[test]
fn test_unpack_errors() {
    let p = test_pipeline();
    let ids = add_frames(&p, 1);
    let batch_id = p.move_and_pack_frames("infer", &ids).unwrap();

    assert!(matches!(
        p.move_and_unpack_batch("archive", batch_id),
        Err(StagepipeError::StageTypeMismatch { .. })
    ));
    assert!(matches!(
        p.move_and_unpack_batch("output", ids[0]),
        Err(StagepipeError::NotABatch(_))
    ));
    assert!(matches!(
        p.move_and_unpack_batch("output", 999),
        Err(StagepipeError::UnknownId(999))
    ));
    assert!(matches!(
        p.move_and_unpack_batch_guarded("archive", batch_id, |_| true),
        Err(StagepipeError::StageTypeMismatch { .. })
    ));
    assert!(p.get_batch(batch_id).is_some());
}

#[test]
fn test_guarded_unpack_reports_required_capacity() {
    let p = test_pipeline();
    let ids = add_frames(&p, 3);
    let batch_id = p.move_and_pack_frames("infer", &ids).unwrap();

    let outcome = p
        .move_and_unpack_batch_guarded("output", batch_id, |n| n <= 2)
        .unwrap();
    assert_eq!(outcome, UnpackOutcome::NeedsCapacity(3));
    assert_eq!(p.stage_ids("infer"), Some(vec![batch_id]));
    assert_eq!(p.stage_len("output"), Some(0));

    let outcome = p
        .move_and_unpack_batch_guarded("output", batch_id, |n| n <= 3)
        .unwrap();
    assert_eq!(outcome, UnpackOutcome::Unpacked(ids));
}

#[test]
fn test_delete_frame_and_batch() {
    let p = test_pipeline();
    let ids = add_frames(&p, 3);
    let batch_id = p.move_and_pack_frames("infer", &ids[1..]).unwrap();

    let mut update = FrameUpdate::new();
    update.set_confidence(0, Some(0.9));
    p.add_frame_update(ids[0], update).unwrap();
    p.delete(ids[0]).unwrap();
    assert!(p.get_frame(ids[0]).is_none());
    assert_eq!(p.pending_updates(ids[0]), 0);

    assert!(matches!(
        p.delete(ids[1]),
        Err(StagepipeError::NotAnIndependentFrame(_))
    ));
    p.delete(batch_id).unwrap();
    assert!(p.get_frame(ids[1]).is_none());
    assert!(p.locate(ids[2]).is_none());
    assert_eq!(p.stats().frames, 0);
    assert!(matches!(p.delete(batch_id), Err(StagepipeError::UnknownId(_))));
}

//==================================================================================
// Deferred Updates
//==================================================================================

#[test]
fn test_staged_update_is_invisible_until_applied() {
    let p = test_pipeline();
    let id = add_frames(&p, 1)[0];
    let mut update = FrameUpdate::new();
    update.set_confidence(0, Some(0.99));
    p.add_frame_update(id, update).unwrap();

    assert_eq!(p.get_confidence(id, 0), Some(0.5));
    assert!(p.apply_updates(id).unwrap());
    assert_eq!(p.get_confidence(id, 0), Some(0.99));
    // Nothing left to apply.
    assert!(!p.apply_updates(id).unwrap());
}

#[test]
fn test_updates_follow_frames_through_pack_and_unpack() {
    let p = test_pipeline();
    let ids = add_frames(&p, 2);

    let mut early = FrameUpdate::new();
    early.set_confidence(1, Some(0.25));
    p.add_frame_update(ids[1], early).unwrap();

    let batch_id = p.move_and_pack_frames("infer", &ids).unwrap();
    assert_eq!(p.pending_updates(ids[1]), 0);
    assert_eq!(p.pending_updates(batch_id), 1);

    let mut late = FrameUpdate::new();
    late.set_confidence(0, None);
    p.add_batched_frame_update(batch_id, ids[0], late).unwrap();
    assert_eq!(p.pending_updates(batch_id), 2);

    p.move_and_unpack_batch("output", batch_id).unwrap();
    assert_eq!(p.pending_updates(ids[0]), 1);
    assert_eq!(p.pending_updates(ids[1]), 1);

    assert!(p.apply_updates(ids[0]).unwrap());
    assert!(p.apply_updates(ids[1]).unwrap());
    assert_eq!(p.get_confidence(ids[0], 0), None);
    assert_eq!(p.get_confidence(ids[1], 1), Some(0.25));
}

#[test]
fn test_apply_on_batch_updates_every_member() {
    let p = test_pipeline();
    let ids = add_frames(&p, 2);
    let batch_id = p.move_and_pack_frames("infer", &ids).unwrap();

    for &fid in &ids {
        let mut update = FrameUpdate::new();
        update.set_frame_attribute(
            Attribute::new("meta", "seen", vec![AttributeValue::boolean(true, None)]),
            AttributeUpdatePolicy::default(),
        );
        p.add_batched_frame_update(batch_id, fid, update).unwrap();
    }
    // The member's own id has no queue entry while it is batched.
    assert!(!p.apply_updates(ids[0]).unwrap());
    assert!(p.apply_updates(batch_id).unwrap());
    for &fid in &ids {
        assert_eq!(
            p.get_frame_attribute_value(fid, "meta", "seen", 0),
            Some(AttributeValue::boolean(true, None))
        );
    }
}

#[test]
fn test_failed_apply_rolls_back_and_keeps_updates() {
    let p = test_pipeline();
    let id = add_frames(&p, 1)[0];
    let before = p.get_frame(id).unwrap();

    let mut update = FrameUpdate::new();
    update.set_confidence(0, Some(0.1)).delete_object(42);
    p.add_frame_update(id, update).unwrap();

    let err = p.apply_updates(id).unwrap_err();
    match err {
        StagepipeError::UpdateFailed { id: failed, source } => {
            assert_eq!(failed, id);
            assert!(matches!(
                *source,
                StagepipeError::ObjectNotFound { object_id: 42, .. }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(p.get_frame(id).unwrap(), before);
    assert_eq!(p.pending_updates(id), 1);

    assert!(p.clear_updates(id));
    assert!(!p.clear_updates(id));
    assert!(!p.apply_updates(id).unwrap());
}

#[test]
fn test_foreign_object_at_max_id_fails_and_keeps_updates() {
    let p = test_pipeline();
    let frame = make_frame(0).with_object(VideoObject::new(
        i64::MAX,
        "det",
        "bike",
        BoundingBox::new(1.0, 1.0, 1.0, 1.0),
    ));
    let id = p.add_frame("input", frame).unwrap();
    let before = p.get_frame(id).unwrap();

    let mut update = FrameUpdate::new();
    update.add_object(
        VideoObject::new(i64::MAX, "det", "bike", BoundingBox::new(2.0, 2.0, 1.0, 1.0)),
        ObjectUpdatePolicy::AddForeignObjects,
    );
    p.add_frame_update(id, update).unwrap();

    match p.apply_updates(id) {
        Err(StagepipeError::UpdateFailed { id: failed, source }) => {
            assert_eq!(failed, id);
            assert!(matches!(
                *source,
                StagepipeError::ObjectIdExhausted { frame_id } if frame_id == id
            ));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(p.get_frame(id).unwrap(), before);
    assert_eq!(p.pending_updates(id), 1);
}

#[test]
fn test_batch_apply_failure_rolls_back_every_member() {
    let p = test_pipeline();
    let ids = add_frames(&p, 2);
    let batch_id = p.move_and_pack_frames("infer", &ids).unwrap();

    let mut ok = FrameUpdate::new();
    ok.set_confidence(0, Some(0.8));
    p.add_batched_frame_update(batch_id, ids[0], ok).unwrap();
    let mut bad = FrameUpdate::new();
    bad.set_label(7, "ghost");
    p.add_batched_frame_update(batch_id, ids[1], bad).unwrap();

    assert!(p.apply_updates(batch_id).is_err());
    assert_eq!(p.get_confidence(ids[0], 0), Some(0.5));
    assert_eq!(p.pending_updates(batch_id), 2);
}

#[test]
fn test_update_targets_are_validated_when_staged() {
    let p = test_pipeline();
    let ids = add_frames(&p, 2);
    let batch_id = p.move_and_pack_frames("infer", &ids[..1]).unwrap();

    assert!(matches!(
        p.add_frame_update(ids[0], FrameUpdate::new()),
        Err(StagepipeError::NotAnIndependentFrame(_))
    ));
    assert!(matches!(
        p.add_frame_update(555, FrameUpdate::new()),
        Err(StagepipeError::UnknownId(555))
    ));
    assert!(matches!(
        p.add_batched_frame_update(batch_id, ids[1], FrameUpdate::new()),
        Err(StagepipeError::NotInBatch { .. })
    ));
    assert!(matches!(
        p.add_batched_frame_update(ids[1], ids[1], FrameUpdate::new()),
        Err(StagepipeError::NotABatch(_))
    ));
}

//==================================================================================
// Object Accessors
//==================================================================================

#[test]
fn test_confidence_accessors() {
    let p = test_pipeline();
    let id = add_frames(&p, 1)[0];
    assert_eq!(p.get_confidence(id, 0), Some(0.5));
    assert_eq!(p.get_confidence(id, 1), None);

    assert!(p.set_confidence(id, 1, 0.75));
    assert_eq!(p.get_confidence(id, 1), Some(0.75));
    assert!(p.clear_confidence(id, 1));
    assert_eq!(p.get_confidence(id, 1), None);

    assert!(!p.set_confidence(id, 9, 0.1));
    assert!(!p.clear_confidence(404, 0));
}

#[test]
fn test_box_and_tracking_accessors() {
    let p = test_pipeline();
    let id = add_frames(&p, 1)[0];

    let rotated = BoundingBox::rotated(1.0, 2.0, 3.0, 4.0, 45.0);
    assert!(p.set_detection_box(id, 0, rotated));
    assert_eq!(p.get_detection_box(id, 0), Some(rotated));
    assert!(p.get_detection_box(id, 5).is_none());

    assert!(p.get_tracking_info(id, 0).is_none());
    let track_box = BoundingBox::new(11.0, 21.0, 4.0, 8.0);
    assert!(p.set_tracking_info(id, 0, track_box, 17));
    let info = p.get_tracking_info(id, 0).unwrap();
    assert_eq!(info.id, 17);
    assert_eq!(info.bbox, track_box);
    assert!(p.clear_tracking_info(id, 0));
    assert!(p.get_tracking_info(id, 0).is_none());
    assert!(!p.set_tracking_info(id, 3, track_box, 1));
}

#[test]
fn test_text_and_attribute_accessors() {
    let p = test_pipeline();
    let id = add_frames(&p, 1)[0];
    assert_eq!(p.get_namespace(id, 0).as_deref(), Some("det"));
    assert_eq!(p.get_label(id, 1).as_deref(), Some("car"));
    assert_eq!(p.get_draw_label(id, 1).as_deref(), Some("car"));
    assert!(p.get_label(id, 8).is_none());

    let mut update = FrameUpdate::new();
    update
        .set_draw_label(1, Some("Car #1".to_string()))
        .set_object_attribute(
            1,
            Attribute::new(
                "reid",
                "embedding",
                vec![
                    AttributeValue::float_vector(vec![0.1, 0.2, 0.3], Some(0.9)),
                    AttributeValue::float_vector(vec![1.0], None),
                ],
            ),
            AttributeUpdatePolicy::ErrorWhenDuplicate,
        );
    p.add_frame_update(id, update).unwrap();
    p.apply_updates(id).unwrap();

    assert_eq!(p.get_draw_label(id, 1).as_deref(), Some("Car #1"));
    let value = p.get_attribute_value(id, 1, "reid", "embedding", 1).unwrap();
    assert_eq!(value.as_float_vector(), Some(&[1.0][..]));
    assert!(p.get_attribute_value(id, 1, "reid", "embedding", 2).is_none());
    assert!(p.get_attribute_value(id, 0, "reid", "embedding", 0).is_none());
}
