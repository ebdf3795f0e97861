use super::handle_api::*;
use super::*;
use crate::error::StagepipeError;
use crate::types::ObjectTextField;

const CONFIG_JSON: &str = r#"{
    "name": "bridge-test",
    "stages": [
        {"name": "decode", "payload": "frame"},
        {"name": "infer", "payload": "batch"},
        {"name": "sink", "payload": "frame"}
    ],
    "missing_id_policy": "abort"
}"#;

const FRAME_JSON: &str = r#"{
    "source_id": "cam-7",
    "pts": 40,
    "objects": [
        {
            "id": 0,
            "namespace": "yolo",
            "label": "person",
            "confidence": 0.8,
            "detection_box": {"xc": 10.0, "yc": 10.0, "width": 5.0, "height": 9.0},
            "attributes": [
                {
                    "namespace": "reid",
                    "name": "embedding",
                    "values": [
                        {"confidence": 0.7, "value": {"kind": "float_vector", "data": [0.5, 0.25, 0.125]}}
                    ]
                }
            ]
        }
    ]
}"#;

#[test]
fn test_handle_lifecycle() {
    let handle = create_pipeline_from_json(CONFIG_JSON).unwrap();
    assert_ne!(handle, 0);
    assert_eq!(lookup(handle).unwrap().name(), "bridge-test");

    assert!(release_pipeline(handle));
    assert!(lookup(handle).is_err());
    assert!(!release_pipeline(handle));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dup = r#"{"stages": [{"name": "a", "payload": "frame"}, {"name": "a", "payload": "frame"}]}"#;
    assert!(create_pipeline_from_json(dup).is_err());
    assert!(create_pipeline_from_json("not json").is_err());
}

#[test]
fn test_text_fields_negotiate_size() {
    let handle = create_pipeline_from_json(CONFIG_JSON).unwrap();
    let frame_id = add_frame_json(handle, "decode", FRAME_JSON).unwrap();

    let mut small = [0u8; 2];
    let query = read_text(handle, frame_id, 0, ObjectTextField::Label, &mut small).unwrap();
    assert_eq!(query, Negotiated::NeedsCapacity(7));
    assert_eq!(small, [0, 0]);

    let mut buf = vec![0u8; query.required()];
    let filled = read_text(handle, frame_id, 0, ObjectTextField::Label, &mut buf).unwrap();
    assert_eq!(filled, Negotiated::Written(7));
    assert_eq!(&buf, b"person\0");

    assert!(read_text(handle, frame_id, 9, ObjectTextField::Namespace, &mut buf).is_none());
    release_pipeline(handle);
}

#[test]
fn test_text_with_nul_is_rejected_at_ingestion() {
    let handle = create_pipeline_from_json(CONFIG_JSON).unwrap();
    let bad_frame = FRAME_JSON.replace(r#""label": "person""#, r#""label": "per\u0000son""#);
    assert!(matches!(
        add_frame_json(handle, "decode", &bad_frame),
        Err(StagepipeError::InteriorNul { object_id: 0 })
    ));
    assert_eq!(lookup(handle).unwrap().stage_len("decode"), Some(0));

    let frame_id = add_frame_json(handle, "decode", FRAME_JSON).unwrap();
    let bad_update = r#"{"commands": [{"op": "set_draw_label", "object_id": 0, "draw_label": "a\u0000b"}]}"#;
    assert!(matches!(
        add_frame_update_json(handle, frame_id, bad_update),
        Err(StagepipeError::InteriorNul { object_id: 0 })
    ));
    assert_eq!(lookup(handle).unwrap().pending_updates(frame_id), 0);

    let ok_update = r#"{"commands": [{"op": "set_label", "object_id": 0, "label": "rider"}]}"#;
    add_frame_update_json(handle, frame_id, ok_update).unwrap();
    assert_eq!(lookup(handle).unwrap().pending_updates(frame_id), 1);
    release_pipeline(handle);
}

#[test]
fn test_float_vec_attribute_read() {
    let handle = create_pipeline_from_json(CONFIG_JSON).unwrap();
    let frame_id = add_frame_json(handle, "decode", FRAME_JSON).unwrap();

    let mut short = [0.0f64; 1];
    assert_eq!(
        read_float_vec_attribute(handle, frame_id, 0, "reid", "embedding", 0, &mut short),
        FloatVecRead::NeedsCapacity(3)
    );
    let mut buf = [0.0f64; 4];
    assert_eq!(
        read_float_vec_attribute(handle, frame_id, 0, "reid", "embedding", 0, &mut buf),
        FloatVecRead::Copied {
            len: 3,
            confidence: Some(0.7)
        }
    );
    assert_eq!(&buf[..3], &[0.5, 0.25, 0.125]);
    assert_eq!(
        read_float_vec_attribute(handle, frame_id, 0, "reid", "embedding", 1, &mut buf),
        FloatVecRead::Absent
    );
    release_pipeline(handle);
}

#[test]
fn test_unpack_into_waits_for_capacity() {
    let handle = create_pipeline_from_json(CONFIG_JSON).unwrap();
    let ids: Vec<i64> = (0..3)
        .map(|_| add_frame_json(handle, "decode", FRAME_JSON).unwrap())
        .collect();
    let pipeline = lookup(handle).unwrap();
    let batch_id = pipeline.move_and_pack_frames("infer", &ids).unwrap();

    let mut small = [0i64; 2];
    assert_eq!(
        unpack_into(handle, "sink", batch_id, &mut small).unwrap(),
        Negotiated::NeedsCapacity(3)
    );
    assert_eq!(pipeline.stage_len("infer"), Some(1));

    let mut buf = [0i64; 3];
    assert_eq!(
        unpack_into(handle, "sink", batch_id, &mut buf).unwrap(),
        Negotiated::Written(3)
    );
    assert_eq!(buf.to_vec(), ids);
    assert_eq!(pipeline.stage_len("sink"), Some(3));
    release_pipeline(handle);
}

#[test]
fn test_update_json_round_trip_through_handles() {
    let handle = create_pipeline_from_json(CONFIG_JSON).unwrap();
    let frame_id = add_frame_json(handle, "decode", FRAME_JSON).unwrap();
    let update = r#"{"commands": [
        {"op": "set_confidence", "object_id": 0, "confidence": null},
        {"op": "set_label", "object_id": 0, "label": "pedestrian"}
    ]}"#;
    add_frame_update_json(handle, frame_id, update).unwrap();
    assert!(add_frame_update_json(handle, frame_id, "{bad").is_err());

    let pipeline = lookup(handle).unwrap();
    assert!(pipeline.apply_updates(frame_id).unwrap());
    assert_eq!(pipeline.get_confidence(frame_id, 0), None);
    assert_eq!(pipeline.get_label(frame_id, 0).as_deref(), Some("pedestrian"));
    release_pipeline(handle);
}
