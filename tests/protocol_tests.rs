use colloquy::session::{ControlMessage, ServerEvent};

#[test]
fn ready_event_decodes_with_conversation_id() {
    let event: ServerEvent =
        serde_json::from_str(r#"{"type":"ready","conversation_id":"c-42"}"#).expect("decode");
    assert_eq!(
        event,
        ServerEvent::Ready {
            conversation_id: Some("c-42".to_string()),
            response_id: None,
        }
    );
}

#[test]
fn audio_chunk_decodes_payload_fields() {
    let event: ServerEvent = serde_json::from_str(
        r#"{"type":"audio_chunk","data":"AAA=","sample_rate":24000,"response_id":"7"}"#,
    )
    .expect("decode");
    assert_eq!(
        event,
        ServerEvent::AudioChunk {
            data: "AAA=".to_string(),
            sample_rate: Some(24000),
            response_id: Some("7".to_string()),
        }
    );
}

#[test]
fn chunk_sample_rate_is_optional() {
    let event: ServerEvent =
        serde_json::from_str(r#"{"type":"audio_chunk","data":"AAA="}"#).expect("decode");
    assert!(matches!(
        event,
        ServerEvent::AudioChunk {
            sample_rate: None,
            response_id: None,
            ..
        }
    ));
}

#[test]
fn error_variants_map_by_type_tag() {
    let event: ServerEvent =
        serde_json::from_str(r#"{"type":"tts_error","error":"synth failed"}"#).expect("decode");
    assert_eq!(
        event,
        ServerEvent::TtsError {
            error: Some("synth failed".to_string())
        }
    );

    let event: ServerEvent = serde_json::from_str(r#"{"type":"stt_error"}"#).expect("decode");
    assert_eq!(event, ServerEvent::SttError { error: None });
}

#[test]
fn interrupted_carries_next_response_id() {
    let event: ServerEvent =
        serde_json::from_str(r#"{"type":"interrupted","next_response_id":"7"}"#).expect("decode");
    assert_eq!(
        event,
        ServerEvent::Interrupted {
            next_response_id: Some("7".to_string())
        }
    );
}

#[test]
fn unknown_types_map_to_the_catch_all() {
    let event: ServerEvent =
        serde_json::from_str(r#"{"type":"server_heartbeat","n":3}"#).expect("decode");
    assert_eq!(event, ServerEvent::Unknown);
}

#[test]
fn payload_without_required_text_is_a_decode_error() {
    assert!(serde_json::from_str::<ServerEvent>(r#"{"type":"transcript"}"#).is_err());
}

#[test]
fn control_messages_serialize_to_type_tags() {
    let encode = |m: ControlMessage| serde_json::to_string(&m).expect("encode");
    assert_eq!(encode(ControlMessage::Start), r#"{"type":"start"}"#);
    assert_eq!(encode(ControlMessage::Stop), r#"{"type":"stop"}"#);
    assert_eq!(encode(ControlMessage::Interrupt), r#"{"type":"interrupt"}"#);
    assert_eq!(encode(ControlMessage::Clear), r#"{"type":"clear"}"#);
}
