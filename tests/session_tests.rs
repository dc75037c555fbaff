use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use colloquy::session::{
    ControlMessage, Effect, EngineUpdate, LocalSignal, PlaybackEvent, ServerEvent, Session,
    SessionEvent, SocketNotice, TurnPhase,
};
use colloquy::Gate;

fn new_session() -> (Arc<Gate>, Session) {
    let gate = Arc::new(Gate::new());
    let session = Session::new(Arc::clone(&gate), 24_000);
    (gate, session)
}

fn chunk(id: &str) -> SessionEvent {
    SessionEvent::Server(ServerEvent::AudioChunk {
        data: BASE64.encode([0u8; 640]),
        sample_rate: Some(24_000),
        response_id: Some(id.to_string()),
    })
}

fn server(event: ServerEvent) -> SessionEvent {
    SessionEvent::Server(event)
}

fn has_resume(effects: &[Effect]) -> bool {
    effects
        .iter()
        .any(|e| matches!(e, Effect::Notify(EngineUpdate::ResumeListening)))
}

fn has_control(effects: &[Effect], message: ControlMessage) -> bool {
    effects
        .iter()
        .any(|e| matches!(e, Effect::SendControl(m) if *m == message))
}

fn scheduled(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Schedule(_)))
        .count()
}

fn begin_turn(session: &mut Session) {
    session.dispatch(server(ServerEvent::Listening));
}

#[test]
fn empty_transcript_resumes_immediately_with_no_buffers() {
    // Start listening, hear nothing: the microphone comes straight back.
    let (gate, mut session) = new_session();
    begin_turn(&mut session);
    assert!(gate.listening());

    let fx = session.dispatch(server(ServerEvent::TranscriptEmpty));
    assert!(has_resume(&fx));
    assert_eq!(session.pending_buffers(), 0);
    assert_eq!(session.phase(), TurnPhase::Idle);
}

#[test]
fn resume_waits_for_the_last_buffer_to_drain() {
    // Three chunks are scheduled; the server's `complete` arrives while
    // they are still playing. Resume must wait for the third completion.
    let (gate, mut session) = new_session();
    begin_turn(&mut session);

    session.dispatch(server(ServerEvent::Synthesizing {
        response_id: Some("r1".to_string()),
    }));
    assert!(gate.speaking());
    assert!(gate.can_play_incoming());
    assert!(!gate.listening(), "speaking excludes listening");

    for _ in 0..3 {
        let fx = session.dispatch(chunk("r1"));
        assert_eq!(scheduled(&fx), 1);
    }
    assert_eq!(session.pending_buffers(), 3);

    let fx = session.dispatch(server(ServerEvent::Complete {
        response_id: None,
        next_response_id: None,
    }));
    assert!(!has_resume(&fx), "resume must not fire before drain");

    let fx = session.dispatch(SessionEvent::Playback(PlaybackEvent::ChunkFinished));
    assert!(!has_resume(&fx));
    let fx = session.dispatch(SessionEvent::Playback(PlaybackEvent::ChunkFinished));
    assert!(!has_resume(&fx));
    let fx = session.dispatch(SessionEvent::Playback(PlaybackEvent::ChunkFinished));
    assert!(has_resume(&fx), "resume fires on the final completion");

    assert!(!gate.speaking());
    assert_eq!(session.phase(), TurnPhase::Idle);
}

#[test]
fn resume_fires_at_most_once_per_turn() {
    let (_gate, mut session) = new_session();
    begin_turn(&mut session);

    session.dispatch(server(ServerEvent::Synthesizing {
        response_id: Some("r1".to_string()),
    }));
    session.dispatch(chunk("r1"));
    session.dispatch(server(ServerEvent::Complete {
        response_id: None,
        next_response_id: None,
    }));

    let fx = session.dispatch(SessionEvent::Playback(PlaybackEvent::ChunkFinished));
    assert!(has_resume(&fx));

    // A stray completion notice after the turn ended changes nothing.
    let fx = session.dispatch(SessionEvent::Playback(PlaybackEvent::ChunkFinished));
    assert!(!has_resume(&fx));

    // The next turn re-arms the notification.
    begin_turn(&mut session);
    let fx = session.dispatch(server(ServerEvent::TranscriptEmpty));
    assert!(has_resume(&fx));
}

#[test]
fn barge_in_stops_playback_and_rejects_the_dead_turn() {
    let (gate, mut session) = new_session();
    begin_turn(&mut session);

    session.dispatch(server(ServerEvent::Synthesizing {
        response_id: Some("r1".to_string()),
    }));
    let fx = session.dispatch(chunk("r1"));
    assert_eq!(scheduled(&fx), 1);
    assert_eq!(session.pending_buffers(), 1);

    let fx = session.dispatch(SessionEvent::Local(LocalSignal::BargeIn));
    assert!(fx.iter().any(|e| matches!(e, Effect::StopPlayback)));
    assert!(has_control(&fx, ControlMessage::Interrupt));
    assert!(has_resume(&fx), "local interrupt bypasses the drain wait");
    assert_eq!(session.pending_buffers(), 0);
    assert!(!gate.speaking());
    assert!(!gate.can_play_incoming());

    // A late chunk for the interrupted turn arrives after the decision:
    // it must be dropped without scheduling.
    let fx = session.dispatch(chunk("r1"));
    assert_eq!(scheduled(&fx), 0);
    assert_eq!(session.pending_buffers(), 0);
}

#[test]
fn barge_in_is_ignored_while_not_speaking() {
    let (_gate, mut session) = new_session();
    begin_turn(&mut session);
    let fx = session.dispatch(SessionEvent::Local(LocalSignal::BargeIn));
    assert!(fx.is_empty());
}

#[test]
fn server_interrupt_hands_over_to_the_named_successor() {
    // The server interrupts the old turn and names response "7" as the
    // successor; audio for "7" must flow, audio for the old id must not.
    let (_gate, mut session) = new_session();
    begin_turn(&mut session);

    session.dispatch(server(ServerEvent::Synthesizing {
        response_id: Some("old".to_string()),
    }));
    session.dispatch(chunk("old"));

    let fx = session.dispatch(server(ServerEvent::Interrupted {
        next_response_id: Some("7".to_string()),
    }));
    assert!(fx.iter().any(|e| matches!(e, Effect::StopPlayback)));
    assert!(has_resume(&fx));

    let fx = session.dispatch(chunk("7"));
    assert_eq!(scheduled(&fx), 1, "successor turn audio is accepted");

    let fx = session.dispatch(chunk("old"));
    assert_eq!(scheduled(&fx), 0, "stale audio is dropped");
}

#[test]
fn transcript_for_a_cancelled_response_is_suppressed() {
    let (_gate, mut session) = new_session();
    begin_turn(&mut session);

    session.dispatch(server(ServerEvent::Synthesizing {
        response_id: Some("r1".to_string()),
    }));
    session.dispatch(SessionEvent::Local(LocalSignal::Interrupt));

    let fx = session.dispatch(server(ServerEvent::Transcript {
        text: "too late".to_string(),
        response_id: Some("r1".to_string()),
    }));
    assert!(
        !fx.iter()
            .any(|e| matches!(e, Effect::Notify(EngineUpdate::Transcript(_)))),
        "cancelled turn must not reach the transcript callback"
    );
}

#[test]
fn text_deltas_stop_after_completion_cancels_the_id() {
    let (_gate, mut session) = new_session();
    begin_turn(&mut session);

    session.dispatch(server(ServerEvent::Generating {
        response_id: Some("r1".to_string()),
    }));
    let fx = session.dispatch(server(ServerEvent::TextDelta {
        text: "hello".to_string(),
        response_id: Some("r1".to_string()),
    }));
    assert!(fx
        .iter()
        .any(|e| matches!(e, Effect::Notify(EngineUpdate::ResponseDelta(_)))));

    session.dispatch(server(ServerEvent::Complete {
        response_id: None,
        next_response_id: None,
    }));

    let fx = session.dispatch(server(ServerEvent::TextDelta {
        text: "straggler".to_string(),
        response_id: Some("r1".to_string()),
    }));
    assert!(
        !fx.iter()
            .any(|e| matches!(e, Effect::Notify(EngineUpdate::ResponseDelta(_)))),
        "late deltas for a finished turn are dropped"
    );
}

#[test]
fn text_only_turn_completes_without_audio() {
    let (_gate, mut session) = new_session();
    begin_turn(&mut session);

    session.dispatch(server(ServerEvent::Generating {
        response_id: Some("r1".to_string()),
    }));
    let fx = session.dispatch(server(ServerEvent::TextComplete {
        text: "the answer".to_string(),
        response_id: Some("r1".to_string()),
    }));
    assert!(fx.iter().any(|e| matches!(
        e,
        Effect::Notify(EngineUpdate::Response(text)) if text == "the answer"
    )));

    // No buffers pending: complete resumes immediately.
    let fx = session.dispatch(server(ServerEvent::Complete {
        response_id: None,
        next_response_id: None,
    }));
    assert!(has_resume(&fx));
}

#[test]
fn server_errors_remediate_like_interrupts() {
    let (gate, mut session) = new_session();
    begin_turn(&mut session);

    session.dispatch(server(ServerEvent::Synthesizing {
        response_id: Some("r1".to_string()),
    }));
    session.dispatch(chunk("r1"));

    let fx = session.dispatch(server(ServerEvent::TtsError {
        error: Some("voice unavailable".to_string()),
    }));
    assert!(fx.iter().any(|e| matches!(e, Effect::StopPlayback)));
    assert!(has_resume(&fx));
    assert!(fx.iter().any(|e| matches!(
        e,
        Effect::Notify(EngineUpdate::Error(message)) if message == "voice unavailable"
    )));
    assert!(!gate.speaking());
    assert_eq!(session.phase(), TurnPhase::Errored);

    // The dead turn's audio stays dead.
    let fx = session.dispatch(chunk("r1"));
    assert_eq!(scheduled(&fx), 0);
}

#[test]
fn chunks_are_rejected_while_the_playback_gate_is_closed() {
    let (_gate, mut session) = new_session();
    begin_turn(&mut session);
    // No synthesizing event: the accept gate never opened.
    let fx = session.dispatch(chunk("r1"));
    assert_eq!(scheduled(&fx), 0);
    assert_eq!(session.pending_buffers(), 0);
}

#[test]
fn start_listening_opens_capture_and_tells_the_server() {
    let (_gate, mut session) = new_session();
    let fx = session.dispatch(SessionEvent::Local(LocalSignal::StartListening));
    assert!(fx.iter().any(|e| matches!(e, Effect::StartCapture)));
    assert!(has_control(&fx, ControlMessage::Start));
}

#[test]
fn silence_cutoff_sends_stop_while_listening() {
    let (gate, mut session) = new_session();
    begin_turn(&mut session);

    let fx = session.dispatch(SessionEvent::Local(LocalSignal::SilenceDetected));
    assert!(has_control(&fx, ControlMessage::Stop));
    assert!(!gate.listening());

    // Outside the listening phase the signal is a no-op.
    let fx = session.dispatch(SessionEvent::Local(LocalSignal::SilenceDetected));
    assert!(fx.is_empty());
}

#[test]
fn connection_loss_clears_all_local_state() {
    let (gate, mut session) = new_session();
    begin_turn(&mut session);
    session.dispatch(server(ServerEvent::Synthesizing {
        response_id: Some("r1".to_string()),
    }));
    session.dispatch(chunk("r1"));

    let fx = session.dispatch(SessionEvent::Socket(SocketNotice::Closed(Some(
        "io error".to_string(),
    ))));
    assert!(fx.iter().any(|e| matches!(e, Effect::StopCapture)));
    assert!(fx.iter().any(|e| matches!(e, Effect::StopPlayback)));
    assert!(fx.iter().any(|e| matches!(
        e,
        Effect::Notify(EngineUpdate::Disconnected { reason: Some(r) }) if r == "io error"
    )));
    assert!(!gate.listening());
    assert!(!gate.speaking());
    assert!(!gate.can_play_incoming());
    assert_eq!(session.pending_buffers(), 0);
    assert_eq!(session.phase(), TurnPhase::Idle);
    // No resume on disconnect: reconnection is the caller's decision.
    assert!(!has_resume(&fx));
}

#[test]
fn listening_event_resets_per_turn_state() {
    let (gate, mut session) = new_session();
    begin_turn(&mut session);
    session.dispatch(server(ServerEvent::Synthesizing {
        response_id: Some("r1".to_string()),
    }));
    session.dispatch(chunk("r1"));
    assert_eq!(session.pending_buffers(), 1);

    // The next turn starts while a stray buffer count lingers; it must
    // not leak into the new turn.
    begin_turn(&mut session);
    assert_eq!(session.pending_buffers(), 0);
    assert!(gate.listening());
    assert!(!gate.speaking());
    assert!(!gate.can_play_incoming());
    assert_eq!(session.phase(), TurnPhase::Listening);
}

#[test]
fn ready_event_reports_the_conversation() {
    let (_gate, mut session) = new_session();
    let fx = session.dispatch(server(ServerEvent::Ready {
        conversation_id: Some("c-1".to_string()),
        response_id: None,
    }));
    assert!(fx.iter().any(|e| matches!(
        e,
        Effect::Notify(EngineUpdate::Connected { conversation_id: Some(c) }) if c == "c-1"
    )));
    assert_eq!(session.conversation_id(), Some("c-1"));
}

#[test]
fn malformed_chunk_payload_is_dropped_without_counting() {
    let (_gate, mut session) = new_session();
    begin_turn(&mut session);
    session.dispatch(server(ServerEvent::Synthesizing {
        response_id: Some("r1".to_string()),
    }));

    let fx = session.dispatch(server(ServerEvent::AudioChunk {
        data: "not base64!!".to_string(),
        sample_rate: None,
        response_id: Some("r1".to_string()),
    }));
    assert_eq!(scheduled(&fx), 0);
    assert_eq!(session.pending_buffers(), 0);
}
