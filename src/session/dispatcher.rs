use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{debug, info, warn};

use super::completion::TurnCompletion;
use super::event::{
    AudioChunk, ControlMessage, Effect, EngineUpdate, LocalSignal, PlaybackEvent, ServerEvent,
    SessionEvent, SocketNotice,
};
use super::identity::ResponseIdentity;
use super::phase::TurnPhase;
use crate::gate::Gate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The session state machine. Consumes one `SessionEvent` at a time and
/// returns the effects to execute; it performs no I/O itself, which is
/// what keeps every turn-ordering property checkable without a server or
/// a sound card.
///
/// All mutable turn state lives here and is touched only from the event
/// loop that drives `dispatch`. The one exception is the gate, which is
/// atomic precisely so the capture callback can read it from outside.
pub struct Session {
    gate: Arc<Gate>,
    identity: ResponseIdentity,
    completion: TurnCompletion,
    phase: TurnPhase,
    connection: ConnectionState,
    conversation_id: Option<String>,
    response_buffer: String,
    /// Set when an interrupt was decided locally and the server has not
    /// yet confirmed; suppresses the dead turn's synthesis events.
    locally_interrupted: bool,
    default_sample_rate: u32,
}

impl Session {
    pub fn new(gate: Arc<Gate>, default_sample_rate: u32) -> Self {
        Self {
            gate,
            identity: ResponseIdentity::new(),
            completion: TurnCompletion::new(),
            phase: TurnPhase::Idle,
            connection: ConnectionState::Disconnected,
            conversation_id: None,
            response_buffer: String::new(),
            locally_interrupted: false,
            default_sample_rate,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn pending_buffers(&self) -> u32 {
        self.completion.pending_buffers()
    }

    pub fn dispatch(&mut self, event: SessionEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            SessionEvent::Server(ev) => self.on_server(ev, &mut effects),
            SessionEvent::Playback(ev) => self.on_playback(ev, &mut effects),
            SessionEvent::Local(sig) => self.on_local(sig, &mut effects),
            SessionEvent::Socket(notice) => self.on_socket(notice, &mut effects),
        }
        effects
    }

    fn on_server(&mut self, event: ServerEvent, effects: &mut Vec<Effect>) {
        match event {
            ServerEvent::Ready {
                conversation_id,
                response_id,
            } => {
                self.connection = ConnectionState::Connected;
                self.conversation_id = conversation_id.clone();
                self.identity.advance(response_id);
                info!(conversation_id = ?self.conversation_id, "session ready");
                effects.push(Effect::Notify(EngineUpdate::Connected { conversation_id }));
                self.status("Ready", effects);
            }

            ServerEvent::Listening => {
                self.set_phase(TurnPhase::Listening);
                // Fresh turn: nothing from the previous one may leak.
                self.completion.begin_turn();
                self.locally_interrupted = false;
                self.response_buffer.clear();
                self.gate.set(Some(true), Some(false), Some(false));
                self.status("Listening...", effects);
            }

            ServerEvent::Stopped => {
                self.gate.set(Some(false), None, None);
                self.set_phase(TurnPhase::Stopped);
                self.status("Processing...", effects);
            }

            ServerEvent::Transcribing => {
                self.set_phase(TurnPhase::Transcribing);
                self.status("Transcribing...", effects);
            }

            ServerEvent::Transcript { text, response_id } => {
                if !self.identity.should_accept(response_id.as_deref(), false) {
                    return;
                }
                effects.push(Effect::Notify(EngineUpdate::Transcript(text)));
            }

            ServerEvent::TranscriptEmpty => {
                // No speech made it through; there is no turn to wait for.
                self.status("No speech detected", effects);
                self.set_phase(TurnPhase::Idle);
                if self.completion.force_finish() {
                    effects.push(Effect::Notify(EngineUpdate::ResumeListening));
                }
            }

            ServerEvent::Generating { response_id } => {
                if !self.identity.should_accept(response_id.as_deref(), false) {
                    return;
                }
                self.set_phase(TurnPhase::Generating);
                self.response_buffer.clear();
                self.status("Generating...", effects);
            }

            ServerEvent::TextDelta { text, response_id } => {
                if !self.identity.should_accept(response_id.as_deref(), false) {
                    return;
                }
                self.response_buffer.push_str(&text);
                effects.push(Effect::Notify(EngineUpdate::ResponseDelta(text)));
            }

            ServerEvent::TextComplete { text, response_id } => {
                if !self.identity.should_accept(response_id.as_deref(), false) {
                    return;
                }
                self.response_buffer = text.clone();
                effects.push(Effect::Notify(EngineUpdate::Response(text)));
            }

            ServerEvent::Synthesizing { response_id } => {
                if self.locally_interrupted {
                    debug!("ignoring synthesizing after local interrupt");
                    return;
                }
                if !self.identity.should_accept(response_id.as_deref(), false) {
                    return;
                }
                self.set_phase(TurnPhase::Synthesizing);
                self.gate.set(None, Some(true), Some(true));
                self.status("Speaking...", effects);
            }

            ServerEvent::AudioChunk {
                data,
                sample_rate,
                response_id,
            } => {
                if !self.identity.should_accept(response_id.as_deref(), false) {
                    return;
                }
                if self.locally_interrupted {
                    debug!("dropping audio chunk after local interrupt");
                    return;
                }
                if !self.gate.can_play_incoming() {
                    debug!("dropping audio chunk: playback gate closed");
                    return;
                }
                let pcm = match BASE64.decode(data.as_bytes()) {
                    Ok(pcm) => pcm,
                    Err(e) => {
                        warn!(error = %e, "undecodable audio chunk payload");
                        return;
                    }
                };
                let rate = sample_rate.unwrap_or(self.default_sample_rate);
                self.completion.chunk_scheduled();
                if !self.gate.speaking() {
                    self.gate.set(None, Some(true), None);
                }
                self.set_phase(TurnPhase::Speaking);
                effects.push(Effect::Schedule(AudioChunk::pcm16(pcm, rate)));
            }

            ServerEvent::AudioPhraseEnd => {
                debug!("phrase boundary");
            }

            ServerEvent::Audio { data, response_id } => {
                if !self.identity.should_accept(response_id.as_deref(), false) {
                    return;
                }
                if self.locally_interrupted || !self.gate.can_play_incoming() {
                    debug!("dropping full-clip audio: playback gate closed");
                    return;
                }
                let bytes = match BASE64.decode(data.as_bytes()) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "undecodable full-clip audio payload");
                        return;
                    }
                };
                self.completion.stream_started();
                if !self.gate.speaking() {
                    self.gate.set(None, Some(true), None);
                }
                self.set_phase(TurnPhase::Speaking);
                effects.push(Effect::ScheduleStream(bytes));
            }

            ServerEvent::Complete {
                response_id: _,
                next_response_id,
            } => {
                self.gate.set(Some(false), None, None);
                self.set_phase(TurnPhase::Complete);
                // The turn is over; cancel its id so late chunks cannot
                // sneak into the drain window.
                if let Some(active) = self.identity.active().map(str::to_string) {
                    self.identity.mark_cancelled(active);
                }
                self.identity.advance(next_response_id);
                self.completion.server_complete();
                self.status("Complete", effects);
                if self.completion.try_finish() {
                    self.finish_turn(effects);
                }
            }

            ServerEvent::Interrupted { next_response_id } => {
                info!("server interrupt");
                self.remediate_interrupt(effects);
                // A named successor means the server already committed the
                // next turn; its audio may arrive without a fresh
                // synthesizing event, so reopen the playback gate for it.
                let reopen = next_response_id.is_some();
                self.identity.advance(next_response_id);
                if reopen {
                    self.gate.set(None, None, Some(true));
                }
                self.locally_interrupted = false;
                self.set_phase(TurnPhase::Interrupted);
                self.status("Interrupted", effects);
            }

            ServerEvent::Error { error }
            | ServerEvent::TtsError { error }
            | ServerEvent::LlmError { error }
            | ServerEvent::SttError { error } => {
                let message = error.unwrap_or_else(|| "voice service error".to_string());
                warn!(error = %message, "server-reported error");
                self.remediate_interrupt(effects);
                self.identity.advance(None);
                self.locally_interrupted = false;
                self.set_phase(TurnPhase::Errored);
                self.status(&format!("Error: {message}"), effects);
                effects.push(Effect::Notify(EngineUpdate::Error(message)));
            }

            ServerEvent::Unknown => {
                debug!("unknown server event type");
            }
        }
    }

    fn on_playback(&mut self, event: PlaybackEvent, effects: &mut Vec<Effect>) {
        match event {
            PlaybackEvent::ChunkFinished => {
                self.completion.chunk_finished();
                if self.completion.try_finish() {
                    self.finish_turn(effects);
                }
            }
            PlaybackEvent::StreamFinished => {
                self.completion.stream_finished();
                if self.completion.try_finish() {
                    self.finish_turn(effects);
                }
            }
            PlaybackEvent::StreamFailed(message) => {
                warn!(error = %message, "continuous playback failed");
                self.completion.stream_finished();
                if self.completion.try_finish() {
                    self.finish_turn(effects);
                }
            }
        }
    }

    fn on_local(&mut self, signal: LocalSignal, effects: &mut Vec<Effect>) {
        match signal {
            LocalSignal::StartListening => {
                self.response_buffer.clear();
                effects.push(Effect::StartCapture);
                effects.push(Effect::SendControl(ControlMessage::Start));
            }

            LocalSignal::StopListening => {
                effects.push(Effect::SendControl(ControlMessage::Stop));
                self.gate.set(Some(false), None, None);
                effects.push(Effect::StopCapture);
            }

            LocalSignal::SilenceDetected => {
                if self.phase != TurnPhase::Listening || !self.gate.listening() {
                    return;
                }
                debug!("local silence cutoff");
                effects.push(Effect::SendControl(ControlMessage::Stop));
                self.gate.set(Some(false), None, None);
            }

            LocalSignal::BargeIn => {
                // Only meaningful while the assistant is audibly speaking.
                if !self.gate.speaking() {
                    return;
                }
                info!("barge-in detected");
                self.interrupt_current_turn(effects);
            }

            LocalSignal::Interrupt => {
                if matches!(self.phase, TurnPhase::Idle | TurnPhase::Listening) {
                    return;
                }
                info!("user interrupt");
                self.interrupt_current_turn(effects);
            }

            LocalSignal::ClearHistory => {
                self.response_buffer.clear();
                effects.push(Effect::SendControl(ControlMessage::Clear));
            }
        }
    }

    fn on_socket(&mut self, notice: SocketNotice, effects: &mut Vec<Effect>) {
        match notice {
            SocketNotice::Opened => {
                self.connection = ConnectionState::Connected;
                self.status("Connecting...", effects);
            }
            SocketNotice::Closed(reason) => {
                info!(reason = ?reason, "socket closed");
                self.connection = ConnectionState::Disconnected;
                self.gate.clear();
                self.completion.begin_turn();
                self.locally_interrupted = false;
                self.set_phase(TurnPhase::Idle);
                effects.push(Effect::StopCapture);
                effects.push(Effect::StopPlayback);
                self.status("Disconnected", effects);
                effects.push(Effect::Notify(EngineUpdate::Disconnected { reason }));
            }
        }
    }

    /// Local interruption: identical remediation to the server's
    /// `interrupted` event, performed synchronously without waiting for an
    /// acknowledgment. Stale-chunk rejection holds regardless of how the
    /// local and remote decisions race, because the dead id is in the
    /// cancelled ring before this function returns.
    fn interrupt_current_turn(&mut self, effects: &mut Vec<Effect>) {
        self.locally_interrupted = true;
        self.remediate_interrupt(effects);
        self.identity.advance(None);
        self.set_phase(TurnPhase::Interrupted);
        // Best-effort: correctness never depends on the server honoring it.
        effects.push(Effect::SendControl(ControlMessage::Interrupt));
        self.status("Interrupted", effects);
    }

    /// Shared core of every turn-invalidating path: kill playback, close
    /// the gates, cancel the active id, resume immediately.
    fn remediate_interrupt(&mut self, effects: &mut Vec<Effect>) {
        if let Some(active) = self.identity.active().map(str::to_string) {
            self.identity.mark_cancelled(active);
        }
        self.gate.set(Some(false), Some(false), Some(false));
        effects.push(Effect::StopPlayback);
        self.completion.clear_pending();
        if self.completion.force_finish() {
            effects.push(Effect::Notify(EngineUpdate::ResumeListening));
        }
    }

    /// The drain condition held: hand the microphone back.
    fn finish_turn(&mut self, effects: &mut Vec<Effect>) {
        self.gate.set(None, Some(false), Some(false));
        self.set_phase(TurnPhase::Idle);
        effects.push(Effect::Notify(EngineUpdate::ResumeListening));
    }

    fn set_phase(&mut self, next: TurnPhase) {
        if self.phase.accepts(next) {
            debug!(from = ?self.phase, to = ?next, "turn phase");
            self.phase = next;
        } else if self.phase != next {
            debug!(from = ?self.phase, to = ?next, "ignoring invalid phase transition");
        }
    }

    fn status(&self, text: &str, effects: &mut Vec<Effect>) {
        effects.push(Effect::Notify(EngineUpdate::Status(text.to_string())));
    }
}
