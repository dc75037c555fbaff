use serde::{Deserialize, Serialize};

/// One decoded PCM16 payload handed from the network side to playback.
/// Ownership moves with it; nothing is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Raw little-endian PCM16 bytes.
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunk {
    pub fn pcm16(data: Vec<u8>, sample_rate: u32) -> Self {
        Self {
            data,
            sample_rate,
            channels: 1,
        }
    }
}

/// Inbound server events, one variant per wire `type`. Content-bearing
/// variants carry the optional `response_id` used for stale-event
/// filtering. Unrecognized types land in `Unknown` and are dropped by the
/// dispatcher.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Ready {
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        response_id: Option<String>,
    },
    Listening,
    Stopped,
    Transcribing,
    Transcript {
        text: String,
        #[serde(default)]
        response_id: Option<String>,
    },
    TranscriptEmpty,
    Generating {
        #[serde(default)]
        response_id: Option<String>,
    },
    TextDelta {
        text: String,
        #[serde(default)]
        response_id: Option<String>,
    },
    TextComplete {
        text: String,
        #[serde(default)]
        response_id: Option<String>,
    },
    Synthesizing {
        #[serde(default)]
        response_id: Option<String>,
    },
    AudioChunk {
        /// Base64-encoded PCM16 little-endian samples.
        data: String,
        #[serde(default)]
        sample_rate: Option<u32>,
        #[serde(default)]
        response_id: Option<String>,
    },
    AudioPhraseEnd,
    /// Full-clip fallback when the server cannot stream incrementally.
    Audio {
        data: String,
        #[serde(default)]
        response_id: Option<String>,
    },
    Complete {
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        next_response_id: Option<String>,
    },
    Interrupted {
        #[serde(default)]
        next_response_id: Option<String>,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
    },
    TtsError {
        #[serde(default)]
        error: Option<String>,
    },
    LlmError {
        #[serde(default)]
        error: Option<String>,
    },
    SttError {
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Outbound control frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Start,
    Stop,
    Interrupt,
    Clear,
}

/// Notices synthesized by the playback side. One `ChunkFinished` arrives
/// for every scheduled chunk, success or not, so the pending-buffer count
/// always drains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    ChunkFinished,
    StreamFinished,
    StreamFailed(String),
}

/// Signals originating on this device rather than from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalSignal {
    StartListening,
    StopListening,
    /// Explicit user interruption (tap, button).
    Interrupt,
    /// The barge-in detector fired while the assistant was speaking.
    BargeIn,
    /// The silence tracker decided the utterance ended.
    SilenceDetected,
    ClearHistory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketNotice {
    Opened,
    Closed(Option<String>),
}

/// Everything the dispatcher consumes, from all three sources, funneled
/// through one channel so mutation of turn state stays single-threaded.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Server(ServerEvent),
    Playback(PlaybackEvent),
    Local(LocalSignal),
    Socket(SocketNotice),
}

/// Everything the dispatcher produces. The engine's driver loop executes
/// these against the real socket and audio devices; tests assert on them
/// directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SendControl(ControlMessage),
    Schedule(AudioChunk),
    ScheduleStream(Vec<u8>),
    StopPlayback,
    StartCapture,
    StopCapture,
    Notify(EngineUpdate),
}

/// Notifications delivered to the embedding layer.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    Connected { conversation_id: Option<String> },
    Disconnected { reason: Option<String> },
    /// Human-readable state label ("Listening...", "Speaking...").
    Status(String),
    /// Finalized user transcript for one turn.
    Transcript(String),
    /// Incremental response text as it streams.
    ResponseDelta(String),
    /// Finalized assistant response for one turn.
    Response(String),
    /// The turn is over and the microphone may be handed back to the user.
    ResumeListening,
    /// Throttled microphone level, 0..1.
    MicLevel(f32),
    Error(String),
}
