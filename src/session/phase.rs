use serde::{Deserialize, Serialize};

/// Logical phase of the current conversational turn. Exactly one is active
/// at a time, owned and mutated only by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnPhase {
    Idle,
    Listening,
    Stopped,
    Transcribing,
    Generating,
    Synthesizing,
    Speaking,
    Complete,
    Interrupted,
    Errored,
}

impl Default for TurnPhase {
    fn default() -> Self {
        Self::Idle
    }
}

impl TurnPhase {
    /// Validate a requested transition. The server may legitimately skip
    /// phases (a cached response can jump straight to synthesis), so the
    /// graph is permissive in the forward direction; it exists to reject
    /// the transitions that indicate a stale or duplicated event.
    pub fn accepts(self, next: TurnPhase) -> bool {
        use TurnPhase::*;

        if self == next {
            return false;
        }
        match (self, next) {
            // Listening restarts a turn from anywhere.
            (_, Listening) => true,
            // Idle is the universal resting state.
            (_, Idle) => true,
            // Interrupts and errors override any in-turn phase.
            (_, Interrupted) | (_, Errored) => true,

            (Idle, _) => true,
            (Listening, Stopped) => true,
            // In-turn forward progress, with skips allowed.
            (Listening | Stopped, Transcribing | Generating | Synthesizing | Speaking) => true,
            (Transcribing, Generating | Synthesizing | Speaking | Complete) => true,
            (Generating, Synthesizing | Speaking | Complete) => true,
            (Synthesizing, Speaking | Complete) => true,
            (Speaking, Complete) => true,
            (Stopped, Complete) => true,
            // A successor turn's audio may follow an interrupt directly.
            (Interrupted, Synthesizing | Speaking) => true,

            _ => false,
        }
    }
}
