use std::sync::atomic::{AtomicU32, Ordering};

const LISTENING: u32 = 1 << 0;
const SPEAKING: u32 = 1 << 1;
const ACCEPT_INCOMING: u32 = 1 << 2;

/// The only state the realtime capture callback is allowed to read: three
/// flags packed into one atomic word. Readers take a single load; writers
/// go through a compare-exchange loop so concurrent partial updates never
/// lose each other.
///
/// `speaking` and `listening` are mutually exclusive by construction: a
/// write that would set both clears `listening`, since feeding the
/// assistant its own output is worse than clipping the first syllable of a
/// reply.
#[derive(Debug, Default)]
pub struct Gate {
    bits: AtomicU32,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update only the provided flags, atomically.
    pub fn set(
        &self,
        listening: Option<bool>,
        speaking: Option<bool>,
        accept_incoming: Option<bool>,
    ) {
        let _ = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |mut bits| {
                if let Some(v) = listening {
                    bits = apply(bits, LISTENING, v);
                }
                if let Some(v) = speaking {
                    bits = apply(bits, SPEAKING, v);
                }
                if let Some(v) = accept_incoming {
                    bits = apply(bits, ACCEPT_INCOMING, v);
                }
                // Speaking wins: never leave both set.
                if bits & SPEAKING != 0 {
                    bits &= !LISTENING;
                }
                Some(bits)
            });
    }

    /// Clear all flags in one store.
    pub fn clear(&self) {
        self.bits.store(0, Ordering::Release);
    }

    pub fn listening(&self) -> bool {
        self.bits.load(Ordering::Acquire) & LISTENING != 0
    }

    pub fn speaking(&self) -> bool {
        self.bits.load(Ordering::Acquire) & SPEAKING != 0
    }

    pub fn accept_incoming(&self) -> bool {
        self.bits.load(Ordering::Acquire) & ACCEPT_INCOMING != 0
    }

    /// All three flags from one load, for callers that need a coherent
    /// view: (listening, speaking, accept_incoming).
    pub fn snapshot(&self) -> (bool, bool, bool) {
        let bits = self.bits.load(Ordering::Acquire);
        (
            bits & LISTENING != 0,
            bits & SPEAKING != 0,
            bits & ACCEPT_INCOMING != 0,
        )
    }

    /// May the capture pipeline forward microphone frames to the server?
    pub fn can_send_mic(&self) -> bool {
        let bits = self.bits.load(Ordering::Acquire);
        bits & LISTENING != 0 && bits & SPEAKING == 0
    }

    /// May newly arrived audio be scheduled for playback?
    pub fn can_play_incoming(&self) -> bool {
        self.accept_incoming()
    }
}

fn apply(bits: u32, flag: u32, value: bool) -> u32 {
    if value {
        bits | flag
    } else {
        bits & !flag
    }
}
