/// Reconciles "the server finished generating" with "local playback has
/// drained" into a single resume-listening decision.
///
/// The server's `complete` means generation finished, not that sound
/// stopped coming out of the speaker; handing the microphone back before
/// the buffers drain makes the assistant hear its own trailing audio. The
/// notification is latched so it fires at most once per turn.
#[derive(Debug, Default)]
pub struct TurnCompletion {
    pending_buffers: u32,
    server_complete: bool,
    continuous_playing: bool,
    resume_notified: bool,
}

impl TurnCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset at the start of every listening phase so nothing leaks across
    /// turns.
    pub fn begin_turn(&mut self) {
        *self = Self::default();
    }

    pub fn pending_buffers(&self) -> u32 {
        self.pending_buffers
    }

    pub fn chunk_scheduled(&mut self) {
        self.pending_buffers += 1;
    }

    /// Saturating: a completion notice that raced a `stop_all` must not
    /// underflow the next turn's count.
    pub fn chunk_finished(&mut self) {
        self.pending_buffers = self.pending_buffers.saturating_sub(1);
    }

    pub fn stream_started(&mut self) {
        self.continuous_playing = true;
    }

    pub fn stream_finished(&mut self) {
        self.continuous_playing = false;
    }

    pub fn server_complete(&mut self) {
        self.server_complete = true;
    }

    /// Forget all queued work. Used when playback is force-stopped.
    pub fn clear_pending(&mut self) {
        self.pending_buffers = 0;
        self.continuous_playing = false;
    }

    /// Drain check: true exactly once per turn, when the server has
    /// finished and every scheduled buffer has played out.
    pub fn try_finish(&mut self) -> bool {
        if self.resume_notified
            || !self.server_complete
            || self.pending_buffers != 0
            || self.continuous_playing
        {
            return false;
        }
        self.resume_notified = true;
        self.server_complete = false;
        true
    }

    /// Bypass path for interrupts and empty transcripts: resume now,
    /// regardless of drain state, still at most once per turn.
    pub fn force_finish(&mut self) -> bool {
        if self.resume_notified {
            return false;
        }
        self.resume_notified = true;
        self.server_complete = false;
        true
    }
}
