use std::time::Instant;

use crate::config::{BargeInConfig, SilenceConfig};

/// Hysteresis state machine over the capture amplitude feed. Decides when
/// the user has started talking over the assistant, locally, before any
/// server round trip.
///
/// The counter only runs while the assistant is audibly speaking; quiet
/// frames decay it rather than reset it, so the natural dips inside a
/// spoken sentence do not restart the count. The cooldown stops a second
/// trigger while the first interrupt is still propagating.
#[derive(Debug)]
pub struct BargeInDetector {
    cfg: BargeInConfig,
    consecutive_loud: u32,
    last_trigger: Option<Instant>,
}

impl BargeInDetector {
    pub fn new(cfg: BargeInConfig) -> Self {
        Self {
            cfg,
            consecutive_loud: 0,
            last_trigger: None,
        }
    }

    /// Feed one frame's amplitude (0..1). Returns true when a local
    /// interrupt should fire.
    pub fn process(&mut self, amplitude: f32, assistant_speaking: bool) -> bool {
        if !self.cfg.enabled {
            return false;
        }
        if !assistant_speaking {
            self.consecutive_loud = 0;
            return false;
        }

        if amplitude >= self.cfg.amplitude_threshold {
            // Saturate at the trigger count so a long loud stretch during
            // cooldown can fire again the moment the cooldown lapses.
            self.consecutive_loud = (self.consecutive_loud + 1).min(self.cfg.min_loud_frames);
        } else {
            self.consecutive_loud = self.consecutive_loud.saturating_sub(1);
        }

        if self.consecutive_loud >= self.cfg.min_loud_frames {
            let cooled = self
                .last_trigger
                .map_or(true, |t| t.elapsed() >= self.cfg.cooldown());
            if cooled {
                self.last_trigger = Some(Instant::now());
                self.consecutive_loud = 0;
                return true;
            }
        }
        false
    }
}

/// Local end-of-utterance detection on the same amplitude feed: once
/// speech has been heard while listening, a sustained quiet run fires a
/// stop. Duration is accumulated from frame time rather than wall clock,
/// matching the frame cadence of the pump.
#[derive(Debug)]
pub struct SilenceTracker {
    cfg: SilenceConfig,
    frame_ms: u64,
    heard_speech: bool,
    quiet_ms: u64,
    fired: bool,
}

impl SilenceTracker {
    pub fn new(cfg: SilenceConfig, frame_ms: u64) -> Self {
        Self {
            cfg,
            frame_ms,
            heard_speech: false,
            quiet_ms: 0,
            fired: false,
        }
    }

    /// Feed one frame's amplitude. Returns true at most once per listening
    /// stretch, when the utterance appears to have ended.
    pub fn process(&mut self, amplitude: f32, listening: bool) -> bool {
        if !self.cfg.enabled {
            return false;
        }
        if !listening {
            self.reset();
            return false;
        }

        if amplitude >= self.cfg.amplitude_threshold {
            self.heard_speech = true;
            self.quiet_ms = 0;
            return false;
        }
        if !self.heard_speech || self.fired {
            return false;
        }
        self.quiet_ms += self.frame_ms;
        if self.quiet_ms >= self.cfg.min_quiet_ms {
            self.fired = true;
            return true;
        }
        false
    }

    fn reset(&mut self) {
        self.heard_speech = false;
        self.quiet_ms = 0;
        self.fired = false;
    }
}
