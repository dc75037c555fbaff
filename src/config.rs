use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wire format the server expects for microphone audio.
pub const WIRE_SAMPLE_RATE: u32 = 16_000;

/// Top-level engine configuration. All numeric tuning lives here rather
/// than in the components: threshold and timing constants depend on the
/// microphone gain and speaker placement of the deployment, so the
/// embedding layer must be able to override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base server address, e.g. "http://localhost:8080". The streaming
    /// URL is derived from this (`ws`/`wss` scheme, `v1/voice/ws` path).
    pub server_address: String,
    pub capture: CaptureConfig,
    pub barge_in: BargeInConfig,
    pub silence: SilenceConfig,
    pub playback: PlaybackConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_address: "http://localhost:8080".to_string(),
            capture: CaptureConfig::default(),
            barge_in: BargeInConfig::default(),
            silence: SilenceConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Duration of one analysis frame popped from the capture ring.
    pub frame_ms: u32,
    /// Capacity of the capture ring buffer, in samples. When the pump
    /// thread falls behind, the hardware callback drops samples rather
    /// than grow this.
    pub ring_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_ms: 20,
            ring_capacity: 32_768,
        }
    }
}

/// Barge-in tuning. Defaults are conservative: the amplitude threshold sits
/// well above typical speaker bleed, and the trigger needs several
/// consecutive loud frames so a cough or a door slam does not cut the
/// assistant off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BargeInConfig {
    pub enabled: bool,
    /// Mean absolute amplitude (0..1) above which a frame counts as loud.
    pub amplitude_threshold: f32,
    /// Consecutive loud frames required to fire.
    pub min_loud_frames: u32,
    /// Minimum gap between two triggers.
    pub cooldown_ms: u64,
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            amplitude_threshold: 0.05,
            min_loud_frames: 4,
            cooldown_ms: 1500,
        }
    }
}

impl BargeInConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Local end-of-utterance detection. Off by default: the server performs
/// its own endpointing, and the local tracker is purely a latency
/// optimization for deployments with a slow uplink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SilenceConfig {
    pub enabled: bool,
    /// Amplitude below which a frame counts as quiet.
    pub amplitude_threshold: f32,
    /// Sustained quiet required after speech before the stop fires.
    pub min_quiet_ms: u64,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            amplitude_threshold: 0.015,
            min_quiet_ms: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Sample rate assumed for chunks that do not carry one, and for raw
    /// PCM fallback clips without a WAV header.
    pub default_sample_rate: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_sample_rate: 24_000,
        }
    }
}
