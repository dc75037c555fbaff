use colloquy::audio::bargein::{BargeInDetector, SilenceTracker};
use colloquy::config::{BargeInConfig, SilenceConfig};

fn test_config() -> BargeInConfig {
    BargeInConfig {
        enabled: true,
        amplitude_threshold: 0.05,
        min_loud_frames: 4,
        cooldown_ms: 1500,
    }
}

#[test]
fn quiet_trace_never_fires() {
    let mut detector = BargeInDetector::new(test_config());
    for _ in 0..1000 {
        assert!(!detector.process(0.04, true));
    }
}

#[test]
fn loud_trace_while_speaking_fires_exactly_once() {
    let mut detector = BargeInDetector::new(test_config());
    let mut fires = 0;
    for _ in 0..100 {
        if detector.process(0.2, true) {
            fires += 1;
        }
    }
    // The cooldown has not elapsed, so the sustained shout fires once.
    assert_eq!(fires, 1);
}

#[test]
fn fires_only_while_assistant_is_speaking() {
    let mut detector = BargeInDetector::new(test_config());
    for _ in 0..100 {
        assert!(!detector.process(0.2, false));
    }
}

#[test]
fn counter_resets_when_assistant_stops_speaking() {
    let mut detector = BargeInDetector::new(test_config());
    // Three loud frames, then the assistant goes quiet: progress is lost.
    for _ in 0..3 {
        assert!(!detector.process(0.2, true));
    }
    detector.process(0.2, false);
    // Three more loud frames are not enough on their own.
    for _ in 0..3 {
        assert!(!detector.process(0.2, true));
    }
    assert!(detector.process(0.2, true));
}

#[test]
fn brief_dips_decay_without_resetting() {
    let mut detector = BargeInDetector::new(test_config());
    // Loud, loud, dip, then loud again: the dip costs one step of
    // progress, it does not restart the count.
    assert!(!detector.process(0.2, true)); // 1
    assert!(!detector.process(0.2, true)); // 2
    assert!(!detector.process(0.01, true)); // back to 1
    assert!(!detector.process(0.2, true)); // 2
    assert!(!detector.process(0.2, true)); // 3
    assert!(detector.process(0.2, true)); // 4 -> fire
}

#[test]
fn disabled_detector_is_inert() {
    let mut cfg = test_config();
    cfg.enabled = false;
    let mut detector = BargeInDetector::new(cfg);
    for _ in 0..100 {
        assert!(!detector.process(1.0, true));
    }
}

fn silence_config() -> SilenceConfig {
    SilenceConfig {
        enabled: true,
        amplitude_threshold: 0.015,
        min_quiet_ms: 1200,
    }
}

#[test]
fn silence_requires_speech_first() {
    // 20 ms frames: 60 quiet frames exceed the 1200 ms budget, but no
    // speech was ever heard, so nothing fires.
    let mut tracker = SilenceTracker::new(silence_config(), 20);
    for _ in 0..100 {
        assert!(!tracker.process(0.001, true));
    }
}

#[test]
fn silence_fires_once_after_speech_then_quiet() {
    let mut tracker = SilenceTracker::new(silence_config(), 20);
    for _ in 0..10 {
        assert!(!tracker.process(0.2, true));
    }
    let mut fires = 0;
    for _ in 0..200 {
        if tracker.process(0.001, true) {
            fires += 1;
        }
    }
    assert_eq!(fires, 1);
}

#[test]
fn speech_resets_the_quiet_run() {
    let mut tracker = SilenceTracker::new(silence_config(), 20);
    tracker.process(0.2, true);
    // 59 quiet frames (1180 ms), then speech, then quiet again: the run
    // starts over.
    for _ in 0..59 {
        assert!(!tracker.process(0.001, true));
    }
    tracker.process(0.2, true);
    for _ in 0..59 {
        assert!(!tracker.process(0.001, true));
    }
    assert!(tracker.process(0.001, true));
}

#[test]
fn leaving_listening_resets_the_tracker() {
    let mut tracker = SilenceTracker::new(silence_config(), 20);
    tracker.process(0.2, true);
    for _ in 0..30 {
        tracker.process(0.001, true);
    }
    // Listening dropped: everything resets, including the fired latch.
    tracker.process(0.0, false);
    for _ in 0..100 {
        assert!(!tracker.process(0.001, true), "no speech heard since reset");
    }
}
