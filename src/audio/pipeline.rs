use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ringbuf::traits::{Consumer, Observer, Split};
use ringbuf::HeapRb;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::bargein::{BargeInDetector, SilenceTracker};
use super::capture::AudioCapture;
use super::resample::{downmix, encode_pcm16, mean_abs_level, pcm16_bytes, FrameConverter};
use crate::config::EngineConfig;
use crate::error::{Result, VoiceError};
use crate::gate::Gate;
use crate::net::socket::{OutboundFrame, Uplink};
use crate::session::event::{EngineUpdate, LocalSignal, SessionEvent};

const LEVEL_INTERVAL: Duration = Duration::from_millis(100);

/// Control handle for the capture side. The cpal stream lives on the pump
/// thread (it is not `Send`), so the engine talks to it through commands.
pub struct CaptureHandle {
    cmd_tx: std::sync::mpsc::Sender<CaptureCmd>,
    shutdown: Arc<AtomicBool>,
}

#[derive(Debug)]
enum CaptureCmd {
    Resume,
    Pause,
}

impl CaptureHandle {
    pub fn resume(&self) {
        let _ = self.cmd_tx.send(CaptureCmd::Resume);
    }

    pub fn pause(&self) {
        let _ = self.cmd_tx.send(CaptureCmd::Pause);
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the capture pump: opens the input device on a dedicated thread,
/// then loops popping fixed frames from the ring, converting them to the
/// wire format, and fanning the amplitude out to the detectors.
///
/// Device/open failures are reported synchronously so the caller can
/// surface them for the current attempt and retry later.
pub fn spawn_capture(
    cfg: &EngineConfig,
    gate: Arc<Gate>,
    uplink: Arc<Uplink>,
    events: mpsc::UnboundedSender<SessionEvent>,
    updates: mpsc::UnboundedSender<EngineUpdate>,
) -> Result<CaptureHandle> {
    let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
    let (init_tx, init_rx) = std::sync::mpsc::channel();
    let shutdown = Arc::new(AtomicBool::new(false));

    let cfg = cfg.clone();
    let thread_gate = Arc::clone(&gate);
    let thread_shutdown = Arc::clone(&shutdown);

    std::thread::Builder::new()
        .name("capture-pump".to_string())
        .spawn(move || {
            let rb = HeapRb::<f32>::new(cfg.capture.ring_capacity);
            let (producer, consumer) = rb.split();

            let capture = match AudioCapture::new(producer, Arc::clone(&thread_gate)) {
                Ok(c) => {
                    let _ = init_tx.send(Ok(()));
                    c
                }
                Err(e) => {
                    let _ = init_tx.send(Err(e));
                    return;
                }
            };

            let pump = CapturePump {
                consumer,
                gate: thread_gate,
                sample_rate: capture.sample_rate,
                channels: capture.channels,
                cfg,
                uplink,
                events,
                updates,
                shutdown: thread_shutdown,
            };
            pump.run(capture, cmd_rx);
        })
        .map_err(|e| VoiceError::Audio(format!("capture thread: {e}")))?;

    init_rx
        .recv()
        .map_err(|_| VoiceError::Audio("capture thread died during init".to_string()))??;

    Ok(CaptureHandle { cmd_tx, shutdown })
}

struct CapturePump<C>
where
    C: Consumer<Item = f32>,
{
    consumer: C,
    gate: Arc<Gate>,
    sample_rate: u32,
    channels: u16,
    cfg: EngineConfig,
    uplink: Arc<Uplink>,
    events: mpsc::UnboundedSender<SessionEvent>,
    updates: mpsc::UnboundedSender<EngineUpdate>,
    shutdown: Arc<AtomicBool>,
}

impl<C> CapturePump<C>
where
    C: Consumer<Item = f32>,
{
    fn run(mut self, capture: AudioCapture, cmd_rx: std::sync::mpsc::Receiver<CaptureCmd>) {
        info!(
            sample_rate = self.sample_rate,
            channels = self.channels,
            "capture pump started"
        );

        // One analysis frame, in native mono samples.
        let frame_len =
            (self.sample_rate as usize * self.cfg.capture.frame_ms as usize) / 1000;
        let native_len = frame_len * self.channels as usize;

        let mut converter = match FrameConverter::new(self.sample_rate, frame_len) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "capture pump cannot convert; exiting");
                return;
            }
        };

        let mut bargein = BargeInDetector::new(self.cfg.barge_in.clone());
        let mut silence = SilenceTracker::new(
            self.cfg.silence.clone(),
            u64::from(self.cfg.capture.frame_ms),
        );

        let mut native_buf = vec![0.0f32; native_len];
        let mut last_level = Instant::now();

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            // Stream control is serviced between frames; the commands are
            // rare and the loop cadence is one frame.
            while let Ok(cmd) = cmd_rx.try_recv() {
                let result = match cmd {
                    CaptureCmd::Resume => capture.resume(),
                    CaptureCmd::Pause => capture.pause(),
                };
                if let Err(e) = result {
                    warn!(error = %e, "capture stream control failed");
                }
            }

            if self.consumer.occupied_len() < native_len {
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
            self.consumer.pop_slice(&mut native_buf);

            let mono = downmix(&native_buf, self.channels);
            let wire = match converter.convert(&mono) {
                Ok(w) => w,
                Err(e) => {
                    // A single bad frame is dropped; capture continues.
                    debug!(error = %e, "frame conversion failed");
                    continue;
                }
            };

            let pcm = encode_pcm16(&wire);
            let amplitude = mean_abs_level(&pcm);

            if bargein.process(amplitude, self.gate.speaking()) {
                let _ = self
                    .events
                    .send(SessionEvent::Local(LocalSignal::BargeIn));
            }
            if silence.process(amplitude, self.gate.listening()) {
                let _ = self
                    .events
                    .send(SessionEvent::Local(LocalSignal::SilenceDetected));
            }

            if last_level.elapsed() >= LEVEL_INTERVAL {
                last_level = Instant::now();
                // Amplified for visibility, same as the level meter scale.
                let level = (amplitude * 3.0).min(1.0);
                let _ = self.updates.send(EngineUpdate::MicLevel(level));
            }

            if self.gate.can_send_mic() {
                self.uplink.send(OutboundFrame::Audio(pcm16_bytes(&pcm)));
            }
        }

        info!("capture pump stopped");
    }
}
