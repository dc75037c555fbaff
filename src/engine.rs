use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::audio::pipeline::{spawn_capture, CaptureHandle};
use crate::audio::playback::{self, PlaybackHandle};
use crate::config::EngineConfig;
use crate::error::{Result, VoiceError};
use crate::gate::Gate;
use crate::net::socket::{self, SocketHandle, Uplink};
use crate::session::event::{
    Effect, EngineUpdate, LocalSignal, PlaybackEvent, SessionEvent,
};
use crate::session::Session;

struct AudioStack {
    capture: CaptureHandle,
    playback: PlaybackHandle,
}

/// The one object owning global session state: configuration, gate,
/// capture and playback stacks, the socket, and the dispatcher loop.
/// Everything cross-thread goes through the atomic gate or a channel;
/// there are no shared mutable fields beyond those.
pub struct VoiceEngine {
    cfg: EngineConfig,
    gate: Arc<Gate>,
    uplink: Arc<Uplink>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    updates_tx: mpsc::UnboundedSender<EngineUpdate>,
    updates_rx: Option<mpsc::UnboundedReceiver<EngineUpdate>>,
    audio: Arc<Mutex<Option<AudioStack>>>,
    socket: Option<SocketHandle>,
}

impl VoiceEngine {
    pub fn new(cfg: EngineConfig) -> Self {
        let gate = Arc::new(Gate::new());
        let uplink = Arc::new(Uplink::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let audio: Arc<Mutex<Option<AudioStack>>> = Arc::new(Mutex::new(None));

        let session = Session::new(Arc::clone(&gate), cfg.playback.default_sample_rate);
        tokio::spawn(run_loop(
            session,
            events_rx,
            events_tx.clone(),
            updates_tx.clone(),
            Arc::clone(&uplink),
            Arc::clone(&audio),
        ));

        Self {
            cfg,
            gate,
            uplink,
            events_tx,
            updates_tx,
            updates_rx: Some(updates_rx),
            audio,
            socket: None,
        }
    }

    /// Take the update stream. Callable once.
    pub fn updates(&mut self) -> Option<mpsc::UnboundedReceiver<EngineUpdate>> {
        self.updates_rx.take()
    }

    pub async fn connect(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let handle = socket::connect(&self.cfg.server_address, self.events_tx.clone()).await?;
        self.uplink.install(handle.outbound.clone());
        self.socket = Some(handle);
        Ok(())
    }

    /// Drop the current connection. Also required after a connection loss
    /// before `connect` can establish a fresh one; reconnection is always
    /// an explicit caller decision.
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.socket.take() {
            handle.close();
        }
        self.uplink.clear();
    }

    /// Connect if needed, bring the audio stack up, and ask the server to
    /// open a turn. Hardware failures surface here as the terminal result
    /// of this attempt; the caller may retry.
    pub async fn start_listening(&mut self) -> Result<()> {
        self.connect().await?;
        self.ensure_audio()?;
        self.events_tx
            .send(SessionEvent::Local(LocalSignal::StartListening))
            .map_err(|_| VoiceError::Socket("engine loop gone".to_string()))?;
        Ok(())
    }

    pub fn stop_listening(&self) {
        let _ = self
            .events_tx
            .send(SessionEvent::Local(LocalSignal::StopListening));
    }

    /// Interrupt the current turn immediately, without waiting for the
    /// server to confirm.
    pub fn interrupt(&self) {
        let _ = self
            .events_tx
            .send(SessionEvent::Local(LocalSignal::Interrupt));
    }

    pub fn clear_history(&self) {
        let _ = self
            .events_tx
            .send(SessionEvent::Local(LocalSignal::ClearHistory));
    }

    fn ensure_audio(&self) -> Result<()> {
        let mut slot = self
            .audio
            .lock()
            .map_err(|_| VoiceError::Audio("audio state poisoned".to_string()))?;
        if slot.is_some() {
            return Ok(());
        }
        info!("bringing up audio stack");
        let playback = playback::spawn(
            self.cfg.playback.default_sample_rate,
            self.events_tx.clone(),
        )?;
        let capture = spawn_capture(
            &self.cfg,
            Arc::clone(&self.gate),
            Arc::clone(&self.uplink),
            self.events_tx.clone(),
            self.updates_tx.clone(),
        )?;
        *slot = Some(AudioStack { capture, playback });
        Ok(())
    }
}

impl Drop for VoiceEngine {
    fn drop(&mut self) {
        self.disconnect();
        if let Ok(mut slot) = self.audio.lock() {
            if let Some(stack) = slot.take() {
                stack.capture.shutdown();
                stack.playback.shutdown();
            }
        }
    }
}

/// The dispatcher loop: the single place turn state mutates, and the
/// serialized context through which all playback scheduling and counter
/// changes flow.
async fn run_loop(
    mut session: Session,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    updates: mpsc::UnboundedSender<EngineUpdate>,
    uplink: Arc<Uplink>,
    audio: Arc<Mutex<Option<AudioStack>>>,
) {
    while let Some(event) = events.recv().await {
        for effect in session.dispatch(event) {
            match effect {
                Effect::SendControl(message) => uplink.send_control(message),
                Effect::Schedule(chunk) => {
                    let scheduled = with_audio(&audio, |stack| stack.playback.schedule(chunk));
                    if !scheduled {
                        warn!("no playback stack; dropping chunk");
                        // Keep the pending count honest.
                        let _ = events_tx
                            .send(SessionEvent::Playback(PlaybackEvent::ChunkFinished));
                    }
                }
                Effect::ScheduleStream(bytes) => {
                    let scheduled =
                        with_audio(&audio, |stack| stack.playback.schedule_stream(bytes));
                    if !scheduled {
                        warn!("no playback stack; dropping clip");
                        let _ = events_tx.send(SessionEvent::Playback(
                            PlaybackEvent::StreamFailed("no playback stack".to_string()),
                        ));
                    }
                }
                Effect::StopPlayback => {
                    with_audio(&audio, |stack| stack.playback.stop_all());
                }
                Effect::StartCapture => {
                    with_audio(&audio, |stack| stack.capture.resume());
                }
                Effect::StopCapture => {
                    with_audio(&audio, |stack| stack.capture.pause());
                }
                Effect::Notify(update) => {
                    let _ = updates.send(update);
                }
            }
        }
    }
}

fn with_audio<F>(audio: &Arc<Mutex<Option<AudioStack>>>, f: F) -> bool
where
    F: FnOnce(&AudioStack),
{
    match audio.lock() {
        Ok(slot) => match slot.as_ref() {
            Some(stack) => {
                f(stack);
                true
            }
            None => false,
        },
        Err(_) => false,
    }
}
