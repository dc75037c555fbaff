use std::sync::Mutex;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, VoiceError};
use crate::session::event::{ControlMessage, ServerEvent, SessionEvent, SocketNotice};

/// Frames queued for the writer task.
#[derive(Debug)]
pub enum OutboundFrame {
    Control(ControlMessage),
    /// Raw little-endian PCM16 mono 16 kHz.
    Audio(Vec<u8>),
}

/// Shared send slot. The capture pump and the dispatcher both write here;
/// between connections the slot is empty and sends are dropped with a
/// debug log. Outbound traffic is fire-and-forget.
#[derive(Debug, Default)]
pub struct Uplink {
    slot: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
}

impl Uplink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, tx: mpsc::UnboundedSender<OutboundFrame>) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(tx);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }

    pub fn send(&self, frame: OutboundFrame) {
        let Ok(slot) = self.slot.lock() else {
            return;
        };
        match slot.as_ref() {
            Some(tx) => {
                let _ = tx.send(frame);
            }
            None => debug!("dropping outbound frame: not connected"),
        }
    }

    pub fn send_control(&self, message: ControlMessage) {
        self.send(OutboundFrame::Control(message));
    }
}

/// A live connection. Dropping the handle or calling `close` cancels the
/// reader and writer tasks; the reader emits one final `Closed` notice.
pub struct SocketHandle {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    cancel: CancellationToken,
}

impl SocketHandle {
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Derive the streaming URL from a configured base address: append the
/// `v1/voice/ws` path and upgrade the scheme (`http` → `ws`,
/// `https` → `wss`). A bare host gets the plain scheme.
pub fn streaming_url(base: &str) -> Result<String> {
    let trimmed = base.trim();
    if trimmed.is_empty() {
        return Err(VoiceError::Config("empty server address".to_string()));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| VoiceError::Config(format!("invalid server address: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(VoiceError::Config(format!(
                "unsupported scheme: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| VoiceError::Config("cannot derive socket scheme".to_string()))?;

    let path = format!("{}/v1/voice/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url.to_string())
}

/// Connect and spawn the reader/writer pair. All inbound events funnel
/// into `events`; outbound frames drain from the returned sender.
pub async fn connect(
    base: &str,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> Result<SocketHandle> {
    let url = streaming_url(base)?;
    info!(url = %url, "connecting");

    let (ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| VoiceError::Socket(e.to_string()))?;
    let (sink, stream) = ws.split();

    let cancel = CancellationToken::new();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    tokio::spawn(write_loop(sink, outbound_rx, cancel.clone()));
    tokio::spawn(read_loop(stream, events.clone(), cancel.clone()));

    let _ = events.send(SessionEvent::Socket(SocketNotice::Opened));

    Ok(SocketHandle {
        outbound: outbound_tx,
        cancel,
    })
}

async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let message = match frame {
                    OutboundFrame::Control(control) => match serde_json::to_string(&control) {
                        Ok(text) => Message::Text(text),
                        Err(e) => {
                            warn!(error = %e, "unserializable control message");
                            continue;
                        }
                    },
                    OutboundFrame::Audio(bytes) => Message::Binary(bytes),
                };
                // Fire and forget: a failed send is logged, never retried.
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "outbound send failed");
                }
            }
        }
    }
}

async fn read_loop<S>(
    mut stream: S,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) where
    S: Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let closed = |reason: Option<String>| SessionEvent::Socket(SocketNotice::Closed(reason));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = events.send(closed(None));
                break;
            }
            message = stream.next() => match message {
                None => {
                    let _ = events.send(closed(None));
                    break;
                }
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        let _ = events.send(SessionEvent::Server(event));
                    }
                    // A malformed event is dropped; the loop continues.
                    Err(e) => debug!(error = %e, "undecodable server event"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let _ = events.send(closed(frame.map(|f| f.reason.to_string())));
                    break;
                }
                // Binary frames are client-to-server only; pings are
                // answered by the library.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(closed(Some(e.to_string())));
                    break;
                }
            }
        }
    }
}
