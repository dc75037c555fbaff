use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::resample::downmix;
use crate::error::{Result, VoiceError};
use crate::session::event::{AudioChunk, PlaybackEvent, SessionEvent};

/// Commands accepted by the playback thread. All graph mutation (device
/// open, rate change, queue edits) happens there, serialized.
#[derive(Debug)]
enum PlaybackCmd {
    Schedule(AudioChunk),
    ScheduleStream(Vec<u8>),
    StopAll,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueuedKind {
    Chunk,
    Stream,
}

struct Queued {
    samples: Vec<f32>,
    kind: QueuedKind,
}

/// Shared with the output callback. The callback holds the lock only long
/// enough to copy samples out and note finished entries.
struct PlayQueue {
    items: VecDeque<Queued>,
    offset: usize,
}

/// Control handle for the playback thread; cheap to clone.
#[derive(Clone)]
pub struct PlaybackHandle {
    cmd_tx: std::sync::mpsc::Sender<PlaybackCmd>,
}

impl PlaybackHandle {
    pub fn schedule(&self, chunk: AudioChunk) {
        let _ = self.cmd_tx.send(PlaybackCmd::Schedule(chunk));
    }

    pub fn schedule_stream(&self, bytes: Vec<u8>) {
        let _ = self.cmd_tx.send(PlaybackCmd::ScheduleStream(bytes));
    }

    pub fn stop_all(&self) {
        let _ = self.cmd_tx.send(PlaybackCmd::StopAll);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(PlaybackCmd::Shutdown);
    }
}

/// Spawn the playback thread. The output device is opened lazily on the
/// first scheduled chunk and then kept warm across turns so the next
/// turn's audio starts without an audible gap.
///
/// Every `Schedule` is answered by exactly one `ChunkFinished` notice
/// (sent immediately on decode or device failure), so the pending-buffer
/// count upstream always drains.
pub fn spawn(
    default_rate: u32,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> Result<PlaybackHandle> {
    let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<PlaybackCmd>();

    std::thread::Builder::new()
        .name("playback".to_string())
        .spawn(move || {
            let mut worker = PlaybackWorker {
                default_rate,
                events,
                queue: Arc::new(Mutex::new(PlayQueue {
                    items: VecDeque::new(),
                    offset: 0,
                })),
                stream: None,
                rate: 0,
            };
            for cmd in cmd_rx.iter() {
                match cmd {
                    PlaybackCmd::Schedule(chunk) => worker.schedule(chunk),
                    PlaybackCmd::ScheduleStream(bytes) => worker.schedule_stream(bytes),
                    PlaybackCmd::StopAll => worker.stop_all(),
                    PlaybackCmd::Shutdown => break,
                }
            }
            info!("playback thread stopped");
        })
        .map_err(|e| VoiceError::Audio(format!("playback thread: {e}")))?;

    Ok(PlaybackHandle { cmd_tx })
}

struct PlaybackWorker {
    default_rate: u32,
    events: mpsc::UnboundedSender<SessionEvent>,
    queue: Arc<Mutex<PlayQueue>>,
    stream: Option<cpal::Stream>,
    rate: u32,
}

impl PlaybackWorker {
    fn schedule(&mut self, chunk: AudioChunk) {
        let samples = {
            let raw = pcm16_to_f32(&chunk.data);
            downmix(&raw, chunk.channels)
        };
        if let Err(e) = self.ensure_stream(chunk.sample_rate) {
            warn!(error = %e, "cannot open output for chunk; dropping");
            let _ = self
                .events
                .send(SessionEvent::Playback(PlaybackEvent::ChunkFinished));
            return;
        }
        self.enqueue(samples, QueuedKind::Chunk);
    }

    fn schedule_stream(&mut self, bytes: Vec<u8>) {
        let (samples, rate) = match decode_clip(&bytes, self.default_rate) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "undecodable full-clip audio");
                let _ = self
                    .events
                    .send(SessionEvent::Playback(PlaybackEvent::StreamFailed(
                        e.to_string(),
                    )));
                return;
            }
        };
        if let Err(e) = self.ensure_stream(rate) {
            warn!(error = %e, "cannot open output for clip; dropping");
            let _ = self
                .events
                .send(SessionEvent::Playback(PlaybackEvent::StreamFailed(
                    e.to_string(),
                )));
            return;
        }
        self.enqueue(samples, QueuedKind::Stream);
    }

    fn enqueue(&self, samples: Vec<f32>, kind: QueuedKind) {
        if let Ok(mut q) = self.queue.lock() {
            q.items.push_back(Queued { samples, kind });
        }
    }

    /// Drop everything scheduled and in flight. The stream itself stays
    /// up, primed for the next turn. Cleared entries send no completion
    /// notices; the counters upstream were already cleared by whoever
    /// ordered the stop.
    fn stop_all(&self) {
        if let Ok(mut q) = self.queue.lock() {
            q.items.clear();
            q.offset = 0;
        }
        debug!("playback queue cleared");
    }

    /// (Re)build the output stream when the incoming rate differs from the
    /// configured one. Only called from the playback thread, never
    /// concurrently with the callback taking samples.
    fn ensure_stream(&mut self, rate: u32) -> Result<()> {
        if self.stream.is_some() && self.rate == rate {
            return Ok(());
        }
        if self.stream.is_some() {
            info!(from = self.rate, to = rate, "output rate change");
        }
        self.stream = None;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| VoiceError::Audio("no output device available".to_string()))?;

        let supports = |channels: u16| {
            device.supported_output_configs().ok().and_then(|mut cs| {
                cs.find(|c| {
                    c.channels() == channels
                        && c.min_sample_rate().0 <= rate
                        && c.max_sample_rate().0 >= rate
                })
            })
        };

        let supported = supports(1)
            .or_else(|| supports(2))
            .ok_or_else(|| VoiceError::Audio(format!("no output config at {rate} Hz")))?;
        let config = supported
            .with_sample_rate(cpal::SampleRate(rate))
            .config();
        let channels = config.channels as usize;

        let queue = Arc::clone(&self.queue);
        let events = self.events.clone();
        let err_fn = |err| error!(error = %err, "playback stream error");

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut q) = queue.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    for frame in data.chunks_mut(channels) {
                        let sample = loop {
                            if q.items.is_empty() {
                                break 0.0;
                            }
                            if q.offset < q.items[0].samples.len() {
                                let s = q.items[0].samples[q.offset];
                                q.offset += 1;
                                break s;
                            }
                            if let Some(done) = q.items.pop_front() {
                                q.offset = 0;
                                let notice = match done.kind {
                                    QueuedKind::Chunk => PlaybackEvent::ChunkFinished,
                                    QueuedKind::Stream => PlaybackEvent::StreamFinished,
                                };
                                let _ = events.send(SessionEvent::Playback(notice));
                            }
                        };
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| VoiceError::Audio(e.to_string()))?;

        stream
            .play()
            .map_err(|e| VoiceError::Audio(e.to_string()))?;

        self.stream = Some(stream);
        self.rate = rate;
        Ok(())
    }
}

/// Little-endian PCM16 bytes to f32 samples. A trailing odd byte is
/// ignored.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Decode a full-clip payload: WAV when the RIFF header is present,
/// otherwise raw PCM16 at `fallback_rate`. Returns mono samples and their
/// rate.
pub fn decode_clip(bytes: &[u8], fallback_rate: u32) -> Result<(Vec<f32>, u32)> {
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        let reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| VoiceError::Audio(format!("wav header: {e}")))?;
        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => reader
                .into_samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| VoiceError::Audio(format!("wav samples: {e}")))?
                .into_iter()
                .map(|s| s as f32 / 32768.0)
                .collect(),
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| VoiceError::Audio(format!("wav samples: {e}")))?,
        };
        let mono = downmix(&samples, spec.channels);
        return Ok((mono, spec.sample_rate));
    }

    if fallback_rate == 0 {
        return Err(VoiceError::Audio("invalid fallback sample rate".to_string()));
    }
    Ok((pcm16_to_f32(bytes), fallback_rate))
}
