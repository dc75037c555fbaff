use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::Producer;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::WIRE_SAMPLE_RATE;
use crate::error::{Result, VoiceError};
use crate::gate::Gate;

/// Owns the hardware input stream. The callback does exactly two things:
/// read the gate and push samples into the ring buffer. Everything else
/// (downmix, resampling, amplitude, forwarding) happens on the pump
/// thread, so the hardware thread never waits on anyone.
///
/// Samples flow while either `listening` or `speaking` is set: the
/// barge-in detector needs microphone energy precisely while the
/// assistant is talking, even though no frames are sent upstream then.
pub struct AudioCapture {
    stream: cpal::Stream,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioCapture {
    pub fn new<P>(mut producer: P, gate: Arc<Gate>) -> Result<Self>
    where
        P: Producer<Item = f32> + Send + 'static,
    {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| VoiceError::Audio("no input device available".to_string()))?;

        info!(
            device = device.name().unwrap_or_default(),
            "audio input device"
        );

        // Prefer the wire rate in mono so the pump has nothing to do; any
        // other supported config works, the resampler covers the gap.
        let preferred = device
            .supported_input_configs()
            .map_err(|e| VoiceError::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate().0 <= WIRE_SAMPLE_RATE
                    && c.max_sample_rate().0 >= WIRE_SAMPLE_RATE
            })
            .map(|c| c.with_sample_rate(cpal::SampleRate(WIRE_SAMPLE_RATE)));

        let config = match preferred {
            Some(c) => c,
            None => device
                .default_input_config()
                .map_err(|e| VoiceError::Audio(e.to_string()))?,
        };

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        info!(sample_rate, channels, "audio capture config");

        let err_fn = |err| error!(error = %err, "capture stream error");

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device
                .build_input_stream(
                    &config.into(),
                    move |data: &[f32], _: &_| {
                        if gate.listening() || gate.speaking() {
                            // Lossy when the pump falls behind.
                            producer.push_slice(data);
                        }
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| VoiceError::Audio(e.to_string()))?,
            cpal::SampleFormat::I16 => device
                .build_input_stream(
                    &config.into(),
                    move |data: &[i16], _: &_| {
                        if gate.listening() || gate.speaking() {
                            for &sample in data {
                                let _ = producer.try_push(sample as f32 / i16::MAX as f32);
                            }
                        }
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| VoiceError::Audio(e.to_string()))?,
            other => {
                return Err(VoiceError::Audio(format!(
                    "unsupported capture sample format: {other:?}"
                )))
            }
        };

        Ok(Self {
            stream,
            sample_rate,
            channels,
        })
    }

    pub fn resume(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| VoiceError::Audio(e.to_string()))
    }

    pub fn pause(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| VoiceError::Audio(e.to_string()))
    }
}
