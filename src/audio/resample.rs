use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::config::WIRE_SAMPLE_RATE;
use crate::error::{Result, VoiceError};

/// Mix interleaved multi-channel audio down to mono by averaging.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Converts fixed-size mono frames from the device rate to the 16 kHz wire
/// rate. A pass-through when the device already captures at 16 kHz.
pub struct FrameConverter {
    resampler: Option<SincFixedIn<f32>>,
    input_frames: usize,
}

impl FrameConverter {
    pub fn new(source_rate: u32, input_frames: usize) -> Result<Self> {
        if source_rate == WIRE_SAMPLE_RATE {
            return Ok(Self {
                resampler: None,
                input_frames,
            });
        }

        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = f64::from(WIRE_SAMPLE_RATE) / f64::from(source_rate);
        let resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, input_frames, 1)
            .map_err(|e| VoiceError::Audio(format!("resampler init: {e}")))?;

        Ok(Self {
            resampler: Some(resampler),
            input_frames,
        })
    }

    /// Samples expected per `convert` call.
    pub fn input_frames(&self) -> usize {
        self.input_frames
    }

    pub fn convert(&mut self, frame: &[f32]) -> Result<Vec<f32>> {
        match &mut self.resampler {
            None => Ok(frame.to_vec()),
            Some(resampler) => {
                let mut out = resampler
                    .process(&[frame], None)
                    .map_err(|e| VoiceError::Audio(format!("resample: {e}")))?;
                Ok(out.remove(0))
            }
        }
    }
}

/// Convert f32 samples in [-1, 1] to clamped PCM16.
pub fn encode_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// Mean absolute amplitude of a PCM16 frame, normalized to 0..1.
pub fn mean_abs_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|&s| (s as f32).abs()).sum();
    sum / samples.len() as f32 / 32768.0
}

/// Little-endian wire bytes for a PCM16 frame.
pub fn pcm16_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}
