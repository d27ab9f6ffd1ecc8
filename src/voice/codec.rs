//! Telephony audio codec helpers
//!
//! Carrier media streams carry 8kHz G.711 μ-law. TTS engines that only emit
//! 24kHz 16-bit PCM go through [`PcmTranscoder`] first.

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

/// Bias added before μ-law segment lookup
const ULAW_BIAS: i32 = 0x84;

/// Largest magnitude that survives encoding
const ULAW_CLIP: i32 = 32635;

/// OpenAI TTS PCM output rate
const TTS_RATE: usize = 24_000;

/// Carrier media stream rate
const CARRIER_RATE: usize = 8_000;

/// Resampler input frames per chunk (20ms at 24kHz)
const CHUNK_FRAMES: usize = 480;

const SUB_CHUNKS: usize = 2;

/// Encode one 16-bit linear sample as G.711 μ-law
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut magnitude = i32::from(sample);
    let sign: u8 = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0
    };

    magnitude = magnitude.min(ULAW_CLIP) + ULAW_BIAS;

    let segment = ((magnitude >> 7) & 0xFF) as u8;
    let exponent: u8 = if segment == 0 {
        0
    } else {
        7 - segment.leading_zeros() as u8
    };
    let mantissa = ((magnitude >> (exponent + 3)) & 0x0F) as u8;

    !(sign | (exponent << 4) | mantissa)
}

/// Streaming 24kHz s16le PCM → 8kHz μ-law converter
///
/// Input may arrive split at any byte boundary. Odd bytes and samples short
/// of a full resampler chunk carry over to the next push; [`Self::finish`]
/// drains the tail.
pub struct PcmTranscoder {
    resampler: FftFixedIn<f32>,
    carry: Option<u8>,
    pending: Vec<f32>,
}

impl PcmTranscoder {
    /// # Errors
    ///
    /// Returns an error if the resampler cannot be built
    pub fn new() -> Result<Self> {
        let resampler = FftFixedIn::<f32>::new(TTS_RATE, CARRIER_RATE, CHUNK_FRAMES, SUB_CHUNKS, 1)
            .map_err(|e| Error::Tts(format!("resampler init failed: {e}")))?;

        Ok(Self {
            resampler,
            carry: None,
            pending: Vec::with_capacity(CHUNK_FRAMES * 2),
        })
    }

    /// Convert a chunk, returning whatever μ-law bytes are complete
    ///
    /// # Errors
    ///
    /// Returns an error if resampling fails
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut input = bytes.iter().copied();
        while let Some(low) = self.carry.take().or_else(|| input.next()) {
            let Some(high) = input.next() else {
                self.carry = Some(low);
                break;
            };
            self.pending
                .push(f32::from(i16::from_le_bytes([low, high])) / 32768.0);
        }

        let mut out = Vec::with_capacity(self.pending.len() / 3);
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let resampled = self
                .resampler
                .process(&[&self.pending[..needed]], None)
                .map_err(|e| Error::Tts(format!("resample failed: {e}")))?;
            self.pending.drain(..needed);
            encode_ulaw(&resampled[0], &mut out);
        }

        Ok(out)
    }

    /// Flush samples still waiting for a full chunk
    ///
    /// # Errors
    ///
    /// Returns an error if resampling fails
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        self.carry = None;
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        // The partial chunk is zero-padded; keep only the real samples' share
        let expected = self.pending.len().div_ceil(TTS_RATE / CARRIER_RATE);
        let tail: [&[f32]; 1] = [&self.pending];
        let resampled = self
            .resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| Error::Tts(format!("resample failed: {e}")))?;
        self.pending.clear();

        let mut out = Vec::with_capacity(expected);
        let samples = &resampled[0];
        encode_ulaw(&samples[..expected.min(samples.len())], &mut out);
        Ok(out)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn encode_ulaw(samples: &[f32], out: &mut Vec<u8>) {
    out.extend(
        samples
            .iter()
            .map(|s| linear_to_ulaw((s * 32768.0).clamp(-32768.0, 32767.0) as i16)),
    );
}
