//! PCM audio format arithmetic and frame buffering

use serde::{Deserialize, Serialize};

/// Playback format every connection ultimately receives: 16 kHz mono 16-bit
/// little-endian PCM. Synthesis output in any other format goes through the
/// resample path before it reaches the wire.
pub const TARGET_FORMAT: PcmFormat = PcmFormat {
    sample_rate: 16_000,
    channels: 1,
    bits_per_sample: 16,
};

/// Raw PCM stream format.
///
/// Serializes with the field names the client protocol uses in
/// `audio_start.format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    #[serde(rename = "sampleRate")]
    pub sample_rate: u32,
    #[serde(rename = "numChannels")]
    pub channels: u16,
    #[serde(rename = "bitsPerSample")]
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// Bytes consumed per second of audio in this format.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Duration in milliseconds of `bytes` of raw audio.
    pub fn duration_ms(&self, bytes: usize) -> u64 {
        let bps = self.bytes_per_second();
        if bps == 0 {
            return 0;
        }
        (bytes as u64 * 1000) / bps as u64
    }

    /// Byte count covering `ms` milliseconds, floored to a whole sample.
    pub fn bytes_for_ms(&self, ms: u64) -> usize {
        let raw = (self.bytes_per_second() as u64 * ms / 1000) as usize;
        let block = self.channels as usize * (self.bits_per_sample as usize / 8);
        if block == 0 {
            return raw;
        }
        raw - raw % block
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        TARGET_FORMAT
    }
}

impl std::fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// Convert 16-bit little-endian PCM bytes to normalized f32 samples.
///
/// A trailing odd byte is ignored.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Accumulates raw audio bytes into fixed-size analysis frames.
///
/// Inbound WebSocket frames arrive at whatever granularity the client's
/// recorder produces; the activity detector wants exact frames. Leftover
/// bytes carry over to the next push.
#[derive(Debug)]
pub struct FrameBuffer {
    frame_bytes: usize,
    pending: Vec<u8>,
}

impl FrameBuffer {
    /// Create a buffer yielding frames of `frame_samples` 16-bit samples.
    pub fn new(frame_samples: usize) -> Self {
        Self {
            frame_bytes: frame_samples * 2,
            pending: Vec::new(),
        }
    }

    /// Append bytes and drain every complete frame now available.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_bytes {
            let rest = self.pending.split_off(self.frame_bytes);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    /// Bytes waiting for the next complete frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard any partial frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
