//! RIFF/WAV header reading and writing
//!
//! Synthesis providers stream WAV bytes with an embedded header; the pacing
//! queue needs the format and the payload offset before it can forward or
//! resample anything. The parser walks RIFF chunks instead of assuming fixed
//! byte offsets, so extra chunks (`LIST`, `fact`, ...) before `data` are
//! handled.

use thiserror::Error;

use crate::audio::PcmFormat;

/// WAV parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WavError {
    #[error("not a RIFF/WAVE stream")]
    NotRiff,

    #[error("missing fmt chunk before data")]
    MissingFormat,

    #[error("unsupported encoding: {0} (only PCM)")]
    UnsupportedEncoding(u16),

    #[error("unsupported sample width: {0} bits")]
    UnsupportedWidth(u16),
}

/// Parsed WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    /// Stream format from the `fmt ` chunk.
    pub format: PcmFormat,
    /// Byte offset where PCM payload begins.
    pub data_offset: usize,
    /// Payload length the header declares. Streaming encoders often write a
    /// placeholder here; the end of the byte stream is authoritative.
    pub declared_len: usize,
}

/// Attempt to parse a WAV header from the front of `bytes`.
///
/// Returns `Ok(None)` when more bytes are needed, `Ok(Some(info))` once the
/// `data` chunk has been located, and an error for malformed or unsupported
/// streams.
pub fn parse_header(bytes: &[u8]) -> Result<Option<WavInfo>, WavError> {
    if bytes.len() < 12 {
        return Ok(None);
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::NotRiff);
    }

    let mut pos = 12;
    let mut format: Option<PcmFormat> = None;

    loop {
        if bytes.len() < pos + 8 {
            return Ok(None);
        }
        let id = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]])
            as usize;

        if id == b"data" {
            let fmt = format.ok_or(WavError::MissingFormat)?;
            return Ok(Some(WavInfo {
                format: fmt,
                data_offset: pos + 8,
                declared_len: size,
            }));
        }

        // Non-data chunks must be fully buffered before we can move past them.
        if bytes.len() < pos + 8 + size {
            return Ok(None);
        }

        if id == b"fmt " {
            if size < 16 {
                return Err(WavError::MissingFormat);
            }
            let body = &bytes[pos + 8..pos + 8 + size];
            let encoding = u16::from_le_bytes([body[0], body[1]]);
            if encoding != 1 {
                return Err(WavError::UnsupportedEncoding(encoding));
            }
            let channels = u16::from_le_bytes([body[2], body[3]]);
            let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
            let bits_per_sample = u16::from_le_bytes([body[14], body[15]]);
            if bits_per_sample != 16 {
                return Err(WavError::UnsupportedWidth(bits_per_sample));
            }
            format = Some(PcmFormat {
                sample_rate,
                channels,
                bits_per_sample,
            });
        }

        // RIFF chunks are word-aligned.
        pos += 8 + size + (size & 1);
    }
}

/// Build a standard 44-byte WAV header for `data_len` bytes of PCM payload.
pub fn header_for(format: PcmFormat, data_len: usize) -> [u8; 44] {
    let mut header = [0u8; 44];
    let byte_rate = format.bytes_per_second() as u32;
    let block_align = format.channels * (format.bits_per_sample / 8);

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_len as u32).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&format.channels.to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&format.bits_per_sample.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&(data_len as u32).to_le_bytes());

    header
}
