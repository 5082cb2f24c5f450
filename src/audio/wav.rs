//! # PCM WAV Container Parser
//!
//! Decodes a RIFF/WAVE byte buffer into raw integer samples without any
//! third-party WAV library. Only uncompressed PCM is accepted.
//!
//! ## Validation Order (fail fast):
//! 1. **Size**: at least 44 bytes (canonical header)
//! 2. **Signature**: `RIFF` at offset 0, `WAVE` at offset 8
//! 3. **Format chunk**: sample rate in `[1, 192000]`, channels in `[1, 8]`, PCM tag
//! 4. **Data chunk**: present and non-empty
//! 5. **Sample width**: 8, 16, 24 or 32 bits
//!
//! ## Sample Decoding:
//! - **8-bit**: unsigned bytes, passed through as `0..=255`
//! - **16-bit**: little-endian signed halfwords
//! - **24-bit**: little-endian triplets, sign-extended by hand into `i32`
//! - **32-bit**: little-endian signed words
//!
//! All widths are widened to `i32` so downstream stages see one sample type.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

/// Smallest buffer that can hold a canonical RIFF + fmt + data header.
pub const MIN_WAV_LEN: usize = 44;

pub const MAX_SAMPLE_RATE: u32 = 192_000;
pub const MAX_CHANNELS: u16 = 8;

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Ways a buffer can fail to decode as PCM WAV.
///
/// Every variant is terminal for the upload and points at something the
/// client can fix in their file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer than 44 bytes
    TooSmall(usize),
    /// Missing `RIFF` or `WAVE` marker
    BadSignature,
    /// Sample rate outside `[1, 192000]`
    BadSampleRate(u32),
    /// Channel count outside `[1, 8]`
    BadChannelCount(u16),
    /// Data chunk missing or empty
    NoAudioData,
    /// Bits per sample other than 8/16/24/32
    UnsupportedSampleWidth(u16),
    /// Anything else structurally wrong with the chunks or payload
    MalformedContainer(String),
}

impl ParseError {
    /// Machine-readable kind used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::TooSmall(_) => "too_small",
            ParseError::BadSignature => "bad_signature",
            ParseError::BadSampleRate(_) => "bad_sample_rate",
            ParseError::BadChannelCount(_) => "bad_channel_count",
            ParseError::NoAudioData => "no_audio_data",
            ParseError::UnsupportedSampleWidth(_) => "unsupported_sample_width",
            ParseError::MalformedContainer(_) => "malformed_container",
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TooSmall(len) => write!(
                f,
                "File too small to be a WAV ({} bytes, need at least {})",
                len, MIN_WAV_LEN
            ),
            ParseError::BadSignature => {
                write!(f, "Invalid WAV file: missing RIFF/WAVE signature. Please upload a PCM .wav audio")
            }
            ParseError::BadSampleRate(rate) => write!(
                f,
                "Unsupported sample rate {} Hz (expected 1..={})",
                rate, MAX_SAMPLE_RATE
            ),
            ParseError::BadChannelCount(ch) => write!(
                f,
                "Unsupported channel count {} (expected 1..={})",
                ch, MAX_CHANNELS
            ),
            ParseError::NoAudioData => write!(f, "WAV file contains no audio data"),
            ParseError::UnsupportedSampleWidth(bits) => {
                write!(f, "Unsupported sample width: {} bits per sample", bits)
            }
            ParseError::MalformedContainer(msg) => write!(f, "Malformed WAV container: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

/// Decoded PCM signal, interleaved frame-major.
///
/// ## Invariants (checked in [`PcmStream::new`]):
/// - `samples.len() % channels == 0`
/// - `1 <= channels <= 8`
/// - `1 <= sample_rate <= 192000`
#[derive(Debug, Clone, PartialEq)]
pub struct PcmStream {
    samples: Vec<i32>,
    sample_rate: u32,
    channels: u16,
}

impl PcmStream {
    pub fn new(samples: Vec<i32>, sample_rate: u32, channels: u16) -> Result<Self, ParseError> {
        if sample_rate == 0 || sample_rate > MAX_SAMPLE_RATE {
            return Err(ParseError::BadSampleRate(sample_rate));
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(ParseError::BadChannelCount(channels));
        }
        if samples.len() % channels as usize != 0 {
            return Err(ParseError::MalformedContainer(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }

        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn into_samples(self) -> Vec<i32> {
        self.samples
    }
}

/// Fields read from the `fmt ` chunk.
#[derive(Debug, Clone, Copy)]
struct FormatChunk {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Parse a PCM WAV buffer into a [`PcmStream`].
pub fn parse(bytes: &[u8]) -> Result<PcmStream, ParseError> {
    if bytes.len() < MIN_WAV_LEN {
        return Err(ParseError::TooSmall(bytes.len()));
    }

    if !has_wav_signature(bytes) {
        return Err(ParseError::BadSignature);
    }

    let (format, data) = locate_chunks(bytes)?;

    let format = format.ok_or_else(|| ParseError::MalformedContainer("missing fmt chunk".to_string()))?;

    if format.sample_rate == 0 || format.sample_rate > MAX_SAMPLE_RATE {
        return Err(ParseError::BadSampleRate(format.sample_rate));
    }
    if format.channels == 0 || format.channels > MAX_CHANNELS {
        return Err(ParseError::BadChannelCount(format.channels));
    }
    if format.format_tag != WAVE_FORMAT_PCM {
        return Err(ParseError::MalformedContainer(format!(
            "non-PCM compression tag 0x{:04X}",
            format.format_tag
        )));
    }

    let payload = match data {
        Some(payload) if !payload.is_empty() => payload,
        _ => return Err(ParseError::NoAudioData),
    };

    let samples = decode_samples(payload, format.bits_per_sample, format.channels)?;

    PcmStream::new(samples, format.sample_rate, format.channels)
}

/// True when the buffer starts with `RIFF....WAVE`.
pub fn has_wav_signature(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Compression tag from the `fmt ` chunk, with WAVE_FORMAT_EXTENSIBLE resolved
/// to its sub-format. `None` when there is no readable `fmt ` chunk.
pub fn compression_tag(bytes: &[u8]) -> Option<u16> {
    if !has_wav_signature(bytes) {
        return None;
    }
    let (format, _) = locate_chunks(bytes).ok()?;
    format.map(|f| f.format_tag)
}

/// Walk the RIFF sub-chunks after the 12-byte header and pick out `fmt ` and `data`.
fn locate_chunks(bytes: &[u8]) -> Result<(Option<FormatChunk>, Option<&[u8]>), ParseError> {
    let mut pos = 12;
    let mut format = None;
    let mut data = None;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = Cursor::new(&bytes[pos + 4..pos + 8])
            .read_u32::<LittleEndian>()
            .map_err(|e| ParseError::MalformedContainer(e.to_string()))? as usize;
        let body_start = pos + 8;
        let body_end = body_start
            .checked_add(size)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                ParseError::MalformedContainer(format!(
                    "chunk '{}' declares {} bytes but only {} remain",
                    String::from_utf8_lossy(id),
                    size,
                    bytes.len() - body_start
                ))
            })?;
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => format = Some(read_format(body)?),
            b"data" => {
                data = Some(body);
                break;
            }
            _ => {}
        }

        // chunks are word aligned
        pos = body_end + (size & 1);
    }

    Ok((format, data))
}

fn read_format(body: &[u8]) -> Result<FormatChunk, ParseError> {
    if body.len() < 16 {
        return Err(ParseError::MalformedContainer(format!(
            "fmt chunk is {} bytes, need at least 16",
            body.len()
        )));
    }

    let malformed = |e: std::io::Error| ParseError::MalformedContainer(e.to_string());
    let mut cursor = Cursor::new(body);
    let mut format_tag = cursor.read_u16::<LittleEndian>().map_err(malformed)?;
    let channels = cursor.read_u16::<LittleEndian>().map_err(malformed)?;
    let sample_rate = cursor.read_u32::<LittleEndian>().map_err(malformed)?;
    let _byte_rate = cursor.read_u32::<LittleEndian>().map_err(malformed)?;
    let _block_align = cursor.read_u16::<LittleEndian>().map_err(malformed)?;
    let bits_per_sample = cursor.read_u16::<LittleEndian>().map_err(malformed)?;

    // WAVE_FORMAT_EXTENSIBLE stores the real tag in the first two bytes of the sub-format GUID
    if format_tag == WAVE_FORMAT_EXTENSIBLE {
        if body.len() < 40 {
            return Err(ParseError::MalformedContainer(
                "extensible fmt chunk is missing its sub-format".to_string(),
            ));
        }
        cursor.set_position(24);
        format_tag = cursor.read_u16::<LittleEndian>().map_err(malformed)?;
    }

    Ok(FormatChunk {
        format_tag,
        channels,
        sample_rate,
        bits_per_sample,
    })
}

fn decode_samples(payload: &[u8], bits_per_sample: u16, channels: u16) -> Result<Vec<i32>, ParseError> {
    let width = match bits_per_sample {
        8 => 1,
        16 => 2,
        24 => 3,
        32 => 4,
        other => return Err(ParseError::UnsupportedSampleWidth(other)),
    };

    let frame_bytes = width * channels as usize;
    if payload.len() % frame_bytes != 0 {
        return Err(ParseError::MalformedContainer(format!(
            "data chunk of {} bytes is not a whole number of {}-byte frames",
            payload.len(),
            frame_bytes
        )));
    }

    let samples = match width {
        1 => payload.iter().map(|&b| b as i32).collect(),
        2 => payload
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as i32)
            .collect(),
        3 => payload
            .chunks_exact(3)
            .map(|c| decode_i24([c[0], c[1], c[2]]))
            .collect(),
        _ => {
            let mut cursor = Cursor::new(payload);
            let mut out = Vec::with_capacity(payload.len() / 4);
            while let Ok(sample) = cursor.read_i32::<LittleEndian>() {
                out.push(sample);
            }
            out
        }
    };

    Ok(samples)
}

/// Assemble a little-endian 24-bit two's-complement sample into an `i32`.
///
/// There is no native 24-bit integer, so the three bytes are combined into
/// the low 24 bits of a `u32`; when bit 23 is set the top byte is filled with
/// ones before reinterpreting as signed.
pub fn decode_i24(bytes: [u8; 3]) -> i32 {
    let raw = bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16;
    if raw & 0x0080_0000 != 0 {
        (raw | 0xFF00_0000) as i32
    } else {
        raw as i32
    }
}
