//! # Format Dispatcher
//!
//! Turns an uploaded byte buffer into a [`PcmStream`], choosing between the
//! in-process WAV parser and the external transcoder.
//!
//! ## Decode Strategies (tried in order):
//! 1. **DirectParse**: always attempted; cheap and needs no external tool
//! 2. **Transcode**: only when the direct parse failed *and* the content
//!    signature or filename extension points at another audio format, or the
//!    RIFF `fmt ` chunk names a codec other than integer PCM
//!
//! A parse failure on something that looks like a WAV file is returned as-is
//! so the client learns what is wrong with their file. Any non-parse failure
//! ends the run.
//!
//! CPU work runs on the blocking pool; a panic there is reported as
//! `DecodeFailed` instead of tearing down the worker.

use crate::audio::transcoder::{TranscodeError, Transcoder};
use crate::audio::wav::{self, ParseError, PcmStream};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// How the PCM stream was obtained. Reported to the caller, never used by
/// the feature stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Provenance {
    #[serde(rename = "wav")]
    Direct,
    #[serde(rename = "transcoded")]
    Transcoded,
}

impl Provenance {
    pub fn source_type(&self) -> &'static str {
        match self {
            Provenance::Direct => "wav",
            Provenance::Transcoded => "transcoded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The buffer is WAV-like but invalid
    Parse(ParseError),
    /// A transcode was needed but the tool can't be used
    TranscoderUnavailable(String),
    /// The tool ran but produced nothing usable
    TranscodeFailed(String),
    /// Unexpected internal failure while decoding
    DecodeFailed(String),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Parse(e) => e.kind(),
            DispatchError::TranscoderUnavailable(_) => "transcoder_unavailable",
            DispatchError::TranscodeFailed(_) => "transcode_failed",
            DispatchError::DecodeFailed(_) => "decode_failed",
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Parse(e) => write!(f, "{}", e),
            DispatchError::TranscoderUnavailable(msg) => {
                write!(f, "This audio format needs transcoding, but the transcoder is unavailable: {}", msg)
            }
            DispatchError::TranscodeFailed(msg) => write!(f, "Could not decode audio: {}", msg),
            DispatchError::DecodeFailed(msg) => write!(f, "Audio decoding failed unexpectedly: {}", msg),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<ParseError> for DispatchError {
    fn from(err: ParseError) -> Self {
        DispatchError::Parse(err)
    }
}

impl From<TranscodeError> for DispatchError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::Unavailable(msg) => DispatchError::TranscoderUnavailable(msg),
            other => DispatchError::TranscodeFailed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DirectParse,
    Transcode,
}

/// Strategies in the order they are attempted.
pub const STRATEGIES: [Strategy; 2] = [Strategy::DirectParse, Strategy::Transcode];

impl Strategy {
    pub fn provenance(self) -> Provenance {
        match self {
            Strategy::DirectParse => Provenance::Direct,
            Strategy::Transcode => Provenance::Transcoded,
        }
    }

    /// Whether this strategy is worth attempting for the upload.
    pub fn applies(self, bytes: &[u8], filename_hint: &str) -> bool {
        match self {
            Strategy::DirectParse => true,
            Strategy::Transcode => looks_transcodable(bytes, filename_hint),
        }
    }

    async fn attempt(
        self,
        transcoder: &dyn Transcoder,
        bytes: Arc<[u8]>,
        filename_hint: &str,
    ) -> Result<PcmStream, DispatchError> {
        match self {
            Strategy::DirectParse => Ok(run_guarded(move || wav::parse(&bytes)).await??),
            Strategy::Transcode => {
                let converted = transcoder.transcode(&bytes, filename_hint).await?;
                run_guarded(move || wav::parse(&converted))
                    .await?
                    .map_err(|e| DispatchError::TranscodeFailed(format!("transcoder output is not valid PCM WAV: {}", e)))
            }
        }
    }
}

/// Decode an upload into PCM, trying each applicable strategy in order.
pub async fn load(
    transcoder: &dyn Transcoder,
    bytes: Vec<u8>,
    filename_hint: &str,
) -> Result<(PcmStream, Provenance), DispatchError> {
    let bytes: Arc<[u8]> = bytes.into();
    let mut last_error = None;

    for strategy in STRATEGIES {
        if !strategy.applies(&bytes, filename_hint) {
            debug!(?strategy, filename = %filename_hint, "Skipping decode strategy");
            continue;
        }

        match strategy.attempt(transcoder, Arc::clone(&bytes), filename_hint).await {
            Ok(stream) => {
                info!(
                    ?strategy,
                    sample_rate = stream.sample_rate(),
                    channels = stream.channels(),
                    frames = stream.frames(),
                    "Audio decoded"
                );
                return Ok((stream, strategy.provenance()));
            }
            Err(err) => {
                debug!(?strategy, error = %err, "Decode strategy failed");
                let recoverable = matches!(err, DispatchError::Parse(_));
                last_error = Some(err);
                if !recoverable {
                    break;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| DispatchError::DecodeFailed("no decode strategy applied".to_string())))
}

/// Run CPU-bound work on the blocking pool, containing panics.
pub(crate) async fn run_guarded<T, F>(job: F) -> Result<T, DispatchError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job).await.map_err(|e| {
        error!(error = %e, "Audio processing task failed");
        DispatchError::DecodeFailed("internal error while processing audio".to_string())
    })
}

/// True when a failed direct parse should be handed to the transcoder.
pub fn looks_transcodable(bytes: &[u8], filename_hint: &str) -> bool {
    if sniff_container(bytes).is_some() {
        return true;
    }
    if wav::has_wav_signature(bytes) {
        // RIFF wrapping a codec the parser doesn't decode (float, ADPCM, MP3-in-WAV, ...)
        return wav::compression_tag(bytes).is_some_and(|tag| tag != wav::WAVE_FORMAT_PCM);
    }
    has_foreign_extension(filename_hint)
}

/// Identify common non-WAV audio containers by magic bytes.
pub fn sniff_container(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"ID3") {
        Some("mp3")
    } else if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0 {
        // MPEG audio / ADTS frame sync
        Some("mpeg")
    } else if bytes.starts_with(b"fLaC") {
        Some("flac")
    } else if bytes.starts_with(b"OggS") {
        Some("ogg")
    } else if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
        Some("mp4")
    } else if bytes.starts_with(b"FORM") {
        Some("aiff")
    } else if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        Some("webm")
    } else if bytes.starts_with(b"#!AMR") {
        Some("amr")
    } else if bytes.starts_with(b"caff") {
        Some("caf")
    } else {
        None
    }
}

fn has_foreign_extension(filename_hint: &str) -> bool {
    Path::new(filename_hint)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| !ext.eq_ignore_ascii_case("wav") && !ext.eq_ignore_ascii_case("wave"))
        .unwrap_or(false)
}
