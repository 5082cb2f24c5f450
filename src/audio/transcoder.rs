//! # External Transcoder Adapter
//!
//! Converts audio the WAV parser can't read (MP3, AAC, Ogg, FLAC, ...) into
//! mono 16 kHz 16-bit PCM WAV by running an external decoder.
//!
//! ## Key Points:
//! - **Trait seam**: the dispatcher only sees [`Transcoder`], so tests and
//!   alternative backends can stand in for the real process
//! - **Scratch files**: input and output live in a private temp directory
//!   that is removed when the call returns
//! - **Timeout**: the child is killed if it outlives the configured budget
//! - **Availability**: a missing binary is reported as `Unavailable`, never a panic

use crate::config::TranscoderConfig;
use futures_util::future::BoxFuture;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Sample rate requested from the transcoder.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;
/// Channel count requested from the transcoder.
pub const TARGET_CHANNELS: u16 = 1;

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const STDERR_TAIL_BYTES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    /// The tool is disabled, missing, or can't be executed
    Unavailable(String),
    /// The tool ran but did not produce usable output
    Failed(String),
    /// The tool exceeded its time budget and was killed
    TimedOut(Duration),
}

impl fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscodeError::Unavailable(msg) => write!(f, "Transcoder unavailable: {}", msg),
            TranscodeError::Failed(msg) => write!(f, "Transcoding failed: {}", msg),
            TranscodeError::TimedOut(limit) => {
                write!(f, "Transcoding timed out after {}s", limit.as_secs())
            }
        }
    }
}

impl std::error::Error for TranscodeError {}

/// Capability: arbitrary audio bytes in, PCM WAV bytes out.
///
/// Futures are boxed so the service can hold an `Arc<dyn Transcoder>`.
pub trait Transcoder: Send + Sync {
    /// Short name for logs and status reports.
    fn name(&self) -> &str;

    /// Whether this instance was built with transcoding switched on.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Whether a call to [`Transcoder::transcode`] could currently succeed.
    fn check_available(&self) -> BoxFuture<'_, bool>;

    /// Convert `bytes` into mono 16 kHz 16-bit PCM WAV. `filename_hint` is only
    /// used to tell the tool what container it is looking at.
    fn transcode<'a>(
        &'a self,
        bytes: &'a [u8],
        filename_hint: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>, TranscodeError>>;
}

/// Runs `ffmpeg` (or a compatible CLI) as a child process.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
    timeout: Duration,
    enabled: bool,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            enabled: true,
        }
    }

    pub fn from_config(config: &TranscoderConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            enabled: config.enabled,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run_version_check(&self) -> bool {
        if !self.enabled {
            return false;
        }

        let mut command = Command::new(&self.program);
        command
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(VERSION_CHECK_TIMEOUT, command.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(program = %self.program, error = %e, "Transcoder version check failed to spawn");
                false
            }
            Err(_) => {
                warn!(program = %self.program, "Transcoder version check timed out");
                false
            }
        }
    }

    async fn run(&self, bytes: &[u8], filename_hint: &str) -> Result<Vec<u8>, TranscodeError> {
        if !self.enabled {
            return Err(TranscodeError::Unavailable(
                "transcoding is disabled by configuration".to_string(),
            ));
        }

        let workdir = tempfile::Builder::new()
            .prefix("voice-screen-")
            .tempdir()
            .map_err(|e| TranscodeError::Failed(format!("could not create scratch directory: {}", e)))?;
        let input = workdir.path().join(format!("input.{}", input_extension(filename_hint)));
        let output = workdir.path().join("output.wav");

        tokio::fs::write(&input, bytes)
            .await
            .map_err(|e| TranscodeError::Failed(format!("could not stage input: {}", e)))?;

        let mut command = Command::new(&self.program);
        command
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
            .arg(&input)
            .arg("-ac")
            .arg(TARGET_CHANNELS.to_string())
            .arg("-ar")
            .arg(TARGET_SAMPLE_RATE.to_string())
            .args(["-acodec", "pcm_s16le", "-f", "wav"])
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            program = %self.program,
            input_bytes = bytes.len(),
            filename = %filename_hint,
            "Spawning transcoder"
        );

        let child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                TranscodeError::Unavailable(format!("cannot run '{}': {}", self.program, e))
            }
            _ => TranscodeError::Failed(format!("failed to start '{}': {}", self.program, e)),
        })?;

        // dropping the future on timeout drops the child, which kills it
        let finished = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| TranscodeError::TimedOut(self.timeout))?
            .map_err(|e| TranscodeError::Failed(e.to_string()))?;

        if !finished.status.success() {
            return Err(TranscodeError::Failed(format!(
                "exit status {}: {}",
                finished.status,
                stderr_tail(&finished.stderr)
            )));
        }

        let wav = tokio::fs::read(&output)
            .await
            .map_err(|e| TranscodeError::Failed(format!("no output produced: {}", e)))?;
        if wav.is_empty() {
            return Err(TranscodeError::Failed("transcoder produced an empty file".to_string()));
        }

        Ok(wav)
    }
}

impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        &self.program
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.run_version_check())
    }

    fn transcode<'a>(
        &'a self,
        bytes: &'a [u8],
        filename_hint: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>, TranscodeError>> {
        Box::pin(self.run(bytes, filename_hint))
    }
}

/// File extension handed to the tool; anything odd becomes `bin` so a client
/// filename never reaches the command line.
fn input_extension(filename_hint: &str) -> String {
    Path::new(filename_hint)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned transcoder that counts calls.
    pub(crate) struct StubTranscoder {
        pub available: bool,
        pub output: Result<Vec<u8>, TranscodeError>,
        pub calls: AtomicUsize,
        pub availability_checks: AtomicUsize,
    }

    impl StubTranscoder {
        pub(crate) fn returning(output: Result<Vec<u8>, TranscodeError>) -> Self {
            Self {
                available: true,
                output,
                calls: AtomicUsize::new(0),
                availability_checks: AtomicUsize::new(0),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn availability_check_count(&self) -> usize {
            self.availability_checks.load(Ordering::SeqCst)
        }
    }

    impl Transcoder for StubTranscoder {
        fn name(&self) -> &str {
            "stub"
        }

        fn check_available(&self) -> BoxFuture<'_, bool> {
            self.availability_checks.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { self.available })
        }

        fn transcode<'a>(
            &'a self,
            _bytes: &'a [u8],
            _filename_hint: &'a str,
        ) -> BoxFuture<'a, Result<Vec<u8>, TranscodeError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let output = self.output.clone();
            Box::pin(async move { output })
        }
    }

    #[test]
    fn test_input_extension() {
        assert_eq!(input_extension("clip.MP3"), "mp3");
        assert_eq!(input_extension("voice.m4a"), "m4a");
        assert_eq!(input_extension("noext"), "bin");
        assert_eq!(input_extension(""), "bin");
        assert_eq!(input_extension("x.mp3;rm -rf"), "bin");
        assert_eq!(input_extension("a.verylongextension"), "bin");
    }

    #[test]
    fn test_stderr_tail_keeps_end() {
        let long = "x".repeat(2000) + "final error";
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.ends_with("final error"));
        assert!(tail.len() <= STDERR_TAIL_BYTES);
    }

    #[tokio::test]
    async fn test_disabled_transcoder_is_unavailable() {
        let config = TranscoderConfig {
            enabled: false,
            ..TranscoderConfig::default()
        };
        let transcoder = FfmpegTranscoder::from_config(&config);
        assert!(!transcoder.is_enabled());
        assert!(!transcoder.check_available().await);
        assert!(matches!(
            transcoder.transcode(b"ID3", "a.mp3").await,
            Err(TranscodeError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let transcoder = FfmpegTranscoder::new("definitely-not-a-real-decoder-binary", Duration::from_secs(5));
        assert!(!transcoder.check_available().await);
        assert!(matches!(
            transcoder.transcode(b"ID3", "a.mp3").await,
            Err(TranscodeError::Unavailable(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let transcoder = FfmpegTranscoder::new("false", Duration::from_secs(5));
        assert!(matches!(
            transcoder.transcode(b"ID3", "a.mp3").await,
            Err(TranscodeError::Failed(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_program_is_killed_after_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-decoder.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let transcoder = FfmpegTranscoder::new(script.to_string_lossy(), Duration::from_secs(1));
        let started = std::time::Instant::now();
        let err = transcoder.transcode(b"ID3", "a.mp3").await.unwrap_err();

        assert_eq!(err, TranscodeError::TimedOut(Duration::from_secs(1)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_output_is_failure() {
        let transcoder = FfmpegTranscoder::new("true", Duration::from_secs(5));
        let err = transcoder.transcode(b"ID3", "a.mp3").await.unwrap_err();
        assert!(matches!(err, TranscodeError::Failed(ref msg) if msg.contains("no output")));
    }
}
