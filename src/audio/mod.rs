//! # Audio Analysis Module
//!
//! Everything between an uploaded byte buffer and a scored result.
//!
//! ## Key Components (leaf first):
//! - **Container Parser** (`wav`): PCM WAV bytes to integer samples
//! - **Transcoder Adapter** (`transcoder`): external decoder for everything else
//! - **Format Dispatcher** (`dispatcher`): picks parser or transcoder
//! - **Channel Mixer** (`mixer`): interleaved channels to mono
//! - **Feature Extractor** (`features`): RMS, zero-crossing rate, pitch variance
//! - **Scorer** (`scoring`): heuristic score and label
//! - **Pipeline** (`pipeline`): runs the stages above for one upload
//!
//! ## Data Flow:
//! raw bytes → dispatcher → (parser | transcoder → parser) → mixer → features → scorer

pub mod dispatcher;
pub mod features;
pub mod mixer;
pub mod pipeline;
pub mod scoring;
pub mod transcoder;
pub mod wav;

pub use dispatcher::{DispatchError, Provenance};
pub use features::FeatureSet;
pub use pipeline::{analyze, AnalysisReport};
pub use scoring::{Label, ScoreResult};
pub use transcoder::{FfmpegTranscoder, TranscodeError, Transcoder};
pub use wav::{ParseError, PcmStream};
