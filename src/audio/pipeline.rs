//! One analysis run for one upload: decode, downmix, extract, score.
//!
//! Each call owns its buffers from start to finish; nothing is cached or
//! shared between runs.

use crate::audio::dispatcher::{self, run_guarded, DispatchError, Provenance};
use crate::audio::features::{self, FeatureSet};
use crate::audio::mixer;
use crate::audio::scoring::{self, Label};
use crate::audio::transcoder::Transcoder;
use serde::Serialize;
use tracing::info;

/// Everything the caller gets back about an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub label: Label,
    pub score: f64,
    pub features: FeatureSet,
    pub sample_rate: u32,
    pub channels: u16,
    pub source_type: Provenance,
    pub duration_seconds: f64,
}

pub async fn analyze(
    transcoder: &dyn Transcoder,
    bytes: Vec<u8>,
    filename_hint: &str,
) -> Result<AnalysisReport, DispatchError> {
    let input_bytes = bytes.len();
    let (stream, provenance) = dispatcher::load(transcoder, bytes, filename_hint).await?;

    let sample_rate = stream.sample_rate();
    let channels = stream.channels();
    let duration_seconds = stream.duration_seconds();

    let (features, result) = run_guarded(move || {
        let mono = mixer::mix(stream);
        let features = features::extract(&mono, sample_rate);
        (features, scoring::score(&features))
    })
    .await?;

    info!(
        input_bytes,
        source_type = provenance.source_type(),
        sample_rate,
        channels,
        rms = features.rms,
        zcr = features.zcr,
        pitch_var = features.pitch_var,
        score = result.score,
        label = %result.label,
        "Analysis complete"
    );

    Ok(AnalysisReport {
        label: result.label,
        score: result.score,
        features,
        sample_rate,
        channels,
        source_type: provenance,
        duration_seconds,
    })
}
