//! Heuristic risk score over a [`FeatureSet`].
//!
//! The coefficients below are arbitrary. They were never fitted to labelled
//! data and the score is not a diagnostic signal; they are kept fixed so
//! results stay reproducible across deployments.

use crate::audio::features::FeatureSet;
use serde::Serialize;
use std::fmt;

const ZCR_WEIGHT: f64 = 1.5;
const PITCH_VAR_WEIGHT: f64 = 0.5;
const PITCH_VAR_SCALE: f64 = 1000.0;
const RMS_WEIGHT: f64 = 0.3;
const RMS_REFERENCE: f64 = 0.1;
const LABEL_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    PossibleSignal,
    NonSignal,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::PossibleSignal => "possible_signal",
            Label::NonSignal => "non_signal",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreResult {
    /// Clipped to `[0, 1]`
    pub score: f64,
    pub label: Label,
}

/// Higher zero-crossing rate, higher pitch variance and lower energy all raise the score.
pub fn score(features: &FeatureSet) -> ScoreResult {
    let raw = ZCR_WEIGHT * features.zcr
        + PITCH_VAR_WEIGHT * (features.pitch_var / PITCH_VAR_SCALE).min(1.0)
        + RMS_WEIGHT * (RMS_REFERENCE - features.rms);
    let score = raw.clamp(0.0, 1.0);

    let label = if score > LABEL_THRESHOLD {
        Label::PossibleSignal
    } else {
        Label::NonSignal
    };

    ScoreResult { score, label }
}
