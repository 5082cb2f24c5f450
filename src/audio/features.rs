//! # Acoustic Feature Extraction
//!
//! Computes three scalar features over a mono signal:
//!
//! - **rms**: root-mean-square energy of the peak-normalized signal
//! - **zcr**: fraction of adjacent sample pairs with a strict sign change
//! - **pitch_var**: variance (Hz²) of a coarse per-frame autocorrelation pitch track
//!
//! The pitch track is deliberately cheap: non-overlapping ~20 ms frames, one
//! autocorrelation peak per frame searched within the 60–350 Hz speech F0
//! range. It is not a voicing-aware pitch detector, so noisy or unvoiced
//! frames still contribute an estimate.

use crate::audio::mixer::MonoSignal;
use serde::Serialize;

/// Lowest fundamental frequency searched (longest lag).
pub const MIN_PITCH_HZ: u32 = 60;
/// Highest fundamental frequency searched (shortest lag).
pub const MAX_PITCH_HZ: u32 = 350;
/// Frames per second for the pitch track, i.e. 20 ms frames.
const PITCH_FRAMES_PER_SECOND: u32 = 50;
const AUTOCORR_EPSILON: f64 = 1e-9;

/// The three features fed to the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FeatureSet {
    /// Energy, `>= 0`
    pub rms: f64,
    /// Zero-crossing rate, in `[0, 1]`
    pub zcr: f64,
    /// Variance of per-frame pitch estimates, `>= 0`
    pub pitch_var: f64,
}

/// Autocorrelation lag search range `[min_lag, max_lag)` for a sample rate.
pub fn lag_bounds(sample_rate: u32) -> (usize, usize) {
    let min_lag = ((sample_rate / MAX_PITCH_HZ) as usize).max(1);
    let max_lag = ((sample_rate / MIN_PITCH_HZ) as usize).max(min_lag + 1);
    (min_lag, max_lag)
}

/// Extract [`FeatureSet`] from a mono signal.
///
/// An empty signal yields all zeros. An all-silent signal is normalized by
/// `1.0` instead of its zero peak, so no feature is ever NaN or infinite.
pub fn extract(signal: &MonoSignal, sample_rate: u32) -> FeatureSet {
    let raw = signal.samples();
    if raw.is_empty() {
        return FeatureSet::default();
    }

    let peak = raw.iter().fold(0.0_f64, |acc, &s| acc.max(s.abs()));
    let divisor = if peak > 0.0 { peak } else { 1.0 };
    let normalized: Vec<f64> = raw.iter().map(|&s| s / divisor).collect();

    FeatureSet {
        rms: rms(&normalized),
        zcr: zero_crossing_rate(&normalized),
        pitch_var: pitch_variance(&normalized, sample_rate),
    }
}

fn rms(x: &[f64]) -> f64 {
    (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
}

/// Zero values never count as a crossing: only a strictly negative product does.
fn zero_crossing_rate(x: &[f64]) -> f64 {
    if x.len() <= 1 {
        return 0.0;
    }
    let crossings = x.windows(2).filter(|pair| pair[0] * pair[1] < 0.0).count();
    crossings as f64 / (x.len() - 1) as f64
}

fn pitch_variance(x: &[f64], sample_rate: u32) -> f64 {
    let (min_lag, max_lag) = lag_bounds(sample_rate);
    if x.len() <= max_lag + 1 {
        return 0.0;
    }

    let mean = x.iter().sum::<f64>() / x.len() as f64;
    let centered: Vec<f64> = x.iter().map(|&v| v - mean).collect();

    let frame = ((sample_rate / PITCH_FRAMES_PER_SECOND) as usize).max(1);
    // trailing partial frame is dropped unless it is the only one
    let steps = (centered.len() / frame).max(1);

    let pitches: Vec<f64> = (0..steps)
        .filter_map(|i| {
            let start = i * frame;
            let end = (start + frame).min(centered.len());
            let window = &centered[start..end];
            if window.len() < max_lag + 1 {
                return None;
            }
            let lag = autocorrelation_peak_lag(window, min_lag, max_lag);
            (lag > 0).then(|| sample_rate as f64 / lag as f64)
        })
        .collect();

    variance(&pitches)
}

/// Lag of the largest normalized autocorrelation value in `[min_lag, max_lag)`.
/// Ties go to the shortest lag.
fn autocorrelation_peak_lag(frame: &[f64], min_lag: usize, max_lag: usize) -> usize {
    // zero lag is the peak of a one-sided autocorrelation
    let norm = autocorrelation(frame, 0) + AUTOCORR_EPSILON;

    let mut best_lag = min_lag;
    let mut best = f64::NEG_INFINITY;
    for lag in min_lag..max_lag {
        let value = autocorrelation(frame, lag) / norm;
        if value > best {
            best = value;
            best_lag = lag;
        }
    }
    best_lag
}

fn autocorrelation(frame: &[f64], lag: usize) -> f64 {
    frame.iter().zip(&frame[lag..]).map(|(a, b)| a * b).sum()
}

/// Population variance (Welford); zero for an empty set.
///
/// A constant track gives exactly 0.0: every delta after the first value is 0.
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (i, &x) in values.iter().enumerate() {
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }
    m2 / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, sample_rate: u32, seconds: f64, amplitude: f64) -> Vec<f64> {
        let n = (sample_rate as f64 * seconds) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin())
            .collect()
    }

    fn assert_finite(features: &FeatureSet) {
        assert!(features.rms.is_finite());
        assert!(features.zcr.is_finite());
        assert!(features.pitch_var.is_finite());
    }

    #[test]
    fn test_empty_signal() {
        assert_eq!(extract(&MonoSignal::default(), 16000), FeatureSet::default());
    }

    #[test]
    fn test_silence_is_all_zero() {
        let features = extract(&MonoSignal::from(vec![0.0; 16000]), 16000);
        assert_finite(&features);
        assert_eq!(features.rms, 0.0);
        assert_eq!(features.zcr, 0.0);
        assert_eq!(features.pitch_var, 0.0);
    }

    #[test]
    fn test_lag_bounds() {
        assert_eq!(lag_bounds(16000), (45, 266));
        assert_eq!(lag_bounds(8000), (22, 133));
        assert_eq!(lag_bounds(100), (1, 2));
        assert_eq!(lag_bounds(1), (1, 2));
    }

    #[test]
    fn test_rms_of_normalized_square_wave() {
        let features = extract(&MonoSignal::from(vec![500.0, -500.0, 500.0, -500.0]), 16000);
        assert!((features.rms - 1.0).abs() < 1e-12);
        assert_eq!(features.zcr, 1.0);
    }

    #[test]
    fn test_zero_is_not_a_crossing() {
        let features = extract(&MonoSignal::from(vec![0.0, 1.0, 0.0, -1.0, 0.0]), 16000);
        assert_eq!(features.zcr, 0.0);

        let features = extract(&MonoSignal::from(vec![1.0, -1.0, -1.0, 1.0, 1.0]), 16000);
        assert_eq!(features.zcr, 0.5);
    }

    #[test]
    fn test_single_sample() {
        let features = extract(&MonoSignal::from(vec![-7.0]), 16000);
        assert_eq!(features.rms, 1.0);
        assert_eq!(features.zcr, 0.0);
        assert_eq!(features.pitch_var, 0.0);
    }

    #[test]
    fn test_zcr_scale_invariant() {
        let base: Vec<f64> = (0..2000).map(|i| ((i * 7919) % 201) as f64 - 100.0).collect();
        let scaled: Vec<f64> = base.iter().map(|v| v * 37.5).collect();

        let a = extract(&MonoSignal::from(base), 16000);
        let b = extract(&MonoSignal::from(scaled), 16000);
        assert_eq!(a.zcr, b.zcr);
        assert!((0.0..=1.0).contains(&a.zcr));
        assert!((a.rms - b.rms).abs() < 1e-12);
    }

    #[test]
    fn test_short_signal_has_no_pitch_variance() {
        // 267 samples == max_lag + 1 at 16 kHz
        let features = extract(&MonoSignal::from(sine(150.0, 16000, 267.0 / 16000.0, 1.0)), 16000);
        assert_eq!(features.pitch_var, 0.0);
    }

    #[test]
    fn test_steady_sine_has_stable_pitch() {
        let features = extract(&MonoSignal::from(sine(150.0, 16000, 1.0, 12000.0)), 16000);
        assert_finite(&features);
        assert!(features.pitch_var < 5.0, "pitch_var = {}", features.pitch_var);
        assert!(features.rms > 0.6 && features.rms < 0.8);
    }

    #[test]
    fn test_pitch_jump_has_large_variance() {
        let mut samples = sine(100.0, 16000, 0.5, 1.0);
        samples.extend(sine(300.0, 16000, 0.5, 1.0));
        let features = extract(&MonoSignal::from(samples), 16000);
        assert!(features.pitch_var > 1000.0, "pitch_var = {}", features.pitch_var);
    }

    #[test]
    fn test_peak_lag_of_periodic_frame() {
        // long frame so the shrinking overlap at larger lags barely biases the peak
        let frame: Vec<f64> = sine(200.0, 16000, 0.1, 1.0);
        let (min_lag, max_lag) = lag_bounds(16000);
        assert_eq!(autocorrelation_peak_lag(&frame, min_lag, max_lag), 80);
    }

    #[test]
    fn test_silent_frame_picks_min_lag() {
        let frame = vec![0.0; 320];
        assert_eq!(autocorrelation_peak_lag(&frame, 45, 266), 45);
    }

    #[test]
    fn test_variance() {
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(variance(&[3.0]), 0.0);
        assert_eq!(variance(&[1.0, 3.0]), 1.0);
    }

    #[test]
    fn test_constant_pitch_track_has_exactly_zero_variance() {
        // what a silent clip at 16 kHz produces: every frame lands on min_lag
        let track = vec![16000.0 / 45.0; 50];
        assert_eq!(variance(&track), 0.0);

        let track = vec![1.0 / 3.0; 1000];
        assert_eq!(variance(&track), 0.0);
    }
}
