//! Channel downmix: interleaved multi-channel PCM to a mono float signal.

use crate::audio::wav::PcmStream;

/// One floating-point sample per time step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonoSignal(Vec<f64>);

impl MonoSignal {
    pub fn samples(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for MonoSignal {
    fn from(samples: Vec<f64>) -> Self {
        Self(samples)
    }
}

/// Average each frame of `channels` interleaved samples into one mono sample.
///
/// Mono input is only widened to `f64`. The stream is consumed; its sample
/// buffer is not reused afterwards.
pub fn mix(stream: PcmStream) -> MonoSignal {
    let channels = stream.channels() as usize;
    let samples = stream.into_samples();

    if channels == 1 {
        return MonoSignal(samples.into_iter().map(|s| s as f64).collect());
    }

    MonoSignal(
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().map(|&s| s as f64).sum::<f64>() / channels as f64)
            .collect(),
    )
}
