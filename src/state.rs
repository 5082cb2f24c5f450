//! # Application State Management
//!
//! Shared state handed to every request handler.
//!
//! ## What lives here:
//! - **config**: runtime-updatable configuration (`Arc<RwLock<AppConfig>>`)
//! - **metrics**: request and analysis counters (`Arc<RwLock<AppMetrics>>`)
//! - **transcoder**: the external decoder capability (`Arc<dyn Transcoder>`)
//!
//! No audio data is ever stored here. Each upload is analyzed by its own
//! pipeline run and only the counters below outlive the request.

use crate::audio::{FfmpegTranscoder, Provenance, Transcoder};
use crate::config::AppConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// How long a transcoder availability result is reused by status checks.
pub const TRANSCODER_STATUS_TTL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub transcoder: Arc<dyn Transcoder>,
    pub start_time: Instant,
    availability_cache: Arc<RwLock<Option<(Instant, bool)>>>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .field("transcoder", &self.transcoder.name())
            .field("start_time", &self.start_time)
            .field("availability_cache", &self.availability_cache)
            .finish()
    }
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of 4xx/5xx responses since server start
    pub error_count: u64,

    /// Uploads currently being analyzed
    pub active_analyses: u32,

    /// Successful analyses decoded straight from WAV
    pub direct_analyses: u64,

    /// Successful analyses that went through the transcoder
    pub transcoded_analyses: u64,

    /// Analyses that ended in an error
    pub failed_analyses: u64,

    /// Key: endpoint name (e.g., "POST /predict")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Build state with the ffmpeg transcoder described by `config`.
    pub fn new(config: AppConfig) -> Self {
        let transcoder = Arc::new(FfmpegTranscoder::from_config(&config.transcoder));
        Self::with_transcoder(config, transcoder)
    }

    /// Build state around any transcoder implementation.
    pub fn with_transcoder(config: AppConfig, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            transcoder,
            start_time: Instant::now(),
            availability_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Copy of the current configuration; the lock is released immediately.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark an analysis as started. The returned guard marks it finished when
    /// dropped, so early returns can't leak the in-flight count.
    pub fn begin_analysis(&self) -> AnalysisGuard {
        self.metrics.write().unwrap().active_analyses += 1;
        AnalysisGuard {
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn record_analysis_outcome(&self, outcome: Option<Provenance>) {
        let mut metrics = self.metrics.write().unwrap();
        match outcome {
            Some(Provenance::Direct) => metrics.direct_analyses += 1,
            Some(Provenance::Transcoded) => metrics.transcoded_analyses += 1,
            None => metrics.failed_analyses += 1,
        }
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap().clone()
    }

    /// Transcoder availability, checking at most once per [`TRANSCODER_STATUS_TTL`].
    pub async fn transcoder_available(&self) -> bool {
        let cached = *self.availability_cache.read().unwrap();
        if let Some((checked_at, available)) = cached {
            if checked_at.elapsed() < TRANSCODER_STATUS_TTL {
                return available;
            }
        }

        let available = self.transcoder.check_available().await;
        *self.availability_cache.write().unwrap() = Some((Instant::now(), available));
        available
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Decrements the in-flight analysis count on drop.
pub struct AnalysisGuard {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for AnalysisGuard {
    fn drop(&mut self) {
        if let Ok(mut metrics) = self.metrics.write() {
            metrics.active_analyses = metrics.active_analyses.saturating_sub(1);
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
