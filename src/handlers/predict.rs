//! # Prediction Endpoint
//!
//! Accepts one audio upload, runs the analysis pipeline on it and returns
//! the heuristic score.
//!
//! ## Endpoint: `POST /predict` (also `POST /api/v1/predict`)
//!
//! ## Request:
//! Multipart form data with the audio file in the field named by
//! `upload.field_name` (default `"file"`).
//!
//! ## Response:
//! ```json
//! {
//!   "label": "possible_signal",
//!   "score": 0.515,
//!   "features": { "rms": 0.1, "zcr": 0.05, "pitch_var": 1500.0 },
//!   "sample_rate": 16000,
//!   "channels": 1,
//!   "source_type": "wav",
//!   "processing_time_ms": 12,
//!   "timestamp": "2025-01-01T12:00:00Z"
//! }
//! ```
//!
//! The size limit is checked per chunk while the field streams in, so an
//! oversized upload is rejected without being buffered in full.

use crate::audio;
use crate::config::UploadConfig;
use crate::error::AppError;
use crate::middleware::RequestId;
use crate::state::AppState;
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use futures_util::stream::StreamExt;
use serde_json::json;
use std::time::Instant;
use tracing::{debug, warn};

/// The file part pulled out of the multipart body.
#[derive(Debug)]
struct Upload {
    bytes: Vec<u8>,
    filename: Option<String>,
}

pub async fn predict(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let start_time = Instant::now();
    let request_id = req.extensions().get::<RequestId>().copied();
    let upload_config = state.get_config().upload;

    let upload = read_upload(payload, &upload_config).await?;
    let filename = upload.filename.unwrap_or_default();

    debug!(
        request_id = ?request_id,
        bytes = upload.bytes.len(),
        filename = %filename,
        "Upload received"
    );

    let _in_flight = state.begin_analysis();
    let report = match audio::analyze(state.transcoder.as_ref(), upload.bytes, &filename).await {
        Ok(report) => {
            state.record_analysis_outcome(Some(report.source_type));
            report
        }
        Err(err) => {
            state.record_analysis_outcome(None);
            warn!(
                request_id = ?request_id,
                filename = %filename,
                kind = err.kind(),
                error = %err,
                "Analysis failed"
            );
            return Err(err.into());
        }
    };

    Ok(HttpResponse::Ok().json(json!({
        "label": report.label,
        "score": round_score(report.score),
        "features": report.features,
        "sample_rate": report.sample_rate,
        "channels": report.channels,
        "source_type": report.source_type,
        "processing_time_ms": start_time.elapsed().as_millis() as u64,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Pull the configured file field out of the form, enforcing the size limit
/// as chunks arrive. Other fields are skipped.
async fn read_upload(mut payload: Multipart, config: &UploadConfig) -> Result<Upload, AppError> {
    let mut upload: Option<Upload> = None;

    while let Some(item) = payload.next().await {
        let mut field: Field =
            item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let Some(content_disposition) = field.content_disposition() else {
            continue;
        };
        if content_disposition.get_name() != Some(config.field_name.as_str()) || upload.is_some() {
            continue;
        }
        let filename = content_disposition.get_filename().map(|s| s.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
            if bytes.len() + chunk.len() > config.max_upload_bytes {
                return Err(AppError::PayloadTooLarge {
                    limit: config.max_upload_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        upload = Some(Upload { bytes, filename });
    }

    let upload = upload.ok_or_else(|| {
        AppError::BadRequest(format!("No file provided in form field '{}'", config.field_name))
    })?;

    if upload.bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }

    if config.require_filename && upload.filename.as_deref().map_or(true, str::is_empty) {
        return Err(AppError::BadRequest("Uploaded file has no filename".to_string()));
    }

    Ok(upload)
}

fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}
