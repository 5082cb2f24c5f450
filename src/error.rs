//! # Error Handling
//!
//! HTTP-facing error type and its conversion into JSON error responses.
//!
//! ## Error Body:
//! ```json
//! {
//!   "error": {
//!     "type": "bad_signature",
//!     "message": "Invalid WAV file: missing RIFF/WAVE signature. Please upload a PCM .wav audio",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```
//!
//! Audio failures keep their specific kind in `type` so a client can tell
//! "fix your file" (4xx) from "service capability missing" (503).

use crate::audio::DispatchError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// Client sent an unusable request (400)
    BadRequest(String),

    /// Upload exceeds the configured limit (413)
    PayloadTooLarge { limit: usize },

    /// User input failed validation rules (400)
    ValidationError(String),

    /// Decoding or analysis of the uploaded audio failed
    Audio(DispatchError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::PayloadTooLarge { limit } => {
                write!(f, "Upload too large: limit is {} bytes", limit)
            }
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Audio(err) => write!(f, "{}", err),
        }
    }
}

impl AppError {
    fn error_type(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::PayloadTooLarge { .. } => "payload_too_large",
            AppError::ValidationError(_) => "validation_error",
            AppError::Audio(err) => err.kind(),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::BadRequest(msg) | AppError::ValidationError(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Audio(err) => match err {
                DispatchError::Parse(_) => StatusCode::BAD_REQUEST,
                DispatchError::TranscodeFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
                DispatchError::TranscoderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                DispatchError::DecodeFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        AppError::Audio(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}
