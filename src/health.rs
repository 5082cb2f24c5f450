use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

/// Liveness plus transcoder availability.
///
/// Reports `"degraded"` when transcoding is enabled but the tool can't be
/// run: WAV uploads still work, everything else will fail with 503.
///
/// The transcoder fields describe the running instance. Transcoder settings
/// changed through `PUT /api/v1/config` show up as `restart_required`.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();
    let transcoder_enabled = state.transcoder.is_enabled();
    let transcoder_available = state.transcoder_available().await;

    let status = if transcoder_enabled && !transcoder_available {
        "degraded"
    } else {
        "healthy"
    };

    HttpResponse::Ok().json(json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "voice-screen-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "active_analyses": metrics.active_analyses
        },
        "memory": get_memory_info(),
        "transcoder": {
            "enabled": transcoder_enabled,
            "program": state.transcoder.name(),
            "available": transcoder_available,
            "restart_required": config.transcoder.enabled != transcoder_enabled
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "analyses": {
            "active": metrics.active_analyses,
            "direct": metrics.direct_analyses,
            "transcoded": metrics.transcoded_analyses,
            "failed": metrics.failed_analyses
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info()
    }))
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", process::id())) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    vm_rss = parse_kb(line);
                } else if line.starts_with("VmSize:") {
                    vm_size = parse_kb(line);
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": format!("Memory info not available for pid {}", process::id())
    })
}

/// `VmRSS:   12345 kB` → bytes
fn parse_kb(line: &str) -> u64 {
    line.split_whitespace()
        .nth(1)
        .and_then(|kb| kb.parse::<u64>().ok())
        .unwrap_or(0)
        * 1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::transcoder::tests::StubTranscoder;
    use crate::audio::TranscodeError;
    use crate::config::AppConfig;
    use actix_web::test::{call_and_read_body_json, init_service, TestRequest};
    use actix_web::App;
    use std::sync::Arc;

    #[test]
    fn test_parse_kb() {
        assert_eq!(parse_kb("VmRSS:      2048 kB"), 2048 * 1024);
        assert_eq!(parse_kb("VmRSS:"), 0);
    }

    #[actix_web::test]
    async fn test_health_reports_transcoder() {
        let mut stub = StubTranscoder::returning(Err(TranscodeError::Unavailable("gone".into())));
        stub.available = false;
        let state = AppState::with_transcoder(AppConfig::default(), Arc::new(stub));

        let app = init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let body: serde_json::Value =
            call_and_read_body_json(&app, TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["transcoder"]["available"], false);
        assert_eq!(body["transcoder"]["program"], "stub");
    }

    #[actix_web::test]
    async fn test_health_with_available_transcoder() {
        let state = AppState::with_transcoder(
            AppConfig::default(),
            Arc::new(StubTranscoder::returning(Ok(Vec::new()))),
        );
        let app = init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let body: serde_json::Value =
            call_and_read_body_json(&app, TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"]["name"], "voice-screen-backend");
    }

    #[actix_web::test]
    async fn test_health_reports_running_transcoder_after_config_update() {
        let stub = Arc::new(StubTranscoder::returning(Ok(Vec::new())));
        let state = AppState::with_transcoder(AppConfig::default(), stub.clone());

        let mut disabled = state.get_config();
        disabled.transcoder.enabled = false;
        state.update_config(disabled).unwrap();

        let app = init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        for _ in 0..3 {
            let body: serde_json::Value =
                call_and_read_body_json(&app, TestRequest::get().uri("/health").to_request()).await;
            assert_eq!(body["transcoder"]["enabled"], true);
            assert_eq!(body["transcoder"]["available"], true);
            assert_eq!(body["transcoder"]["restart_required"], true);
        }
        assert_eq!(stub.availability_check_count(), 1);
    }
}
