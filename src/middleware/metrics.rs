use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};

/// Counts requests and errors per endpoint into [`AppState`] metrics.
///
/// Endpoints are keyed by route pattern when one matched, so the map stays
/// bounded no matter what paths clients request.
pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let app_state = req.app_data::<web::Data<AppState>>().cloned();

        if let Some(state) = &app_state {
            state.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let Some(state) = app_state else {
                return result;
            };

            let (route, is_error) = match &result {
                Ok(response) => (
                    response.request().match_pattern().unwrap_or(path),
                    response.status().is_client_error() || response.status().is_server_error(),
                ),
                Err(_) => (path, true),
            };

            state.record_endpoint_request(&format!("{} {}", method, route), duration_ms, is_error);
            if is_error {
                state.increment_error_count();
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::test::{call_service, init_service, TestRequest};
    use actix_web::{App, HttpResponse};

    #[actix_web::test]
    async fn test_counts_requests_and_errors() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = init_service(
            App::new()
                .app_data(state.clone())
                .wrap(MetricsMiddleware)
                .route("/ok", web::get().to(|| async { HttpResponse::Ok().finish() }))
                .route("/bad", web::get().to(|| async { HttpResponse::BadRequest().finish() })),
        )
        .await;

        call_service(&app, TestRequest::get().uri("/ok").to_request()).await;
        call_service(&app, TestRequest::get().uri("/ok").to_request()).await;
        call_service(&app, TestRequest::get().uri("/bad").to_request()).await;

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.request_count, 3);
        assert_eq!(metrics.error_count, 1);
        assert_eq!(metrics.endpoint_metrics["GET /ok"].request_count, 2);
        assert_eq!(metrics.endpoint_metrics["GET /bad"].error_count, 1);
    }

    #[actix_web::test]
    async fn test_endpoints_keyed_by_route_pattern() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = init_service(
            App::new()
                .app_data(state.clone())
                .wrap(MetricsMiddleware)
                .route("/items/{id}", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        call_service(&app, TestRequest::get().uri("/items/1").to_request()).await;
        call_service(&app, TestRequest::get().uri("/items/2").to_request()).await;

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.endpoint_metrics.len(), 1);
        assert_eq!(metrics.endpoint_metrics["GET /items/{id}"].request_count, 2);
    }
}
