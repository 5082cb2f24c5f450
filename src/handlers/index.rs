use actix_web::HttpResponse;
use serde_json::json;

/// `GET /` banner so a browser hit shows the service is up.
pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "Voice screening backend running" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::{call_and_read_body_json, init_service, TestRequest};
    use actix_web::{web, App};

    #[actix_web::test]
    async fn test_index_banner() {
        let app = init_service(App::new().route("/", web::get().to(index))).await;
        let body: serde_json::Value =
            call_and_read_body_json(&app, TestRequest::get().uri("/").to_request()).await;
        assert_eq!(body["message"], "Voice screening backend running");
    }
}
