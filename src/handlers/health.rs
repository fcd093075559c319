use actix_web::HttpResponse;
use serde_json::json;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "healthy" }))
}
