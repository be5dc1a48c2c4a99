use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::config::Config;

/// Liveness probe, mounted outside `/api`.
#[get("/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "success",
        "message": "SafeHire Kenya API is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": Config::profile(),
    }))
}

#[openapi(tag = "Health")]
#[get("/test")]
pub fn api_test() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "success",
        "message": "API is working",
        "data": {
            "test": true,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }
    }))
}
