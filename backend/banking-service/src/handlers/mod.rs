pub mod notifications;
pub mod websocket;

use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// Response envelope shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let data: Value = json!({
        "status": "ok",
        "connections": state.registry.total_connections().await,
    });
    HttpResponse::Ok().json(ApiResponse::ok("Service healthy", data))
}

/// All routes except `/metrics`, which `main` mounts next to the middleware.
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
    notifications::register_routes(cfg);
    websocket::register_routes(cfg);
}
