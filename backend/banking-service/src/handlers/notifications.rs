/// Admin endpoints for pushing notifications and inspecting live connections
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use super::ApiResponse;
use crate::auth::AuthenticatedIdentity;
use crate::error::{AppError, Result};
use crate::middleware::RateLimitMiddleware;
use crate::models::{IdentityKind, Principal};
use crate::rbac::permissions::{NOTIFICATION_BROADCAST, NOTIFICATION_SEND, NOTIFICATION_VIEW};
use crate::state::AppState;
use crate::websocket::Notification;

#[derive(Debug, Deserialize, Validate)]
pub struct NotifyRequest {
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 64))]
    pub event_type: String,
    #[serde(default = "empty_object")]
    pub data: Value,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BroadcastRequest {
    /// Restrict to one kind; omitted means everyone
    pub kind: Option<IdentityKind>,
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 64))]
    pub event_type: String,
    #[serde(default = "empty_object")]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct PermissionQuery {
    pub permission: String,
}

fn empty_object() -> Value {
    json!({})
}

fn validate_body<T: Validate>(body: &T) -> Result<()> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Send a notification to every connection of one principal
///
/// Endpoint: POST /api/v1/admins/notifications/{kind}/{id}
pub async fn notify_principal(
    identity: AuthenticatedIdentity,
    path: web::Path<(String, i64)>,
    body: web::Json<NotifyRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state.checker.require(&identity, NOTIFICATION_SEND).await?;
    validate_body(&*body)?;

    let (kind, id) = path.into_inner();
    let kind: IdentityKind = kind.parse().map_err(AppError::BadRequest)?;
    let body = body.into_inner();
    let notification = Notification::new(body.event_type, body.data)?;

    let principal = Principal::new(kind, id);
    let delivered = state.registry.notify(principal, &notification).await;

    tracing::info!(
        admin = %identity.principal(),
        target = %principal,
        event = notification.event_type(),
        delivered,
        "admin notification sent"
    );

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Notification sent",
        json!({ "delivered": delivered }),
    )))
}

/// Broadcast a notification to one kind, or to everyone
///
/// Endpoint: POST /api/v1/admins/notifications/broadcast
pub async fn broadcast(
    identity: AuthenticatedIdentity,
    body: web::Json<BroadcastRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state.checker.require(&identity, NOTIFICATION_BROADCAST).await?;
    validate_body(&*body)?;

    let body = body.into_inner();
    let notification = Notification::new(body.event_type, body.data)?;

    let delivered = match body.kind {
        Some(kind) => state.registry.broadcast(kind, &notification).await,
        None => state.registry.broadcast_all(&notification).await,
    };

    tracing::info!(
        admin = %identity.principal(),
        kind = ?body.kind,
        event = notification.event_type(),
        delivered,
        "admin broadcast sent"
    );

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Broadcast sent",
        json!({ "delivered": delivered }),
    )))
}

/// Live connection overview
///
/// Endpoint: GET /api/v1/admins/connections
pub async fn connections(
    identity: AuthenticatedIdentity,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state.checker.require(&identity, NOTIFICATION_VIEW).await?;

    let ids = |principals: Vec<Principal>| principals.into_iter().map(|p| p.id).collect::<Vec<_>>();
    let users = ids(state.registry.connected_principals(IdentityKind::User).await);
    let admins = ids(state.registry.connected_principals(IdentityKind::Admin).await);

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Active connections",
        json!({
            "total": state.registry.total_connections().await,
            "users": users,
            "admins": admins,
        }),
    )))
}

/// Whether the calling admin holds a permission
///
/// Endpoint: GET /api/v1/admins/permissions/check?permission=...
pub async fn check_permission(
    identity: AuthenticatedIdentity,
    query: web::Query<PermissionQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if !identity.is_admin() {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let decision = state.checker.check_identity(&identity, &query.permission).await;
    let data = serde_json::to_value(&decision).map_err(|_| AppError::Internal)?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Permission checked", data)))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/admins")
            .wrap(RateLimitMiddleware)
            .route("/notifications/broadcast", web::post().to(broadcast))
            .route("/notifications/{kind}/{id}", web::post().to(notify_principal))
            .route("/connections", web::get().to(connections))
            .route("/permissions/check", web::get().to(check_permission)),
    );
}
