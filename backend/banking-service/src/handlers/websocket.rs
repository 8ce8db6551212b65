/// WebSocket upgrade endpoints
///
/// `GET /ws/user` and `GET /ws/admin`. The access token is read from the
/// `token` query parameter or the `Authorization` header. Nothing is
/// registered unless the token verifies and its kind matches the path.
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::bearer_token;
use crate::error::AppError;
use crate::middleware::RateLimitMiddleware;
use crate::models::IdentityKind;
use crate::state::AppState;
use crate::websocket::{Connection, Notification, WsSession};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

pub async fn user_socket(
    req: HttpRequest,
    stream: web::Payload,
    params: web::Query<WsParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    connect(IdentityKind::User, req, stream, params.into_inner(), state).await
}

pub async fn admin_socket(
    req: HttpRequest,
    stream: web::Payload,
    params: web::Query<WsParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    connect(IdentityKind::Admin, req, stream, params.into_inner(), state).await
}

async fn connect(
    expected: IdentityKind,
    req: HttpRequest,
    stream: web::Payload,
    params: WsParams,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let token = params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&req))
        .ok_or(AppError::Unauthorized)?;

    let identity = state.tokens.verify_access(token)?;
    if identity.kind != expected {
        tracing::warn!(
            principal = %identity.principal(),
            channel = %expected,
            "token kind does not match websocket channel"
        );
        return Err(AppError::Forbidden(format!("{} channel requires a {} token", expected, expected)).into());
    }

    let principal = identity.principal();
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let connection = Connection::new(tx);
    let connection_id = connection.id();

    // Greeting goes to this socket only; it is queued before the session
    // starts draining the channel.
    match Notification::connection_status(identity.id).to_text() {
        Ok(text) => {
            let _ = connection.send_text(text).await;
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode connection status"),
    }

    state.registry.register(principal, connection).await;

    let session = WsSession::new(
        principal,
        connection_id,
        state.registry.clone(),
        rx,
        state.websocket.heartbeat_interval(),
        state.websocket.client_timeout(),
    );

    match ws::start(session, &req, stream) {
        Ok(response) => Ok(response),
        Err(e) => {
            tracing::warn!(principal = %principal, error = %e, "websocket handshake failed");
            state.registry.unregister(principal, connection_id).await;
            Err(e)
        }
    }
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/ws")
            .wrap(RateLimitMiddleware)
            .route("/user", web::get().to(user_socket))
            .route("/admin", web::get().to(admin_socket)),
    );
}
