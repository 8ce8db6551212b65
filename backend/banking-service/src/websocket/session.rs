use super::registry::ConnectionRegistry;
use super::sink::ConnectionId;
use crate::models::Principal;
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// WebSocket actor for one registered connection.
///
/// Owns the socket. Frames produced by the registry arrive on the
/// channel handed over at construction and are written as text. When the
/// registry drops the sending half the session closes.
pub struct WsSession {
    principal: Principal,
    connection_id: ConnectionId,
    registry: ConnectionRegistry,
    outbound: Option<mpsc::UnboundedReceiver<String>>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    pub fn new(
        principal: Principal,
        connection_id: ConnectionId,
        registry: ConnectionRegistry,
        outbound: mpsc::UnboundedReceiver<String>,
        heartbeat_interval: Duration,
        client_timeout: Duration,
    ) -> Self {
        Self {
            principal,
            connection_id,
            registry,
            outbound: Some(outbound),
            hb: Instant::now(),
            heartbeat_interval,
            client_timeout,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(principal = %act.principal, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            principal = %self.principal,
            connection_id = %self.connection_id,
            "WebSocket session started"
        );

        self.hb(ctx);

        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            principal = %self.principal,
            connection_id = %self.connection_id,
            "WebSocket session stopped"
        );

        let registry = self.registry.clone();
        let principal = self.principal;
        let connection_id = self.connection_id;

        actix::spawn(async move {
            registry.unregister(principal, connection_id).await;
        });
    }
}

/// Outbound notifications from the registry.
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, text: String, ctx: &mut Self::Context) {
        ctx.text(text);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        tracing::debug!(principal = %self.principal, "registry released connection, closing socket");
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Away,
            description: Some("server shutting down".to_string()),
        }));
        ctx.stop();
    }
}

/// Inbound frames from the client. The channel is push-only, so text is
/// only logged.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(bytes)) => {
                self.hb = Instant::now();
                ctx.pong(&bytes);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                tracing::debug!(principal = %self.principal, len = text.len(), "ignoring inbound text frame");
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(principal = %self.principal, "binary frames are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::error!(principal = %self.principal, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}
