use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, TextEncoder,
};

use crate::events::banking::EVENT_TYPES;
use crate::models::IdentityKind;
use crate::rbac::permissions;
use crate::websocket::messages::CONNECTION_STATUS;

/// Label used for permissions and event types outside the known sets.
const OTHER_LABEL: &str = "other";

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "banking_service_http_requests_total",
            "Total HTTP requests handled by banking-service",
        ),
        &["method", "path", "status"],
    )
    .expect("failed to create banking_service_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register banking_service_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "banking_service_http_request_duration_seconds",
            "HTTP request latency for banking-service",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "path", "status"],
    )
    .expect("failed to create banking_service_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register banking_service_http_request_duration_seconds");
    histogram
});

static WS_ACTIVE_CONNECTIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(
            "banking_service_ws_active_connections",
            "Registered WebSocket connections by identity kind",
        ),
        &["kind"],
    )
    .expect("failed to create banking_service_ws_active_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register banking_service_ws_active_connections");
    gauge
});

static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "banking_service_notifications_total",
            "Notification sends by event type and outcome",
        ),
        &["event", "outcome"],
    )
    .expect("failed to create banking_service_notifications_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register banking_service_notifications_total");
    counter
});

static EVENTS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "banking_service_events_dropped_total",
            "Events dropped before dispatch",
        ),
        &["reason"],
    )
    .expect("failed to create banking_service_events_dropped_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register banking_service_events_dropped_total");
    counter
});

static AUTHORIZATION_DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "banking_service_authorization_decisions_total",
            "Permission checks by permission and decision",
        ),
        &["permission", "decision"],
    )
    .expect("failed to create banking_service_authorization_decisions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register banking_service_authorization_decisions_total");
    counter
});

static RATE_LIMITED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "banking_service_rate_limited_total",
            "Requests rejected by the rate limiter, by caller kind",
        ),
        &["caller"],
    )
    .expect("failed to create banking_service_rate_limited_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register banking_service_rate_limited_total");
    counter
});

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

pub fn set_active_connections(kind: IdentityKind, count: usize) {
    WS_ACTIVE_CONNECTIONS
        .with_label_values(&[kind.as_str()])
        .set(count as i64);
}

/// Permission label; callers can pass arbitrary strings, so unknown ones share a series.
fn permission_label(permission: &str) -> &str {
    if permissions::is_known(permission) {
        permission
    } else {
        OTHER_LABEL
    }
}

/// Event type label, bounded the same way as [`permission_label`].
fn event_label(event: &str) -> &str {
    if event == CONNECTION_STATUS || EVENT_TYPES.contains(&event) {
        event
    } else {
        OTHER_LABEL
    }
}

pub fn record_notification(event: &str, delivered: usize, failed: usize) {
    let event = event_label(event);
    if delivered > 0 {
        NOTIFICATIONS_TOTAL
            .with_label_values(&[event, "delivered"])
            .inc_by(delivered as u64);
    }
    if failed > 0 {
        NOTIFICATIONS_TOTAL
            .with_label_values(&[event, "failed"])
            .inc_by(failed as u64);
    }
}

pub fn record_event_dropped(reason: &str) {
    EVENTS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_authorization(permission: &str, granted: bool) {
    let decision = if granted { "granted" } else { "denied" };
    AUTHORIZATION_DECISIONS_TOTAL
        .with_label_values(&[permission_label(permission), decision])
        .inc();
}

pub fn record_rate_limited(caller: &str) {
    RATE_LIMITED_TOTAL.with_label_values(&[caller]).inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::Instant;

/// Records count and latency of every request, labelled by route pattern.
pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        // Route pattern keeps label cardinality bounded (ids stay out).
        let path = req
            .match_pattern()
            .unwrap_or_else(|| "unmatched".to_string());
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let result = service.call(req).await;
            let elapsed = start.elapsed();
            match &result {
                Ok(response) => {
                    observe_http_request(&method, &path, response.status().as_u16(), elapsed);
                }
                Err(_) => {
                    observe_http_request(&method, &path, 500, elapsed);
                }
            }
            result
        })
    }
}
