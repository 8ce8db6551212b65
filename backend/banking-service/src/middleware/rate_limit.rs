use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpRequest,
};
use async_trait::async_trait;
use futures::future::{ready, LocalBoxFuture, Ready};
use redis_utils::{SharedConnectionManager, WindowCounter};
use serde::Deserialize;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::auth::{bearer_token, TokenService};
use crate::config::RateLimitConfig;
use crate::error::{AppError, Result as AppResult};
use crate::metrics;
use crate::state::AppState;

/// Retry hint used when the store cannot say when the window resets.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Counter state after recording one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHit {
    pub count: u64,
    pub reset_after_secs: Option<u64>,
}

/// Backing store for fixed-window request counters.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(&self, key: &str, window: Duration) -> AppResult<RateLimitHit>;
}

/// Counters shared across instances through Redis.
pub struct RedisRateLimitStore {
    counter: WindowCounter,
}

impl RedisRateLimitStore {
    pub fn new(manager: SharedConnectionManager) -> Self {
        Self {
            counter: WindowCounter::new(manager, "rate_limit"),
        }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, key: &str, window: Duration) -> AppResult<RateLimitHit> {
        let hit = self
            .counter
            .hit(key, window)
            .await
            .map_err(|e| AppError::Cache(format!("{:#}", e)))?;
        Ok(RateLimitHit {
            count: hit.count,
            reset_after_secs: hit.reset_after_secs,
        })
    }
}

/// Process-local counters, for tests and single-instance setups.
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    windows: Mutex<HashMap<String, (u64, Instant)>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, window: Duration) -> AppResult<RateLimitHit> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(key.to_string()).or_insert((0, now));
        if now.duration_since(entry.1) >= window {
            *entry = (0, now);
        }
        entry.0 += 1;

        let remaining = window.saturating_sub(now.duration_since(entry.1));
        Ok(RateLimitHit {
            count: entry.0,
            reset_after_secs: Some(remaining.as_secs().max(1)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: u64 },
}

/// Applies a [`RateLimitConfig`] to counters kept in a [`RateLimitStore`].
///
/// Store errors and slow lookups let the request through, so a degraded
/// Redis never takes the API down with it.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub async fn check(&self, key: &str) -> RateLimitDecision {
        let hit = timeout(
            self.config.store_timeout(),
            self.store.hit(key, self.config.window()),
        )
        .await;

        match hit {
            Ok(Ok(hit)) if hit.count > self.config.max_requests => RateLimitDecision::Limited {
                retry_after: hit.reset_after_secs.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            Ok(Ok(_)) => RateLimitDecision::Allowed,
            Ok(Err(e)) => {
                tracing::warn!(key, error = %e, "rate limit store error, allowing request");
                RateLimitDecision::Allowed
            }
            Err(_) => {
                tracing::warn!(
                    key,
                    timeout_ms = self.config.store_timeout_ms,
                    "rate limit store timeout, allowing request"
                );
                RateLimitDecision::Allowed
            }
        }
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// `user:<id>` or `admin:<id>` for a verified access token, else `ip:<addr>`.
///
/// Socket upgrades may carry the token as a `token` query parameter.
pub fn rate_limit_key(req: &HttpRequest, tokens: &TokenService) -> String {
    let query_token = web::Query::<TokenQuery>::from_query(req.query_string())
        .ok()
        .and_then(|q| q.into_inner().token)
        .filter(|t| !t.is_empty());

    let identity = bearer_token(req)
        .or(query_token.as_deref())
        .and_then(|token| tokens.verify_access(token).ok());

    match identity {
        Some(identity) => identity.principal().to_string(),
        None => {
            let info = req.connection_info();
            format!("ip:{}", info.realip_remote_addr().unwrap_or("unknown"))
        }
    }
}

/// `user`, `admin` or `ip`.
fn key_kind(key: &str) -> &str {
    key.split(':').next().unwrap_or("ip")
}

/// Per-caller request limit.
///
/// Reads the [`RateLimiter`] from [`AppState`]; when none is configured
/// requests pass straight through.
pub struct RateLimitMiddleware;

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddlewareService<S>;
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            if let Some(state) = state {
                if let Some(limiter) = &state.rate_limiter {
                    let key = rate_limit_key(req.request(), &state.tokens);

                    if let RateLimitDecision::Limited { retry_after } = limiter.check(&key).await {
                        tracing::warn!(key = %key, path = %req.path(), retry_after, "rate limit exceeded");
                        metrics::record_rate_limited(key_kind(&key));
                        let err = AppError::TooManyRequests { retry_after };
                        return Ok(req.error_response(err).map_into_right_body());
                    }
                }
            }

            service.call(req).await.map(ServiceResponse::map_into_left_body)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::models::Identity;
    use actix_web::test::TestRequest;

    struct FailingStore;

    #[async_trait]
    impl RateLimitStore for FailingStore {
        async fn hit(&self, _key: &str, _window: Duration) -> AppResult<RateLimitHit> {
            Err(AppError::Cache("connection refused".into()))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl RateLimitStore for SlowStore {
        async fn hit(&self, _key: &str, _window: Duration) -> AppResult<RateLimitHit> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(RateLimitHit {
                count: u64::MAX,
                reset_after_secs: None,
            })
        }
    }

    fn config(max_requests: u64) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            window_secs: 60,
            store_timeout_ms: 50,
            ..RateLimitConfig::default()
        }
    }

    fn tokens() -> TokenService {
        TokenService::new(&JwtConfig {
            secret: "rate-limit-test-secret-0123456789".to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
        })
    }

    #[tokio::test]
    async fn test_limit_applies_per_key() {
        let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()), config(2));

        assert_eq!(limiter.check("user:1").await, RateLimitDecision::Allowed);
        assert_eq!(limiter.check("user:1").await, RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.check("user:1").await,
            RateLimitDecision::Limited { retry_after } if retry_after >= 1 && retry_after <= 60
        ));
        assert_eq!(limiter.check("admin:1").await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn test_window_resets() {
        let store = InMemoryRateLimitStore::new();
        let window = Duration::from_millis(20);
        assert_eq!(store.hit("ip:1", window).await.unwrap().count, 1);
        assert_eq!(store.hit("ip:1", window).await.unwrap().count, 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.hit("ip:1", window).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_store_failure_allows() {
        let limiter = RateLimiter::new(Arc::new(FailingStore), config(1));
        assert_eq!(limiter.check("user:1").await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn test_store_timeout_allows() {
        let limiter = RateLimiter::new(Arc::new(SlowStore), config(1));
        assert_eq!(limiter.check("user:1").await, RateLimitDecision::Allowed);
    }

    #[test]
    fn test_key_from_bearer_token() {
        let tokens = tokens();
        let token = tokens.create_access_token(&Identity::admin(4, "teller")).unwrap();
        let req = TestRequest::get()
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();
        assert_eq!(rate_limit_key(&req, &tokens), "admin:4");
    }

    #[test]
    fn test_key_from_query_token() {
        let tokens = tokens();
        let token = tokens.create_access_token(&Identity::user(9)).unwrap();
        let req = TestRequest::get()
            .uri(&format!("/ws/user?token={}", token))
            .to_http_request();
        assert_eq!(rate_limit_key(&req, &tokens), "user:9");
    }

    #[test]
    fn test_key_falls_back_to_peer_ip() {
        let req = TestRequest::get()
            .insert_header(("Authorization", "Bearer forged"))
            .peer_addr("10.0.0.7:5555".parse().unwrap())
            .to_http_request();
        assert_eq!(rate_limit_key(&req, &tokens()), "ip:10.0.0.7");
    }
}
