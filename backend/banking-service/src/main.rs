use actix_web::{web, App, HttpServer};
use anyhow::Context;
use banking_service::{
    auth::TokenService,
    config::Config,
    events, handlers, logging, metrics,
    middleware::{RateLimiter, RedisRateLimitStore},
    rbac::{CachedRoleStore, PermissionChecker, PgRoleStore, RoleStore},
    state::AppState,
    websocket::ConnectionRegistry,
};
use db_pool::{create_pool, DbConfig};
use redis_utils::RedisPool;
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;

const SERVICE_NAME: &str = "banking-service";

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(?config, "Starting {}", SERVICE_NAME);

    let db_config = DbConfig::new(
        SERVICE_NAME,
        &config.database.url,
        config.database.max_connections,
    );
    db_config.log_config();
    let db_pool = create_pool(db_config)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let redis = connect_redis(&config).await;
    let role_store = build_role_store(&config, PgRoleStore::new(db_pool.clone()), redis.as_ref());
    let rate_limiter = build_rate_limiter(&config, redis.as_ref());
    let checker = PermissionChecker::new(role_store);

    let registry = ConnectionRegistry::new();
    let (emitter, dispatcher) = events::channel(config.websocket.event_queue_capacity, registry.clone());
    let dispatcher_task = tokio::spawn(dispatcher.run());

    let state = AppState {
        registry: registry.clone(),
        checker,
        tokens: Arc::new(TokenService::new(&config.jwt)),
        events: emitter,
        websocket: config.websocket.clone(),
        rate_limiter,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Starting HTTP server on {}", addr);

    let app_state = web::Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(metrics::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::register_routes)
    })
    .workers(config.server.workers)
    .disable_signals()
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run();

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    // Stop accepting first so no upgrade registers after the registry is drained.
    server_handle.pause().await;
    let closed = registry.shutdown().await;
    tracing::info!(closed, "WebSocket connections closed");

    server_handle.stop(true).await;
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("HTTP server error: {}", e),
        Err(e) => tracing::error!("HTTP server task failed: {}", e),
    }

    // Emitter clones stay alive inside the app factory, so stop the dispatcher here.
    dispatcher_task.abort();
    db_pool.close().await;

    tracing::info!("{} stopped", SERVICE_NAME);
    Ok(())
}

/// Redis is needed by the role cache and the rate limiter; both degrade
/// gracefully when it is unreachable.
async fn connect_redis(config: &Config) -> Option<RedisPool> {
    if !config.redis.role_cache_enabled && !config.rate_limit.enabled {
        return None;
    }

    match RedisPool::connect(&config.redis.url).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::warn!("Redis unavailable, role cache and rate limiting disabled: {:#}", e);
            None
        }
    }
}

/// Postgres-backed role store, fronted by Redis when enabled and reachable.
fn build_role_store(config: &Config, pg: PgRoleStore, redis: Option<&RedisPool>) -> Arc<dyn RoleStore> {
    match redis {
        Some(pool) if config.redis.role_cache_enabled => {
            tracing::info!(ttl_secs = config.redis.role_cache_ttl_secs, "Role cache enabled");
            Arc::new(CachedRoleStore::new(
                pg,
                pool.manager(),
                Duration::from_secs(config.redis.role_cache_ttl_secs),
            ))
        }
        _ => Arc::new(pg),
    }
}

fn build_rate_limiter(config: &Config, redis: Option<&RedisPool>) -> Option<RateLimiter> {
    match redis {
        Some(pool) if config.rate_limit.enabled => {
            tracing::info!(
                max_requests = config.rate_limit.max_requests,
                window_secs = config.rate_limit.window_secs,
                "Rate limiting enabled"
            );
            Some(RateLimiter::new(
                Arc::new(RedisRateLimitStore::new(pool.manager())),
                config.rate_limit.clone(),
            ))
        }
        _ => None,
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
