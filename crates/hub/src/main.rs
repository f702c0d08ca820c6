mod api;
mod auth;
mod broadcast;
mod config;
mod cors;
mod error;
mod lifecycle;
mod metrics;
mod oplog;
mod presence;
mod registry;
mod rooms;
mod state;
mod ws;

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
    auth::jwt::JwtIdentityVerifier,
    config::HubConfig,
    error::{attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope},
    metrics::HubMetrics,
    oplog::OperationLog,
    presence::PresenceStore,
    state::HubState,
};

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = HubConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if config.is_dev_jwt_secret() {
        warn!("using development JWT secret; set COLLAB_HUB_JWT_SECRET in production");
    }

    metrics::set_global_metrics(Arc::new(HubMetrics::default()));

    let verifier =
        JwtIdentityVerifier::new(&config.jwt_secret).context("invalid hub JWT secret")?;
    let (presence, oplog) = build_stores(&config).await;
    let listen_addr = config.listen_addr;
    let state = HubState::new(config, verifier, presence, oplog);
    let app = build_router(state);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind hub listener on {listen_addr}"))?;

    info!(listen_addr = %listen_addr, "starting collabspace hub");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("hub server exited unexpectedly")
}

/// Connect the shared stores, degrading to in-process state when Redis is
/// not configured or unreachable. The hub stays up either way; presence
/// and catch-up are best effort.
async fn build_stores(config: &HubConfig) -> (PresenceStore, OperationLog) {
    let ttl = config.presence_ttl_secs;
    let cap = config.oplog_cap;
    let memory =
        || (PresenceStore::memory(Duration::from_secs(ttl)), OperationLog::memory(cap));

    let Some(redis_url) = config.redis_url.as_deref() else {
        info!("no redis url configured, using in-memory stores");
        return memory();
    };

    let client = match redis::Client::open(redis_url) {
        Ok(client) => client,
        Err(error) => {
            warn!(error = %error, "invalid redis url, falling back to in-memory stores");
            return memory();
        }
    };

    match redis::aio::ConnectionManager::new(client).await {
        Ok(conn) => {
            info!("connected to redis shared store");
            (PresenceStore::redis(conn.clone(), ttl), OperationLog::redis(conn, cap))
        }
        Err(error) => {
            warn!(error = %error, "redis unreachable, falling back to in-memory stores");
            memory()
        }
    }
}

fn build_router(state: HubState) -> Router {
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .merge(ws::router(state.clone()))
            .merge(api::router(state)),
    )
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(cors::cors_layer())
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;

    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
