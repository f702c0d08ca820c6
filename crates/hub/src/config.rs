// Hub server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The Redis URL is optional: without it the hub runs with
// in-process presence and operation-log stores.

use std::net::SocketAddr;

/// Core hub server configuration.
///
/// Constructed via [`HubConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// JWT verification secret for connection credentials.
    pub jwt_secret: String,
    /// Redis connection URL for the shared expiring store.
    pub redis_url: Option<String>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `collabspace_hub=debug`).
    pub log_filter: String,
    /// Presence entry time-to-live in seconds.
    pub presence_ttl_secs: u64,
    /// Maximum retained operations per document room.
    pub oplog_cap: usize,
    /// Server ping cadence in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Inactivity window after which a connection is disconnected.
    pub idle_timeout_ms: u64,
}

const DEV_JWT_SECRET: &str = "collabspace_local_development_jwt_secret_32_chars";

impl HubConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `COLLAB_HUB_HOST` | `0.0.0.0` |
    /// | `COLLAB_HUB_PORT` | `3001` |
    /// | `COLLAB_HUB_JWT_SECRET` | dev-only placeholder |
    /// | `COLLAB_HUB_REDIS_URL` | *(none — in-memory stores)* |
    /// | `COLLAB_HUB_CORS_ORIGINS` | *(none — cors.rs uses dev defaults)* |
    /// | `COLLAB_HUB_LOG_FILTER` | `info` |
    /// | `COLLAB_HUB_PRESENCE_TTL_SECS` | `300` |
    /// | `COLLAB_HUB_OPLOG_CAP` | `100` |
    /// | `COLLAB_HUB_HEARTBEAT_INTERVAL_MS` | `15000` |
    /// | `COLLAB_HUB_IDLE_TIMEOUT_MS` | `60000` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("COLLAB_HUB_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 =
            env("COLLAB_HUB_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(3001);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret =
            env("COLLAB_HUB_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.into());

        let redis_url = env("COLLAB_HUB_REDIS_URL").ok();
        let cors_origins = env("COLLAB_HUB_CORS_ORIGINS").ok();

        let log_filter = env("COLLAB_HUB_LOG_FILTER").unwrap_or_else(|_| "info".into());

        let presence_ttl_secs = env("COLLAB_HUB_PRESENCE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        let oplog_cap =
            env("COLLAB_HUB_OPLOG_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(100);

        let heartbeat_interval_ms = env("COLLAB_HUB_HEARTBEAT_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15_000);

        let idle_timeout_ms = env("COLLAB_HUB_IDLE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60_000);

        Self {
            listen_addr,
            jwt_secret,
            redis_url,
            cors_origins,
            log_filter,
            presence_ttl_secs,
            oplog_cap,
            heartbeat_interval_ms,
            idle_timeout_ms,
        }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}
