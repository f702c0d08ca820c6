// CORS middleware configuration for the hub.
//
// Reads allowed origins from the `COLLAB_HUB_CORS_ORIGINS` environment
// variable (comma-separated). Falls back to permissive localhost defaults
// in development.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Default origins allowed when `COLLAB_HUB_CORS_ORIGINS` is unset.
const DEFAULT_DEV_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:5173",
];

/// Environment variable that overrides the allowed origin list.
const CORS_ORIGINS_ENV: &str = "COLLAB_HUB_CORS_ORIGINS";

/// Build a [`CorsLayer`] from the environment.
///
/// - If `COLLAB_HUB_CORS_ORIGINS` is set to `"*"`, allows any origin.
/// - If set to a comma-separated list, allows exactly those origins.
/// - If unset, allows the default development origins.
pub fn cors_layer() -> CorsLayer {
    cors_layer_from_env(std::env::var(CORS_ORIGINS_ENV).ok())
}

fn cors_layer_from_env(env_value: Option<String>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600));

    match env_value.as_deref() {
        Some("*") => base.allow_origin(AllowOrigin::any()).allow_credentials(false),
        Some(origins) => {
            let parsed = parse_origins(origins);
            base.allow_origin(parsed)
        }
        None => {
            let defaults = parse_origins(&DEFAULT_DEV_ORIGINS.join(","));
            base.allow_origin(defaults)
        }
    }
}

fn parse_origins(comma_separated: &str) -> Vec<HeaderValue> {
    comma_separated
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect()
}
