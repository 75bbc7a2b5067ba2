//! Edge layers wrapped around the router.
//!
//! From the outside in: request tracing, CORS, security response headers and
//! per-client rate limiting. With `LOCAL_DEV` set, the security headers and
//! the rate limiter are left off.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::error::ServerError;
use crate::rate_limit::{RateLimitResult, RateLimiter};

/// How long browsers may cache a preflight answer.
const CORS_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// Headers added to every response outside local development.
const SECURITY_HEADERS: [(HeaderName, &str); 5] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=31536000; includeSubDomains",
    ),
    (header::CONTENT_SECURITY_POLICY, "default-src 'self'"),
];

/// Wraps `router` in the edge layers configured by `config`.
pub fn apply(router: Router, config: &Config, rate_limiter: RateLimiter) -> Router {
    let mut router = router;

    if !config.local_dev {
        router = router.layer(middleware::from_fn_with_state(
            rate_limiter,
            enforce_rate_limit,
        ));
        for (name, value) in SECURITY_HEADERS {
            router = router.layer(SetResponseHeaderLayer::overriding(
                name,
                HeaderValue::from_static(value),
            ));
        }
    }

    router
        .layer(cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// CORS for the configured front-end origins, with credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([header::CONTENT_LENGTH, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE)
}

/// Bucket for requests that matched no route.
const UNMATCHED_ROUTE: &str = "<unmatched>";

/// Counts the request against its client IP and route.
///
/// The route is the matched template (`/api/v1/events/{id}`), so every id
/// under one route shares a bucket. The IP comes from the connection. Without
/// connection info (in-process tests) every request shares the `unknown`
/// client.
pub async fn enforce_rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ROUTE, MatchedPath::as_str);
    let key = format!("{client}:{route}");

    match limiter.check_rate_limit(&key).await {
        RateLimitResult::Allowed => Ok(next.run(request).await),
        RateLimitResult::Limited { retry_after_secs } => {
            info!(
                client = %key,
                retry_after = retry_after_secs,
                "Rate limit exceeded"
            );
            Err(ServerError::rate_limit(key, retry_after_secs))
        }
    }
}
