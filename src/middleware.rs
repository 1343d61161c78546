use axum::{
    extract::{Request, State},
    http::{
        header::{CONTENT_LENGTH, RETRY_AFTER, USER_AGENT},
        HeaderMap, HeaderName, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    BoxError,
};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::client_identity::identify;
use crate::clock::unix_seconds;
use crate::config::RateLimitSettings;
use crate::error::ApiError;
use crate::rate_limiter::LimiterRegistry;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_RATELIMIT_WINDOW: HeaderName = HeaderName::from_static("x-ratelimit-window");

const SKIP_PATHS: [&str; 5] = ["/health", "/healthz", "/ping", "/metrics", "/favicon.ico"];
const SKIP_PREFIXES: [&str; 2] = ["/static/", "/assets/"];
const SKIP_SUFFIXES: [&str; 3] = [".css", ".js", ".ico"];
const CORRELATION_HEADERS: [&str; 3] = ["x-correlation-id", "x-request-id", "x-trace-id"];

/// Request id attached to every request by [`request_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// State for the [`rate_limit`] middleware.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub settings: RateLimitSettings,
    pub registry: Arc<LimiterRegistry>,
}

/// Attach a request id to every request.
///
/// An incoming `x-request-id` is kept, otherwise a UUID v4 is generated. The
/// id is stored as a request extension, echoed in the response and recorded
/// on a tracing span around the rest of the stack.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestId(id.clone()));

    let span = info_span!("request", request_id = %id);
    async move {
        let mut response = next.run(request).await;
        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
        response
    }
    .instrument(span)
    .await
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if should_skip_logging(&path) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let query = request.uri().query().map(str::to_string);
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let correlation_id = correlation_id(request.headers()).unwrap_or_else(|| request_id.clone());
    let client_ip = identify(&request).unwrap_or_else(|| "unknown".to_string());
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    let response_size_bytes = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    macro_rules! log_request {
        ($level:ident) => {
            tracing::$level!(
                target: "starter_api::middleware",
                method = %method,
                path = %path,
                query = query.as_deref(),
                correlation_id = %correlation_id,
                request_id = %request_id,
                client_ip = %client_ip,
                status,
                response_size_bytes,
                duration_ms,
                user_agent = %user_agent,
                "HTTP request"
            )
        };
    }

    match status {
        500.. => log_request!(error),
        400..=499 => log_request!(warn),
        _ => log_request!(info),
    }

    response
}

/// Sliding-window rate limiting per client.
///
/// Clients that cannot be identified are admitted without touching the
/// registry. Admitted and denied responses both carry the rate limit headers.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.settings.enabled {
        return next.run(request).await;
    }

    let Some(client_id) = identify(&request) else {
        debug!(
            target: "starter_api::middleware",
            uri = %request.uri(),
            "Unable to identify client, skipping rate limit"
        );
        return next.run(request).await;
    };

    let clock = state.registry.clock();
    let now = clock.now();
    let system_now = clock.system_now();
    let decision = state.registry.get_or_create(&client_id).allow_at(now);

    let reset_in = decision.reset_at.saturating_duration_since(now);
    let reset_unix = unix_seconds(system_now + reset_in);

    if !decision.allowed {
        let retry_after = retry_after_secs(reset_in);
        warn!(
            target: "starter_api::middleware",
            client_id = %client_id,
            retry_after,
            "Rate limit exceeded"
        );

        let mut response = ApiError::RateLimitExceeded { retry_after }.into_response();
        set_rate_limit_headers(response.headers_mut(), &state.settings, 0, reset_unix);
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    let mut response = next.run(request).await;
    set_rate_limit_headers(
        response.headers_mut(),
        &state.settings,
        decision.remaining,
        reset_unix,
    );
    response
}

/// Map errors raised by the tower layers into the JSON error envelope.
pub async fn handle_middleware_error(err: BoxError, timeout: Duration) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        warn!(
            target: "starter_api::middleware",
            timeout_secs = timeout.as_secs(),
            "Request timed out"
        );
        return ApiError::Timeout {
            timeout_secs: timeout.as_secs(),
        };
    }

    error!(
        target: "starter_api::middleware",
        error = %err,
        "Unhandled middleware error"
    );
    ApiError::Internal
}

/// Turn a caught panic into a 500 with the standard error body.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    error!(
        target: "starter_api::middleware",
        panic = %detail,
        "Panic recovered while handling request"
    );
    ApiError::Internal.into_response()
}

fn set_rate_limit_headers(
    headers: &mut HeaderMap,
    settings: &RateLimitSettings,
    remaining: u32,
    reset_unix: u64,
) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(settings.requests_per_minute));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_unix));
    headers.insert(X_RATELIMIT_WINDOW, HeaderValue::from(settings.window.as_secs()));
}

// Rounded up so clients never retry before a slot frees, and at least one second.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

fn should_skip_logging(path: &str) -> bool {
    SKIP_PATHS.contains(&path)
        || SKIP_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
        || SKIP_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

fn correlation_id(headers: &HeaderMap) -> Option<String> {
    CORRELATION_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}
