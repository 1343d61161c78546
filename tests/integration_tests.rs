use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use starter_api::clock::ManualClock;
use starter_api::server::apply_middleware;
use starter_api::{create_app, create_app_with_clock, Config};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

fn limited_config(requests_per_minute: u32) -> Config {
    Config {
        rate_limit_requests_per_minute: requests_per_minute,
        ..Config::default()
    }
}

fn get_from(path: &str, client_ip: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("x-forwarded-for", client_ip)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_app(&Config::default());

    let response = send(&app, get_from("/api/v1/health", "10.0.0.1")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "starter-api");
    assert_eq!(body["checks"]["rate_limiter"], "enabled");
}

#[tokio::test]
async fn test_probe_endpoints() {
    let app = create_app(&Config::default());

    let cases = [
        ("/api/v1/heartbeat", "beat", "alive"),
        ("/api/v1/ready", "status", "ready"),
        ("/api/v1/live", "status", "alive"),
        ("/health", "status", "healthy"),
    ];
    for (path, field, expected) in cases {
        let response = send(&app, get_from(path, "10.0.0.1")).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
        assert_eq!(json_body(response).await[field], expected, "{}", path);
    }

    let response = send(&app, get_from("/api/v1/system", "10.0.0.1")).await;
    let body = json_body(response).await;
    assert_eq!(body["tracked_clients"], 1);
    assert_eq!(body["os"], std::env::consts::OS);
}

#[tokio::test]
async fn test_unknown_route_returns_error_envelope() {
    let app = create_app(&Config::default());

    let response = send(&app, get_from("/api/v1/nope", "10.0.0.1")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-ratelimit-limit"));

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "No route for /api/v1/nope");
}

#[tokio::test]
async fn test_rate_limit_window_scenario() {
    let clock = Arc::new(ManualClock::new());
    let app = create_app_with_clock(&limited_config(3), clock.clone());

    for expected_remaining in ["2", "1", "0"] {
        let response = send(&app, get_from("/api/v1/health", "203.0.113.7")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-ratelimit-limit"), Some("3"));
        assert_eq!(
            header_str(&response, "x-ratelimit-remaining"),
            Some(expected_remaining)
        );
        assert_eq!(header_str(&response, "x-ratelimit-window"), Some("60"));
        clock.advance(Duration::from_secs(1));
    }

    // Three requests at t=0,1,2; the fourth arrives at t=3.
    let response = send(&app, get_from("/api/v1/health", "203.0.113.7")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(&response, "retry-after"), Some("57"));
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), Some("0"));
    assert_eq!(header_str(&response, "x-ratelimit-limit"), Some("3"));
    assert_eq!(
        header_str(&response, header::CONTENT_TYPE.as_str()),
        Some("application/json")
    );

    let body = json_body(response).await;
    assert_eq!(
        body,
        serde_json::json!({
            "error": {
                "code": "RATE_LIMIT_EXCEEDED",
                "message": "Rate limit exceeded. Try again in 57 seconds."
            }
        })
    );

    // At t=61 the requests from t=0 and t=1 have left the window.
    clock.advance(Duration::from_secs(58));
    let response = send(&app, get_from("/api/v1/health", "203.0.113.7")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), Some("1"));
}

#[tokio::test]
async fn test_reset_header_is_unix_seconds_in_the_future() {
    let clock = Arc::new(ManualClock::new());
    let app = create_app_with_clock(&limited_config(5), clock);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let response = send(&app, get_from("/api/v1/health", "10.1.1.1")).await;
    let reset: u64 = header_str(&response, "x-ratelimit-reset")
        .unwrap()
        .parse()
        .unwrap();

    assert!(reset >= now + 59 && reset <= now + 61, "reset {}", reset);
}

#[tokio::test]
async fn test_clients_are_limited_independently() {
    let clock = Arc::new(ManualClock::new());
    let app = create_app_with_clock(&limited_config(1), clock);

    let response = send(&app, get_from("/api/v1/health", "10.0.0.1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(&app, get_from("/api/v1/health", "10.0.0.1")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = send(&app, get_from("/api/v1/health", "10.0.0.2")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), Some("0"));
}

#[tokio::test]
async fn test_forwarded_for_uses_first_hop() {
    let clock = Arc::new(ManualClock::new());
    let app = create_app_with_clock(&limited_config(1), clock);

    let response = send(&app, get_from("/api/v1/health", "198.51.100.4, 10.0.0.1")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get_from("/api/v1/health", "198.51.100.4")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_unidentified_client_is_admitted_without_headers() {
    let clock = Arc::new(ManualClock::new());
    let app = create_app_with_clock(&limited_config(1), clock);

    for _ in 0..3 {
        let request = Request::builder()
            .uri("/api/v1/health")
            .body(Body::empty())
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn test_peer_address_is_used_without_proxy_headers() {
    let clock = Arc::new(ManualClock::new());
    let app = create_app_with_clock(&limited_config(1), clock);
    let peer: SocketAddr = "192.0.2.10:51234".parse().unwrap();

    let build = || {
        let mut request = Request::builder()
            .uri("/api/v1/health")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    };

    let response = send(&app, build()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), Some("0"));

    let response = send(&app, build()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_disabled_rate_limiting_sets_no_headers() {
    let config = Config {
        rate_limit_enabled: false,
        rate_limit_requests_per_minute: 1,
        ..Config::default()
    };
    let app = create_app(&config);

    for _ in 0..3 {
        let response = send(&app, get_from("/api/v1/health", "10.0.0.1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-remaining"));
        assert!(!response.headers().contains_key("retry-after"));
    }

    let response = send(&app, get_from("/api/v1/health", "10.0.0.1")).await;
    assert_eq!(json_body(response).await["checks"]["rate_limiter"], "disabled");
}

#[tokio::test]
async fn test_request_id_is_generated_or_echoed() {
    let app = create_app(&Config::default());

    let response = send(&app, get_from("/api/v1/live", "10.0.0.1")).await;
    let generated = header_str(&response, "x-request-id").unwrap();
    assert_eq!(generated.len(), 36);

    let request = Request::builder()
        .uri("/api/v1/live")
        .header("x-request-id", "req-123")
        .header("x-forwarded-for", "10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(header_str(&response, "x-request-id"), Some("req-123"));
}

#[tokio::test]
async fn test_cors_allows_configured_origins_only() {
    let config = Config {
        cors_allowed_origins: "https://app.example.com,*.example.org".to_string(),
        ..Config::default()
    };
    let app = create_app(&config);

    let request = Request::builder()
        .uri("/api/v1/health")
        .header(header::ORIGIN, "https://app.example.com")
        .header("x-forwarded-for", "10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(
        header_str(&response, "access-control-allow-origin"),
        Some("https://app.example.com")
    );

    let request = Request::builder()
        .uri("/api/v1/health")
        .header(header::ORIGIN, "https://api.example.org")
        .header("x-forwarded-for", "10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(
        header_str(&response, "access-control-allow-origin"),
        Some("https://api.example.org")
    );

    let request = Request::builder()
        .uri("/api/v1/health")
        .header(header::ORIGIN, "https://evil.test")
        .header("x-forwarded-for", "10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert!(!response
        .headers()
        .contains_key("access-control-allow-origin"));
}

async fn panicking_handler() -> &'static str {
    panic!("handler exploded")
}

async fn slow_handler() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "done"
}

fn pipeline_app() -> Router {
    let config = Config {
        request_timeout_secs: 1,
        ..Config::default()
    };
    let router = Router::new()
        .route("/panic", get(panicking_handler))
        .route("/slow", get(slow_handler));
    apply_middleware(router, &config)
}

fn get_with_id(path: &str, request_id: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("x-request-id", request_id)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_panicking_handler_returns_internal_error_envelope() {
    let app = pipeline_app();

    let response = send(&app, get_with_id("/panic", "req-panic")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(header_str(&response, "x-request-id"), Some("req-panic"));

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(body["error"]["message"], "An unexpected error occurred");
}

#[tokio::test]
async fn test_slow_handler_times_out_with_error_envelope() {
    let app = pipeline_app();

    let response = send(&app, get_with_id("/slow", "req-slow")).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(header_str(&response, "x-request-id"), Some("req-slow"));

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "REQUEST_TIMEOUT");
    assert_eq!(body["error"]["message"], "Request timed out after 1 seconds");
}

fn preflight(origin: &str) -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri("/api/v1/health")
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_preflight_from_disallowed_origin_is_forbidden() {
    let config = Config {
        cors_allowed_origins: "https://app.example.com".to_string(),
        ..Config::default()
    };
    let app = create_app(&config);

    let response = send(&app, preflight("https://evil.test")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!response
        .headers()
        .contains_key("access-control-allow-origin"));
    assert_eq!(json_body(response).await["error"]["code"], "FORBIDDEN");

    let response = send(&app, preflight("https://app.example.com")).await;
    assert!(response.status().is_success());
    assert_eq!(
        header_str(&response, "access-control-allow-origin"),
        Some("https://app.example.com")
    );
}
