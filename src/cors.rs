//! CORS layer with strict origin matching.

use axum::extract::{Request, State};
use axum::http::header::{HeaderName, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::CorsSettings;
use crate::error::ApiError;

/// Build the CORS layer from configuration.
pub fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let allowed: Arc<[String]> = settings.allowed_origins.clone().into();

    let methods: Vec<Method> = settings
        .allowed_methods
        .iter()
        .filter_map(|m| match Method::from_bytes(m.to_uppercase().as_bytes()) {
            Ok(method) => Some(method),
            Err(_) => {
                warn!(method = %m, "Ignoring invalid CORS method");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
            origin
                .to_str()
                .map(|origin| is_origin_allowed(origin, &allowed))
                .unwrap_or(false)
        }))
        .allow_methods(methods)
        .allow_headers(header_names(&settings.allowed_headers))
        .expose_headers(header_names(&settings.exposed_headers))
        .allow_credentials(settings.allow_credentials)
        .max_age(settings.max_age)
}

/// Answer a preflight from an origin that is not allowed with 403.
///
/// `CorsLayer` would reply 200 without CORS headers; this runs in front of it
/// so the refusal is explicit and uses the JSON error envelope.
pub async fn reject_disallowed_preflight(
    State(allowed): State<Arc<[String]>>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let is_preflight = request.method() == Method::OPTIONS
        && headers.contains_key(ACCESS_CONTROL_REQUEST_METHOD);

    if is_preflight {
        if let Some(origin) = headers.get(ORIGIN) {
            let origin = origin.to_str().unwrap_or_default();
            if !is_origin_allowed(origin, &allowed) {
                warn!(origin = %origin, "Rejecting CORS preflight from disallowed origin");
                return ApiError::Forbidden("Origin not allowed".to_string()).into_response();
            }
        }
    }

    next.run(request).await
}

/// Whether `origin` matches one of the allowed entries.
///
/// Entries are exact origins, `*.domain` or `scheme://*.domain`. A bare `*`
/// never matches, and neither does the `null` origin.
pub fn is_origin_allowed(origin: &str, allowed: &[String]) -> bool {
    if origin == "null" {
        return false;
    }

    let Ok(uri) = origin.parse::<Uri>() else {
        return false;
    };
    let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) else {
        return false;
    };
    if scheme != "http" && scheme != "https" {
        return false;
    }
    let host = authority.as_str();

    allowed.iter().any(|entry| {
        if entry == "*" {
            return false;
        }
        if entry == origin {
            return true;
        }
        subdomain_matches(scheme, host, entry)
    })
}

fn subdomain_matches(scheme: &str, host: &str, pattern: &str) -> bool {
    let (required_scheme, rest) = match pattern.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, pattern),
    };
    let Some(domain) = rest.strip_prefix("*.") else {
        return false;
    };
    if domain.is_empty() {
        return false;
    }
    if required_scheme.is_some_and(|required| required != scheme) {
        return false;
    }

    // Require a label boundary so "attackerexample.com" never matches "*.example.com".
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn header_names(names: &[String]) -> Vec<HeaderName> {
    names
        .iter()
        .filter_map(|name| match HeaderName::from_bytes(name.as_bytes()) {
            Ok(header) => Some(header),
            Err(_) => {
                warn!(header = %name, "Ignoring invalid CORS header name");
                None
            }
        })
        .collect()
}
