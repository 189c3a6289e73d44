use std::sync::Arc;

use axum::http::{HeaderValue, Method, header, request::Parts};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// CORS for the configured allow-list. Allowed origins may send credentials;
/// anything else gets no CORS headers and is logged.
pub fn layer(allowed_origins: &[String]) -> CorsLayer {
    let allowed: Arc<[String]> = allowed_origins.into();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                let ok = origin
                    .to_str()
                    .is_ok_and(|origin| allowed.iter().any(|a| a == origin));
                if !ok {
                    tracing::warn!(?origin, "CORS origin blocked");
                }
                ok
            },
        ))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
