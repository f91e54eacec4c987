use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::error;
use crate::images::MAX_IMAGE_BYTES;
use crate::routes;
use crate::state::AppState;

pub const API_PREFIX: &str = "/api/v1";

/// Assemble the full application: versioned API, uploaded images, error
/// envelope, CORS and request tracing.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.cors)?;
    let uploads = ServeDir::new(state.config.uploads_path());

    let app = Router::new()
        .nest(API_PREFIX, routes::api_router())
        .nest_service("/uploads", uploads)
        .fallback(error::route_not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error::error_envelope,
        ))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

/// Echo the configured origin, or mirror the caller's origin when none is
/// configured. Credentials are allowed either way, which rules out a
/// literal `*`.
fn cors_layer(config: &CorsConfig) -> anyhow::Result<CorsLayer> {
    let origin = match config.allowed_origin.as_deref() {
        Some(origin) => AllowOrigin::exact(HeaderValue::from_str(origin)?),
        None => AllowOrigin::mirror_request(),
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_rejects_unparseable_origin() {
        let config = CorsConfig {
            allowed_origin: Some("bad\norigin".into()),
        };
        assert!(cors_layer(&config).is_err());
    }

    #[test]
    fn cors_accepts_configured_or_missing_origin() {
        assert!(cors_layer(&CorsConfig::default()).is_ok());
        let config = CorsConfig {
            allowed_origin: Some("https://blog.example.com".into()),
        };
        assert!(cors_layer(&config).is_ok());
    }
}
