use super::{AppState, MULTIPART_OVERHEAD_BYTES, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

pub fn create_app(state: AppState) -> Router {
    let body_limit = state
        .policy
        .max_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let static_dir = state.static_dir.clone();

    let mut router = Router::new()
        .route("/api/upscale", post(handlers::upscale_image))
        .route("/api/health", get(handlers::health_check))
        // Uploads past this size fail while the image field is being read
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    // Static frontend is mounted after the API routes
    if let Some(dir) = static_dir {
        tracing::info!("Serving static files from {}", dir.display());
        router = router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    router
        // Add CORS layer for broader client compatibility
        .layer(CorsLayer::permissive())
        // Add tracing for HTTP requests and responses
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatekeeper::UploadPolicy;
    use crate::upscaler::UpscaleBackend;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_huge_size_limit_builds_router() {
        let state = AppState::new(UploadPolicy::new(usize::MAX), UpscaleBackend::Passthrough);
        let response = create_app(state)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
