//! services/api/src/web/routes.rs
//!
//! Assembles the HTTP router from the shared state.

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa_swagger_ui::SwaggerUi;

use crate::web::{
    auth::token_handler,
    middleware::{optional_auth, require_auth},
    predict::{predict_image_handler, predict_video_handler},
    rest::{api_doc, root_handler},
    state::AppState,
    users::{history_handler, register_handler},
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    // Credentials are allowed, so a wildcard mirrors the caller's origin.
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin '{}'", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
}

/// Builds the complete application: API routes under the configured prefix,
/// the root endpoint, and Swagger UI.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let config = app_state.config.clone();

    // Public routes (no auth)
    let public_routes = Router::new()
        .route("/token", post(token_handler))
        .route("/users/register", post(register_handler));

    // Optional auth: anonymous calls work, authenticated calls are logged
    let inference_routes = Router::new()
        .route("/predict/image", post(predict_image_handler))
        .route("/predict/video", post(predict_video_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            optional_auth,
        ));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/users/history", get(history_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(inference_routes)
        .merge(protected_routes);

    let prefix = config.api_prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        Router::new().merge(api_router)
    } else {
        Router::new().nest(prefix, api_router)
    };

    app.route("/", get(root_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api_doc(&config.api_prefix)),
        )
}
