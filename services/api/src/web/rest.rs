//! services/api/src/web/rest.rs
//!
//! The service root endpoint and the master definition for the OpenAPI
//! specification.

use axum::Json;
use serde::Serialize;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::Server;
use utoipa::{Modify, OpenApi, ToSchema};

use crate::web::{auth, predict, users};

pub const PROJECT_NAME: &str = "Oloy11";

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    info(title = "Oloy11"),
    paths(
        auth::token_handler,
        users::register_handler,
        users::history_handler,
        predict::predict_image_handler,
        predict::predict_video_handler,
    ),
    components(
        schemas(
            auth::TokenForm,
            auth::TokenResponse,
            users::UserCreate,
            users::UserOut,
            users::HistoryEntryOut,
            predict::ImagePredictionResponse,
            predict::VideoPredictionResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Oloy11 API", description = "Object detection on images and videos, with user accounts and history.")
    )
)]
pub struct ApiDoc;

/// The document with its server URL set to the mount point of the API routes.
pub fn api_doc(api_prefix: &str) -> utoipa::openapi::OpenApi {
    let prefix = api_prefix.trim_end_matches('/');
    let mut doc = ApiDoc::openapi();
    doc.servers = Some(vec![Server::new(if prefix.is_empty() { "/" } else { prefix })]);
    doc
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// Root
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct WelcomeResponse {
    pub message: String,
}

/// GET / - Availability check
pub async fn root_handler() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: format!("Welcome to {} API", PROJECT_NAME),
    })
}
