//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        db::DbAdapter, media::MediaStore, video::FfmpegVideoDecoder, yolo::labels::load_labels,
        yolo::YoloOnnxEngine,
    },
    config::Config,
    error::ApiError,
    inference::InferenceService,
    security::TokenService,
    web::{build_router, state::AppState},
};
use chrono::Duration;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Prepare Storage ---
    let media = MediaStore::new(config.upload_dir.clone());
    media
        .ensure_upload_dir()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    // --- 4. Load the Detection Model (once per process) ---
    let labels = load_labels(config.model_labels_path.as_deref())?;
    let engine = Arc::new(YoloOnnxEngine::load(
        &config.model_path,
        config.model_input_size,
        config.inference_threads,
        labels,
    )?);
    let video_decoder = Arc::new(FfmpegVideoDecoder::new(
        config.ffmpeg_path.clone(),
        config.ffprobe_path.clone(),
    ));

    // --- 5. Build the Shared AppState ---
    let tokens = TokenService::new(
        &config.secret_key,
        config.jwt_algorithm,
        Duration::minutes(config.access_token_expire_minutes),
    );
    let inference = Arc::new(InferenceService::new(
        engine,
        video_decoder,
        media,
        db_adapter.clone(),
    ));
    let app_state = Arc::new(AppState {
        db: db_adapter,
        config: config.clone(),
        tokens,
        inference,
    });

    // --- 6. Create the Web Router ---
    let app = build_router(app_state);

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
