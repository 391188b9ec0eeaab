//! Shared fakes and builders for the integration tests.
#![allow(dead_code)]

use api_lib::{
    adapters::{db::DbAdapter, media::MediaStore},
    config::Config,
    inference::InferenceService,
    security::TokenService,
    web::{build_router, state::AppState},
};
use async_trait::async_trait;
use axum::Router;
use image::{ImageFormat, Rgb, RgbImage};
use jsonwebtoken::Algorithm;
use oloy_core::domain::{
    BoundingBox, Detection, DetectionParams, HistoryAction, HistoryEntry, User, UserCredentials,
};
use oloy_core::ports::{
    DatabaseService, DetectionEngine, FrameSource, PortError, PortResult, VideoDecoder,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::Level;

pub const SECRET: &str = "integration-test-secret";

//=========================================================================================
// Fakes
//=========================================================================================

/// Returns one detection on the listed calls (1-based) and none otherwise.
pub struct ScriptedEngine {
    hits: HashSet<usize>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(u32, u32)>>,
    params: Mutex<Vec<DetectionParams>>,
}

impl ScriptedEngine {
    pub fn hitting(calls: &[usize]) -> Self {
        Self {
            hits: calls.iter().copied().collect(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_dimensions(&self) -> Vec<(u32, u32)> {
        self.seen.lock().unwrap().clone()
    }

    /// The parameters of every call, in call order.
    pub fn seen_params(&self) -> Vec<DetectionParams> {
        self.params.lock().unwrap().clone()
    }
}

impl DetectionEngine for ScriptedEngine {
    fn detect(&self, image: &RgbImage, params: &DetectionParams) -> PortResult<Vec<Detection>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(image.dimensions());
        self.params.lock().unwrap().push(*params);
        if self.hits.contains(&call) {
            Ok(vec![person()])
        } else {
            Ok(Vec::new())
        }
    }
}

pub fn person() -> Detection {
    Detection {
        name: "person".to_string(),
        class: 0,
        confidence: 0.9,
        bbox: BoundingBox {
            x1: 1.0,
            y1: 1.0,
            x2: 5.0,
            y2: 6.0,
        },
    }
}

/// Produces `frames` blank frames, or fails to open.
pub struct SyntheticDecoder {
    pub frames: u64,
    pub fail_open: bool,
}

struct SyntheticFrames {
    remaining: u64,
}

impl FrameSource for SyntheticFrames {
    fn next_frame(&mut self) -> PortResult<Option<RgbImage>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(RgbImage::new(4, 4)))
    }
}

impl VideoDecoder for SyntheticDecoder {
    fn open(&self, path: &Path) -> PortResult<Box<dyn FrameSource>> {
        if self.fail_open {
            return Err(PortError::InvalidInput(format!(
                "{} is not a video",
                path.display()
            )));
        }
        Ok(Box::new(SyntheticFrames {
            remaining: self.frames,
        }))
    }
}

/// A database that is down.
pub struct UnavailableDatabase;

#[async_trait]
impl DatabaseService for UnavailableDatabase {
    async fn get_user_by_username(&self, _: &str) -> PortResult<Option<UserCredentials>> {
        Err(PortError::Unexpected("database unavailable".into()))
    }

    async fn create_user(&self, _: &str, _: &str, _: &str) -> PortResult<User> {
        Err(PortError::Unexpected("database unavailable".into()))
    }

    async fn append_history(
        &self,
        _: i64,
        _: HistoryAction,
        _: &str,
        _: serde_json::Value,
    ) -> PortResult<HistoryEntry> {
        Err(PortError::Unexpected("database unavailable".into()))
    }

    async fn list_history(&self, _: i64, _: i64, _: i64) -> PortResult<Vec<HistoryEntry>> {
        Err(PortError::Unexpected("database unavailable".into()))
    }
}

//=========================================================================================
// Builders
//=========================================================================================

pub async fn memory_db() -> Arc<DbAdapter> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = DbAdapter::new(pool);
    db.run_migrations().await.unwrap();
    Arc::new(db)
}

pub async fn media_store(dir: &TempDir) -> MediaStore {
    let store = MediaStore::new(dir.path().join("uploads"));
    store.ensure_upload_dir().await.unwrap();
    store
}

pub fn test_config(upload_dir: PathBuf) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: "sqlite::memory:".to_string(),
        log_level: Level::INFO,
        api_prefix: "/api/v1".to_string(),
        secret_key: SECRET.to_string(),
        jwt_algorithm: Algorithm::HS256,
        access_token_expire_minutes: 30,
        upload_dir,
        model_path: PathBuf::from("unused.onnx"),
        model_labels_path: None,
        model_input_size: 640,
        inference_threads: 1,
        ffmpeg_path: PathBuf::from("ffmpeg"),
        ffprobe_path: PathBuf::from("ffprobe"),
        max_upload_bytes: 10 * 1024 * 1024,
        cors_origins: vec!["*".to_string()],
    }
}

pub fn token_service() -> TokenService {
    TokenService::new(SECRET, Algorithm::HS256, chrono::Duration::minutes(30))
}

/// Everything an HTTP test needs, wired the way the binary wires it.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub db: Arc<DbAdapter>,
    pub engine: Arc<ScriptedEngine>,
    pub dir: TempDir,
}

pub async fn test_app(engine: ScriptedEngine) -> TestApp {
    let dir = TempDir::new().unwrap();
    let db = memory_db().await;
    let engine = Arc::new(engine);
    let media = media_store(&dir).await;
    let config = Arc::new(test_config(media.upload_dir().to_path_buf()));
    let inference = Arc::new(InferenceService::new(
        engine.clone(),
        Arc::new(SyntheticDecoder {
            frames: 3,
            fail_open: false,
        }),
        media,
        db.clone(),
    ));
    let state = Arc::new(AppState {
        db: db.clone(),
        config,
        tokens: token_service(),
        inference,
    });
    TestApp {
        router: build_router(state.clone()),
        state,
        db,
        engine,
        dir,
    }
}

//=========================================================================================
// Payloads
//=========================================================================================

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([120, 60, 30]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub const BOUNDARY: &str = "oloy11-test-boundary";

/// A multipart part: field name, optional file name, content.
pub type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    name, file_name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

pub fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// Serves `body` at `/image.png` on a loopback port and returns its URL.
pub async fn serve_image(body: Vec<u8>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = Router::new().route("/image.png", axum::routing::get(move || async move { body }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/image.png", address)
}
