//! services/api/src/adapters/media.rs
//!
//! Media Ingestion: persists uploaded or fetched bytes under the upload root
//! with a collision-resistant name, and decodes stored images.

use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Extensions the detector is known to read. Anything else is accepted but flagged.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "bmp", "dng", "jpeg", "mpo", "png", "tif", "tiff", "webp", "heic", "jpg",
];

/// Container extensions accepted for video inference.
pub const VIDEO_EXTENSIONS: &[&str] = &["asf", "mp4", "mpeg", "mov", "mkv", "avi", "webm"];

const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not retrieve image from URL (status {0})")]
    FetchFailed(u16),
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Invalid image file: {0}")]
    InvalidImage(#[from] image::ImageError),
}

/// A file persisted under the upload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub path: PathBuf,
    /// False when the declared extension is outside the supported set.
    pub supported: bool,
}

/// Lower-cased extension after the last dot, or `None` when there is no dot.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

#[derive(Clone)]
pub struct MediaStore {
    upload_dir: PathBuf,
    client: reqwest::Client,
}

impl MediaStore {
    pub fn new(upload_dir: PathBuf) -> Self {
        Self {
            upload_dir,
            client: reqwest::Client::new(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Creates the upload root if it does not exist yet.
    pub async fn ensure_upload_dir(&self) -> Result<(), MediaError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        Ok(())
    }

    fn unique_path(&self, extension: &str) -> PathBuf {
        self.upload_dir
            .join(format!("{}.{}", Uuid::new_v4(), extension))
    }

    async fn persist(&self, bytes: &[u8], extension: &str) -> Result<PathBuf, MediaError> {
        self.ensure_upload_dir().await?;
        let path = self.unique_path(extension);
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Persists an uploaded image. The extension comes from `declared_name`.
    pub async fn ingest_upload(&self, bytes: &[u8], declared_name: &str) -> Result<StoredMedia, MediaError> {
        let extension = extension_of(declared_name);
        let supported = extension
            .as_deref()
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        if !supported {
            warn!("Upload '{}' has an unsupported image extension; accepting anyway", declared_name);
        }
        let path = self
            .persist(bytes, extension.as_deref().unwrap_or(DEFAULT_IMAGE_EXTENSION))
            .await?;
        Ok(StoredMedia { path, supported })
    }

    /// Persists an uploaded video whose extension has already been checked.
    pub async fn ingest_video(&self, bytes: &[u8], extension: &str) -> Result<PathBuf, MediaError> {
        self.persist(bytes, extension).await
    }

    /// Downloads `url` and persists the body like an upload.
    pub async fn ingest_url(&self, url: &str) -> Result<StoredMedia, MediaError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::FetchFailed(status.as_u16()));
        }
        let body = response.bytes().await?;
        let path = self.persist(&body, DEFAULT_IMAGE_EXTENSION).await?;
        Ok(StoredMedia { path, supported: true })
    }
}

/// Decodes a stored image into RGB, guessing the format from its content.
/// Blocking; run it on a blocking worker.
pub fn decode_image(path: &Path) -> Result<RgbImage, MediaError> {
    let bytes = std::fs::read(path)?;
    let image = image::load_from_memory(&bytes)?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use image::{ImageFormat, Rgb};
    use rstest::rstest;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let image = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[rstest]
    #[case("photo.PNG", Some("png"))]
    #[case("archive.tar.gz", Some("gz"))]
    #[case("noext", None)]
    #[case("trailing.", None)]
    fn extension_is_taken_after_the_last_dot(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(extension_of(name).as_deref(), expected);
    }

    #[tokio::test]
    async fn uploads_get_unique_paths_under_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().join("uploads"));

        let first = store.ingest_upload(b"abc", "cat.png").await.unwrap();
        let second = store.ingest_upload(b"abc", "cat.png").await.unwrap();

        assert_ne!(first.path, second.path);
        assert!(first.path.starts_with(store.upload_dir()));
        assert_eq!(first.path.extension().unwrap(), "png");
        assert!(first.supported);
        assert_eq!(tokio::fs::read(&first.path).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn unsupported_extensions_are_flagged_not_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());

        let stored = store.ingest_upload(b"abc", "notes.txt").await.unwrap();
        assert!(!stored.supported);
        assert!(stored.path.exists());

        let no_ext = store.ingest_upload(b"abc", "blob").await.unwrap();
        assert!(!no_ext.supported);
        assert_eq!(no_ext.path.extension().unwrap(), "jpg");
    }

    #[tokio::test]
    async fn decode_reads_content_regardless_of_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());
        let stored = store.ingest_upload(&png_bytes(), "mislabelled.jpg").await.unwrap();

        let image = decode_image(&stored.path).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[tokio::test]
    async fn decode_rejects_non_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());
        let stored = store.ingest_upload(b"definitely not pixels", "x.png").await.unwrap();

        assert!(matches!(
            decode_image(&stored.path),
            Err(MediaError::InvalidImage(_))
        ));
    }

    #[tokio::test]
    async fn url_ingestion_persists_the_body() {
        let body = png_bytes();
        let served = body.clone();
        let base = serve(Router::new().route("/img", get(move || async move { served }))).await;

        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());
        let stored = store.ingest_url(&format!("{}/img", base)).await.unwrap();

        assert_eq!(tokio::fs::read(&stored.path).await.unwrap(), body);
    }

    #[tokio::test]
    async fn url_ingestion_fails_on_error_status() {
        let base = serve(Router::new().route(
            "/missing",
            get(|| async { StatusCode::NOT_FOUND }),
        ))
        .await;

        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());
        let err = store
            .ingest_url(&format!("{}/missing", base))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::FetchFailed(404)));
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
