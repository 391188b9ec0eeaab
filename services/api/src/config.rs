//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use jsonwebtoken::Algorithm;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub api_prefix: String,
    pub secret_key: String,
    pub jwt_algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
    pub upload_dir: PathBuf,
    pub model_path: PathBuf,
    pub model_labels_path: Option<PathBuf>,
    pub model_input_size: u32,
    pub inference_threads: usize,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", "0.0.0.0:8000")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://oloy11.db?mode=rwc".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let api_prefix =
            std::env::var("API_PREFIX").unwrap_or_else(|_| DEFAULT_API_PREFIX.to_string());

        // --- Token Settings ---
        let secret_key = std::env::var("SECRET_KEY")
            .map_err(|_| ConfigError::MissingVar("SECRET_KEY".to_string()))?;
        if secret_key.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SECRET_KEY".to_string(),
                "must not be empty".to_string(),
            ));
        }

        let algorithm_str = std::env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string());
        let jwt_algorithm = parse_symmetric_algorithm(&algorithm_str)?;

        let access_token_expire_minutes: i64 = parse_var("ACCESS_TOKEN_EXPIRE_MINUTES", "30")?;
        if access_token_expire_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "ACCESS_TOKEN_EXPIRE_MINUTES".to_string(),
                "must be positive".to_string(),
            ));
        }

        // --- Storage and Model Settings ---
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));
        let model_path = std::env::var("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("yolo11n.onnx"));
        let model_labels_path = std::env::var("MODEL_LABELS_PATH").ok().map(PathBuf::from);
        let model_input_size = parse_var("MODEL_INPUT_SIZE", "640")?;
        let inference_threads = parse_var("INFERENCE_THREADS", "4")?;

        let ffmpeg_path = std::env::var("FFMPEG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ffmpeg"));
        let ffprobe_path = std::env::var("FFPROBE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ffprobe"));

        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", "209715200")?;

        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| {
                "http://localhost,http://localhost:3000,http://localhost:8000".to_string()
            })
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            api_prefix,
            secret_key,
            jwt_algorithm,
            access_token_expire_minutes,
            upload_dir,
            model_path,
            model_labels_path,
            model_input_size,
            inference_threads,
            ffmpeg_path,
            ffprobe_path,
            max_upload_bytes,
            cors_origins,
        })
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

/// Only HMAC algorithms are accepted; the secret key is shared, not a key pair.
pub fn parse_symmetric_algorithm(value: &str) -> Result<Algorithm, ConfigError> {
    match value.to_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(ConfigError::InvalidValue(
            "JWT_ALGORITHM".to_string(),
            format!("'{}' is not a supported symmetric algorithm", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("HS256", Algorithm::HS256)]
    #[case("hs384", Algorithm::HS384)]
    #[case("HS512", Algorithm::HS512)]
    fn accepts_hmac_algorithms(#[case] raw: &str, #[case] expected: Algorithm) {
        assert_eq!(parse_symmetric_algorithm(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("RS256")]
    #[case("none")]
    fn rejects_asymmetric_or_unknown_algorithms(#[case] raw: &str) {
        assert!(matches!(
            parse_symmetric_algorithm(raw),
            Err(ConfigError::InvalidValue(name, _)) if name == "JWT_ALGORITHM"
        ));
    }
}
