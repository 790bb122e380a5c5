use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{AppError, Result};

pub const DEFAULT_DATABASE_PATH: &str = "tontine.db";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_FACE_MODEL_DIR: &str = "models";
pub const DEFAULT_FACE_MATCH_THRESHOLD: f64 = 0.45;
pub const DEFAULT_IMAGE_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RATE_LIMIT_PER_SEC: u64 = 5;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: String,
    pub port: u16,
    pub jwt_secret: String,
    pub face_model_dir: PathBuf,
    pub face_match_threshold: f64,
    pub image_fetch_timeout: Duration,
    pub rate_limit_per_sec: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET must be set in environment".to_string()))?;

        Ok(Self {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            jwt_secret,
            face_model_dir: std::env::var("FACE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_FACE_MODEL_DIR)),
            face_match_threshold: threshold_from(std::env::var("FACE_MATCH_THRESHOLD").ok()),
            image_fetch_timeout: Duration::from_secs(
                std::env::var("IMAGE_FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_IMAGE_FETCH_TIMEOUT_SECS)
                    .max(1),
            ),
            rate_limit_per_sec: std::env::var("RATE_LIMIT_PER_SEC")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RATE_LIMIT_PER_SEC),
        })
    }
}

// A non-numeric or non-positive override falls back to the default.
fn threshold_from(raw: Option<String>) -> f64 {
    raw.and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(DEFAULT_FACE_MATCH_THRESHOLD)
}
