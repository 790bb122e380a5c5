use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Settings;
use crate::errors::{AppError, Result};
use crate::services::face_engine::FaceEngine;
use crate::services::image_source::{resolve_pair, ImageSource};

/// Outcome of comparing the two submitted photographs. The raw distance and
/// the active threshold always travel with the boolean so failures stay
/// explainable downstream.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FaceComparison {
    pub distance: f64,
    pub threshold: f64,
    pub matches: bool,
}

/// Two descriptors denote the same identity strictly below the threshold; the
/// boundary itself does not match.
pub fn evaluate_match(distance: f64, threshold: f64) -> bool {
    distance.is_finite() && distance < threshold
}

/// Decides whether two image references depict the same person.
#[async_trait]
pub trait FaceMatcher: Send + Sync {
    async fn compare(&self, id_image: &str, selfie_image: &str) -> Result<FaceComparison>;
}

pub struct FaceMatchService {
    engine: Arc<FaceEngine>,
    client: reqwest::Client,
    threshold: f64,
}

impl FaceMatchService {
    pub fn new(engine: Arc<FaceEngine>, settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.image_fetch_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            engine,
            client,
            threshold: settings.face_match_threshold,
        })
    }
}

#[async_trait]
impl FaceMatcher for FaceMatchService {
    async fn compare(&self, id_image: &str, selfie_image: &str) -> Result<FaceComparison> {
        let id_source = ImageSource::parse(id_image)?;
        let selfie_source = ImageSource::parse(selfie_image)?;

        // Both rasters must be in hand before descriptor extraction starts.
        let (id_raster, selfie_raster) =
            resolve_pair(&self.client, &id_source, &selfie_source).await?;

        let distance = self
            .engine
            .compare(id_raster.to_rgb8(), selfie_raster.to_rgb8())
            .await?;

        Ok(FaceComparison {
            distance,
            threshold: self.threshold,
            matches: evaluate_match(distance, self.threshold),
        })
    }
}
