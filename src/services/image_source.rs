use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};
use image::DynamicImage;
use sha2::{Digest, Sha256};

use crate::errors::{AppError, Result};

/// A submitted image reference, classified once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `data:` URL carrying the base64-encoded image bytes inline.
    InlinePayload(String),
    /// Remote HTTP(S) location.
    RemoteUrl(String),
    /// Path on the local filesystem.
    LocalPath(PathBuf),
}

impl ImageSource {
    pub fn parse(reference: &str) -> Result<Self> {
        if reference.is_empty() {
            return Err(AppError::ImageSource("Image source missing".to_string()));
        }
        if reference.starts_with("data:") {
            return Ok(ImageSource::InlinePayload(reference.to_string()));
        }
        if reference.starts_with("http:") || reference.starts_with("https:") {
            return Ok(ImageSource::RemoteUrl(reference.to_string()));
        }
        Ok(ImageSource::LocalPath(PathBuf::from(reference)))
    }

    /// Fetches and raster-decodes the referenced image. Remote fetches use
    /// the caller's client, which carries the configured timeout; no retry is
    /// performed here.
    pub async fn resolve(&self, client: &reqwest::Client) -> Result<DynamicImage> {
        let bytes = match self {
            ImageSource::InlinePayload(data) => {
                let encoded = data.split_once(',').map(|(_, rest)| rest).ok_or_else(|| {
                    AppError::ImageSource("Inline image payload has no data segment".to_string())
                })?;
                general_purpose::STANDARD.decode(encoded).map_err(|e| {
                    AppError::ImageSource(format!("Invalid base64 image payload: {}", e))
                })?
            }
            ImageSource::RemoteUrl(url) => {
                let response = client.get(url).send().await.map_err(|e| {
                    AppError::ImageSource(format!("Unable to download image from url: {}", e))
                })?;
                if !response.status().is_success() {
                    return Err(AppError::ImageSource(format!(
                        "Unable to download image from url: status {}",
                        response.status()
                    )));
                }
                response
                    .bytes()
                    .await
                    .map_err(|e| {
                        AppError::ImageSource(format!("Unable to download image from url: {}", e))
                    })?
                    .to_vec()
            }
            ImageSource::LocalPath(path) => tokio::fs::read(path).await.map_err(|e| {
                AppError::ImageSource(format!("Failed to read image {}: {}", path.display(), e))
            })?,
        };

        image::load_from_memory(&bytes)
            .map_err(|e| AppError::ImageSource(format!("Failed to decode image: {}", e)))
    }
}

/// Resolves the ID document and selfie references concurrently; the first
/// failure aborts the pair.
pub async fn resolve_pair(
    client: &reqwest::Client,
    id_image: &ImageSource,
    selfie_image: &ImageSource,
) -> Result<(DynamicImage, DynamicImage)> {
    tokio::try_join!(id_image.resolve(client), selfie_image.resolve(client))
}

/// One-way digest of a submitted image reference. Inline payloads are hashed
/// over their decoded bytes so equivalent encodings collapse to one digest;
/// other references are hashed over the reference string itself. Hashing
/// never re-fetches and raw image bytes are never persisted.
pub fn hash_image_source(source: &str) -> String {
    if source.is_empty() {
        return String::new();
    }

    let mut hasher = Sha256::new();
    match source
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
    {
        Some((_, encoded)) => match general_purpose::STANDARD.decode(encoded) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(source.as_bytes()),
        },
        None => hasher.update(source.as_bytes()),
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30]));
        let mut cursor = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, image::ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn parse_classifies_each_reference_shape() {
        assert!(matches!(
            ImageSource::parse("data:image/png;base64,AAAA").unwrap(),
            ImageSource::InlinePayload(_)
        ));
        assert!(matches!(
            ImageSource::parse("http://example.com/id.png").unwrap(),
            ImageSource::RemoteUrl(_)
        ));
        assert!(matches!(
            ImageSource::parse("https://example.com/id.png").unwrap(),
            ImageSource::RemoteUrl(_)
        ));
        assert!(matches!(
            ImageSource::parse("uploads/selfie.png").unwrap(),
            ImageSource::LocalPath(_)
        ));
    }

    #[test]
    fn parse_rejects_empty_reference_before_io() {
        let err = ImageSource::parse("").unwrap_err();
        match err {
            AppError::ImageSource(message) => assert_eq!(message, "Image source missing"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn inline_hash_digests_decoded_bytes() {
        let bytes = b"hello";
        let encoded = general_purpose::STANDARD.encode(bytes);
        let reference = format!("data:image/png;base64,{}", encoded);

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let expected = format!("{:x}", hasher.finalize());

        assert_eq!(hash_image_source(&reference), expected);
        // The digest is not derived from the reference string itself
        assert_ne!(hash_image_source(&reference), hash_image_source(&encoded));
    }

    #[test]
    fn url_hash_digests_the_reference_string() {
        let url = "https://example.com/id.png";
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let expected = format!("{:x}", hasher.finalize());

        assert_eq!(hash_image_source(url), expected);
    }

    #[test]
    fn empty_reference_hashes_to_empty_string() {
        assert_eq!(hash_image_source(""), "");
    }

    #[tokio::test]
    async fn resolves_inline_payload() {
        let encoded = general_purpose::STANDARD.encode(png_bytes());
        let reference = format!("data:image/png;base64,{}", encoded);
        let source = ImageSource::parse(&reference).unwrap();

        let image = source.resolve(&reqwest::Client::new()).await.unwrap();
        assert_eq!(image.to_rgb8().dimensions(), (2, 2));
    }

    #[tokio::test]
    async fn resolves_local_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("selfie.png");
        std::fs::write(&path, png_bytes()).unwrap();

        let source = ImageSource::parse(path.to_str().unwrap()).unwrap();
        let image = source.resolve(&reqwest::Client::new()).await.unwrap();
        assert_eq!(image.to_rgb8().dimensions(), (2, 2));
    }

    #[tokio::test]
    async fn missing_local_path_is_a_source_error() {
        let source = ImageSource::parse("/nonexistent/id.png").unwrap();
        let err = source.resolve(&reqwest::Client::new()).await.unwrap_err();
        assert!(matches!(err, AppError::ImageSource(_)));
    }

    #[tokio::test]
    async fn inline_payload_without_data_segment_fails() {
        let source = ImageSource::parse("data:image/png;base64").unwrap();
        let err = source.resolve(&reqwest::Client::new()).await.unwrap_err();
        assert!(matches!(err, AppError::ImageSource(_)));
    }

    #[tokio::test]
    async fn invalid_base64_payload_fails() {
        let source = ImageSource::parse("data:image/png;base64,!!notbase64!!").unwrap();
        let err = source.resolve(&reqwest::Client::new()).await.unwrap_err();
        assert!(matches!(err, AppError::ImageSource(_)));
    }

    #[tokio::test]
    async fn undecodable_bytes_fail_raster_decode() {
        let encoded = general_purpose::STANDARD.encode(b"not an image");
        let source = ImageSource::parse(&format!("data:image/png;base64,{}", encoded)).unwrap();
        let err = source.resolve(&reqwest::Client::new()).await.unwrap_err();
        match err {
            AppError::ImageSource(message) => {
                assert!(message.starts_with("Failed to decode image"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
