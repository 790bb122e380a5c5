use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One verification record per user. The image hashes are one-way digests of
/// the most recent successfully matched submission; raw image bytes are never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KycRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub national_id: String,
    pub id_image_hash: String,
    pub selfie_image_hash: String,
    pub ai_verified: bool,
    pub admin_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KycRecord {
    pub fn is_verified(&self) -> bool {
        self.ai_verified || self.admin_verified
    }
}
