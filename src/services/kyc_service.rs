use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::api::types::{SubmitKycRequest, VerifyKycRequest};
use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::kyc::KycRecord;
use crate::services::face_match::FaceMatcher;
use crate::services::image_source::hash_image_source;

pub struct KycService {
    database: Arc<SqliteDatabase>,
    matcher: Arc<dyn FaceMatcher>,
}

impl KycService {
    pub fn new(database: Arc<SqliteDatabase>, matcher: Arc<dyn FaceMatcher>) -> Self {
        Self { database, matcher }
    }

    /// Submits a claimed identity with an ID document and selfie reference.
    /// A failed match is persisted (`ai_verified = false`) before the error
    /// returns; hashes from an earlier successful match are left untouched.
    pub async fn submit(&self, user_id: &Uuid, payload: &SubmitKycRequest) -> Result<KycRecord> {
        let missing = payload.missing_fields();
        if !missing.is_empty() {
            return Err(AppError::Validation { missing });
        }

        let id_image = payload.id_image.as_deref().unwrap_or_default();
        let selfie_image = payload.selfie_image.as_deref().unwrap_or_default();
        let first_name = trimmed(&payload.first_name);
        let last_name = trimmed(&payload.last_name);
        let national_id = trimmed(&payload.national_id);

        let comparison = self.matcher.compare(id_image, selfie_image).await?;
        debug!(
            user = %user_id,
            distance = comparison.distance,
            threshold = comparison.threshold,
            matches = comparison.matches,
            "face comparison complete"
        );

        if !comparison.matches {
            self.database
                .upsert_kyc_unmatched(user_id, &first_name, &last_name, &national_id)
                .await?;
            return Err(AppError::MatchFailed {
                distance: comparison.distance,
                threshold: comparison.threshold,
            });
        }

        self.database
            .upsert_kyc_matched(
                user_id,
                &first_name,
                &last_name,
                &national_id,
                &hash_image_source(id_image),
                &hash_image_source(selfie_image),
            )
            .await
    }

    pub async fn get_for_user(&self, user_id: &Uuid) -> Result<KycRecord> {
        self.database
            .get_kyc_by_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("KYC record not found".to_string()))
    }

    pub async fn get_by_id(&self, kyc_id: &Uuid) -> Result<KycRecord> {
        self.database
            .get_kyc_by_id(kyc_id)
            .await?
            .ok_or_else(|| AppError::NotFound("KYC record not found".to_string()))
    }

    /// Administrative re-run of the comparison against freshly supplied
    /// images. The stored hashes are not reversible and cannot be
    /// re-compared.
    pub async fn verify_by_ai(
        &self,
        kyc_id: &Uuid,
        payload: &VerifyKycRequest,
    ) -> Result<KycRecord> {
        let record = self.get_by_id(kyc_id).await?;

        let missing = payload.missing_fields();
        if !missing.is_empty() {
            return Err(AppError::Validation { missing });
        }

        let id_image = payload.id_image.as_deref().unwrap_or_default();
        let selfie_image = payload.selfie_image.as_deref().unwrap_or_default();

        let comparison = self.matcher.compare(id_image, selfie_image).await?;

        if !comparison.matches {
            self.database
                .update_kyc_ai_result(&record.id, false, None)
                .await?;
            return Err(AppError::MatchFailed {
                distance: comparison.distance,
                threshold: comparison.threshold,
            });
        }

        let id_hash = hash_image_source(id_image);
        let selfie_hash = hash_image_source(selfie_image);
        self.database
            .update_kyc_ai_result(&record.id, true, Some((&id_hash, &selfie_hash)))
            .await?;

        self.get_by_id(kyc_id).await
    }

    /// Privileged human elevation of the admin flag; the automated path never
    /// touches it. Exposed to the admin collaborator, not over this core's
    /// HTTP surface.
    pub async fn set_admin_verified(&self, kyc_id: &Uuid, verified: bool) -> Result<KycRecord> {
        let record = self.get_by_id(kyc_id).await?;
        self.database
            .set_kyc_admin_verified(&record.id, verified)
            .await?;
        self.get_by_id(kyc_id).await
    }

    /// Verification gate: the only interface other subsystems (group
    /// creation, leaderboards) may use to check a user's status, so the
    /// policy can evolve without touching callers.
    pub async fn ensure_verified(&self, user_id: &Uuid) -> Result<KycRecord> {
        let record = self.get_for_user(user_id).await?;
        if !record.is_verified() {
            return Err(AppError::AccessDenied("KYC verification required".to_string()));
        }
        Ok(record)
    }
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().unwrap_or_default().trim().to_string()
}
