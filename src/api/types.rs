use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::kyc::KycRecord;
use crate::models::user::User;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitKycRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub national_id: Option<String>,
    pub id_image: Option<String>,
    pub selfie_image: Option<String>,
}

impl SubmitKycRequest {
    /// Wire names of required fields that are absent or blank, in submission
    /// order.
    pub fn missing_fields(&self) -> Vec<String> {
        let fields = [
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("nationalId", &self.national_id),
            ("idImage", &self.id_image),
            ("selfieImage", &self.selfie_image),
        ];
        fields
            .iter()
            .filter(|(_, value)| is_blank(value))
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyKycRequest {
    pub id_image: Option<String>,
    pub selfie_image: Option<String>,
}

impl VerifyKycRequest {
    pub fn missing_fields(&self) -> Vec<String> {
        let fields = [
            ("idImage", &self.id_image),
            ("selfieImage", &self.selfie_image),
        ];
        fields
            .iter()
            .filter(|(_, value)| is_blank(value))
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KycResponse {
    pub message: String,
    pub kyc: KycRecord,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KycRecordResponse {
    pub kyc: KycRecord,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KycDetailResponse {
    pub kyc: KycRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MatchFailureDetails {
    pub distance: f64,
    pub threshold: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<MatchFailureDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_reports_wire_names_in_order() {
        let payload = SubmitKycRequest {
            first_name: Some("  ".to_string()),
            last_name: Some("Lovelace".to_string()),
            national_id: None,
            id_image: Some("data:image/png;base64,AAAA".to_string()),
            selfie_image: None,
        };

        assert_eq!(
            payload.missing_fields(),
            vec!["firstName", "nationalId", "selfieImage"]
        );
    }

    #[test]
    fn complete_payload_has_no_missing_fields() {
        let payload = SubmitKycRequest {
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            national_id: Some("X123".to_string()),
            id_image: Some("id.png".to_string()),
            selfie_image: Some("selfie.png".to_string()),
        };

        assert!(payload.missing_fields().is_empty());
    }
}
