use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use tontine_backend::api::types::{SubmitKycRequest, VerifyKycRequest};
use tontine_backend::database::sqlite::SqliteDatabase;
use tontine_backend::errors::{AppError, Result};
use tontine_backend::models::user::User;
use tontine_backend::services::face_match::{evaluate_match, FaceComparison, FaceMatcher};
use tontine_backend::services::image_source::hash_image_source;
use tontine_backend::services::kyc_service::KycService;

const THRESHOLD: f64 = 0.45;

const ADA_ID_IMAGE: &str = "https://example.com/ada-id.png";
const ADA_SELFIE_IMAGE: &str = "https://example.com/ada-selfie.png";

struct StubMatcher {
    distance: f64,
}

#[async_trait]
impl FaceMatcher for StubMatcher {
    async fn compare(&self, _id_image: &str, _selfie_image: &str) -> Result<FaceComparison> {
        Ok(FaceComparison {
            distance: self.distance,
            threshold: THRESHOLD,
            matches: evaluate_match(self.distance, THRESHOLD),
        })
    }
}

struct NoFaceMatcher;

#[async_trait]
impl FaceMatcher for NoFaceMatcher {
    async fn compare(&self, _id_image: &str, _selfie_image: &str) -> Result<FaceComparison> {
        Err(AppError::NoFaceDetected)
    }
}

async fn database_in(dir: &TempDir) -> Arc<SqliteDatabase> {
    let path = dir.path().join("kyc-test.db");
    Arc::new(SqliteDatabase::new(path.to_str().unwrap()).await.unwrap())
}

fn service_with(database: Arc<SqliteDatabase>, distance: f64) -> KycService {
    KycService::new(database, Arc::new(StubMatcher { distance }))
}

fn ada_submission() -> SubmitKycRequest {
    SubmitKycRequest {
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        national_id: Some("X123".to_string()),
        id_image: Some(ADA_ID_IMAGE.to_string()),
        selfie_image: Some(ADA_SELFIE_IMAGE.to_string()),
    }
}

#[tokio::test]
async fn submit_with_matching_faces_creates_verified_record() {
    let dir = TempDir::new().unwrap();
    let service = service_with(database_in(&dir).await, 0.2);
    let user_id = Uuid::new_v4();

    let record = service.submit(&user_id, &ada_submission()).await.unwrap();

    assert_eq!(record.user_id, user_id);
    assert_eq!(record.first_name, "Ada");
    assert_eq!(record.last_name, "Lovelace");
    assert_eq!(record.national_id, "X123");
    assert!(record.ai_verified);
    assert!(!record.admin_verified);
    assert!(!record.id_image_hash.is_empty());
    assert!(!record.selfie_image_hash.is_empty());
    assert_ne!(record.id_image_hash, ADA_ID_IMAGE);
    assert_ne!(record.selfie_image_hash, ADA_SELFIE_IMAGE);
}

#[tokio::test]
async fn submit_with_mismatched_faces_reports_detail_and_persists_unverified() {
    let dir = TempDir::new().unwrap();
    let service = service_with(database_in(&dir).await, 0.9);
    let user_id = Uuid::new_v4();

    let err = service
        .submit(&user_id, &ada_submission())
        .await
        .unwrap_err();
    match err {
        AppError::MatchFailed {
            distance,
            threshold,
        } => {
            assert_eq!(distance, 0.9);
            assert_eq!(threshold, THRESHOLD);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // The failure is observable on the record, but no hashes were stored.
    let record = service.get_for_user(&user_id).await.unwrap();
    assert!(!record.ai_verified);
    assert!(record.id_image_hash.is_empty());
    assert!(record.selfie_image_hash.is_empty());
}

#[tokio::test]
async fn missing_national_id_is_rejected_without_mutation() {
    let dir = TempDir::new().unwrap();
    let service = service_with(database_in(&dir).await, 0.2);
    let user_id = Uuid::new_v4();

    let mut payload = ada_submission();
    payload.national_id = None;

    let err = service.submit(&user_id, &payload).await.unwrap_err();
    match err {
        AppError::Validation { missing } => {
            assert_eq!(missing, vec!["nationalId".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert!(matches!(
        service.get_for_user(&user_id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn resubmission_keeps_one_record_per_user() {
    let dir = TempDir::new().unwrap();
    let service = service_with(database_in(&dir).await, 0.2);
    let user_id = Uuid::new_v4();

    let first = service.submit(&user_id, &ada_submission()).await.unwrap();

    let mut second_payload = ada_submission();
    second_payload.first_name = Some("Augusta".to_string());
    let second = service.submit(&user_id, &second_payload).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.first_name, "Augusta");

    let stored = service.get_for_user(&user_id).await.unwrap();
    assert_eq!(stored.id, first.id);
    assert_eq!(stored.first_name, "Augusta");
}

#[tokio::test]
async fn failed_resubmission_flips_flag_but_keeps_previous_hashes() {
    let dir = TempDir::new().unwrap();
    let database = database_in(&dir).await;
    let passing = service_with(database.clone(), 0.2);
    let failing = service_with(database.clone(), 0.9);
    let user_id = Uuid::new_v4();

    let verified = passing.submit(&user_id, &ada_submission()).await.unwrap();
    assert!(verified.ai_verified);

    let err = failing
        .submit(&user_id, &ada_submission())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MatchFailed { .. }));

    let record = passing.get_for_user(&user_id).await.unwrap();
    assert!(!record.ai_verified);
    assert_eq!(record.id_image_hash, verified.id_image_hash);
    assert_eq!(record.selfie_image_hash, verified.selfie_image_hash);
}

#[tokio::test]
async fn no_face_detected_aborts_without_a_record() {
    let dir = TempDir::new().unwrap();
    let service = KycService::new(database_in(&dir).await, Arc::new(NoFaceMatcher));
    let user_id = Uuid::new_v4();

    let err = service
        .submit(&user_id, &ada_submission())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoFaceDetected));

    assert!(matches!(
        service.get_for_user(&user_id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn gate_requires_a_verified_flag() {
    let dir = TempDir::new().unwrap();
    let database = database_in(&dir).await;
    let failing = service_with(database.clone(), 0.9);
    let user_id = Uuid::new_v4();

    // No record yet: distinct from "record exists but unverified".
    assert!(matches!(
        failing.ensure_verified(&user_id).await,
        Err(AppError::NotFound(_))
    ));

    let _ = failing.submit(&user_id, &ada_submission()).await.unwrap_err();
    match failing.ensure_verified(&user_id).await {
        Err(AppError::AccessDenied(message)) => {
            assert_eq!(message, "KYC verification required");
        }
        other => panic!("unexpected gate outcome: {:?}", other),
    }

    let passing = service_with(database.clone(), 0.2);
    passing.submit(&user_id, &ada_submission()).await.unwrap();
    let gated = passing.ensure_verified(&user_id).await.unwrap();
    assert!(gated.ai_verified);
}

#[tokio::test]
async fn admin_flag_alone_opens_the_gate() {
    let dir = TempDir::new().unwrap();
    let database = database_in(&dir).await;
    let service = service_with(database.clone(), 0.9);
    let user_id = Uuid::new_v4();

    let _ = service.submit(&user_id, &ada_submission()).await.unwrap_err();
    let record = service.get_for_user(&user_id).await.unwrap();

    service.set_admin_verified(&record.id, true).await.unwrap();

    let gated = service.ensure_verified(&user_id).await.unwrap();
    assert!(gated.admin_verified);
    assert!(!gated.ai_verified);
}

#[tokio::test]
async fn verify_by_ai_requires_existing_record_and_both_images() {
    let dir = TempDir::new().unwrap();
    let service = service_with(database_in(&dir).await, 0.2);

    let err = service
        .verify_by_ai(&Uuid::new_v4(), &VerifyKycRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let user_id = Uuid::new_v4();
    let record = service.submit(&user_id, &ada_submission()).await.unwrap();

    let err = service
        .verify_by_ai(&record.id, &VerifyKycRequest::default())
        .await
        .unwrap_err();
    match err {
        AppError::Validation { missing } => {
            assert_eq!(
                missing,
                vec!["idImage".to_string(), "selfieImage".to_string()]
            );
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn verify_by_ai_refreshes_hashes_on_match() {
    let dir = TempDir::new().unwrap();
    let service = service_with(database_in(&dir).await, 0.2);
    let user_id = Uuid::new_v4();

    let record = service.submit(&user_id, &ada_submission()).await.unwrap();

    let new_id_image = "data:image/png;base64,aGVsbG8=";
    let new_selfie_image = "https://example.com/ada-new-selfie.png";
    let payload = VerifyKycRequest {
        id_image: Some(new_id_image.to_string()),
        selfie_image: Some(new_selfie_image.to_string()),
    };

    let updated = service.verify_by_ai(&record.id, &payload).await.unwrap();
    assert!(updated.ai_verified);
    assert_eq!(updated.id_image_hash, hash_image_source(new_id_image));
    assert_eq!(
        updated.selfie_image_hash,
        hash_image_source(new_selfie_image)
    );
    assert_ne!(updated.id_image_hash, record.id_image_hash);
}

#[tokio::test]
async fn verify_by_ai_mismatch_persists_false_and_keeps_hashes() {
    let dir = TempDir::new().unwrap();
    let database = database_in(&dir).await;
    let passing = service_with(database.clone(), 0.2);
    let failing = service_with(database.clone(), 0.9);
    let user_id = Uuid::new_v4();

    let record = passing.submit(&user_id, &ada_submission()).await.unwrap();

    let payload = VerifyKycRequest {
        id_image: Some(ADA_ID_IMAGE.to_string()),
        selfie_image: Some(ADA_SELFIE_IMAGE.to_string()),
    };
    let err = failing.verify_by_ai(&record.id, &payload).await.unwrap_err();
    match err {
        AppError::MatchFailed {
            distance,
            threshold,
        } => {
            assert_eq!(distance, 0.9);
            assert_eq!(threshold, THRESHOLD);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let stored = failing.get_by_id(&record.id).await.unwrap();
    assert!(!stored.ai_verified);
    assert_eq!(stored.id_image_hash, record.id_image_hash);
}

#[tokio::test]
async fn user_read_model_round_trips() {
    let dir = TempDir::new().unwrap();
    let database = database_in(&dir).await;

    let user = User {
        id: Uuid::new_v4(),
        username: "ada".to_string(),
        email: "ada@example.com".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    database.create_user(&user).await.unwrap();

    let stored = database.get_user_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.username, "ada");
    assert_eq!(stored.email, "ada@example.com");

    assert!(database
        .get_user_by_id(&Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
}
