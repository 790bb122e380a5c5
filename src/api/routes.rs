use std::sync::Arc;

use axum::extract::{FromRequestParts, Path};
use axum::http::{header::AUTHORIZATION, request::Parts, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use tracing::{error, info};
use uuid::Uuid;

use crate::api::types::{
    ErrorResponse, KycDetailResponse, KycRecordResponse, KycResponse, SubmitKycRequest,
    UserSummary, VerifyKycRequest,
};
use crate::api::AppState;
use crate::errors::Result;
use crate::services::jwt::{AuthenticatedUser, JwtManager};
use crate::utils::middleware::kyc_verification;

// JWT extractor for Authorization: Bearer ...
pub struct AuthBearer(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthBearer
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        if let Some(auth) = parts.headers.get(AUTHORIZATION) {
            if let Ok(auth_str) = auth.to_str() {
                if let Some(token) = auth_str.strip_prefix("Bearer ") {
                    return Ok(AuthBearer(token.to_string()));
                }
            }
        }
        Err((
            StatusCode::UNAUTHORIZED,
            "Missing or invalid Authorization header".to_string(),
        ))
    }
}

/// Resolves the calling user from a bearer token. Session bookkeeping lives
/// with the account subsystem; only the signed claims are checked here.
pub fn authenticated_user(state: &AppState, token: &str) -> Result<AuthenticatedUser> {
    let jwt_manager = JwtManager::new(state.settings.jwt_secret.clone());
    let token_data = jwt_manager.validate_token(token)?;
    AuthenticatedUser::try_from(token_data.claims)
}

/// KYC API endpoints. The by-id lookup sits behind the verification gate,
/// like the leaderboard and group-creation flows that reuse it.
pub fn kyc_router() -> Router {
    Router::new()
        .route("/", post(submit_kyc))
        .route("/me", get(get_my_kyc))
        .route("/:id/verify-ai", post(verify_kyc_by_ai))
        .route(
            "/:id",
            get(get_kyc_by_id).layer(axum::middleware::from_fn(kyc_verification)),
        )
}

#[utoipa::path(
    post,
    path = "/api/kyc",
    request_body = SubmitKycRequest,
    responses(
        (status = 201, body = KycResponse),
        (status = 400, body = ErrorResponse),
        (status = 401, body = ErrorResponse)
    )
)]
pub async fn submit_kyc(
    Extension(state): Extension<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Json(req): Json<SubmitKycRequest>,
) -> Result<impl IntoResponse> {
    let user = authenticated_user(&state, &token)?;
    match state.kyc_service.submit(&user.user_id, &req).await {
        Ok(kyc) => {
            info!(action = "kyc_submit_success", user = %user.user_id);
            Ok((
                StatusCode::CREATED,
                Json(KycResponse {
                    message: "KYC submitted successfully".to_string(),
                    kyc,
                }),
            ))
        }
        Err(e) => {
            error!(action = "kyc_submit_failed", user = %user.user_id, error = %e);
            Err(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/kyc/me",
    responses(
        (status = 200, body = KycRecordResponse),
        (status = 404, body = ErrorResponse)
    )
)]
pub async fn get_my_kyc(
    Extension(state): Extension<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
) -> Result<impl IntoResponse> {
    let user = authenticated_user(&state, &token)?;
    let kyc = state.kyc_service.get_for_user(&user.user_id).await?;
    Ok(Json(KycRecordResponse { kyc }))
}

#[utoipa::path(
    get,
    path = "/api/kyc/{id}",
    params(("id" = Uuid, Path, description = "KYC record ID")),
    responses(
        (status = 200, body = KycDetailResponse),
        (status = 403, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    )
)]
pub async fn get_kyc_by_id(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let kyc = state.kyc_service.get_by_id(&id).await?;
    let user = state
        .database
        .get_user_by_id(&kyc.user_id)
        .await?
        .map(UserSummary::from);
    Ok(Json(KycDetailResponse { kyc, user }))
}

#[utoipa::path(
    post,
    path = "/api/kyc/{id}/verify-ai",
    params(("id" = Uuid, Path, description = "KYC record ID")),
    request_body = VerifyKycRequest,
    responses(
        (status = 200, body = KycResponse),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    )
)]
pub async fn verify_kyc_by_ai(
    Extension(state): Extension<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Path(id): Path<Uuid>,
    Json(req): Json<VerifyKycRequest>,
) -> Result<impl IntoResponse> {
    let user = authenticated_user(&state, &token)?;
    match state.kyc_service.verify_by_ai(&id, &req).await {
        Ok(kyc) => {
            info!(action = "kyc_ai_verify_updated", user = %user.user_id, record = %id);
            Ok(Json(KycResponse {
                message: "KYC AI verification updated".to_string(),
                kyc,
            }))
        }
        Err(e) => {
            error!(action = "kyc_ai_verify_failed", user = %user.user_id, record = %id, error = %e);
            Err(e)
        }
    }
}
