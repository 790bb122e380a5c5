use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum::Extension;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::info;

use crate::api::routes::authenticated_user;
use crate::api::AppState;
use crate::errors::AppError;

static RATE_LIMITER: Lazy<DashMap<String, (u32, Instant)>> = Lazy::new(DashMap::new);

/// Per-IP request budget over a one second window.
pub async fn global_rate_limiter(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    let ip = request
        .extensions()
        .get::<std::net::SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let now = Instant::now();
    let limited = {
        let mut entry = RATE_LIMITER.entry(ip).or_insert((0, now));
        if now.duration_since(entry.1) > Duration::from_secs(1) {
            *entry = (1, now);
        } else {
            entry.0 += 1;
        }
        u64::from(entry.0) > state.settings.rate_limit_per_sec
    };

    if limited {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(request).await)
}

/// Blocks the request until the caller has passed KYC verification. This is
/// the gate the group-creation and leaderboard routes sit behind; here it
/// guards the administrative by-id lookup.
pub async fn kyc_verification(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    let token = bearer_token(&request).ok_or_else(|| {
        AppError::Authentication("Missing or invalid Authorization header".to_string())
    })?;

    let user = authenticated_user(&state, &token)?;
    let record = state.kyc_service.ensure_verified(&user.user_id).await?;
    info!(action = "kyc_gate_passed", user = %user.user_id, record = %record.id);

    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}
