use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::Settings;
use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::services::face_engine::FaceEngine;
use crate::services::face_match::FaceMatchService;
use crate::services::kyc_service::KycService;
use crate::utils::middleware::global_rate_limiter;

pub mod routes;
pub mod types;

/// Shared application state: one database pool, one verification pipeline.
pub struct AppState {
    pub database: Arc<SqliteDatabase>,
    pub kyc_service: Arc<KycService>,
    pub settings: Settings,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::submit_kyc,
        routes::get_my_kyc,
        routes::get_kyc_by_id,
        routes::verify_kyc_by_ai,
    ),
    components(
        schemas(
            types::SubmitKycRequest,
            types::VerifyKycRequest,
            types::KycResponse,
            types::KycRecordResponse,
            types::KycDetailResponse,
            types::UserSummary,
            types::ErrorResponse,
            types::MatchFailureDetails,
            crate::models::kyc::KycRecord,
        )
    ),
    tags(
        (name = "KYC", description = "Identity verification endpoints. All endpoints require JWT authentication: use the Authorize button and paste your token as 'Bearer <token>'.")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
        openapi.security = Some(vec![utoipa::openapi::security::SecurityRequirement::new(
            "bearerAuth",
            Vec::<String>::new(),
        )]);
    }
}

pub async fn request_id_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(request_id.clone());
    let span = tracing::info_span!("request", request_id = %request_id, method = %req.method(), uri = %req.uri());
    next.run(req).instrument(span).await
}

/// Main entry point for the tontine API server.
/// Wires the verification pipeline, middleware and documentation endpoints.
pub async fn start_http_server() -> Result<()> {
    let settings = Settings::from_env()?;
    let database = Arc::new(SqliteDatabase::new(&settings.database_path).await?);
    let engine = Arc::new(FaceEngine::new(settings.face_model_dir.clone()));
    let matcher = Arc::new(FaceMatchService::new(engine, &settings)?);
    let kyc_service = Arc::new(KycService::new(database.clone(), matcher));
    let state = Arc::new(AppState {
        database,
        kyc_service,
        settings: settings.clone(),
    });

    let openapi = ApiDoc::openapi();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api/kyc", routes::kyc_router())
        .route("/health", get(health_check))
        .route("/docs/openapi.json", get(openapi_json))
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", openapi))
        .layer(axum::middleware::from_fn(global_rate_limiter))
        .layer(Extension(state))
        .layer(cors)
        .layer(axum::middleware::from_fn(request_id_middleware));

    let addr: SocketAddr = format!("0.0.0.0:{}", settings.port)
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid listen address: {}", e)))?;

    tracing::info!(action = "http_server_start", addr = %addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Config(format!("HTTP server error: {}", e)))
}

async fn health_check() -> impl IntoResponse {
    "OK"
}

/// Export OpenAPI specification as JSON
async fn openapi_json() -> Json<Value> {
    let openapi = ApiDoc::openapi();
    Json(serde_json::to_value(openapi).unwrap_or(Value::Null))
}
