//! Embedding migration HTTP server.
//!
//! Exposes recommendations, model switching and the migration task
//! lifecycle over JSON. Handlers are thin: every decision is made by
//! [`MigrationService`].

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{
    EmbeddingModelIdentity, MigrationRecommendation, MigrationRequest, MigrationStatus,
    MigrationTask, ServerConfig,
};
use crate::domain::ports::MigrationFilter;
use crate::services::MigrationService;

/// Query parameters for the recommendation endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RecommendationParams {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

/// Query parameters for migration listing.
#[derive(Debug, Deserialize)]
pub struct MigrationQueryParams {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// A task snapshot plus its completion ratio.
#[derive(Debug, Serialize, Deserialize)]
pub struct MigrationTaskResponse {
    #[serde(flatten)]
    pub task: MigrationTask,
    pub progress: f64,
}

impl From<MigrationTask> for MigrationTaskResponse {
    fn from(task: MigrationTask) -> Self {
        Self {
            progress: task.progress(),
            task,
        }
    }
}

/// Response to a created migration.
#[derive(Debug, Serialize, Deserialize)]
pub struct MigrationCreatedResponse {
    pub task_id: Uuid,
    pub task: MigrationTaskResponse,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn status_for(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Conflict { .. } | DomainError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        DomainError::InvalidScope(_) | DomainError::ValidationFailed(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DomainError::ProviderFailure { .. } => StatusCode::BAD_GATEWAY,
        DomainError::LedgerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::MigrationNotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        DomainError::DatabaseError(_)
        | DomainError::SerializationError(_)
        | DomainError::ExecutionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: &DomainError) -> ApiError {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(error = %err, code = err.code(), "Request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error: message.into(),
            code: "validation_failed".to_string(),
        }),
    )
}

/// Shared state for the migration HTTP server.
struct AppState {
    service: Arc<MigrationService>,
}

/// Migration HTTP Server.
pub struct MigrationHttpServer {
    config: ServerConfig,
    service: Arc<MigrationService>,
}

impl MigrationHttpServer {
    pub fn new(service: Arc<MigrationService>, config: ServerConfig) -> Self {
        Self { config, service }
    }

    /// Build the router.
    pub fn build_router(&self) -> Router {
        let state = Arc::new(AppState {
            service: Arc::clone(&self.service),
        });

        let app = Router::new()
            .route("/api/v1/embedding/recommendation", get(get_recommendation))
            .route("/api/v1/embedding/model", put(set_current_model))
            .route(
                "/api/v1/embedding/migrations",
                post(create_migration).get(list_migrations),
            )
            .route("/api/v1/embedding/migrations/{id}", get(get_migration))
            .route("/api/v1/embedding/migrations/{id}/cancel", post(cancel_migration))
            .route("/health", get(health_check))
            .with_state(state);

        if self.config.enable_cors {
            app.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
                .layer(TraceLayer::new_for_http())
        } else {
            app.layer(TraceLayer::new_for_http())
        }
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(
        self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve_on<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        tracing::info!(addr = %listener.local_addr()?, "Migration HTTP server listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn get_recommendation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecommendationParams>,
) -> Result<Json<MigrationRecommendation>, ApiError> {
    let model = match (params.model_name, params.provider) {
        (Some(model_name), Some(provider)) => Some(EmbeddingModelIdentity::new(model_name, provider)),
        (None, None) => None,
        _ => return Err(bad_request("model_name and provider must be given together")),
    };

    state
        .service
        .get_recommendation(model)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

async fn set_current_model(
    State(state): State<Arc<AppState>>,
    Json(model): Json<EmbeddingModelIdentity>,
) -> Result<Json<MigrationRecommendation>, ApiError> {
    state
        .service
        .set_current_model(model)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

async fn create_migration(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MigrationRequest>,
) -> Result<(StatusCode, Json<MigrationCreatedResponse>), ApiError> {
    let task = state
        .service
        .start_migration(req)
        .await
        .map_err(|e| api_error(&e))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MigrationCreatedResponse {
            task_id: task.id,
            task: task.into(),
        }),
    ))
}

async fn list_migrations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MigrationQueryParams>,
) -> Result<Json<Vec<MigrationTaskResponse>>, ApiError> {
    let status = match params.status.as_deref() {
        Some(s) => Some(
            MigrationStatus::from_str(s)
                .ok_or_else(|| bad_request(format!("unknown status '{s}'")))?,
        ),
        None => None,
    };

    let tasks = state
        .service
        .list(MigrationFilter {
            status,
            include_archived: params.include_archived,
            limit: Some(params.limit.clamp(1, 1000)),
        })
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(tasks.into_iter().map(MigrationTaskResponse::from).collect()))
}

async fn get_migration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MigrationTaskResponse>, ApiError> {
    state
        .service
        .get_status(id)
        .await
        .map(|task| Json(task.into()))
        .map_err(|e| api_error(&e))
}

async fn cancel_migration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MigrationTaskResponse>, ApiError> {
    state
        .service
        .cancel(id)
        .await
        .map(|task| Json(task.into()))
        .map_err(|e| api_error(&e))
}
