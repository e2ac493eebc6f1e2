use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use adsync_core::error::AppError;
use adsync_core::task_queue::TaskQueue;

use crate::auth::require_api_key;
use crate::dto::{
    AccountResponse, CreateTaskResponse, CustomersResponse, ErrorResponse, HealthResponse,
    ListTasksQuery, MessageResponse, StageResponse, TaskListResponse, TaskResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/get_customers", get(get_customers))
        .route("/v1/get_campaigns", get(get_campaigns))
        .route("/v1/get_adgroups", get(get_adgroups))
        .route("/v1/get_adgroupads", get(get_adgroupads))
        .route("/v1/get_all", get(get_all))
        .route("/v1/clear", get(clear))
        .route("/v1/tasks", get(list_tasks))
        .route("/v1/tasks/{id}", get(get_task).delete(cancel_task))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

fn not_found(id: Uuid) -> axum::response::Response {
    let body = ErrorResponse {
        error: "not_found".to_string(),
        message: format!("Task not found: {id}"),
    };
    (StatusCode::NOT_FOUND, axum::Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/get_customers",
    responses(
        (status = 200, description = "Roster loaded and cached", body = CustomersResponse),
        (status = 502, description = "Upstream failure", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "stages"
)]
pub async fn get_customers(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let refresh = state.orchestrator.refresh_accounts().await?;

    let response = CustomersResponse {
        status: refresh.report.to_string(),
        date: refresh.context.date,
        accounts: refresh
            .context
            .accounts
            .iter()
            .map(AccountResponse::from)
            .collect(),
    };

    Ok(axum::Json(response))
}

#[utoipa::path(
    get,
    path = "/v1/get_campaigns",
    responses(
        (status = 200, description = "Stage dispatched or skipped", body = StageResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "stages"
)]
pub async fn get_campaigns(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.orchestrator.refresh_campaigns().await?;
    Ok(axum::Json(StageResponse::from(report)))
}

#[utoipa::path(
    get,
    path = "/v1/get_adgroups",
    responses(
        (status = 200, description = "Stage dispatched or skipped", body = StageResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "stages"
)]
pub async fn get_adgroups(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.orchestrator.refresh_ad_groups().await?;
    Ok(axum::Json(StageResponse::from(report)))
}

#[utoipa::path(
    get,
    path = "/v1/get_adgroupads",
    responses(
        (status = 200, description = "Stage dispatched or skipped", body = StageResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "stages"
)]
pub async fn get_adgroupads(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.orchestrator.refresh_ad_group_ads().await?;
    Ok(axum::Json(StageResponse::from(report)))
}

#[utoipa::path(
    get,
    path = "/v1/get_all",
    responses(
        (status = 202, description = "Full cycle enqueued", body = CreateTaskResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "stages"
)]
pub async fn get_all(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let task = state.orchestrator.refresh_all().await?;

    let response = CreateTaskResponse {
        task_id: task.id,
        status: task.status.to_string(),
    };

    Ok((StatusCode::ACCEPTED, axum::Json(response)))
}

#[utoipa::path(
    get,
    path = "/v1/clear",
    responses(
        (status = 200, description = "Roster cache cleared", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "stages"
)]
pub async fn clear(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.orchestrator.clear();
    axum::Json(MessageResponse {
        status: "Roster cleared".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/tasks",
    params(ListTasksQuery),
    responses(
        (status = 200, description = "List of tasks", body = TaskListResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "tasks"
)]
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status_filter = query
        .status
        .map(|s| s.parse().map_err(|e: String| AppError::Generic(e)))
        .transpose()?;

    let limit = query.limit.unwrap_or(20).min(100);
    let tasks = state.db.task_repo().list_tasks(status_filter, limit).await?;
    let total = tasks.len();

    let response = TaskListResponse {
        tasks: tasks.into_iter().map(TaskResponse::from).collect(),
        total,
    };

    Ok(axum::Json(response))
}

#[utoipa::path(
    get,
    path = "/v1/tasks/{id}",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task details", body = TaskResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "tasks"
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.db.task_repo().get_task(id).await? {
        Some(task) => Ok(axum::Json(TaskResponse::from(task)).into_response()),
        None => Ok(not_found(id)),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/tasks/{id}",
    params(
        ("id" = Uuid, Path, description = "Task ID")
    ),
    responses(
        (status = 204, description = "Task cancelled"),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Conflict", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "tasks"
)]
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = state.db.task_repo();
    match repo.get_task(id).await? {
        Some(task) if task.status.is_terminal() => {
            let body = ErrorResponse {
                error: "conflict".to_string(),
                message: format!("Task {id} is already in terminal state: {}", task.status),
            };
            Ok((StatusCode::CONFLICT, axum::Json(body)).into_response())
        }
        Some(_) => {
            repo.cancel_task(id).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        None => Ok(not_found(id)),
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state.db.health_check().await.is_ok();

    let (status, response) = if healthy {
        (
            StatusCode::OK,
            HealthResponse {
                status: "healthy",
                database: "ok",
            },
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            HealthResponse {
                status: "unhealthy",
                database: "error",
            },
        )
    };

    (status, axum::Json(response))
}
