use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{ActorRole, Phase, PhaseDescriptor, RegistryError, RoleDescriptor, TenderId};
use super::machine::{TenderAction, TransitionEffect};
use super::repository::{RepositoryError, TenderFilter, TenderRepository, TenderView};
use super::service::{TenderDraft, TenderServiceError, TenderWorkflowService};

/// Header carrying the authenticated principal's role.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Deserialize)]
pub(crate) struct ActionRequest {
    action: TenderAction,
}

#[derive(Debug, Serialize)]
pub(crate) struct ActionResponse {
    tender: TenderView,
    effect: TransitionEffect,
}

#[derive(Debug, Serialize)]
pub(crate) struct DivisionResolution {
    division: String,
    direction: &'static str,
    direction_name: Option<&'static str>,
}

/// Router exposing the tender workflow to the presentation layer.
pub fn tender_router<R>(service: Arc<TenderWorkflowService<R>>) -> Router
where
    R: TenderRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/tenders",
            post(create_handler::<R>).get(list_handler::<R>),
        )
        .route("/api/v1/tenders/:tender_id", get(get_handler::<R>))
        .route(
            "/api/v1/tenders/:tender_id/actions",
            post(action_handler::<R>),
        )
        .route("/api/v1/dashboard", get(dashboard_handler::<R>))
        .route(
            "/api/v1/directory/divisions/:division",
            get(division_handler::<R>),
        )
        .route("/api/v1/roles", get(roles_handler))
        .route("/api/v1/phases", get(phases_handler))
        .with_state(service)
}

/// Reads the acting role from [`ACTOR_ROLE_HEADER`].
pub fn actor_role(headers: &HeaderMap) -> Result<ActorRole, Response> {
    let raw = headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            error_body(
                StatusCode::UNAUTHORIZED,
                format!("missing {ACTOR_ROLE_HEADER} header"),
            )
        })?;
    raw.parse()
        .map_err(|err: RegistryError| error_body(StatusCode::BAD_REQUEST, err.to_string()))
}

pub(crate) async fn create_handler<R>(
    State(service): State<Arc<TenderWorkflowService<R>>>,
    headers: HeaderMap,
    Json(draft): Json<TenderDraft>,
) -> Response
where
    R: TenderRepository + 'static,
{
    let role = match actor_role(&headers) {
        Ok(role) => role,
        Err(response) => return response,
    };

    match service.create(draft, role, Utc::now()) {
        Ok(record) => {
            let view = record.view(service.machine());
            (StatusCode::CREATED, Json(view)).into_response()
        }
        Err(err) => service_error(err),
    }
}

pub(crate) async fn list_handler<R>(
    State(service): State<Arc<TenderWorkflowService<R>>>,
    Query(filter): Query<TenderFilter>,
) -> Response
where
    R: TenderRepository + 'static,
{
    match service.list(&filter) {
        Ok(records) => {
            let views: Vec<TenderView> = records
                .iter()
                .map(|record| record.view(service.machine()))
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => service_error(err),
    }
}

pub(crate) async fn get_handler<R>(
    State(service): State<Arc<TenderWorkflowService<R>>>,
    Path(tender_id): Path<String>,
) -> Response
where
    R: TenderRepository + 'static,
{
    match service.get(&TenderId(tender_id)) {
        Ok(record) => (StatusCode::OK, Json(record.view(service.machine()))).into_response(),
        Err(err) => service_error(err),
    }
}

pub(crate) async fn action_handler<R>(
    State(service): State<Arc<TenderWorkflowService<R>>>,
    Path(tender_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ActionRequest>,
) -> Response
where
    R: TenderRepository + 'static,
{
    let role = match actor_role(&headers) {
        Ok(role) => role,
        Err(response) => return response,
    };

    let id = TenderId(tender_id);
    match service.act_with_retry(&id, role, request.action, Utc::now()) {
        Ok(outcome) => {
            let body = ActionResponse {
                tender: outcome.record.view(service.machine()),
                effect: outcome.effect,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => service_error(err),
    }
}

pub(crate) async fn dashboard_handler<R>(
    State(service): State<Arc<TenderWorkflowService<R>>>,
) -> Response
where
    R: TenderRepository + 'static,
{
    match service.dashboard() {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => service_error(err),
    }
}

pub(crate) async fn division_handler<R>(
    State(service): State<Arc<TenderWorkflowService<R>>>,
    Path(division): Path<String>,
) -> Response
where
    R: TenderRepository + 'static,
{
    let directory = service.directory();
    match directory.resolve_direction(&division) {
        Ok(direction) => {
            let body = DivisionResolution {
                division,
                direction,
                direction_name: directory.direction(direction).map(|found| found.name),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => service_error(err.into()),
    }
}

pub(crate) async fn roles_handler() -> Json<Vec<RoleDescriptor>> {
    Json(
        ActorRole::ordered()
            .into_iter()
            .map(ActorRole::describe)
            .collect(),
    )
}

pub(crate) async fn phases_handler() -> Json<Vec<PhaseDescriptor>> {
    Json(Phase::ordered().into_iter().map(Phase::describe).collect())
}

/// Maps service failures onto HTTP statuses with a JSON `error` body.
pub fn service_error(err: TenderServiceError) -> Response {
    let status = match &err {
        TenderServiceError::Directory(_) => StatusCode::BAD_REQUEST,
        TenderServiceError::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TenderServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        TenderServiceError::Repository(
            RepositoryError::Conflict | RepositoryError::ConcurrentModification { .. },
        ) => StatusCode::CONFLICT,
        TenderServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    match err {
        TenderServiceError::Transition(transition) => {
            let payload = json!({
                "error": transition.to_string(),
                "precondition": transition.precondition(),
            });
            (status, Json(payload)).into_response()
        }
        other => error_body(status, other.to_string()),
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
