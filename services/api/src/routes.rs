use crate::infra::AppState;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tender_desk::workflows::tender::{
    actor_role, service_error, tender_router, ActorRole, RoleDescriptor, TenderFilter,
    TenderRepository, TenderStatus, TenderView, TenderWorkflowService,
};

/// Screen a role lands on after authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LandingView {
    Overview,
    TenderRegister,
    SignOffQueue,
    ReadOnlyRegister,
}

pub(crate) fn landing_view(role: ActorRole) -> LandingView {
    match role {
        ActorRole::Admin => LandingView::Overview,
        ActorRole::MarketsService => LandingView::TenderRegister,
        ActorRole::TechnicalService
        | ActorRole::StateControl
        | ActorRole::BudgetService
        | ActorRole::TreasurerPayer => LandingView::SignOffQueue,
        ActorRole::SchedulingService => LandingView::ReadOnlyRegister,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LandingResponse {
    pub(crate) role: RoleDescriptor,
    pub(crate) view: LandingView,
    pub(crate) pending: Vec<TenderView>,
}

pub(crate) fn with_tender_routes<R>(service: Arc<TenderWorkflowService<R>>) -> Router
where
    R: TenderRepository + 'static,
{
    tender_router(service.clone())
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/me/landing", get(landing_endpoint::<R>))
        .layer(Extension(service))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn landing_endpoint<R>(
    Extension(service): Extension<Arc<TenderWorkflowService<R>>>,
    headers: HeaderMap,
) -> Response
where
    R: TenderRepository + 'static,
{
    let role = match actor_role(&headers) {
        Ok(role) => role,
        Err(response) => return response,
    };

    // Signatories see what waits on them; the others see every open tender.
    let pending = match landing_view(role) {
        LandingView::SignOffQueue => service.pending_for(role),
        _ => service.list(&TenderFilter {
            status: Some(TenderStatus::Active),
            ..TenderFilter::default()
        }),
    };

    match pending {
        Ok(records) => {
            let body = LandingResponse {
                role: role.describe(),
                view: landing_view(role),
                pending: records
                    .iter()
                    .map(|record| record.view(service.machine()))
                    .collect(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => service_error(err),
    }
}
