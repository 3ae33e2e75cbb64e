use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tender_desk::config::WorkflowConfig;
use tender_desk::workflows::tender::{
    tender_router, MemoryTenderRepository, TenderWorkflowService, ACTOR_ROLE_HEADER,
};
use tower::ServiceExt;

fn router() -> Router {
    let service = TenderWorkflowService::new(
        Arc::new(MemoryTenderRepository::default()),
        WorkflowConfig::default(),
    );
    tender_router(Arc::new(service))
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

fn post(uri: &str, role: Option<&str>, payload: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(role) = role {
        builder = builder.header(ACTOR_ROLE_HEADER, role);
    }
    builder
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

async fn create(app: &Router, division: &str) -> String {
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/tenders",
            Some("SM"),
            json!({ "title": "Travaux de réfection", "division": division }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    body["id"].as_str().expect("id present").to_string()
}

async fn act(app: &Router, id: &str, role: &str, action: &str) -> Response {
    app.clone()
        .oneshot(post(
            &format!("/api/v1/tenders/{id}/actions"),
            Some(role),
            json!({ "action": action }),
        ))
        .await
        .expect("router responds")
}

#[tokio::test]
async fn create_requires_role_header_and_markets_service() {
    let app = router();

    let missing = app
        .clone()
        .oneshot(post(
            "/api/v1/tenders",
            None,
            json!({ "title": "x", "division": "DSI" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let unknown = app
        .clone()
        .oneshot(post(
            "/api/v1/tenders",
            Some("DG"),
            json!({ "title": "x", "division": "DSI" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let wrong_role = app
        .clone()
        .oneshot(post(
            "/api/v1/tenders",
            Some("ST"),
            json!({ "title": "x", "division": "DSI" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(wrong_role.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let bad_division = app
        .clone()
        .oneshot(post(
            "/api/v1/tenders",
            Some("SM"),
            json!({ "title": "x", "division": "UNKNOWN" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(bad_division.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn premature_advance_reports_missing_sign_off() {
    let app = router();
    let id = create(&app, "DSI").await;

    let signed = act(&app, &id, "ST", "sign_off").await;
    assert_eq!(signed.status(), StatusCode::OK);
    let body = body_json(signed).await;
    assert_eq!(body["effect"]["effect"], "signed_off");
    assert_eq!(body["tender"]["awaiting"], "CE");

    let rejected = act(&app, &id, "CE", "advance_phase").await;
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(rejected).await;
    assert_eq!(body["precondition"]["kind"], "missing_sign_off");
    assert_eq!(body["precondition"]["role"], "CE");
    assert_eq!(body["precondition"]["phase"], "preparation");
}

#[tokio::test]
async fn get_list_and_dashboard_reflect_actions() {
    let app = router();
    let id = create(&app, "DTX").await;
    let cancelled = create(&app, "DSI").await;
    assert_eq!(
        act(&app, &cancelled, "ADMIN", "cancel").await.status(),
        StatusCode::OK
    );

    let fetched = app
        .clone()
        .oneshot(get(&format!("/api/v1/tenders/{id}")))
        .await
        .expect("router responds");
    assert_eq!(fetched.status(), StatusCode::OK);
    let body = body_json(fetched).await;
    assert_eq!(body["direction_code"], "DIE");
    assert_eq!(body["phase"]["order"], 1);

    let listed = app
        .clone()
        .oneshot(get("/api/v1/tenders?status=cancelled"))
        .await
        .expect("router responds");
    let body = body_json(listed).await;
    let rows = body.as_array().expect("array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], cancelled.as_str());

    let dashboard = app
        .clone()
        .oneshot(get("/api/v1/dashboard"))
        .await
        .expect("router responds");
    let body = body_json(dashboard).await;
    assert_eq!(body["totals"]["total_ao"], 2);
    assert_eq!(body["totals"]["en_cours"], 1);
    assert_eq!(body["totals"]["termines"], 0);
    let daf = &body["directions"][0];
    assert_eq!(daf["direction"], "DAF");
    assert_eq!(daf["total_ao"], 1);
    assert_eq!(daf["en_cours"], 0);
}

#[tokio::test]
async fn unknown_tender_is_not_found() {
    let app = router();
    let response = app
        .clone()
        .oneshot(get("/api/v1/tenders/AO-404404"))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn directory_and_registry_endpoints() {
    let app = router();

    let resolved = app
        .clone()
        .oneshot(get("/api/v1/directory/divisions/DSI"))
        .await
        .expect("router responds");
    assert_eq!(resolved.status(), StatusCode::OK);
    let body = body_json(resolved).await;
    assert_eq!(body["direction"], "DAF");

    let unknown = app
        .clone()
        .oneshot(get("/api/v1/directory/divisions/UNKNOWN"))
        .await
        .expect("router responds");
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let roles = body_json(
        app.clone()
            .oneshot(get("/api/v1/roles"))
            .await
            .expect("router responds"),
    )
    .await;
    assert_eq!(roles.as_array().expect("array").len(), 7);
    assert_eq!(roles[0]["code"], "ST");

    let phases = body_json(
        app.clone()
            .oneshot(get("/api/v1/phases"))
            .await
            .expect("router responds"),
    )
    .await;
    assert_eq!(phases[2]["order"], 3);
}

#[tokio::test]
async fn list_filters_accept_registry_spellings() {
    let app = router();
    let first = create(&app, "DSI").await;
    create(&app, "DTX").await;
    for role in ["ST", "CE"] {
        assert_eq!(
            act(&app, &first, role, "sign_off").await.status(),
            StatusCode::OK
        );
    }
    assert_eq!(
        act(&app, &first, "CE", "advance_phase").await.status(),
        StatusCode::OK
    );

    let ids = |body: Value| -> Vec<String> {
        body.as_array()
            .expect("array")
            .iter()
            .map(|row| row["id"].as_str().expect("id").to_string())
            .collect()
    };

    let by_number = app
        .clone()
        .oneshot(get("/api/v1/tenders?phase=2"))
        .await
        .expect("router responds");
    assert_eq!(by_number.status(), StatusCode::OK);
    assert_eq!(ids(body_json(by_number).await), vec![first.clone()]);

    let first_phase = body_json(
        app.clone()
            .oneshot(get("/api/v1/tenders?phase=1"))
            .await
            .expect("router responds"),
    )
    .await;
    assert_eq!(ids(first_phase).len(), 1);

    let payments = app
        .clone()
        .oneshot(get("/api/v1/tenders?phase=payments"))
        .await
        .expect("router responds");
    assert_eq!(payments.status(), StatusCode::OK);
    assert!(ids(body_json(payments).await).is_empty());

    let active = app
        .clone()
        .oneshot(get("/api/v1/tenders?status=Active&phase=execution"))
        .await
        .expect("router responds");
    assert_eq!(active.status(), StatusCode::OK);
    assert_eq!(ids(body_json(active).await), vec![first]);

    let unknown = app
        .clone()
        .oneshot(get("/api/v1/tenders?phase=4"))
        .await
        .expect("router responds");
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
}
