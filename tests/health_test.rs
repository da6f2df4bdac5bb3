use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use nexus_gateway::state::AppState;

/// Build a test app router without requiring a real database.
fn test_app() -> axum::Router {
    let state = AppState::new_test();
    nexus_gateway::create_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_degraded_without_real_db() {
    let response = test_app()
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    // new_test() uses a lazy pool against a nonexistent DB, so the ping fails.
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["database"], false);
}

#[tokio::test]
async fn readiness_returns_503_before_mark_ready() {
    let response = test_app()
        .oneshot(Request::builder().uri("/api/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn readiness_returns_200_after_mark_ready() {
    let state = AppState::new_test();
    state.mark_ready();
    let app = nexus_gateway::create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/api/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_services_lists_all_six_dependencies() {
    let response = test_app()
        .oneshot(Request::builder().uri("/status/services").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let deps = json["dependencies"].as_array().expect("dependencies array");
    assert_eq!(deps.len(), 6);
    // All circuits start CLOSED.
    for d in deps {
        assert_eq!(d["phase"], "CLOSED");
    }
}

#[tokio::test]
async fn nonexistent_route_returns_404() {
    let response = test_app()
        .oneshot(Request::builder().uri("/api/does-not-exist").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_without_session_cookie_is_unauthorized() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"project_id":"p1","query":"hello"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
