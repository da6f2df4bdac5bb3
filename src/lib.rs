pub mod audit;
pub mod auth;
pub mod billing;
pub mod config;
pub mod errors;
pub mod feedback;
pub mod handlers;
pub mod ingestion;
pub mod jobs;
pub mod models;
pub mod registration_queue;
pub mod resilient_client;
pub mod saga;
pub mod session_store;
pub mod state;
pub mod wiki;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

/// Request correlation ID middleware, carried over from the upstream
/// gateway pattern: assigns or propagates an `X-Request-Id`.
async fn request_id_middleware(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("request_id", &request_id.as_str());

    let mut response = next.run(req).await;

    if let Ok(header_value) = axum::http::HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", header_value);
    }

    response
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Orchestration Gateway API",
        version = "1.0.0",
        description = "Multi-tenant AI assistant orchestration gateway",
        license(name = "MIT")
    ),
    paths(
        handlers::health_check,
        handlers::readiness,
        handlers::status_services,
        handlers::login,
        handlers::register,
        handlers::chat,
        handlers::toggle_bookmark,
        handlers::save_as_note,
        handlers::list_bookmarks,
        handlers::submit_feedback,
        handlers::generate_wiki,
        handlers::get_job,
        handlers::list_project_jobs,
    ),
    components(schemas(
        models::ChatRequest,
        models::ChatResponse,
        models::ChatTurn,
        models::Job,
        models::SubmitFeedbackRequest,
    )),
    tags(
        (name = "health", description = "Health, readiness, and dependency status"),
        (name = "auth", description = "Login, logout, registration"),
        (name = "chat", description = "Chat orchestration pipeline"),
        (name = "jobs", description = "Background job submission and status"),
    )
)]
pub struct ApiDoc;

/// Build the application router with the given shared state. Extracted
/// from `main()` so integration tests can construct the app without
/// binding to a network port.
pub fn create_router(state: AppState) -> Router {
    // Chat is the expensive, LLM-backed path: tighter limit.
    let rl_chat = GovernorConfigBuilder::default()
        .per_second(state.config.rate_limit_per_second.max(1))
        .burst_size(state.config.rate_limit_burst)
        .finish()
        .expect("rate limiter config: chat");
    let rl_default = GovernorConfigBuilder::default()
        .per_millisecond(500)
        .burst_size(120)
        .finish()
        .expect("rate limiter config: default");

    let public = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/health/ready", get(handlers::readiness))
        .route("/status/services", get(handlers::status_services))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/register", post(handlers::register));

    let chat_routes = Router::new()
        .route("/chat", post(handlers::chat))
        .layer(GovernorLayer::new(rl_chat));

    let other_routes = Router::new()
        .route("/chat/{message_id}/bookmark", post(handlers::toggle_bookmark))
        .route("/chat/{message_id}/save_as_note", post(handlers::save_as_note))
        .route("/project/{project_id}/bookmarks", get(handlers::list_bookmarks))
        .route("/feedback", post(handlers::submit_feedback))
        .route("/project/{project_id}/generate_wiki", post(handlers::generate_wiki))
        .route("/jobs/{job_id}", get(handlers::get_job))
        .route("/project/{project_id}/jobs", get(handlers::list_project_jobs))
        .layer(GovernorLayer::new(rl_default));

    let protected = chat_routes
        .merge(other_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    public
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}

