//! Router assembly (spec §4, §6). Grounded on the teacher's
//! `ai-service::server::create_app` — same `ServiceBuilder` middleware
//! stack (trace, timeout, CORS), same health-route-bypasses-auth shape —
//! generalized from one `/api/v1/generate` endpoint to the spec's eleven,
//! and from a not-yet-wired auth layer to the spec's X-API-Key middleware.

use crate::handlers::{auth, dispatch, health, status};
use crate::middleware::auth::auth_middleware;
use crate::state::{AppState, AppStateInner};
use axum::routing::{get, post};
use axum::{middleware, Router};
use bff_shared::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub async fn create_app(config: Config) -> anyhow::Result<Router> {
    let broker = bff_shared::queue::broker_from_url(&config.broker_url).await?;
    let app_state: AppState = Arc::new(AppStateInner::new(config, broker).await?);
    Ok(build_router(app_state))
}

pub fn build_router(app_state: AppState) -> Router {
    let generate_routes = Router::new()
        .route("/generate/text-to-image", post(dispatch::text_to_image))
        .route("/generate/image-to-image", post(dispatch::image_to_image))
        .route("/generate/sketch-to-image", post(dispatch::sketch_to_image))
        .route("/generate/remove-background", post(dispatch::remove_background))
        .route("/generate/image-inpaint", post(dispatch::image_inpaint))
        .route("/generate/search-and-recolor", post(dispatch::search_and_recolor))
        .route("/generate/upscale", post(dispatch::upscale))
        .route("/generate/downscale", post(dispatch::downscale))
        .route("/generate/text-to-model", post(dispatch::text_to_model))
        .route("/generate/image-to-model", post(dispatch::image_to_model))
        .route("/generate/refine-model", post(dispatch::refine_model))
        .route("/tasks/:internal_task_id/status", get(status::get_status))
        .layer(middleware::from_fn_with_state(app_state.clone(), auth_middleware));

    Router::new()
        .route("/", get(health::root_info))
        .route("/health", get(health::health_check))
        .route("/auth/health", get(health::auth_health))
        .route("/auth/register", post(auth::register))
        .merge(generate_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state)
}
