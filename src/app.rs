use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::stories;
use crate::db::repository::StoryRepository;

/// Text served on `GET /` so load balancers can check the process is up.
pub const LIVENESS_TEXT: &str = "story-paths-server";

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub story_repo: Arc<dyn StoryRepository>,
}

/// Build the HTTP router: story API, liveness route, CORS and request tracing.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(liveness_handler))
        .route(
            "/api/stories",
            get(stories::list_stories_handler).post(stories::create_story_handler),
        )
        .route("/api/stories/{id}", get(stories::fetch_branch_handler))
        .route(
            "/api/stories/{id}/updateTime",
            post(stories::update_time_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
        .with_state(state)
}

async fn liveness_handler() -> &'static str {
    LIVENESS_TEXT
}

/// Only the listed origins may call the API; credentials are allowed.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}
